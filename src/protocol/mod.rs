//! Protocol model: identity, exportability, and method descriptors.
//!
//! - Branded identifiers ([`ProtocolId`], [`MethodId`], [`TypeId`]) keep
//!   identifier domains apart at compile time
//! - [`Exportable`] is the capability every wire-bound value implements
//! - [`Protocol`] is the per-connection descriptor the server registers

mod descriptor;
mod export;
mod ident;

pub use descriptor::{
    BoxFuture, ErrorWrapper, MethodDescription, MethodHandler, Protocol, ProtocolBuilder,
};
pub use export::{Cryptoable, Exportable, FixedBuffer};
pub use ident::{MethodId, ProtocolId, TypeId, Uint64};

//! # typewire
//!
//! Typed binding layer between application code and a framed,
//! length-prefixed, msgpack-encoded RPC transport.
//!
//! Application code defines **protocols** — named collections of remote
//! methods keyed by numeric ids — and gets a typed client and server over
//! an otherwise dynamically-typed wire:
//!
//! - **Codec** (`codec`): converts wire-level dynamic values
//!   ([`codec::WireValue`]) to and from typed values with exact numeric
//!   boundary rules
//! - **Protocol model** (`protocol`): branded identifiers, the
//!   [`protocol::Exportable`] capability, and per-connection
//!   [`protocol::Protocol`] descriptors
//! - **Transport boundary** (`transport`): the black-box framing engine's
//!   interface, with an in-process implementation for tests
//! - **Client/Server**: connect/invoke/close and listen/dispatch/stop
//!
//! ## Example
//!
//! ```ignore
//! use typewire::{Client, Server, ServerOpts};
//! use typewire::codec::{export_int, import_int};
//! use typewire::protocol::{MethodId, Protocol, ProtocolId};
//!
//! let arith = |_h: &Arc<Counter>| {
//!     Protocol::builder("demo.arith", ProtocolId::new(1))
//!         .method(MethodId::new(0), "incr", |args| async move {
//!             let n = import_int(args.first().unwrap_or(&WireValue::Null))?;
//!             Ok(export_int(n + 1))
//!         })
//!         .build()
//! };
//! ```

pub mod codec;
pub mod error;
pub mod protocol;
pub mod transport;

mod client;
mod server;

pub use client::Client;
pub use error::{Result, RpcError};
pub use server::{HandlerFactory, ProtocolFactory, Server, ServerOpts};

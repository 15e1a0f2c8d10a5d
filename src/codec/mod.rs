//! Primitive codec: wire values, importers, and exporters.
//!
//! Converts between wire-level dynamic values and strongly-typed in-memory
//! values:
//! - [`WireValue`] — the tagged union every transported field decodes to
//! - `import_*` — wire value to typed value, failing on shape mismatch
//! - `export_*` — typed value to the most compact wire representation
//! - [`MsgpackCodec`] — msgpack bytes for whole wire value trees

mod export;
mod import;
mod value;

pub use export::{crop_blob, export_int, export_uint, extend_args};
pub use import::{import_blob, import_bool, import_enum, import_int, import_string, import_uint};
pub use value::{MsgpackCodec, WireValue};

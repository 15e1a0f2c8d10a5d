//! Exportability: the contract for anything placed on the wire.

use bytes::Bytes;

use crate::codec::{crop_blob, import_blob, WireValue};
use crate::error::{Result, RpcError};
use crate::protocol::TypeId;

/// The universal wire-serialization capability.
///
/// Anything placed on the wire, including wrapped errors, yields a
/// wire-safe value tree through a single `export` operation.
pub trait Exportable {
    /// Produce the wire representation of this value.
    fn export(&self) -> WireValue;
}

/// An exportable value that self-declares its logical type on the wire.
pub trait Cryptoable: Exportable {
    /// The logical type identity of this value.
    fn type_id(&self) -> TypeId;
}

/// A wire value exports as itself.
impl Exportable for WireValue {
    fn export(&self) -> WireValue {
        self.clone()
    }
}

/// A byte sequence with a fixed declared length.
///
/// `export` always yields exactly the declared number of bytes, truncating
/// a longer stored buffer and zero-padding a shorter one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedBuffer {
    bytes: Bytes,
    len: usize,
}

impl FixedBuffer {
    /// Declare a buffer of length `len` holding `bytes`.
    pub fn new(len: usize, bytes: Bytes) -> Self {
        FixedBuffer { bytes, len }
    }

    /// Declare a buffer whose length is the current length of `bytes`.
    pub fn from_bytes(bytes: Bytes) -> Self {
        let len = bytes.len();
        FixedBuffer { bytes, len }
    }

    /// The declared length.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the declared length is zero.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The stored bytes, prior to crop-or-pad.
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// Import a wire blob that must be exactly `len` bytes long.
    pub fn import(a: &WireValue, len: usize) -> Result<Self> {
        let b = import_blob(a)?;
        if b.len() != len {
            return Err(RpcError::Import(format!(
                "expected blob of length {len} but got {}",
                b.len()
            )));
        }
        Ok(FixedBuffer { bytes: b, len })
    }
}

impl Exportable for FixedBuffer {
    fn export(&self) -> WireValue {
        WireValue::Bytes(crop_blob(self.bytes.clone(), Some(self.len)))
    }
}

//! Branded numeric identifiers.
//!
//! [`Uint64`] backs the wide identifiers; [`ProtocolId`], [`TypeId`] and
//! [`MethodId`] are nominal newtypes over it (or over a plain integer for
//! method ids) so the type checker, not a runtime tag, keeps identifier
//! domains apart. The brands are zero-cost: no runtime representation
//! difference from the underlying primitive.

use std::fmt;
use std::str::FromStr;

use crate::codec::{export_uint, WireValue};
use crate::error::{Result, RpcError};
use crate::protocol::Exportable;

/// A 64-bit unsigned wire integer.
///
/// Exports as a machine number below 2^32 and as the arbitrary-precision
/// representation at or above it. Construction from any negative input
/// fails with an import error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Uint64(u64);

impl Uint64 {
    /// Construct from a non-negative machine integer.
    pub const fn new(v: u64) -> Self {
        Uint64(v)
    }

    /// The underlying value.
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Import from a wire value. Negative numbers fail.
    pub fn import(a: &WireValue) -> Result<Self> {
        crate::codec::import_uint(a).map(Uint64)
    }
}

impl From<u64> for Uint64 {
    fn from(v: u64) -> Self {
        Uint64(v)
    }
}

impl TryFrom<i64> for Uint64 {
    type Error = RpcError;

    fn try_from(v: i64) -> Result<Self> {
        u64::try_from(v)
            .map(Uint64)
            .map_err(|_| RpcError::Import("cannot import negative number as uint64".to_string()))
    }
}

impl FromStr for Uint64 {
    type Err = RpcError;

    fn from_str(s: &str) -> Result<Self> {
        if let Ok(v) = s.parse::<u64>() {
            return Ok(Uint64(v));
        }
        // Distinguish a negative decimal from garbage for the error message.
        if s.parse::<i128>().map(|v| v < 0).unwrap_or(false) {
            Err(RpcError::Import(
                "cannot import negative number as uint64".to_string(),
            ))
        } else {
            Err(RpcError::Import(format!("cannot parse {s:?} as uint64")))
        }
    }
}

impl fmt::Display for Uint64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Exportable for Uint64 {
    fn export(&self) -> WireValue {
        export_uint(self.0)
    }
}

/// Identifier of a protocol, unique across a transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProtocolId(Uint64);

impl ProtocolId {
    /// Brand a raw value as a protocol id. Zero cost, no validation.
    pub const fn new(v: u64) -> Self {
        ProtocolId(Uint64::new(v))
    }

    /// The underlying value.
    pub const fn value(self) -> u64 {
        self.0.value()
    }

    /// Import from a wire value.
    pub fn import(a: &WireValue) -> Result<Self> {
        Uint64::import(a).map(ProtocolId)
    }
}

impl From<Uint64> for ProtocolId {
    fn from(v: Uint64) -> Self {
        ProtocolId(v)
    }
}

impl FromStr for ProtocolId {
    type Err = RpcError;

    fn from_str(s: &str) -> Result<Self> {
        s.parse::<Uint64>().map(ProtocolId)
    }
}

impl fmt::Display for ProtocolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Exportable for ProtocolId {
    fn export(&self) -> WireValue {
        self.0.export()
    }
}

/// Identifier of a wire-visible logical type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeId(Uint64);

impl TypeId {
    /// Brand a raw value as a type id. Zero cost, no validation.
    pub const fn new(v: u64) -> Self {
        TypeId(Uint64::new(v))
    }

    /// The underlying value.
    pub const fn value(self) -> u64 {
        self.0.value()
    }
}

impl From<Uint64> for TypeId {
    fn from(v: Uint64) -> Self {
        TypeId(v)
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Exportable for TypeId {
    fn export(&self) -> WireValue {
        self.0.export()
    }
}

/// Identifier of a method, local to one protocol.
///
/// Serializes as a plain machine number.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MethodId(u32);

impl MethodId {
    /// Brand a raw value as a method id. Zero cost, no validation.
    pub const fn new(v: u32) -> Self {
        MethodId(v)
    }

    /// The underlying value.
    pub const fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Exportable for MethodId {
    fn export(&self) -> WireValue {
        WireValue::Number(i64::from(self.0))
    }
}

//! Importers: wire value to typed value.
//!
//! Each function takes a loosely-typed [`WireValue`] and returns the typed
//! value, failing with an import error naming the expected and actual
//! shapes on any type mismatch or domain violation. Import failures are
//! local and recoverable; a handler that receives malformed arguments
//! rejects its own call, never the connection.

use bytes::Bytes;

use crate::codec::WireValue;
use crate::error::{Result, RpcError};

/// Import a signed integer from its machine-number or arbitrary-precision
/// representation.
pub fn import_int(a: &WireValue) -> Result<i64> {
    match a {
        WireValue::Number(n) => Ok(*n),
        WireValue::BigInt(b) => i64::try_from(*b)
            .map_err(|_| RpcError::Import(format!("integer {b} does not fit an int field"))),
        other => Err(RpcError::import_mismatch("int", other.type_name())),
    }
}

/// Import an unsigned integer. Negative values fail.
pub fn import_uint(a: &WireValue) -> Result<u64> {
    match a {
        WireValue::Number(n) => u64::try_from(*n)
            .map_err(|_| RpcError::Import("can't import negative number as uint".to_string())),
        WireValue::BigInt(b) => {
            if *b < 0 {
                Err(RpcError::Import(
                    "can't import negative number as uint".to_string(),
                ))
            } else {
                u64::try_from(*b).map_err(|_| {
                    RpcError::Import(format!("integer {b} does not fit a uint field"))
                })
            }
        }
        other => Err(RpcError::import_mismatch("uint", other.type_name())),
    }
}

/// Import a UTF-8 string. Strict tag check.
pub fn import_string(a: &WireValue) -> Result<String> {
    match a {
        WireValue::String(s) => Ok(s.clone()),
        other => Err(RpcError::import_mismatch("string", other.type_name())),
    }
}

/// Import a boolean. Strict tag check.
pub fn import_bool(a: &WireValue) -> Result<bool> {
    match a {
        WireValue::Bool(b) => Ok(*b),
        other => Err(RpcError::import_mismatch("boolean", other.type_name())),
    }
}

/// Import a byte sequence, returning an owned copy.
pub fn import_blob(a: &WireValue) -> Result<Bytes> {
    match a {
        WireValue::Bytes(b) => Ok(b.clone()),
        other => Err(RpcError::import_mismatch("blob", other.type_name())),
    }
}

/// Import an enum discriminant.
///
/// The wire value must be a machine number that is one of the declared
/// discriminants in `domain`.
pub fn import_enum(a: &WireValue, domain: &[u32]) -> Result<u32> {
    let n = match a {
        WireValue::Number(n) => *n,
        other => return Err(RpcError::import_mismatch("enum", other.type_name())),
    };
    let v = u32::try_from(n)
        .map_err(|_| RpcError::Import(format!("enum value {n} is out of range")))?;
    if domain.contains(&v) {
        Ok(v)
    } else {
        Err(RpcError::Import(format!("enum value {v} is out of range")))
    }
}

//! Exporters: typed value to wire value.
//!
//! Each function picks the most compact wire representation: the
//! machine-number encoding when the value fits the 32-bit range, the
//! arbitrary-precision encoding otherwise. The bounds are exact: signed
//! `[-2^31, 2^31)`, unsigned `[0, 2^32)`.

use bytes::{Bytes, BytesMut};

use crate::codec::WireValue;

/// Exclusive upper bound of the machine-number range for signed exports.
pub(crate) const INT32_BOUND: i64 = 1 << 31;

/// Exclusive upper bound of the machine-number range for unsigned exports.
pub(crate) const UINT32_BOUND: u64 = 1 << 32;

/// Export a signed integer, machine number iff `-2^31 <= a < 2^31`.
pub fn export_int(a: i64) -> WireValue {
    if a >= -INT32_BOUND && a < INT32_BOUND {
        WireValue::Number(a)
    } else {
        WireValue::BigInt(a as i128)
    }
}

/// Export an unsigned integer, machine number iff `a < 2^32`.
pub fn export_uint(a: u64) -> WireValue {
    if a < UINT32_BOUND {
        WireValue::Number(a as i64)
    } else {
        WireValue::BigInt(a as i128)
    }
}

/// Normalize a blob to a fixed wire length.
///
/// `None` or a matching length returns the input unchanged; longer input is
/// truncated, shorter input zero-extended.
pub fn crop_blob(b: Bytes, n: Option<usize>) -> Bytes {
    let n = match n {
        None => return b,
        Some(n) => n,
    };
    if b.len() == n {
        b
    } else if b.len() > n {
        b.slice(..n)
    } else {
        let mut out = BytesMut::with_capacity(n);
        out.extend_from_slice(&b);
        out.resize(n, 0);
        out.freeze()
    }
}

/// Pad a positional argument list with nulls until it has at least `n`
/// elements, so optional trailing arguments decode safely when the sender
/// omitted them.
pub fn extend_args(mut v: Vec<WireValue>, n: usize) -> Vec<WireValue> {
    if v.len() < n {
        v.resize(n, WireValue::Null);
    }
    v
}

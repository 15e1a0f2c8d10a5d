//! Dynamic wire values and the msgpack bridge.
//!
//! Everything that crosses the transport is a [`WireValue`]: a tagged union
//! over the primitive wire shapes. Typed conversion happens in the
//! `import_*` / `export_*` functions, which pattern-match over this union
//! and fail on an unexpected tag.
//!
//! Integers carry their representation: [`WireValue::Number`] is the
//! machine-number encoding, [`WireValue::BigInt`] the arbitrary-precision
//! encoding used for values outside the 32-bit range. The exporters pick
//! the representation; the msgpack bridge classifies decoded integers with
//! the same boundary so a value round-trips unchanged.

use bytes::Bytes;
use rmpv::{Integer, Utf8String, Value};

use crate::codec::export::INT32_BOUND;
use crate::error::{Result, RpcError};

/// A dynamically-typed wire value, prior to/after typed conversion.
#[derive(Debug, Clone, PartialEq)]
pub enum WireValue {
    /// msgpack nil.
    Null,
    /// Boolean.
    Bool(bool),
    /// Machine-number integer representation.
    Number(i64),
    /// Arbitrary-precision integer representation.
    BigInt(i128),
    /// UTF-8 string.
    String(String),
    /// Raw byte sequence.
    Bytes(Bytes),
    /// Ordered list of wire values.
    Array(Vec<WireValue>),
    /// Keyed structure, order-preserving.
    Map(Vec<(WireValue, WireValue)>),
}

impl WireValue {
    /// Name of this value's wire tag, used in import error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            WireValue::Null => "null",
            WireValue::Bool(_) => "bool",
            WireValue::Number(_) => "number",
            WireValue::BigInt(_) => "bigint",
            WireValue::String(_) => "string",
            WireValue::Bytes(_) => "bytes",
            WireValue::Array(_) => "array",
            WireValue::Map(_) => "map",
        }
    }

    /// Convert to an `rmpv` msgpack value.
    ///
    /// Fails with a variant error on a `BigInt` outside the 64-bit range,
    /// which no msgpack integer can carry.
    pub fn to_msgpack(&self) -> Result<Value> {
        let v = match self {
            WireValue::Null => Value::Nil,
            WireValue::Bool(b) => Value::Boolean(*b),
            WireValue::Number(n) => Value::Integer(Integer::from(*n)),
            WireValue::BigInt(b) => {
                if *b >= 0 && *b <= u64::MAX as i128 {
                    Value::Integer(Integer::from(*b as u64))
                } else if *b >= i64::MIN as i128 {
                    Value::Integer(Integer::from(*b as i64))
                } else {
                    return Err(RpcError::Variant(format!(
                        "bigint {b} does not fit a 64-bit wire integer"
                    )));
                }
            }
            WireValue::String(s) => Value::String(Utf8String::from(s.as_str())),
            WireValue::Bytes(b) => Value::Binary(b.to_vec()),
            WireValue::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(item.to_msgpack()?);
                }
                Value::Array(out)
            }
            WireValue::Map(pairs) => {
                let mut out = Vec::with_capacity(pairs.len());
                for (k, v) in pairs {
                    out.push((k.to_msgpack()?, v.to_msgpack()?));
                }
                Value::Map(out)
            }
        };
        Ok(v)
    }

    /// Convert from an `rmpv` msgpack value.
    ///
    /// Decoded integers inside `[-2^31, 2^31)` become [`WireValue::Number`],
    /// everything else [`WireValue::BigInt`], matching the exporter
    /// boundary. Floats and ext values match no wire variant and fail with
    /// a variant error.
    pub fn from_msgpack(v: Value) -> Result<WireValue> {
        let out = match v {
            Value::Nil => WireValue::Null,
            Value::Boolean(b) => WireValue::Bool(b),
            Value::Integer(i) => {
                if let Some(n) = i.as_i64() {
                    if n >= -INT32_BOUND && n < INT32_BOUND {
                        WireValue::Number(n)
                    } else {
                        WireValue::BigInt(n as i128)
                    }
                } else if let Some(u) = i.as_u64() {
                    WireValue::BigInt(u as i128)
                } else {
                    return Err(RpcError::Variant(
                        "msgpack integer with no 64-bit representation".to_string(),
                    ));
                }
            }
            Value::String(s) => {
                let s = s
                    .into_str()
                    .ok_or_else(|| RpcError::Import("invalid utf-8 in wire string".to_string()))?;
                WireValue::String(s)
            }
            Value::Binary(b) => WireValue::Bytes(Bytes::from(b)),
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(WireValue::from_msgpack(item)?);
                }
                WireValue::Array(out)
            }
            Value::Map(pairs) => {
                let mut out = Vec::with_capacity(pairs.len());
                for (k, v) in pairs {
                    out.push((WireValue::from_msgpack(k)?, WireValue::from_msgpack(v)?));
                }
                WireValue::Map(out)
            }
            Value::F32(_) | Value::F64(_) => {
                return Err(RpcError::Variant(
                    "no wire variant for msgpack float".to_string(),
                ));
            }
            Value::Ext(tag, _) => {
                return Err(RpcError::Variant(format!(
                    "no wire variant for msgpack ext {tag}"
                )));
            }
        };
        Ok(out)
    }
}

/// MessagePack codec for wire value trees.
///
/// This is the crate's view of the framing engine's payload encoding; the
/// in-memory transport uses it for every exchanged envelope.
pub struct MsgpackCodec;

impl MsgpackCodec {
    /// Encode a wire value to msgpack bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be represented in msgpack.
    pub fn encode(value: &WireValue) -> Result<Vec<u8>> {
        let v = value.to_msgpack()?;
        let mut buf = Vec::new();
        rmpv::encode::write_value(&mut buf, &v)?;
        Ok(buf)
    }

    /// Decode msgpack bytes to a wire value.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed msgpack or a value with no wire
    /// variant (floats, ext).
    pub fn decode(bytes: &[u8]) -> Result<WireValue> {
        let mut cursor = bytes;
        let v = rmpv::decode::read_value(&mut cursor)?;
        WireValue::from_msgpack(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(v: WireValue) -> WireValue {
        let bytes = MsgpackCodec::encode(&v).unwrap();
        MsgpackCodec::decode(&bytes).unwrap()
    }

    #[test]
    fn test_roundtrip_scalars() {
        assert_eq!(roundtrip(WireValue::Null), WireValue::Null);
        assert_eq!(roundtrip(WireValue::Bool(true)), WireValue::Bool(true));
        assert_eq!(roundtrip(WireValue::Number(42)), WireValue::Number(42));
        assert_eq!(roundtrip(WireValue::Number(-42)), WireValue::Number(-42));
        assert_eq!(
            roundtrip(WireValue::String("hello".to_string())),
            WireValue::String("hello".to_string())
        );
    }

    #[test]
    fn test_roundtrip_bigint() {
        let big = WireValue::BigInt(1 << 40);
        assert_eq!(roundtrip(big.clone()), big);

        let max = WireValue::BigInt(u64::MAX as i128);
        assert_eq!(roundtrip(max.clone()), max);

        let neg = WireValue::BigInt(i64::MIN as i128);
        assert_eq!(roundtrip(neg.clone()), neg);
    }

    #[test]
    fn test_roundtrip_bytes() {
        let blob = WireValue::Bytes(Bytes::from_static(&[1, 2, 3, 4, 5]));
        assert_eq!(roundtrip(blob.clone()), blob);

        // Binary format in msgpack: 0xc4 (bin8) + length + data
        let encoded = MsgpackCodec::encode(&blob).unwrap();
        assert_eq!(encoded[0], 0xc4, "expected bin8 format");
    }

    #[test]
    fn test_roundtrip_nested() {
        let v = WireValue::Array(vec![
            WireValue::Number(1),
            WireValue::Map(vec![(
                WireValue::String("k".to_string()),
                WireValue::Array(vec![WireValue::Null, WireValue::Bool(false)]),
            )]),
        ]);
        assert_eq!(roundtrip(v.clone()), v);
    }

    #[test]
    fn test_null_encodes_as_nil() {
        let encoded = MsgpackCodec::encode(&WireValue::Null).unwrap();
        assert_eq!(encoded, vec![0xc0]);
    }

    #[test]
    fn test_integer_classification_boundary() {
        // Values inside [-2^31, 2^31) decode as Number, outside as BigInt.
        let inside = [0i64, 1, -1, (1 << 31) - 1, -(1 << 31)];
        for n in inside {
            assert_eq!(roundtrip(WireValue::Number(n)), WireValue::Number(n));
        }

        let outside = [1i128 << 31, -(1i128 << 31) - 1, 1 << 40];
        for n in outside {
            assert_eq!(roundtrip(WireValue::BigInt(n)), WireValue::BigInt(n));
        }
    }

    #[test]
    fn test_float_has_no_wire_variant() {
        let mut buf = Vec::new();
        rmpv::encode::write_value(&mut buf, &Value::F64(3.25)).unwrap();
        let err = MsgpackCodec::decode(&buf).unwrap_err();
        assert!(matches!(err, RpcError::Variant(_)));
    }

    #[test]
    fn test_ext_has_no_wire_variant() {
        let mut buf = Vec::new();
        rmpv::encode::write_value(&mut buf, &Value::Ext(7, vec![1, 2])).unwrap();
        let err = MsgpackCodec::decode(&buf).unwrap_err();
        assert!(matches!(err, RpcError::Variant(_)));
    }

    #[test]
    fn test_oversized_bigint_rejected() {
        let err = WireValue::BigInt(i128::MAX).to_msgpack().unwrap_err();
        assert!(matches!(err, RpcError::Variant(_)));
    }

    #[test]
    fn test_decode_error_on_truncated_input() {
        let blob = WireValue::Bytes(Bytes::from_static(&[1, 2, 3, 4, 5]));
        let encoded = MsgpackCodec::encode(&blob).unwrap();
        let result = MsgpackCodec::decode(&encoded[..2]);
        assert!(result.is_err());
    }

    #[test]
    fn test_type_names() {
        assert_eq!(WireValue::Null.type_name(), "null");
        assert_eq!(WireValue::Number(0).type_name(), "number");
        assert_eq!(WireValue::BigInt(0).type_name(), "bigint");
        assert_eq!(WireValue::Bytes(Bytes::new()).type_name(), "bytes");
        assert_eq!(WireValue::Map(vec![]).type_name(), "map");
    }
}

//! Value codecs
//!
//! Two encodings per value:
//! - indexed: a searchable string token. Numbers and dates become fixed-width
//!   lowercase hex of the sign-flipped value, so string order equals value order.
//! - stored: an exact binary form. Strings are UTF-8, numbers big-endian,
//!   dates 12 bytes (seconds + nanoseconds), principals a kind byte + UTF-8 name.
//!
//! Binary values have neither form.

use bytes::{BufMut, Bytes, BytesMut};
use canopy_core::{Principal, PrincipalKind, Value, ValueType};
use chrono::{DateTime, Utc};

/// Errors raised by the value codecs
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValueError {
    #[error("Value type {0} cannot be indexed or stored")]
    Unsupported(ValueType),

    #[error("Stored {value_type} value has {actual} bytes, expected {expected}")]
    Length {
        value_type: ValueType,
        expected: usize,
        actual: usize,
    },

    #[error("Stored value is not valid UTF-8")]
    Utf8,

    #[error("Unknown principal kind tag {0}")]
    PrincipalTag(u8),

    #[error("Timestamp out of range: {0}s {1}ns")]
    TimestampRange(i64, u32),

    #[error("Cannot read {input:?} as {value_type}")]
    Coerce { value_type: ValueType, input: String },

    #[error("Invalid JSON: {0}")]
    Json(String),
}

const SIGN_BIT_32: u32 = 0x8000_0000;
const SIGN_BIT_64: u64 = 0x8000_0000_0000_0000;

const PRINCIPAL_USER: u8 = 0;
const PRINCIPAL_GROUP: u8 = 1;
const PRINCIPAL_PSEUDO: u8 = 2;

/// Order-preserving 8 digit token
pub fn encode_int(value: i32) -> String {
    format!("{:08x}", (value as u32) ^ SIGN_BIT_32)
}

/// Order-preserving 16 digit token
pub fn encode_long(value: i64) -> String {
    format!("{:016x}", (value as u64) ^ SIGN_BIT_64)
}

const NANOS_PER_MILLI: u32 = 1_000_000;

/// Order-preserving token: 16 digits of epoch milliseconds, then 5 digits of
/// the nanoseconds below the millisecond
///
/// Range queries may match on the millisecond prefix alone.
pub fn encode_date(value: &DateTime<Utc>) -> String {
    let sub_milli = value.timestamp_subsec_nanos() % NANOS_PER_MILLI;
    format!("{}{:05x}", encode_long(value.timestamp_millis()), sub_milli)
}

/// Searchable token of a value
pub fn encode_indexed(value: &Value) -> Result<String, ValueError> {
    match value {
        Value::String(s) | Value::Html(s) | Value::Json(s) | Value::ImageRef(s) => Ok(s.clone()),
        Value::Boolean(b) => Ok(b.to_string()),
        Value::Principal(p) => Ok(p.qualified_name()),
        Value::Date(d) | Value::Timestamp(d) => Ok(encode_date(d)),
        Value::Int(i) => Ok(encode_int(*i)),
        Value::Long(l) => Ok(encode_long(*l)),
        Value::Binary(_) | Value::JsonBinary(_) => Err(ValueError::Unsupported(value.value_type())),
    }
}

pub fn encode_long_stored(value: i64) -> Bytes {
    Bytes::copy_from_slice(&value.to_be_bytes())
}

pub fn decode_long_stored(data: &[u8]) -> Result<i64, ValueError> {
    let bytes: [u8; 8] = data.try_into().map_err(|_| ValueError::Length {
        value_type: ValueType::Long,
        expected: 8,
        actual: data.len(),
    })?;
    Ok(i64::from_be_bytes(bytes))
}

pub fn decode_string_stored(data: &[u8]) -> Result<String, ValueError> {
    String::from_utf8(data.to_vec()).map_err(|_| ValueError::Utf8)
}

/// Exact binary form of a value
pub fn encode_stored(value: &Value) -> Result<Bytes, ValueError> {
    let bytes = match value {
        Value::String(s) | Value::Html(s) | Value::Json(s) | Value::ImageRef(s) => Bytes::copy_from_slice(s.as_bytes()),
        Value::Boolean(b) => Bytes::copy_from_slice(&[u8::from(*b)]),
        Value::Principal(p) => {
            let tag = match p.kind() {
                PrincipalKind::User => PRINCIPAL_USER,
                PrincipalKind::Group => PRINCIPAL_GROUP,
                PrincipalKind::Pseudo => PRINCIPAL_PSEUDO,
            };
            let mut buf = BytesMut::with_capacity(1 + p.name().len());
            buf.put_u8(tag);
            buf.put_slice(p.name().as_bytes());
            buf.freeze()
        }
        Value::Date(d) | Value::Timestamp(d) => {
            let mut buf = BytesMut::with_capacity(12);
            buf.put_i64(d.timestamp());
            buf.put_u32(d.timestamp_subsec_nanos());
            buf.freeze()
        }
        Value::Int(i) => Bytes::copy_from_slice(&i.to_be_bytes()),
        Value::Long(l) => encode_long_stored(*l),
        Value::Binary(_) | Value::JsonBinary(_) => return Err(ValueError::Unsupported(value.value_type())),
    };
    Ok(bytes)
}

/// Rebuild a value of `value_type` from its stored form
pub fn decode_stored(value_type: ValueType, data: &[u8]) -> Result<Value, ValueError> {
    let fixed = |expected: usize| {
        if data.len() == expected {
            Ok(())
        } else {
            Err(ValueError::Length { value_type, expected, actual: data.len() })
        }
    };
    match value_type {
        ValueType::String => Ok(Value::String(decode_string_stored(data)?)),
        ValueType::Html => Ok(Value::Html(decode_string_stored(data)?)),
        ValueType::Json => Ok(Value::Json(decode_string_stored(data)?)),
        ValueType::ImageRef => Ok(Value::ImageRef(decode_string_stored(data)?)),
        ValueType::Boolean => {
            fixed(1)?;
            Ok(Value::Boolean(data[0] != 0))
        }
        ValueType::Principal => {
            let (&tag, name) = data.split_first().ok_or(ValueError::Length {
                value_type,
                expected: 1,
                actual: 0,
            })?;
            let name = decode_string_stored(name)?;
            let principal = match tag {
                PRINCIPAL_USER => Principal::user(name),
                PRINCIPAL_GROUP => Principal::group(name),
                PRINCIPAL_PSEUDO if name.starts_with(canopy_core::acl::PSEUDO_PREFIX) => {
                    Principal::from_stored(&name, true)
                }
                other => return Err(ValueError::PrincipalTag(other)),
            };
            Ok(Value::Principal(principal))
        }
        ValueType::Date | ValueType::Timestamp => {
            fixed(12)?;
            let mut secs = [0u8; 8];
            secs.copy_from_slice(&data[..8]);
            let mut nanos = [0u8; 4];
            nanos.copy_from_slice(&data[8..]);
            let (secs, nanos) = (i64::from_be_bytes(secs), u32::from_be_bytes(nanos));
            let dt = DateTime::from_timestamp(secs, nanos).ok_or(ValueError::TimestampRange(secs, nanos))?;
            Ok(if value_type == ValueType::Date { Value::Date(dt) } else { Value::Timestamp(dt) })
        }
        ValueType::Int => {
            fixed(4)?;
            let bytes: [u8; 4] = [data[0], data[1], data[2], data[3]];
            Ok(Value::Int(i32::from_be_bytes(bytes)))
        }
        ValueType::Long => Ok(Value::Long(decode_long_stored(data)?)),
        ValueType::Binary | ValueType::JsonBinary => Err(ValueError::Unsupported(value_type)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use canopy_core::BinaryValue;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn round_trip(value: Value) {
        let stored = encode_stored(&value).unwrap();
        assert_eq!(decode_stored(value.value_type(), &stored).unwrap(), value);
    }

    #[test]
    fn test_round_trip_every_storable_type() {
        let when = Utc.with_ymd_and_hms(2024, 2, 29, 13, 45, 7).unwrap() + chrono::Duration::nanoseconds(123_456_789);
        round_trip(Value::String("Grüße".into()));
        round_trip(Value::Html("<p>Hi</p>".into()));
        round_trip(Value::Json(r#"{"a": [1, 2]}"#.into()));
        round_trip(Value::ImageRef("/images/logo.png".into()));
        round_trip(Value::Boolean(true));
        round_trip(Value::Boolean(false));
        round_trip(Value::Principal(Principal::user("alice")));
        round_trip(Value::Principal(Principal::group("editors")));
        round_trip(Value::Principal(Principal::all()));
        round_trip(Value::Date(when));
        round_trip(Value::Timestamp(when));
        round_trip(Value::Int(i32::MIN));
        round_trip(Value::Long(-42));
    }

    #[test]
    fn test_binary_values_are_rejected() {
        let bin = Value::Binary(BinaryValue { content_type: "image/png".into(), data: Bytes::from_static(b"x") });
        assert_eq!(encode_stored(&bin), Err(ValueError::Unsupported(ValueType::Binary)));
        assert_eq!(encode_indexed(&Value::JsonBinary(Bytes::new())), Err(ValueError::Unsupported(ValueType::JsonBinary)));
        assert!(decode_stored(ValueType::Binary, b"x").is_err());
    }

    #[test]
    fn test_decode_rejects_bad_lengths() {
        assert!(matches!(decode_stored(ValueType::Int, &[0, 1]), Err(ValueError::Length { expected: 4, .. })));
        assert!(matches!(decode_stored(ValueType::Date, &[0; 8]), Err(ValueError::Length { expected: 12, .. })));
        assert!(decode_stored(ValueType::Principal, &[]).is_err());
        assert_eq!(decode_stored(ValueType::Principal, b"\x07bob"), Err(ValueError::PrincipalTag(7)));
        assert_eq!(decode_stored(ValueType::String, &[0xff, 0xfe]), Err(ValueError::Utf8));
    }

    #[test]
    fn test_date_tokens_order_below_a_millisecond() {
        let a = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let b = a + chrono::Duration::nanoseconds(1);
        let ea = encode_indexed(&Value::Date(a)).unwrap();
        let eb = encode_indexed(&Value::Timestamp(b)).unwrap();
        assert!(ea < eb);
        assert_eq!(ea.len(), 21);
        assert_eq!(ea[..16], eb[..16]);
        assert_eq!(&ea[..16], encode_long(a.timestamp_millis()));

        let before_epoch = DateTime::from_timestamp(-1, 999_999_999).unwrap();
        assert!(encode_date(&before_epoch) < encode_date(&DateTime::from_timestamp(0, 0).unwrap()));
    }

    #[test]
    fn test_indexed_tokens_are_fixed_width() {
        assert_eq!(encode_int(0), "80000000");
        assert_eq!(encode_int(-1), "7fffffff");
        assert_eq!(encode_long(0).len(), 16);
        assert_eq!(encode_indexed(&Value::Principal(Principal::group("staff"))).unwrap(), "g:staff");
    }

    proptest! {
        #[test]
        fn prop_int_order_preserved(a in any::<i32>(), b in any::<i32>()) {
            prop_assert_eq!(a.cmp(&b), encode_int(a).cmp(&encode_int(b)));
        }

        #[test]
        fn prop_long_order_preserved(a in any::<i64>(), b in any::<i64>()) {
            prop_assert_eq!(a.cmp(&b), encode_long(a).cmp(&encode_long(b)));
        }

        #[test]
        fn prop_date_order_preserved(a in -62_000_000_000i64..250_000_000_000i64, an in 0u32..1_000_000_000,
                                     b in -62_000_000_000i64..250_000_000_000i64, bn in 0u32..1_000_000_000) {
            let da = DateTime::from_timestamp(a, an).unwrap();
            let db = DateTime::from_timestamp(b, bn).unwrap();
            prop_assert_eq!(da.cmp(&db), encode_date(&da).cmp(&encode_date(&db)));
        }

        #[test]
        fn prop_long_and_string_round_trip(l in any::<i64>(), s in ".*") {
            round_trip(Value::Long(l));
            round_trip(Value::String(s));
        }
    }
}

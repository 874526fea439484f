//! JSON encoding with timestamp support.
//!
//! Timestamps render as `YYYY-MM-DDTHH:MM:SSZ`. Timezone-aware values are
//! converted to UTC first; naive values are taken as already being UTC.
//! Values carrying only a time of day cannot be encoded.

use std::fmt;

use chrono::{DateTime, NaiveDateTime, NaiveTime, TimeZone};
use serde::ser::{Error as _, SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use thiserror::Error;

/// Output pattern for timestamps.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Encoding failure.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// The input contained a value with no JSON representation.
    #[error("{0}")]
    Unsupported(String),

    #[error("JSON encoding failed: {0}")]
    Json(serde_json::Error),
}

impl From<serde_json::Error> for EncodeError {
    fn from(err: serde_json::Error) -> Self {
        // Custom errors raised by `Serialize` impls are classified as data errors.
        if err.is_data() {
            EncodeError::Unsupported(err.to_string())
        } else {
            EncodeError::Json(err)
        }
    }
}

/// A structured document that may contain timestamps.
///
/// Objects keep their insertion order.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    Array(Vec<Value>),
    Object(Vec<(String, Value)>),
    DateTime(NaiveDateTime),
    /// Not encodable; kept so callers holding one get a clear error.
    Time(NaiveTime),
}

impl Value {
    /// Build an object from key/value pairs, preserving order.
    pub fn object<K, V, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Value::Object(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

struct Unsupported<'a>(&'a NaiveTime);

impl fmt::Display for Unsupported<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "time value {} is not JSON serializable", self.0)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) => n.serialize(serializer),
            Value::String(s) => serializer.serialize_str(s),
            Value::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Object(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
            Value::DateTime(dt) => timestamp::serialize(dt, serializer),
            Value::Time(t) => Err(S::Error::custom(Unsupported(t))),
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::$variant(v.into())
            }
        })*
    };
}

value_from! {
    bool => Bool,
    i32 => Number,
    i64 => Number,
    u16 => Number,
    u32 => Number,
    u64 => Number,
    String => String,
    &str => String,
    NaiveDateTime => DateTime,
    NaiveTime => Time,
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        serde_json::Number::from_f64(v).map_or(Value::Null, Value::Number)
    }
}

impl<Tz: TimeZone> From<DateTime<Tz>> for Value {
    fn from(v: DateTime<Tz>) -> Self {
        Value::DateTime(v.naive_utc())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(Into::into).collect())
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Into::into).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

/// Encode any serializable value to JSON text.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<String, EncodeError> {
    Ok(serde_json::to_string(value)?)
}

/// Convert to a `serde_json::Value`, rendering timestamps as strings.
pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<serde_json::Value, EncodeError> {
    Ok(serde_json::to_value(value)?)
}

/// Serde adapter for timestamp fields: `#[serde(with = "codec::timestamp")]`.
pub mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::Serializer;

    use super::TIMESTAMP_FORMAT;

    /// Types that have a UTC calendar date and time.
    pub trait Timestamp {
        fn to_utc_naive(&self) -> NaiveDateTime;
    }

    impl Timestamp for NaiveDateTime {
        fn to_utc_naive(&self) -> NaiveDateTime {
            *self
        }
    }

    impl Timestamp for DateTime<Utc> {
        fn to_utc_naive(&self) -> NaiveDateTime {
            self.naive_utc()
        }
    }

    impl Timestamp for DateTime<chrono::FixedOffset> {
        fn to_utc_naive(&self) -> NaiveDateTime {
            self.naive_utc()
        }
    }

    pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Timestamp,
        S: Serializer,
    {
        serializer.collect_str(&value.to_utc_naive().format(TIMESTAMP_FORMAT))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, NaiveDate};

    fn dec_10_2013() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2013, 12, 10)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_naive_datetime_renders_with_z() {
        let doc = Value::object([("a", dec_10_2013())]);
        assert_eq!(encode(&doc).unwrap(), r#"{"a":"2013-12-10T00:00:00Z"}"#);
    }

    #[test]
    fn test_aware_datetime_converted_to_utc() {
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let local = offset
            .from_local_datetime(&dec_10_2013())
            .single()
            .unwrap();
        let doc = Value::object([("at", local)]);
        assert_eq!(encode(&doc).unwrap(), r#"{"at":"2013-12-09T22:00:00Z"}"#);
    }

    #[test]
    fn test_time_only_is_unsupported() {
        let doc = Value::object([("a", NaiveTime::from_hms_opt(0, 0, 0).unwrap())]);
        let err = encode(&doc).unwrap_err();
        assert!(matches!(err, EncodeError::Unsupported(_)));
        assert!(err.to_string().contains("00:00:00"));
        assert!(err.to_string().contains("not JSON serializable"));
    }

    #[test]
    fn test_nested_unsupported_value_fails() {
        let doc = Value::object([(
            "outer",
            Value::Array(vec![Value::from(1i64), Value::Time(NaiveTime::from_hms_opt(12, 30, 0).unwrap())]),
        )]);
        assert!(matches!(encode(&doc), Err(EncodeError::Unsupported(_))));
    }

    #[test]
    fn test_object_order_preserved() {
        let doc = Value::object([
            ("zeta", Value::from(1i64)),
            ("alpha", Value::from("x")),
            ("mid", Value::Null),
        ]);
        assert_eq!(encode(&doc).unwrap(), r#"{"zeta":1,"alpha":"x","mid":null}"#);
    }

    #[test]
    fn test_from_serde_json_value() {
        let doc = Value::from(serde_json::json!({"b": [true, 2.5], "a": "s"}));
        assert_eq!(encode(&doc).unwrap(), r#"{"b":[true,2.5],"a":"s"}"#);
    }

    #[test]
    fn test_non_finite_float_is_null() {
        assert_eq!(Value::from(f64::NAN), Value::Null);
    }

    #[derive(Serialize)]
    struct Event {
        name: &'static str,
        #[serde(with = "timestamp")]
        at: NaiveDateTime,
    }

    #[test]
    fn test_timestamp_field_adapter() {
        let event = Event {
            name: "deploy",
            at: dec_10_2013(),
        };
        assert_eq!(
            encode(&event).unwrap(),
            r#"{"name":"deploy","at":"2013-12-10T00:00:00Z"}"#
        );
    }

    #[test]
    fn test_to_json_value() {
        let value = to_json(&Value::object([("t", dec_10_2013())])).unwrap();
        assert_eq!(value["t"], "2013-12-10T00:00:00Z");
    }
}

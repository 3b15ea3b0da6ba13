//! Typed values produced by coercion and held by records.

use std::cmp::Ordering;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use serde_json::Value as JsonValue;

use super::onyx_type::{OnyxType, ScalarType};

/// Output format for dates.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Output format for datetimes.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// A typed value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Text(String),
    Integer(i64),
    Decimal(Decimal),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Boolean(bool),
    Array(Vec<Value>),
    Json(JsonValue),
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the text content, if this is a text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer content, if this is an integer value.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Orders two values of compatible types.
    ///
    /// Integers and decimals compare numerically, dates compare against the
    /// date part of datetimes. NULL and incompatible values are unordered.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (Value::Decimal(a), Value::Decimal(b)) => Some(a.cmp(b)),
            (Value::Integer(a), Value::Decimal(b)) => Some(Decimal::from(*a).cmp(b)),
            (Value::Decimal(a), Value::Integer(b)) => Some(a.cmp(&Decimal::from(*b))),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
            (Value::DateTime(a), Value::Date(b)) => Some(a.date().cmp(b)),
            (Value::Date(a), Value::DateTime(b)) => Some(a.cmp(&b.date())),
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// NULL-unaware equality: NULL never equals anything.
    pub fn matches(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => false,
            (Value::Array(a), Value::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.matches(y))
            }
            (Value::Json(a), Value::Json(b)) => a == b,
            _ => self.compare(other) == Some(Ordering::Equal),
        }
    }

    /// Converts a stored JSON value into a typed value for a field type.
    ///
    /// Returns None when the JSON value does not fit the type.
    pub fn from_json(json: &JsonValue, onyx_type: OnyxType) -> Option<Value> {
        if json.is_null() {
            return Some(Value::Null);
        }
        match onyx_type {
            OnyxType::Text | OnyxType::Choice => json.as_str().map(Value::text),
            OnyxType::Integer => json.as_i64().map(Value::Integer),
            OnyxType::Decimal => match json {
                JsonValue::Number(n) => n
                    .as_i64()
                    .map(Decimal::from)
                    .or_else(|| n.as_f64().and_then(Decimal::from_f64))
                    .map(Value::Decimal),
                JsonValue::String(s) => s.parse::<Decimal>().ok().map(Value::Decimal),
                _ => None,
            },
            OnyxType::Date => json
                .as_str()
                .and_then(|s| NaiveDate::parse_from_str(s, DATE_FORMAT).ok())
                .map(Value::Date),
            OnyxType::DateTime => json
                .as_str()
                .and_then(|s| {
                    NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
                        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
                        .ok()
                })
                .map(Value::DateTime),
            OnyxType::Boolean => json.as_bool().map(Value::Boolean),
            OnyxType::Array(base) => json.as_array().and_then(|items| {
                items
                    .iter()
                    .map(|item| Value::from_json(item, base.onyx_type()))
                    .collect::<Option<Vec<_>>>()
                    .map(Value::Array)
            }),
            OnyxType::Structure => json.is_object().then(|| Value::Json(json.clone())),
            OnyxType::Identifiers => json.as_array().map(|items| {
                Value::Array(
                    items
                        .iter()
                        .filter_map(|item| item.as_str().map(Value::text))
                        .collect(),
                )
            }),
            OnyxType::Relation => None,
        }
    }

    /// Converts the value to JSON for output.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Null => JsonValue::Null,
            Value::Text(s) => JsonValue::String(s.clone()),
            Value::Integer(i) => JsonValue::from(*i),
            Value::Decimal(d) => d
                .to_f64()
                .map(JsonValue::from)
                .unwrap_or_else(|| JsonValue::String(d.to_string())),
            Value::Date(d) => JsonValue::String(d.format(DATE_FORMAT).to_string()),
            Value::DateTime(dt) => JsonValue::String(dt.format(DATETIME_FORMAT).to_string()),
            Value::Boolean(b) => JsonValue::Bool(*b),
            Value::Array(items) => JsonValue::Array(items.iter().map(Value::to_json).collect()),
            Value::Json(json) => json.clone(),
        }
    }

    /// Returns the scalar type this value naturally belongs to.
    pub fn scalar_type(&self) -> Option<ScalarType> {
        match self {
            Value::Text(_) => Some(ScalarType::Text),
            Value::Integer(_) => Some(ScalarType::Integer),
            Value::Decimal(_) => Some(ScalarType::Decimal),
            Value::Date(_) => Some(ScalarType::Date),
            Value::DateTime(_) => Some(ScalarType::DateTime),
            Value::Boolean(_) => Some(ScalarType::Boolean),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Text(s) => write!(f, "{}", s),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Decimal(d) => write!(f, "{}", d),
            Value::Date(d) => write!(f, "{}", d.format(DATE_FORMAT)),
            Value::DateTime(dt) => write!(f, "{}", dt.format(DATETIME_FORMAT)),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Array(_) | Value::Json(_) => write!(f, "{}", self.to_json()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_null_never_matches() {
        assert!(!Value::Null.matches(&Value::Null));
        assert!(!Value::Null.matches(&Value::Integer(1)));
        assert!(Value::Integer(1).matches(&Value::Integer(1)));
    }

    #[test]
    fn test_numeric_cross_compare() {
        let d: Decimal = "2.5".parse().unwrap();
        assert_eq!(
            Value::Integer(2).compare(&Value::Decimal(d)),
            Some(Ordering::Less)
        );
        assert!(Value::Integer(3).matches(&Value::Decimal(Decimal::from(3))));
    }

    #[test]
    fn test_from_json() {
        assert_eq!(
            Value::from_json(&json!("2024-03-01"), OnyxType::Date),
            Some(Value::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()))
        );
        assert_eq!(
            Value::from_json(&json!([1, 2]), OnyxType::Array(ScalarType::Integer)),
            Some(Value::Array(vec![Value::Integer(1), Value::Integer(2)]))
        );
        assert_eq!(Value::from_json(&json!("x"), OnyxType::Integer), None);
        assert_eq!(
            Value::from_json(&json!(null), OnyxType::Text),
            Some(Value::Null)
        );
        assert_eq!(Value::from_json(&json!([1]), OnyxType::Structure), None);
    }

    #[test]
    fn test_to_json_datetime() {
        let dt = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap();
        assert_eq!(Value::DateTime(dt).to_json(), json!("2024-01-02 03:04:05"));
    }
}

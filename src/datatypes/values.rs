// src/datatypes/values.rs
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Property name under which a node value carries its table label.
pub const LABEL_KEY: &str = "_label";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Value {
    Int64(i64),
    Float64(f64),
    String(String),
    Boolean(bool),
    Date(NaiveDate),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Null,
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(i) => Some(*i),
            Value::Float64(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Catalog-style name of the runtime type, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int64(_) => "INT64",
            Value::Float64(_) => "DOUBLE",
            Value::String(_) => "STRING",
            Value::Boolean(_) => "BOOL",
            Value::Date(_) => "DATE",
            Value::List(_) => "LIST",
            Value::Map(_) => "MAP",
            Value::Null => "NULL",
        }
    }

    /// Convert to a JSON value for payloads handed to callers.
    /// Dates become ISO strings, non-finite floats become null.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Int64(i) => serde_json::Value::from(*i),
            Value::Float64(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Boolean(b) => serde_json::Value::Bool(*b),
            Value::Date(d) => serde_json::Value::String(d.format("%Y-%m-%d").to_string()),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            Value::Null => serde_json::Value::Null,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int64(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float64(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Date(d)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map(Into::into).unwrap_or(Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format_value(self))
    }
}

// ============================================================================
// Declared types
// ============================================================================

/// Base type of a declared property, as reported by the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    String,
    Int64,
    Double,
    Float,
    Bool,
    Date,
}

impl DataType {
    /// Whether a scalar value fits this type. Null fits every type.
    pub fn accepts(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (_, Value::Null)
                | (DataType::String, Value::String(_))
                | (DataType::Int64, Value::Int64(_))
                | (DataType::Double, Value::Float64(_))
                | (DataType::Double, Value::Int64(_))
                | (DataType::Float, Value::Float64(_))
                | (DataType::Float, Value::Int64(_))
                | (DataType::Bool, Value::Boolean(_))
                | (DataType::Date, Value::Date(_))
        )
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let type_str = match self {
            DataType::String => "STRING",
            DataType::Int64 => "INT64",
            DataType::Double => "DOUBLE",
            DataType::Float => "FLOAT",
            DataType::Bool => "BOOL",
            DataType::Date => "DATE",
        };
        write!(f, "{}", type_str)
    }
}

pub fn format_value(value: &Value) -> String {
    match value {
        Value::Int64(v) => format!("{}", v),
        Value::Float64(v) => {
            if v.is_nan() {
                "NULL".to_string()
            } else {
                format!("{}", v)
            }
        }
        Value::String(v) => format!("\"{}\"", v),
        Value::Boolean(v) => format!("{}", v),
        Value::Date(v) => format!("\"{}\"", v.format("%Y-%m-%d")),
        Value::List(items) => {
            let inner: Vec<String> = items.iter().map(format_value).collect();
            format!("[{}]", inner.join(", "))
        }
        Value::Map(map) => {
            let inner: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}: {}", k, format_value(v)))
                .collect();
            format!("{{{}}}", inner.join(", "))
        }
        Value::Null => "NULL".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_json_nested() {
        let mut map = BTreeMap::new();
        map.insert("id".to_string(), Value::from("m1"));
        map.insert("deps".to_string(), Value::from(vec!["a", "b"]));
        map.insert("weight".to_string(), Value::Float64(f64::NAN));
        let json = Value::Map(map).to_json();
        assert_eq!(json["id"], "m1");
        assert_eq!(json["deps"], serde_json::json!(["a", "b"]));
        assert!(json["weight"].is_null());
    }

    #[test]
    fn test_date_to_json() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(Value::Date(d).to_json(), serde_json::json!("2024-03-01"));
    }

    #[test]
    fn test_data_type_accepts() {
        assert!(DataType::String.accepts(&Value::from("x")));
        assert!(DataType::Double.accepts(&Value::Int64(3)));
        assert!(DataType::Int64.accepts(&Value::Null));
        assert!(!DataType::Int64.accepts(&Value::from("3")));
        assert!(!DataType::Bool.accepts(&Value::Int64(1)));
    }

    #[test]
    fn test_as_i64_from_whole_float() {
        assert_eq!(Value::Float64(2.0).as_i64(), Some(2));
        assert_eq!(Value::Float64(2.5).as_i64(), None);
    }

    #[test]
    fn test_format_value_list() {
        let v = Value::from(vec![Value::Int64(1), Value::from("a")]);
        assert_eq!(format_value(&v), "[1, \"a\"]");
    }
}

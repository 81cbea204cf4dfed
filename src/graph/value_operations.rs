/// Shared value operations for the query executor: equality, ordering,
/// arithmetic, and compact formatting for grouping keys.
use crate::datatypes::values::Value;
use std::cmp::Ordering;

// ============================================================================
// Equality and ordering
// ============================================================================

/// Equality with Int64 <-> Float64 coercion. Lists and maps compare element-wise.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Int64(i), Value::Float64(f)) | (Value::Float64(f), Value::Int64(i)) => {
            (*i as f64) == *f
        }
        (Value::List(x), Value::List(y)) => {
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(l, r)| values_equal(l, r))
        }
        _ => a == b,
    }
}

/// Ordering used by ORDER BY, min and max. Null sorts first.
/// Returns None for incomparable types.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Null, _) => Some(Ordering::Less),
        (_, Value::Null) => Some(Ordering::Greater),

        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Int64(a), Value::Int64(b)) => Some(a.cmp(b)),
        (Value::Float64(a), Value::Float64(b)) => a.partial_cmp(b),
        (Value::Int64(a), Value::Float64(b)) => (*a as f64).partial_cmp(b),
        (Value::Float64(a), Value::Int64(b)) => a.partial_cmp(&(*b as f64)),
        (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
        (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
        (Value::List(a), Value::List(b)) => {
            for (l, r) in a.iter().zip(b.iter()) {
                match compare_values(l, r)? {
                    Ordering::Equal => continue,
                    other => return Some(other),
                }
            }
            Some(a.len().cmp(&b.len()))
        }
        _ => None,
    }
}

// ============================================================================
// Type coercion
// ============================================================================

pub fn value_to_f64(val: &Value) -> Option<f64> {
    match val {
        Value::Int64(i) => Some(*i as f64),
        Value::Float64(f) => Some(*f),
        _ => None,
    }
}

// ============================================================================
// Arithmetic operations
// ============================================================================

/// Add two Values. Strings concatenate, lists append. Returns Null for incompatible types.
pub fn arithmetic_add(a: &Value, b: &Value) -> Value {
    match (a, b) {
        (Value::Int64(x), Value::Int64(y)) => x.checked_add(*y).map_or(Value::Null, Value::Int64),
        (Value::String(x), Value::String(y)) => Value::String(format!("{}{}", x, y)),
        (Value::List(x), Value::List(y)) => {
            Value::List(x.iter().chain(y.iter()).cloned().collect())
        }
        _ => match (value_to_f64(a), value_to_f64(b)) {
            (Some(x), Some(y)) => Value::Float64(x + y),
            _ => Value::Null,
        },
    }
}

pub fn arithmetic_sub(a: &Value, b: &Value) -> Value {
    match (a, b) {
        (Value::Int64(x), Value::Int64(y)) => x.checked_sub(*y).map_or(Value::Null, Value::Int64),
        _ => match (value_to_f64(a), value_to_f64(b)) {
            (Some(x), Some(y)) => Value::Float64(x - y),
            _ => Value::Null,
        },
    }
}

pub fn arithmetic_mul(a: &Value, b: &Value) -> Value {
    match (a, b) {
        (Value::Int64(x), Value::Int64(y)) => x.checked_mul(*y).map_or(Value::Null, Value::Int64),
        _ => match (value_to_f64(a), value_to_f64(b)) {
            (Some(x), Some(y)) => Value::Float64(x * y),
            _ => Value::Null,
        },
    }
}

/// Divide two Values. Returns Null for incompatible types or division by zero.
pub fn arithmetic_div(a: &Value, b: &Value) -> Value {
    match (value_to_f64(a), value_to_f64(b)) {
        (Some(x), Some(y)) if y != 0.0 => Value::Float64(x / y),
        _ => Value::Null,
    }
}

pub fn arithmetic_negate(a: &Value) -> Value {
    match a {
        Value::Int64(x) => x.checked_neg().map_or(Value::Null, Value::Int64),
        Value::Float64(x) => Value::Float64(-x),
        _ => Value::Null,
    }
}

// ============================================================================
// Value formatting
// ============================================================================

/// Format a value compactly (no quotes around strings, "null" for Null).
pub fn format_value_compact(val: &Value) -> String {
    let mut buf = String::new();
    format_value_compact_into(&mut buf, val);
    buf
}

/// Append the compact form to `buf`. Type tags keep `1` and `"1"` apart
/// when the result is used as a grouping or DISTINCT key.
pub fn format_value_compact_into(buf: &mut String, val: &Value) {
    match val {
        Value::Int64(v) => {
            buf.push_str("i:");
            buf.push_str(&v.to_string());
        }
        Value::Float64(v) => {
            buf.push_str("f:");
            buf.push_str(&v.to_string());
        }
        Value::String(v) => {
            buf.push_str("s:");
            buf.push_str(v);
        }
        Value::Boolean(v) => {
            buf.push_str(if *v { "true" } else { "false" });
        }
        Value::Date(v) => {
            buf.push_str("d:");
            buf.push_str(&v.format("%Y-%m-%d").to_string());
        }
        Value::List(items) => {
            buf.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    buf.push('\x1F');
                }
                format_value_compact_into(buf, item);
            }
            buf.push(']');
        }
        Value::Map(map) => {
            buf.push('{');
            for (i, (k, v)) in map.iter().enumerate() {
                if i > 0 {
                    buf.push('\x1F');
                }
                buf.push_str(k);
                buf.push('=');
                format_value_compact_into(buf, v);
            }
            buf.push('}');
        }
        Value::Null => buf.push_str("null"),
    }
}

//! Tabular capabilities: pure functions over the loaded DataFrame. Each one
//! computes a JSON-safe value and leaves rendering to the caller.

pub mod stats;
pub mod trend;

use polars::prelude::*;
use serde_json::{Number, Value};

/// Convert a polars `AnyValue` into a `serde_json::Value`. Numeric types stay
/// JSON numbers, temporal and exotic types are stringified so round-tripping
/// through serialization is lossless for display purposes.
pub fn anyvalue_to_json(val: &AnyValue) -> Value {
    match val {
        AnyValue::Null => Value::Null,
        AnyValue::Boolean(b) => Value::Bool(*b),
        AnyValue::String(s) => Value::String(s.to_string()),
        AnyValue::StringOwned(s) => Value::String(s.to_string()),
        AnyValue::UInt8(n) => Value::Number((*n).into()),
        AnyValue::UInt16(n) => Value::Number((*n).into()),
        AnyValue::UInt32(n) => Value::Number((*n).into()),
        AnyValue::UInt64(n) => Value::Number((*n).into()),
        AnyValue::Int8(n) => Value::Number((*n).into()),
        AnyValue::Int16(n) => Value::Number((*n).into()),
        AnyValue::Int32(n) => Value::Number((*n).into()),
        AnyValue::Int64(n) => Value::Number((*n).into()),
        AnyValue::Float32(n) => f64_to_json(*n as f64),
        AnyValue::Float64(n) => f64_to_json(*n),
        AnyValue::List(s) => {
            let vals: Vec<Value> = s.iter().map(|v| anyvalue_to_json(&v)).collect();
            Value::Array(vals)
        }
        // Dates, datetimes, durations, categoricals and anything else take
        // their display form.
        other => Value::String(display_string(other)),
    }
}

/// Display string for an `AnyValue`; strings come back unquoted.
pub fn display_string(value: &AnyValue) -> String {
    match value {
        AnyValue::Null => String::new(),
        AnyValue::String(s) => s.to_string(),
        AnyValue::StringOwned(s) => s.to_string(),
        other => format!("{other}"),
    }
}

/// NaN and infinities have no JSON representation; they become null.
pub fn f64_to_json(v: f64) -> Value {
    Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null)
}

pub fn opt_f64_to_json(v: Option<f64>) -> Value {
    v.map(f64_to_json).unwrap_or(Value::Null)
}

pub fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::Float32
            | DataType::Float64
    )
}

/// Column values as `f64`, via a non-strict cast: unparseable entries become
/// None rather than errors.
pub fn float_values(s: &Series) -> PolarsResult<Vec<Option<f64>>> {
    let casted = s.cast(&DataType::Float64)?;
    Ok(casted.f64()?.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn anyvalue_conversion_keeps_numbers_and_strings() {
        assert_eq!(anyvalue_to_json(&AnyValue::Int64(7)), json!(7));
        assert_eq!(anyvalue_to_json(&AnyValue::Float64(2.5)), json!(2.5));
        assert_eq!(anyvalue_to_json(&AnyValue::String("oslo")), json!("oslo"));
        assert_eq!(anyvalue_to_json(&AnyValue::Boolean(true)), json!(true));
        assert_eq!(anyvalue_to_json(&AnyValue::Null), Value::Null);
    }

    #[test]
    fn non_finite_floats_become_null() {
        assert_eq!(f64_to_json(f64::NAN), Value::Null);
        assert_eq!(f64_to_json(f64::INFINITY), Value::Null);
        assert_eq!(anyvalue_to_json(&AnyValue::Float64(f64::NAN)), Value::Null);
    }

    #[test]
    fn float_values_coerces_strings_non_strictly() {
        let s = Series::new("mixed".into(), ["1.5", "x", "3"]);
        let vals = float_values(&s).unwrap();
        assert_eq!(vals, vec![Some(1.5), None, Some(3.0)]);
    }
}

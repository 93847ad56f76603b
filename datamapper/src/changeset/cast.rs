use crate::schema::FieldType;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{Number, Value};

/// Cast a non-null param to a field type, returning the stored form or the
/// error message for the field.
pub fn cast_value(field_type: FieldType, value: &Value) -> Result<Value, String> {
    let cast = match field_type {
        FieldType::Integer => cast_integer(value),
        FieldType::Float => cast_float(value),
        FieldType::String => value.as_str().map(|s| Value::String(s.to_string())),
        FieldType::Boolean => cast_boolean(value),
        FieldType::Date => cast_date(value),
        FieldType::Datetime => cast_datetime(value),
        FieldType::Json => Some(value.clone()),
    };
    cast.ok_or_else(|| format!("Not a valid {}.", field_type.human_name()))
}

fn cast_integer(value: &Value) -> Option<Value> {
    match value {
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(value.clone()),
        Value::Number(n) => n
            .as_f64()
            .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
            .map(|f| Value::Number((f as i64).into())),
        Value::String(s) => s.trim().parse::<i64>().ok().map(|i| Value::Number(i.into())),
        _ => None,
    }
}

fn cast_float(value: &Value) -> Option<Value> {
    match value {
        Value::Number(_) => Some(value.clone()),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number),
        _ => None,
    }
}

fn cast_boolean(value: &Value) -> Option<Value> {
    match value {
        Value::Bool(_) => Some(value.clone()),
        Value::Number(n) => match n.as_i64() {
            Some(1) => Some(Value::Bool(true)),
            Some(0) => Some(Value::Bool(false)),
            _ => None,
        },
        Value::String(s) => match s.to_lowercase().as_str() {
            "true" | "t" | "yes" | "y" | "on" | "1" => Some(Value::Bool(true)),
            "false" | "f" | "no" | "n" | "off" | "0" => Some(Value::Bool(false)),
            _ => None,
        },
        _ => None,
    }
}

fn cast_date(value: &Value) -> Option<Value> {
    let text = value.as_str()?;
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .map(|date| Value::String(date.format("%Y-%m-%d").to_string()))
}

fn cast_datetime(value: &Value) -> Option<Value> {
    let text = value.as_str()?;
    if let Ok(datetime) = DateTime::parse_from_rfc3339(text) {
        return Some(Value::String(datetime.to_rfc3339()));
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|datetime| Value::String(datetime.format("%Y-%m-%dT%H:%M:%S%.f").to_string()))
}

/// JSON type name, for messages.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cast_integer() {
        assert_eq!(cast_value(FieldType::Integer, &json!(5)), Ok(json!(5)));
        assert_eq!(cast_value(FieldType::Integer, &json!("12")), Ok(json!(12)));
        assert_eq!(cast_value(FieldType::Integer, &json!(3.0)), Ok(json!(3)));
        assert_eq!(
            cast_value(FieldType::Integer, &json!(3.5)),
            Err("Not a valid integer.".to_string())
        );
        assert!(cast_value(FieldType::Integer, &json!("twelve")).is_err());
    }

    #[test]
    fn test_cast_float_and_string() {
        assert_eq!(cast_value(FieldType::Float, &json!("4.5")), Ok(json!(4.5)));
        assert_eq!(
            cast_value(FieldType::Float, &json!(true)),
            Err("Not a valid number.".to_string())
        );
        assert_eq!(cast_value(FieldType::String, &json!("Ray")), Ok(json!("Ray")));
        assert_eq!(
            cast_value(FieldType::String, &json!(1)),
            Err("Not a valid string.".to_string())
        );
    }

    #[test]
    fn test_cast_boolean() {
        assert_eq!(cast_value(FieldType::Boolean, &json!("yes")), Ok(json!(true)));
        assert_eq!(cast_value(FieldType::Boolean, &json!(0)), Ok(json!(false)));
        assert_eq!(
            cast_value(FieldType::Boolean, &json!("maybe")),
            Err("Not a valid boolean.".to_string())
        );
    }

    #[test]
    fn test_cast_dates() {
        assert_eq!(
            cast_value(FieldType::Date, &json!("2019-02-03")),
            Ok(json!("2019-02-03"))
        );
        assert_eq!(
            cast_value(FieldType::Date, &json!("2019-02-30")),
            Err("Not a valid date.".to_string())
        );
        assert_eq!(
            cast_value(FieldType::Datetime, &json!("2019-02-03T10:00:00Z")),
            Ok(json!("2019-02-03T10:00:00+00:00"))
        );
        assert_eq!(
            cast_value(FieldType::Datetime, &json!("2019-02-03 10:00:00")),
            Ok(json!("2019-02-03T10:00:00"))
        );
        assert_eq!(
            cast_value(FieldType::Datetime, &json!(17)),
            Err("Not a valid datetime.".to_string())
        );
    }

    #[test]
    fn test_json_accepts_anything() {
        assert_eq!(
            cast_value(FieldType::Json, &json!({"a": [1]})),
            Ok(json!({"a": [1]}))
        );
    }

    #[test]
    fn test_type_name() {
        assert_eq!(type_name(&json!([1])), "list");
        assert_eq!(type_name(&json!(null)), "null");
    }
}

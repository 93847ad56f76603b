use crate::error::{DataMapperError, Result};
use crate::schema::FieldType;
use rusqlite::types::Value as SqlValue;
use serde_json::Value;
use std::collections::BTreeMap;

/// Return the only element of `items`, failing with `NoResults` or
/// `MultipleResults` otherwise.
pub fn assert_one<T>(mut items: Vec<T>) -> Result<T> {
    match items.len() {
        0 => Err(DataMapperError::NoResults),
        1 => Ok(items.remove(0)),
        n => Err(DataMapperError::MultipleResults(n)),
    }
}

/// Nested association paths, e.g. `["pets.owner", "home"]` becomes
/// `{home: {}, pets: {owner: {}}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreloadTree {
    children: BTreeMap<String, PreloadTree>,
}

impl PreloadTree {
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&PreloadTree> {
        self.children.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PreloadTree)> {
        self.children.iter()
    }

    fn insert_path<'a>(&mut self, mut segments: impl Iterator<Item = &'a str>) {
        if let Some(head) = segments.next() {
            self.children
                .entry(head.to_string())
                .or_default()
                .insert_path(segments);
        }
    }
}

pub fn expand_preloads<S: AsRef<str>>(paths: &[S]) -> PreloadTree {
    let mut tree = PreloadTree::default();
    for path in paths {
        tree.insert_path(path.as_ref().split('.').filter(|s| !s.is_empty()));
    }
    tree
}

/// `BlogPost` -> `blog_post`
pub fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, ch) in name.chars().enumerate() {
        if ch.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Render a value as a SQL literal (used for DDL defaults).
pub fn sql_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".into(),
        Value::Bool(b) => i64::from(*b).to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        other => format!("'{}'", other.to_string().replace('\'', "''")),
    }
}

pub fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

/// Convert a SQLite value to JSON, using the declared field type when known.
pub fn from_sql_value(value: SqlValue, field_type: Option<FieldType>) -> Value {
    let value = match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(n) => Value::Number(n.into()),
        SqlValue::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        SqlValue::Text(s) => Value::String(s),
        SqlValue::Blob(b) => Value::String(String::from_utf8_lossy(&b).into()),
    };
    match field_type {
        Some(field_type) => coerce(value, field_type),
        None => value,
    }
}

/// Bring a value read back from storage in line with its declared type.
pub fn coerce(value: Value, field_type: FieldType) -> Value {
    match (field_type, value) {
        (FieldType::Boolean, Value::Number(n)) => Value::Bool(n.as_i64() != Some(0)),
        (FieldType::Json, Value::String(s)) => {
            serde_json::from_str(&s).unwrap_or(Value::String(s))
        }
        (_, value) => value,
    }
}

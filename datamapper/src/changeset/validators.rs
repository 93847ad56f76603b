use super::cast::type_name;
use regex::Regex;
use serde_json::Value;
use std::sync::Arc;

/// A per-field check. `Err` carries the message recorded for the field.
pub type FieldValidator = Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>;

/// Bounds for `validate_length`. Strings count characters, lists count items.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Length {
    pub is: Option<usize>,
    pub min: Option<usize>,
    pub max: Option<usize>,
    pub message: Option<String>,
}

impl Length {
    pub fn is(n: usize) -> Self {
        Length {
            is: Some(n),
            ..Default::default()
        }
    }

    pub fn min(n: usize) -> Self {
        Length {
            min: Some(n),
            ..Default::default()
        }
    }

    pub fn max(n: usize) -> Self {
        Length {
            max: Some(n),
            ..Default::default()
        }
    }

    pub fn between(min: usize, max: usize) -> Self {
        Length {
            min: Some(min),
            max: Some(max),
            ..Default::default()
        }
    }

    pub fn message(mut self, message: &str) -> Self {
        self.message = Some(message.to_string());
        self
    }

    pub(crate) fn check(&self, value: &Value) -> Result<(), String> {
        let (len, unit) = match value {
            Value::String(s) => (s.chars().count(), "characters"),
            Value::Array(items) => (items.len(), "items"),
            other => return Err(format!("{} has no length", type_name(other))),
        };
        let failure = if self.is.is_some_and(|n| len != n) {
            self.is.map(|n| format!("should be {n} {unit}"))
        } else if self.min.is_some_and(|n| len < n) {
            self.min.map(|n| format!("should be at least {n} {unit}"))
        } else if self.max.is_some_and(|n| len > n) {
            self.max.map(|n| format!("should be at most {n} {unit}"))
        } else {
            None
        };
        match failure {
            Some(default) => Err(self.message.clone().unwrap_or(default)),
            None => Ok(()),
        }
    }
}

pub(crate) fn inclusion(values: Vec<Value>, message: Option<&str>) -> FieldValidator {
    let message = message.unwrap_or("is invalid").to_string();
    Arc::new(move |value| {
        if values.contains(value) {
            Ok(())
        } else {
            Err(message.clone())
        }
    })
}

pub(crate) fn exclusion(values: Vec<Value>, message: Option<&str>) -> FieldValidator {
    let message = message.unwrap_or("is invalid").to_string();
    Arc::new(move |value| {
        if values.contains(value) {
            Err(message.clone())
        } else {
            Ok(())
        }
    })
}

pub(crate) fn format(pattern: Regex, message: Option<&str>) -> FieldValidator {
    let message = message.unwrap_or("has invalid format").to_string();
    Arc::new(move |value| match value.as_str() {
        Some(text) if pattern.is_match(text) => Ok(()),
        _ => Err(message.clone()),
    })
}

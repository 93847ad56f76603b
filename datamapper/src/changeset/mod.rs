//! Casting and validation of changes before they are written.
//!
//! A changeset is built over some data (a [`Record`] or [`Schemaless`] map),
//! casts a set of params against the data's field types, and collects
//! validators. Validation is evaluated whenever `changes`, `errors` or
//! `is_valid` is called, so the builder can be extended in any order.

pub mod cast;
pub mod data;
pub mod validators;

pub use data::{ChangesetData, Schemaless};
pub use validators::{FieldValidator, Length};

use crate::associations::AssociationKind;
use crate::error::{DataMapperError, Result};
use crate::record::Record;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

pub const MISSING_MESSAGE: &str = "Missing data for required field.";

pub type Errors = BTreeMap<String, Vec<String>>;

#[derive(Clone)]
pub struct Changeset<D> {
    data: D,
    params: Map<String, Value>,
    permitted: BTreeSet<String>,
    required: BTreeSet<String>,
    forced: Map<String, Value>,
    validators: BTreeMap<String, Vec<FieldValidator>>,
}

impl<D: ChangesetData> Changeset<D> {
    pub fn new(data: D) -> Self {
        Changeset {
            data,
            params: Map::new(),
            permitted: BTreeSet::new(),
            required: BTreeSet::new(),
            forced: Map::new(),
            validators: BTreeMap::new(),
        }
    }

    /// Keep the `permitted` keys of `params` as candidate changes.
    pub fn cast(mut self, params: &Map<String, Value>, permitted: &[&str]) -> Self {
        for field in permitted {
            self.permitted.insert(field.to_string());
            if let Some(value) = params.get(*field) {
                self.params.insert(field.to_string(), value.clone());
            }
        }
        self
    }

    pub fn validate_required(mut self, fields: &[&str]) -> Self {
        self.required.extend(fields.iter().map(|f| f.to_string()));
        self
    }

    /// Run `check` on the cast value of `field` whenever it is changed to a
    /// non-null value.
    pub fn validate_change<F>(self, field: &str, check: F) -> Self
    where
        F: Fn(&Value) -> std::result::Result<(), String> + Send + Sync + 'static,
    {
        self.add_validator(field, Arc::new(check))
    }

    pub fn validate_inclusion<V: Into<Value>>(
        self,
        field: &str,
        values: impl IntoIterator<Item = V>,
        message: Option<&str>,
    ) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.add_validator(field, validators::inclusion(values, message))
    }

    pub fn validate_exclusion<V: Into<Value>>(
        self,
        field: &str,
        values: impl IntoIterator<Item = V>,
        message: Option<&str>,
    ) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.add_validator(field, validators::exclusion(values, message))
    }

    pub fn validate_length(self, field: &str, length: Length) -> Self {
        self.add_validator(field, Arc::new(move |value| length.check(value)))
    }

    pub fn validate_format(self, field: &str, pattern: Regex, message: Option<&str>) -> Self {
        self.add_validator(field, validators::format(pattern, message))
    }

    fn add_validator(mut self, field: &str, validator: FieldValidator) -> Self {
        self.validators
            .entry(field.to_string())
            .or_default()
            .push(validator);
        self
    }

    /// Force changes. Forced changes are never cast or validated.
    pub fn change(mut self, changes: Map<String, Value>) -> Self {
        self.forced.extend(changes);
        self
    }

    pub fn put_change(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.forced.insert(field.to_string(), value.into());
        self
    }

    /// Point a `belongs_to` association at `related` by setting the foreign key.
    pub fn put_assoc(self, name: &str, related: &Record) -> Result<Self> {
        let assoc = self.data.association(name)?;
        if assoc.kind() != AssociationKind::BelongsTo {
            return Err(DataMapperError::Unsupported(format!(
                "put_assoc on {:?} association '{name}'",
                assoc.kind()
            )));
        }
        let owner_key = assoc.owner_key().to_string();
        let value = related.get(assoc.related_key())?.clone();
        Ok(self.put_change(&owner_key, value))
    }

    pub fn has_change(&self, field: &str) -> bool {
        self.changes().contains_key(field)
    }

    pub fn get_change(&self, field: &str) -> Option<Value> {
        self.changes().remove(field)
    }

    /// The changed value of `field`, falling back to the data's value.
    pub fn get_field(&self, field: &str) -> Option<Value> {
        self.get_change(field)
            .or_else(|| self.data.value(field).cloned())
    }

    /// Call `f` with the new value when `field` is changed.
    pub fn on_changed(self, field: &str, f: impl FnOnce(Self, Value) -> Self) -> Self {
        match self.get_change(field) {
            Some(value) => f(self, value),
            None => self,
        }
    }

    pub fn pipe(self, f: impl FnOnce(Self) -> Self) -> Self {
        f(self)
    }

    /// Valid changes merged with forced ones; empty while the changeset is invalid.
    pub fn changes(&self) -> Map<String, Value> {
        let (mut changes, errors) = self.evaluate();
        if !errors.is_empty() {
            return Map::new();
        }
        for (field, value) in &self.forced {
            changes.insert(field.clone(), value.clone());
        }
        changes
    }

    pub fn errors(&self) -> Errors {
        self.evaluate().1
    }

    pub fn is_valid(&self) -> bool {
        self.errors().is_empty()
    }

    pub fn apply_changes(&self) -> D {
        self.data.apply(&self.changes())
    }

    pub fn data(&self) -> &D {
        &self.data
    }

    pub fn params(&self) -> &Map<String, Value> {
        &self.params
    }

    fn evaluate(&self) -> (Map<String, Value>, Errors) {
        let mut changes = Map::new();
        let mut errors = Errors::new();

        for field in self.permitted.union(&self.required) {
            let required = self.required.contains(field);
            match self.params.get(field) {
                Some(Value::Null) if required => {
                    errors.entry(field.clone()).or_default().push(MISSING_MESSAGE.into());
                }
                Some(Value::Null) => {
                    changes.insert(field.clone(), Value::Null);
                }
                Some(value) => {
                    let value = match self.data.field_type(field) {
                        Some(field_type) => match cast::cast_value(field_type, value) {
                            Ok(value) => value,
                            Err(message) => {
                                errors.entry(field.clone()).or_default().push(message);
                                continue;
                            }
                        },
                        None => value.clone(),
                    };
                    let messages: Vec<String> = self
                        .validators
                        .get(field)
                        .into_iter()
                        .flatten()
                        .filter_map(|check| check(&value).err())
                        .collect();
                    if messages.is_empty() {
                        changes.insert(field.clone(), value);
                    } else {
                        errors.entry(field.clone()).or_default().extend(messages);
                    }
                }
                None if required && !self.present(field) => {
                    errors.entry(field.clone()).or_default().push(MISSING_MESSAGE.into());
                }
                None => {}
            }
        }

        (changes, errors)
    }

    fn present(&self, field: &str) -> bool {
        let non_null = |value: Option<&Value>| value.is_some_and(|v| !v.is_null());
        non_null(self.forced.get(field)) || non_null(self.data.value(field))
    }
}

/// Cast every attribute of a record, so records can be inserted directly.
impl From<Record> for Changeset<Record> {
    fn from(record: Record) -> Self {
        let params = record.attributes().clone();
        let permitted: Vec<&str> = params.keys().map(String::as_str).collect();
        Changeset::new(record).cast(&params, &permitted)
    }
}

impl<D: ChangesetData + fmt::Debug> fmt::Debug for Changeset<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Changeset")
            .field("valid", &self.is_valid())
            .field("data", &self.data)
            .field("changes", &self.changes())
            .field("errors", &self.errors())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldType;
    use serde_json::json;

    fn params(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    fn book() -> Record {
        crate::testing::schema().record("Book").unwrap()
    }

    #[test]
    fn test_cast_keeps_permitted_params() {
        let changeset = Changeset::new(book()).cast(
            &params(json!({"title": "Dune", "author": "Herbert", "pages": 412})),
            &["title", "pages"],
        );
        assert!(changeset.is_valid());
        assert_eq!(
            Value::Object(changeset.changes()),
            json!({"title": "Dune", "pages": 412})
        );
    }

    #[test]
    fn test_cast_type_errors() {
        let changeset = Changeset::new(book()).cast(
            &params(json!({"title": 5, "pages": "many", "released_on": "2019-13-01"})),
            &["title", "pages", "released_on"],
        );
        assert!(!changeset.is_valid());
        assert!(changeset.changes().is_empty());

        let errors = changeset.errors();
        assert_eq!(errors["title"], vec!["Not a valid string."]);
        assert_eq!(errors["pages"], vec!["Not a valid integer."]);
        assert_eq!(errors["released_on"], vec!["Not a valid date."]);
    }

    #[test]
    fn test_cast_converts_values() {
        let changeset = Changeset::new(book()).cast(
            &params(json!({"pages": "12", "published": "yes", "rating": 4})),
            &["pages", "published", "rating"],
        );
        assert_eq!(
            Value::Object(changeset.changes()),
            json!({"pages": 12, "published": true, "rating": 4})
        );
    }

    #[test]
    fn test_validate_required() {
        let changeset = Changeset::new(book())
            .cast(&params(json!({"author": "Herbert"})), &["title", "author"])
            .validate_required(&["title"]);
        assert_eq!(changeset.errors()["title"], vec![MISSING_MESSAGE]);

        let changeset = Changeset::new(book())
            .cast(&params(json!({"title": null})), &["title"])
            .validate_required(&["title"]);
        assert_eq!(changeset.errors()["title"], vec![MISSING_MESSAGE]);

        let existing = book().with("title", json!("Dune"));
        let changeset = Changeset::new(existing)
            .cast(&params(json!({"author": "Herbert"})), &["title", "author"])
            .validate_required(&["title"]);
        assert!(changeset.is_valid());

        let changeset = Changeset::new(book())
            .validate_required(&["title"])
            .put_change("title", "Forced");
        assert!(changeset.is_valid());
    }

    #[test]
    fn test_validate_change_runs_on_present_values_only() {
        let changeset = Changeset::new(book())
            .cast(&params(json!({"title": "Dune", "author": null})), &["title", "author"])
            .validate_change("title", |value| {
                if value == "Dune" {
                    Err("is already taken".into())
                } else {
                    Ok(())
                }
            })
            .validate_change("author", |_| Err("never called".into()));

        assert_eq!(
            changeset.errors(),
            BTreeMap::from([("title".to_string(), vec!["is already taken".to_string()])])
        );
    }

    #[test]
    fn test_builtin_validators() {
        let changeset = Changeset::new(book())
            .cast(
                &params(json!({"title": "It", "author": "admin", "pages": 3})),
                &["title", "author", "pages"],
            )
            .validate_length("title", Length::min(3))
            .validate_exclusion("author", ["admin"], None)
            .validate_inclusion("pages", [1, 2], Some("unsupported page count"))
            .validate_format("title", Regex::new("^[A-Z]").unwrap(), None);

        let errors = changeset.errors();
        assert_eq!(errors["title"], vec!["should be at least 3 characters"]);
        assert_eq!(errors["author"], vec!["is invalid"]);
        assert_eq!(errors["pages"], vec!["unsupported page count"]);
    }

    #[test]
    fn test_forced_changes_are_not_validated() {
        let changeset = Changeset::new(book())
            .cast(&params(json!({"title": "Dune"})), &["title"])
            .put_change("pages", "not a number")
            .change(params(json!({"author": "Herbert"})));
        assert_eq!(
            Value::Object(changeset.changes()),
            json!({"title": "Dune", "pages": "not a number", "author": "Herbert"})
        );
    }

    #[test]
    fn test_get_change_and_get_field() {
        let existing = book().with("title", json!("Dune")).with("pages", json!(412));
        let changeset =
            Changeset::new(existing).cast(&params(json!({"pages": 500})), &["pages"]);

        assert!(changeset.has_change("pages"));
        assert!(!changeset.has_change("title"));
        assert_eq!(changeset.get_change("pages"), Some(json!(500)));
        assert_eq!(changeset.get_change("title"), None);
        assert_eq!(changeset.get_field("title"), Some(json!("Dune")));
        assert_eq!(changeset.get_field("pages"), Some(json!(500)));
    }

    #[test]
    fn test_on_changed_and_pipe() {
        let changeset = Changeset::new(book())
            .cast(&params(json!({"title": "dune"})), &["title", "author"])
            .on_changed("title", |cs, value| {
                let upper = value.as_str().unwrap_or_default().to_uppercase();
                cs.put_change("title", upper)
            })
            .on_changed("author", |cs, _| cs.put_change("author", "unreachable"))
            .pipe(|cs| cs.put_change("pages", 1));

        assert_eq!(
            Value::Object(changeset.changes()),
            json!({"title": "DUNE", "pages": 1})
        );
    }

    #[test]
    fn test_null_change_on_optional_field() {
        let existing = book().with("author", json!("Herbert"));
        let changeset =
            Changeset::new(existing).cast(&params(json!({"author": null})), &["author"]);
        assert!(changeset.has_change("author"));
        assert_eq!(changeset.apply_changes().get("author").unwrap(), &Value::Null);
    }

    #[test]
    fn test_put_assoc() {
        let schema = crate::testing::schema();
        let person = schema.record("Person").unwrap().with("id", json!(9));

        let changeset = Changeset::new(book()).put_assoc("person", &person).unwrap();
        assert_eq!(changeset.get_change("person_id"), Some(json!(9)));

        let user = schema.record("User").unwrap();
        let pet = schema.record("Pet").unwrap().with("id", json!(1));
        let err = Changeset::new(user).put_assoc("pets", &pet).unwrap_err();
        assert!(matches!(err, DataMapperError::Unsupported(_)));

        let err = Changeset::new(book()).put_assoc("nope", &person).unwrap_err();
        assert!(matches!(err, DataMapperError::UnknownAssociation { .. }));
    }

    #[test]
    fn test_schemaless_changeset() {
        let types = BTreeMap::from([
            ("name".to_string(), FieldType::String),
            ("age".to_string(), FieldType::Integer),
        ]);
        let data = Schemaless::new(params(json!({"name": "Ray"})), types);

        let changeset = Changeset::new(data.clone())
            .cast(&params(json!({"age": "31", "extra": 1})), &["age"])
            .validate_required(&["name"]);
        assert!(changeset.is_valid());
        assert_eq!(
            Value::Object(changeset.apply_changes().data),
            json!({"name": "Ray", "age": 31})
        );

        let person = crate::testing::schema().record("Person").unwrap();
        let err = Changeset::new(data).put_assoc("owner", &person).unwrap_err();
        assert!(matches!(err, DataMapperError::Schema(_)));
    }

    #[test]
    fn test_record_converts_into_changeset() {
        let record = book().with("title", json!("Dune")).with("pages", json!(412));
        let changeset: Changeset<Record> = record.into();
        assert!(changeset.is_valid());
        assert_eq!(
            Value::Object(changeset.changes()),
            json!({"title": "Dune", "pages": 412})
        );
    }
}

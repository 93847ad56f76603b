use crate::error::{DataMapperError, Result};
use crate::schema::Model;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

static NULL: Value = Value::Null;

/// Contents of a preloaded association slot.
#[derive(Debug, Clone, PartialEq)]
pub enum Loaded {
    One(Option<Box<Record>>),
    Many(Vec<Record>),
}

/// A materialized row of a model, plus whatever associations were preloaded.
#[derive(Clone)]
pub struct Record {
    model: Arc<Model>,
    attributes: Map<String, Value>,
    associations: BTreeMap<String, Loaded>,
}

impl Record {
    pub fn new(model: Arc<Model>) -> Self {
        Record {
            model,
            attributes: Map::new(),
            associations: BTreeMap::new(),
        }
    }

    pub fn with_attributes(model: Arc<Model>, attributes: Map<String, Value>) -> Self {
        Record {
            model,
            attributes,
            associations: BTreeMap::new(),
        }
    }

    /// Build a record from any serializable value that serializes to a map.
    pub fn from_serialize<T: Serialize>(model: Arc<Model>, value: &T) -> Result<Self> {
        match serde_json::to_value(value)? {
            Value::Object(attributes) => Ok(Record::with_attributes(model, attributes)),
            other => Err(DataMapperError::InvalidExpression(format!(
                "{other} (records are built from maps)"
            ))),
        }
    }

    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    pub fn into_attributes(self) -> Map<String, Value> {
        self.attributes
    }

    /// Read a declared field. Fields never set read as `null`.
    pub fn get(&self, name: &str) -> Result<&Value> {
        if !self.model.has_field(name) {
            return Err(DataMapperError::UnknownAttribute {
                model: self.model.name().to_string(),
                name: name.to_string(),
            });
        }
        Ok(self.attributes.get(name).unwrap_or(&NULL))
    }

    pub fn set(&mut self, name: &str, value: Value) {
        self.attributes.insert(name.to_string(), value);
    }

    pub fn with(mut self, name: &str, value: Value) -> Self {
        self.set(name, value);
        self
    }

    pub fn primary_key_value(&self) -> &Value {
        self.attributes
            .get(self.model.primary_key())
            .unwrap_or(&NULL)
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.associations.contains_key(name)
    }

    pub fn association(&self, name: &str) -> Result<&Loaded> {
        self.model.association(name)?;
        self.associations
            .get(name)
            .ok_or_else(|| DataMapperError::NotLoaded {
                model: self.model.name().to_string(),
                name: name.to_string(),
            })
    }

    /// A loaded `belongs_to`/`has_one` association.
    pub fn one(&self, name: &str) -> Result<Option<&Record>> {
        match self.association(name)? {
            Loaded::One(record) => Ok(record.as_deref()),
            Loaded::Many(_) => Err(DataMapperError::Unsupported(format!(
                "association '{name}' holds many records"
            ))),
        }
    }

    /// A loaded `has_many` association.
    pub fn many(&self, name: &str) -> Result<&[Record]> {
        match self.association(name)? {
            Loaded::Many(records) => Ok(records),
            Loaded::One(_) => Err(DataMapperError::Unsupported(format!(
                "association '{name}' holds a single record"
            ))),
        }
    }

    pub(crate) fn put_loaded(&mut self, name: &str, loaded: Loaded) {
        self.associations.insert(name.to_string(), loaded);
    }

    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(Value::Object(self.attributes.clone()))?)
    }

    /// Attributes plus loaded associations as one JSON object.
    pub fn to_json(&self) -> Value {
        let mut object = self.attributes.clone();
        for (name, loaded) in &self.associations {
            let value = match loaded {
                Loaded::One(Some(record)) => record.to_json(),
                Loaded::One(None) => Value::Null,
                Loaded::Many(records) => Value::Array(records.iter().map(Record::to_json).collect()),
            };
            object.insert(name.clone(), value);
        }
        Value::Object(object)
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.model.name() == other.model.name()
            && self.attributes == other.attributes
            && self.associations == other.associations
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(self.model.name())
            .field("attributes", &self.attributes)
            .field("associations", &self.associations)
            .finish()
    }
}

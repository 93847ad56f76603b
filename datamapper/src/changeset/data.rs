use crate::associations::Association;
use crate::error::{DataMapperError, Result};
use crate::record::Record;
use crate::schema::FieldType;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// What a changeset can be built over: something with typed fields and
/// current values that changes can be applied to.
pub trait ChangesetData: Clone {
    fn field_type(&self, field: &str) -> Option<FieldType>;

    fn value(&self, field: &str) -> Option<&Value>;

    fn apply(&self, changes: &Map<String, Value>) -> Self;

    fn association(&self, name: &str) -> Result<&Association>;
}

impl ChangesetData for Record {
    fn field_type(&self, field: &str) -> Option<FieldType> {
        self.model().field_type(field)
    }

    fn value(&self, field: &str) -> Option<&Value> {
        self.attributes().get(field)
    }

    fn apply(&self, changes: &Map<String, Value>) -> Self {
        let mut record = self.clone();
        for (name, value) in changes {
            record.set(name, value.clone());
        }
        record
    }

    fn association(&self, name: &str) -> Result<&Association> {
        self.model().association(name)
    }
}

/// Plain data plus the types of its fields, for changesets without a model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schemaless {
    pub data: Map<String, Value>,
    pub types: BTreeMap<String, FieldType>,
}

impl Schemaless {
    pub fn new(data: Map<String, Value>, types: BTreeMap<String, FieldType>) -> Self {
        Schemaless { data, types }
    }
}

impl ChangesetData for Schemaless {
    fn field_type(&self, field: &str) -> Option<FieldType> {
        self.types.get(field).copied()
    }

    fn value(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }

    fn apply(&self, changes: &Map<String, Value>) -> Self {
        let mut data = self.data.clone();
        for (name, value) in changes {
            data.insert(name.clone(), value.clone());
        }
        Schemaless {
            data,
            types: self.types.clone(),
        }
    }

    fn association(&self, name: &str) -> Result<&Association> {
        Err(DataMapperError::Schema(format!(
            "schemaless data has no association '{name}'"
        )))
    }
}

use crate::associations::AssociationKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Top-level schema definition parsed from schema.yaml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaDefinition {
    #[serde(default)]
    pub models: BTreeMap<String, ModelDefinition>,
}

impl SchemaDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a model definition.
    pub fn model(mut self, name: &str, definition: ModelDefinition) -> Self {
        self.models.insert(name.to_string(), definition);
        self
    }
}

/// Definition of a single mapped model
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelDefinition {
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub primary_key: Option<String>,
    #[serde(default)]
    pub primary_key_strategy: Option<PrimaryKeyStrategy>,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldDefinition>,
    #[serde(default)]
    pub associations: BTreeMap<String, AssociationDefinition>,
}

impl ModelDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(mut self, table: &str) -> Self {
        self.table = Some(table.to_string());
        self
    }

    pub fn primary_key(mut self, name: &str, strategy: PrimaryKeyStrategy) -> Self {
        self.primary_key = Some(name.to_string());
        self.primary_key_strategy = Some(strategy);
        self
    }

    pub fn field(mut self, name: &str, field_type: FieldType) -> Self {
        self.fields
            .insert(name.to_string(), FieldDefinition::new(field_type));
        self
    }

    pub fn field_with(mut self, name: &str, definition: FieldDefinition) -> Self {
        self.fields.insert(name.to_string(), definition);
        self
    }

    pub fn belongs_to(self, name: &str, model: &str, foreign_key: &str) -> Self {
        self.association(name, AssociationKind::BelongsTo, model, foreign_key)
    }

    pub fn has_one(self, name: &str, model: &str, foreign_key: &str) -> Self {
        self.association(name, AssociationKind::HasOne, model, foreign_key)
    }

    pub fn has_many(self, name: &str, model: &str, foreign_key: &str) -> Self {
        self.association(name, AssociationKind::HasMany, model, foreign_key)
    }

    fn association(
        mut self,
        name: &str,
        kind: AssociationKind,
        model: &str,
        foreign_key: &str,
    ) -> Self {
        self.associations.insert(
            name.to_string(),
            AssociationDefinition {
                kind,
                model: model.to_string(),
                foreign_key: Some(foreign_key.to_string()),
                primary_key: None,
            },
        );
        self
    }
}

/// How primary keys are produced on insert when the changes don't carry one
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimaryKeyStrategy {
    #[default]
    Autoincrement,
    Ulid,
    Uuid,
    Nanoid,
    Manual,
}

impl PrimaryKeyStrategy {
    /// Type of the implicit primary key field when the model doesn't declare one.
    pub fn implied_type(&self) -> FieldType {
        match self {
            PrimaryKeyStrategy::Autoincrement => FieldType::Integer,
            _ => FieldType::String,
        }
    }
}

/// Definition of a single field in a model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
}

impl FieldDefinition {
    pub fn new(field_type: FieldType) -> Self {
        FieldDefinition {
            field_type,
            required: false,
            default: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default_value(mut self, value: serde_json::Value) -> Self {
        self.default = Some(value);
        self
    }
}

/// Field type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Integer,
    Float,
    String,
    Boolean,
    Date,
    Datetime,
    Json,
}

impl FieldType {
    /// SQLite column affinity used for this type.
    pub fn sql_type(&self) -> &'static str {
        match self {
            FieldType::Integer | FieldType::Boolean => "INTEGER",
            FieldType::Float => "REAL",
            FieldType::String | FieldType::Date | FieldType::Datetime | FieldType::Json => "TEXT",
        }
    }

    /// Human readable name used in cast errors.
    pub fn human_name(&self) -> &'static str {
        match self {
            FieldType::Integer => "integer",
            FieldType::Float => "number",
            FieldType::String => "string",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::Datetime => "datetime",
            FieldType::Json => "json",
        }
    }
}

/// Association declared on a model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssociationDefinition {
    pub kind: AssociationKind,
    pub model: String,
    #[serde(default)]
    pub foreign_key: Option<String>,
    #[serde(default)]
    pub primary_key: Option<String>,
}

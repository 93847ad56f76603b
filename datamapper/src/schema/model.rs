use crate::associations::{Association, AssociationKind};
use crate::error::{DataMapperError, Result};
use crate::query::Query;
use crate::record::Record;
use crate::util::snake_case;
use super::types::{FieldDefinition, FieldType, ModelDefinition, PrimaryKeyStrategy, SchemaDefinition};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A resolved model: table, primary key, typed fields and associations with
/// their keys worked out.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    name: String,
    table: String,
    primary_key: String,
    primary_key_strategy: PrimaryKeyStrategy,
    fields: BTreeMap<String, FieldDefinition>,
    associations: BTreeMap<String, Association>,
}

impl Model {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    pub fn primary_key_strategy(&self) -> PrimaryKeyStrategy {
        self.primary_key_strategy
    }

    pub fn fields(&self) -> &BTreeMap<String, FieldDefinition> {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.get(name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn field_type(&self, name: &str) -> Option<FieldType> {
        self.fields.get(name).map(|f| f.field_type)
    }

    /// Look up a column, failing with `UnknownColumn` when the model has no such field.
    pub fn column(&self, name: &str) -> Result<&FieldDefinition> {
        self.fields
            .get(name)
            .ok_or_else(|| DataMapperError::UnknownColumn {
                table: self.table.clone(),
                column: name.to_string(),
            })
    }

    pub fn associations(&self) -> &BTreeMap<String, Association> {
        &self.associations
    }

    pub fn association(&self, name: &str) -> Result<&Association> {
        self.associations
            .get(name)
            .ok_or_else(|| DataMapperError::UnknownAssociation {
                model: self.name.clone(),
                name: name.to_string(),
            })
    }
}

/// All models of a schema, resolved and shared behind `Arc`s.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    models: BTreeMap<String, Arc<Model>>,
}

impl Schema {
    pub fn from_definition(definition: &SchemaDefinition) -> Result<Self> {
        let mut bare = BTreeMap::new();
        for (name, model_def) in &definition.models {
            bare.insert(name.clone(), resolve_model(name, model_def)?);
        }

        let mut models = BTreeMap::new();
        for (name, model_def) in &definition.models {
            let mut model = bare
                .get(name)
                .cloned()
                .ok_or_else(|| DataMapperError::UnknownModel(name.clone()))?;
            for (assoc_name, assoc_def) in &model_def.associations {
                let related = bare.get(&assoc_def.model).ok_or_else(|| {
                    DataMapperError::Schema(format!(
                        "association '{name}.{assoc_name}' targets unknown model '{}'",
                        assoc_def.model
                    ))
                })?;

                let (owner_key, related_key) = match assoc_def.kind {
                    AssociationKind::BelongsTo => (
                        assoc_def
                            .foreign_key
                            .clone()
                            .unwrap_or_else(|| format!("{assoc_name}_id")),
                        assoc_def
                            .primary_key
                            .clone()
                            .unwrap_or_else(|| related.primary_key.clone()),
                    ),
                    AssociationKind::HasOne | AssociationKind::HasMany => (
                        assoc_def
                            .primary_key
                            .clone()
                            .unwrap_or_else(|| model.primary_key.clone()),
                        assoc_def
                            .foreign_key
                            .clone()
                            .unwrap_or_else(|| format!("{}_id", snake_case(name))),
                    ),
                };

                if !model.has_field(&owner_key) {
                    return Err(DataMapperError::Schema(format!(
                        "association '{name}.{assoc_name}' uses key '{owner_key}' which is not a field of '{name}'"
                    )));
                }
                if !related.has_field(&related_key) {
                    return Err(DataMapperError::Schema(format!(
                        "association '{name}.{assoc_name}' uses key '{related_key}' which is not a field of '{}'",
                        related.name
                    )));
                }

                model.associations.insert(
                    assoc_name.clone(),
                    Association::new(
                        assoc_name,
                        assoc_def.kind,
                        name,
                        &assoc_def.model,
                        &owner_key,
                        &related_key,
                    ),
                );
            }
            models.insert(name.clone(), Arc::new(model));
        }

        Ok(Schema { models })
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        Self::from_definition(&super::parse_schema_str(content)?)
    }

    pub fn from_path(path: &std::path::Path) -> Result<Self> {
        Self::from_definition(&super::parse_schema(path)?)
    }

    pub fn model(&self, name: &str) -> Result<Arc<Model>> {
        self.models
            .get(name)
            .cloned()
            .ok_or_else(|| DataMapperError::UnknownModel(name.to_string()))
    }

    pub fn models(&self) -> impl Iterator<Item = &Arc<Model>> {
        self.models.values()
    }

    /// Start a query against the named model.
    pub fn query(&self, name: &str) -> Result<Query> {
        Ok(Query::new(self.model(name)?))
    }

    /// Blank record of the named model.
    pub fn record(&self, name: &str) -> Result<Record> {
        Ok(Record::new(self.model(name)?))
    }
}

fn resolve_model(name: &str, def: &ModelDefinition) -> Result<Model> {
    if name.is_empty() {
        return Err(DataMapperError::Schema("model name cannot be empty".into()));
    }
    let table = def
        .table
        .clone()
        .unwrap_or_else(|| format!("{}s", snake_case(name)));
    let primary_key = def.primary_key.clone().unwrap_or_else(|| "id".to_string());
    let strategy = def.primary_key_strategy.unwrap_or_default();

    let mut fields = def.fields.clone();
    fields
        .entry(primary_key.clone())
        .or_insert_with(|| FieldDefinition::new(strategy.implied_type()));

    if strategy == PrimaryKeyStrategy::Autoincrement
        && fields[&primary_key].field_type != FieldType::Integer
    {
        return Err(DataMapperError::Schema(format!(
            "model '{name}' uses autoincrement but primary key '{primary_key}' is not an integer"
        )));
    }

    Ok(Model {
        name: name.to_string(),
        table,
        primary_key,
        primary_key_strategy: strategy,
        fields,
        associations: BTreeMap::new(),
    })
}

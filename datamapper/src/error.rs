use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DataMapperError {
    #[error("model '{0}' is not defined in the schema")]
    UnknownModel(String),

    #[error("column '{column}' does not exist for table '{table}'")]
    UnknownColumn { table: String, column: String },

    #[error("association '{name}' does not exist for model '{model}'")]
    UnknownAssociation { model: String, name: String },

    #[error("'{model}' object has no attribute '{name}'")]
    UnknownAttribute { model: String, name: String },

    #[error("alias '{0}' does not exist")]
    UnknownAlias(String),

    #[error("expected at least one result but got none")]
    NoResults,

    #[error("expected at most one result but got {0}")]
    MultipleResults(usize),

    #[error("association '{name}' is not loaded for model '{model}'")]
    NotLoaded { model: String, name: String },

    #[error("can't join '{child}' without joining '{parent}'")]
    MissingJoin { parent: String, child: String },

    #[error("alias '{0}' conflicts with an existing alias")]
    ConflictingAlias(String),

    #[error("{0} is not a valid query expression")]
    InvalidExpression(String),

    #[error("could not perform {action} because changeset is invalid: {}", format_errors(.errors))]
    InvalidChangeset {
        action: String,
        errors: BTreeMap<String, Vec<String>>,
    },

    #[error("an operation called '{0}' has already been added to the multi")]
    DuplicateOperation(String),

    #[error("no operation called '{0}' has run in this multi")]
    UnknownOperation(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("SQL parse error: {0}")]
    SqlParse(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, DataMapperError>;

fn format_errors(errors: &BTreeMap<String, Vec<String>>) -> String {
    errors
        .iter()
        .map(|(field, messages)| format!("{field}: {}", messages.join(", ")))
        .collect::<Vec<_>>()
        .join("; ")
}

use crate::error::{DataMapperError, Result};
use crate::record::Record;
use crate::schema::Model;
use crate::util::coerce;
use serde_json::{Map, Value};
use sqlparser::ast::Statement as SqlStatement;
use sqlparser::dialect::SQLiteDialect;
use sqlparser::parser::Parser;
use std::sync::Arc;

/// A hand-written SQL statement, checked by parsing it up front.
#[derive(Debug, Clone)]
pub struct Raw {
    sql: String,
    params: Vec<Value>,
    model: Option<Arc<Model>>,
    is_query: bool,
}

/// A row returned by a raw query.
#[derive(Debug, Clone, PartialEq)]
pub enum RawRow {
    Row(Map<String, Value>),
    Record(Record),
}

impl Raw {
    /// Parse `sql`; it must hold exactly one statement.
    pub fn new(sql: impl Into<String>) -> Result<Self> {
        let sql = sql.into();
        let statements = Parser::parse_sql(&SQLiteDialect {}, &sql)
            .map_err(|e| DataMapperError::SqlParse(e.to_string()))?;

        let statement = match statements.as_slice() {
            [statement] => statement,
            other => {
                return Err(DataMapperError::SqlParse(format!(
                    "expected exactly one statement, found {}",
                    other.len()
                )))
            }
        };
        let is_query = matches!(statement, SqlStatement::Query(_));

        Ok(Raw {
            sql,
            params: Vec::new(),
            model: None,
            is_query,
        })
    }

    /// Materialize rows as records of `model`.
    pub fn with_model(mut self, model: Arc<Model>) -> Self {
        self.model = Some(model);
        self
    }

    /// Bind the next `?` parameter.
    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.params.push(value.into());
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    pub fn model(&self) -> Option<&Arc<Model>> {
        self.model.as_ref()
    }

    pub fn is_query(&self) -> bool {
        self.is_query
    }

    pub fn deserialize_row(&self, row: Map<String, Value>) -> RawRow {
        match &self.model {
            Some(model) => {
                let attributes = row
                    .into_iter()
                    .map(|(name, value)| {
                        let value = match model.field_type(&name) {
                            Some(field_type) => coerce(value, field_type),
                            None => value,
                        };
                        (name, value)
                    })
                    .collect();
                RawRow::Record(Record::with_attributes(model.clone(), attributes))
            }
            None => RawRow::Row(row),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parses_single_statement() {
        let raw = Raw::new("SELECT * FROM users WHERE id = ?").unwrap().bind(1);
        assert!(raw.is_query());
        assert_eq!(raw.params(), &[json!(1)]);

        let raw = Raw::new("UPDATE users SET name = 'x'").unwrap();
        assert!(!raw.is_query());
    }

    #[test]
    fn test_rejects_bad_sql() {
        assert!(matches!(
            Raw::new("SELEC 1"),
            Err(DataMapperError::SqlParse(_))
        ));
        let err = Raw::new("SELECT 1; SELECT 2").unwrap_err();
        assert!(err.to_string().contains("exactly one statement"));
    }

    #[test]
    fn test_deserialize_row() {
        let schema = crate::testing::schema();
        let row = json!({"id": 1, "title": "Dune", "published": 1});
        let row = row.as_object().unwrap().clone();

        let raw = Raw::new("SELECT * FROM books").unwrap();
        assert_eq!(raw.deserialize_row(row.clone()), RawRow::Row(row.clone()));

        let raw = raw.with_model(schema.model("Book").unwrap());
        match raw.deserialize_row(row) {
            RawRow::Record(record) => {
                assert_eq!(record.get("published").unwrap(), &json!(true));
                assert_eq!(record.get("title").unwrap(), &json!("Dune"));
            }
            other => panic!("expected a record, got {other:?}"),
        }
    }
}

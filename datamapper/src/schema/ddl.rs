use super::model::{Model, Schema};
use crate::associations::AssociationKind;
use crate::error::Result;
use crate::util::{quote_ident, sql_literal};

/// `CREATE TABLE IF NOT EXISTS` statement for a model.
///
/// `belongs_to` associations become `REFERENCES` clauses on their foreign key.
pub fn create_table_sql(schema: &Schema, model: &Model) -> Result<String> {
    let mut columns = Vec::with_capacity(model.fields().len());
    for (name, field) in model.fields() {
        let mut column = format!("{} {}", quote_ident(name), field.field_type.sql_type());

        if name == model.primary_key() {
            column.push_str(" PRIMARY KEY");
            if model.primary_key_strategy() == super::PrimaryKeyStrategy::Autoincrement {
                column.push_str(" AUTOINCREMENT");
            }
        } else if field.required {
            column.push_str(" NOT NULL");
        }

        if let Some(default) = &field.default {
            column.push_str(" DEFAULT ");
            column.push_str(&sql_literal(default));
        }

        let reference = model.associations().values().find(|assoc| {
            assoc.kind() == AssociationKind::BelongsTo && assoc.owner_key() == name
        });
        if let Some(assoc) = reference {
            let related = schema.model(assoc.related())?;
            column.push_str(&format!(
                " REFERENCES {} ({})",
                quote_ident(related.table()),
                quote_ident(assoc.related_key())
            ));
        }

        columns.push(column);
    }

    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
        quote_ident(model.table()),
        columns.join(",\n    ")
    ))
}

/// DDL for every model in the schema, in model-name order.
pub fn create_tables_sql(schema: &Schema) -> Result<Vec<String>> {
    schema
        .models()
        .map(|model| create_table_sql(schema, model))
        .collect()
}

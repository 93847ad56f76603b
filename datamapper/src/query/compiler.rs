//! Compilation of [`Query`] values into parameterized SQLite statements.

use super::join::{to_join_tree, JoinNode};
use super::parser::{self, Operator};
use super::{AliasTracker, Condition, OrderBy, Query, Selection};
use crate::error::{DataMapperError, Result};
use crate::schema::{Model, Schema};
use crate::util::quote_ident;
use serde_json::{Map, Value};
use std::fmt;

/// SQL text plus positional (`?`) parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// `INSERT` for one row; an empty map inserts default values.
pub fn insert_sql(model: &Model, values: &Map<String, Value>) -> Result<Statement> {
    if values.is_empty() {
        return Ok(Statement {
            sql: format!("INSERT INTO {} DEFAULT VALUES", quote_ident(model.table())),
            params: Vec::new(),
        });
    }

    let mut columns = Vec::with_capacity(values.len());
    let mut params = Vec::with_capacity(values.len());
    for (name, value) in values {
        model.column(name)?;
        columns.push(quote_ident(name));
        params.push(value.clone());
    }
    Ok(Statement {
        sql: format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(model.table()),
            columns.join(", "),
            vec!["?"; params.len()].join(", ")
        ),
        params,
    })
}

pub(crate) struct Compiler<'a> {
    schema: &'a Schema,
    query: &'a Query,
    aliases: AliasTracker,
    params: Vec<Value>,
}

impl<'a> Compiler<'a> {
    pub(crate) fn new(schema: &'a Schema, query: &'a Query) -> Self {
        Compiler {
            schema,
            query,
            aliases: AliasTracker::new(),
            params: Vec::new(),
        }
    }

    pub(crate) fn select(mut self) -> Result<Statement> {
        let sql = self.select_sql(None)?;
        Ok(self.finish(sql))
    }

    pub(crate) fn count(mut self) -> Result<Statement> {
        let subquery = self.select_sql(None)?;
        let sql = format!("SELECT COUNT(*) FROM ({subquery}) AS \"subquery_for_count\"");
        Ok(self.finish(sql))
    }

    pub(crate) fn update(mut self, changes: &Map<String, Value>) -> Result<Statement> {
        if changes.is_empty() {
            return Err(DataMapperError::InvalidExpression(
                "an empty set of changes".into(),
            ));
        }

        let model = self.query.model().clone();
        let mut assignments = Vec::with_capacity(changes.len());
        for (name, value) in changes {
            model.column(name)?;
            assignments.push(format!("{} = ?", quote_ident(name)));
            self.params.push(value.clone());
        }

        let mut sql = format!(
            "UPDATE {} SET {}",
            quote_ident(model.table()),
            assignments.join(", ")
        );
        sql.push_str(&self.target()?);
        Ok(self.finish(sql))
    }

    pub(crate) fn delete(mut self) -> Result<Statement> {
        let mut sql = format!("DELETE FROM {}", quote_ident(self.query.model().table()));
        sql.push_str(&self.target()?);
        Ok(self.finish(sql))
    }

    fn finish(self, sql: String) -> Statement {
        Statement {
            sql,
            params: self.params,
        }
    }

    /// WHERE clause selecting the rows an UPDATE or DELETE touches. Joins,
    /// limits and offsets can't be expressed directly, so those go through a
    /// primary key subquery.
    fn target(&mut self) -> Result<String> {
        let query = self.query;
        if !query.joins().is_empty() || query.limit_value().is_some() || query.offset_value().is_some() {
            let model = query.model();
            let pk = format!(
                "{}.{}",
                quote_ident(model.table()),
                quote_ident(model.primary_key())
            );
            let subquery = self.select_sql(Some(pk.clone()))?;
            return Ok(format!(" WHERE {pk} IN ({subquery})"));
        }
        match query.condition() {
            Some(condition) => Ok(format!(" WHERE {}", self.condition(condition)?)),
            None => Ok(String::new()),
        }
    }

    fn select_sql(&mut self, columns: Option<String>) -> Result<String> {
        let query = self.query;
        let from = self.from_clause()?;
        let columns = match columns {
            Some(columns) => columns,
            None => self.columns()?,
        };

        let mut sql = format!("SELECT {columns} FROM {from}");
        if let Some(condition) = query.condition() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.condition(condition)?);
        }
        if !query.order_bys().is_empty() {
            let mut orders = Vec::with_capacity(query.order_bys().len());
            for order in query.order_bys() {
                orders.push(match order {
                    OrderBy::Column { key, direction } => {
                        format!("{} {}", self.column(key)?, direction.as_sql())
                    }
                    OrderBy::Raw(raw) => raw.clone(),
                });
            }
            sql.push_str(" ORDER BY ");
            sql.push_str(&orders.join(", "));
        }
        match (query.limit_value(), query.offset_value()) {
            (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}")),
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {limit}")),
            (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {offset}")),
            (None, None) => {}
        }
        Ok(sql)
    }

    fn from_clause(&mut self) -> Result<String> {
        let base = self.query.model().clone();
        let base_ref = quote_ident(base.table());
        let mut sql = base_ref.clone();
        for node in &to_join_tree(self.query.joins())? {
            self.join(&mut sql, &base, &base_ref, node)?;
        }
        Ok(sql)
    }

    fn join(&mut self, sql: &mut String, owner: &Model, owner_ref: &str, node: &JoinNode) -> Result<()> {
        let assoc = owner.association(node.join.association())?;
        let related = self.schema.model(assoc.related())?;
        let alias = quote_ident(&self.aliases.put(related.clone(), node.join.alias())?);

        sql.push_str(&format!(
            " {} {} AS {alias} ON {alias}.{} = {owner_ref}.{}",
            if node.join.is_outer() { "LEFT JOIN" } else { "JOIN" },
            quote_ident(related.table()),
            quote_ident(assoc.related_key()),
            quote_ident(assoc.owner_key()),
        ));

        for child in &node.children {
            self.join(sql, &related, &alias, child)?;
        }
        Ok(())
    }

    fn columns(&self) -> Result<String> {
        match self.query.selection() {
            None => {
                let model = self.query.model();
                let table = quote_ident(model.table());
                Ok(model
                    .fields()
                    .keys()
                    .map(|name| format!("{table}.{}", quote_ident(name)))
                    .collect::<Vec<_>>()
                    .join(", "))
            }
            Some(selection) => {
                let mut columns = Vec::with_capacity(selection.width());
                self.selection(selection, &mut columns)?;
                Ok(columns.join(", "))
            }
        }
    }

    fn selection(&self, selection: &Selection, out: &mut Vec<String>) -> Result<()> {
        match selection {
            Selection::Column(key) => out.push(self.column(key)?),
            Selection::Raw(sql) => out.push(sql.clone()),
            Selection::List(items) => {
                for item in items {
                    self.selection(item, out)?;
                }
            }
            Selection::Map(entries) => {
                for (_, item) in entries {
                    self.selection(item, out)?;
                }
            }
        }
        Ok(())
    }

    /// Qualified column for `"name"` or `"alias__name"`.
    fn column(&self, key: &str) -> Result<String> {
        let base = self.query.model();
        let (name, alias) = parser::parse_column(key);
        let (model, qualifier) = match alias {
            Some(alias) if alias != base.table() => (self.aliases.fetch(alias)?, alias),
            _ => (base, base.table()),
        };
        model.column(name)?;
        Ok(format!("{}.{}", quote_ident(qualifier), quote_ident(name)))
    }

    fn condition(&mut self, condition: &Condition) -> Result<String> {
        match condition {
            Condition::Compare { column, op, value } => self.comparison(column, *op, value),
            Condition::Raw { sql, params } => {
                self.params.extend(params.iter().cloned());
                Ok(format!("({sql})"))
            }
            Condition::And(items) => self.compound(items, "AND"),
            Condition::Or(items) => self.compound(items, "OR"),
            Condition::Not(inner) => Ok(format!("NOT ({})", self.condition(inner)?)),
        }
    }

    fn compound(&mut self, items: &[Condition], keyword: &str) -> Result<String> {
        if items.is_empty() {
            return Ok(if keyword == "AND" { "1 = 1" } else { "1 = 0" }.to_string());
        }
        let mut parts = Vec::with_capacity(items.len());
        for item in items {
            let sql = self.condition(item)?;
            parts.push(match item {
                Condition::And(_) | Condition::Or(_) => format!("({sql})"),
                _ => sql,
            });
        }
        Ok(parts.join(&format!(" {keyword} ")))
    }

    fn comparison(&mut self, key: &str, op: Operator, value: &Value) -> Result<String> {
        let column = self.column(key)?;
        let sql = match (op, value) {
            (Operator::Eq, Value::Null) => format!("{column} IS NULL"),
            (Operator::NotEq, Value::Null) => format!("{column} IS NOT NULL"),
            (Operator::Eq | Operator::In, Value::Array(items)) => self.in_list(&column, items, false),
            (Operator::NotEq, Value::Array(items)) => self.in_list(&column, items, true),
            (_, Value::Array(_) | Value::Object(_)) => {
                return Err(DataMapperError::InvalidExpression(format!(
                    "{key}__{}={value}",
                    op.suffix()
                )))
            }
            (op, value) => {
                self.params.push(value.clone());
                match op {
                    Operator::Eq => format!("{column} = ?"),
                    Operator::NotEq => format!("{column} != ?"),
                    Operator::Like => format!("{column} LIKE ?"),
                    Operator::NotLike => format!("{column} NOT LIKE ?"),
                    Operator::ILike => format!("LOWER({column}) LIKE LOWER(?)"),
                    Operator::NotILike => format!("LOWER({column}) NOT LIKE LOWER(?)"),
                    Operator::Contains => format!("{column} LIKE '%' || ? || '%'"),
                    Operator::StartsWith => format!("{column} LIKE ? || '%'"),
                    Operator::EndsWith => format!("{column} LIKE '%' || ?"),
                    Operator::Gt => format!("{column} > ?"),
                    Operator::Gte => format!("{column} >= ?"),
                    Operator::Lt => format!("{column} < ?"),
                    Operator::Lte => format!("{column} <= ?"),
                    Operator::In => {
                        return Err(DataMapperError::InvalidExpression(format!(
                            "{key}__in={value} (expected a list)"
                        )))
                    }
                }
            }
        };
        Ok(sql)
    }

    fn in_list(&mut self, column: &str, items: &[Value], negate: bool) -> String {
        if items.is_empty() {
            return if negate { "1 = 1" } else { "1 = 0" }.to_string();
        }
        self.params.extend(items.iter().cloned());
        format!(
            "{column} {}IN ({})",
            if negate { "NOT " } else { "" },
            vec!["?"; items.len()].join(", ")
        )
    }
}

pub mod alias_tracker;
pub mod compiler;
pub mod join;
pub mod parser;

pub use alias_tracker::AliasTracker;
pub use compiler::Statement;
pub use join::{to_join_tree, Join, JoinNode};
pub use parser::{Direction, Operator};

use crate::error::Result;
use crate::schema::{Model, Schema};
use serde_json::{Map, Value};
use std::sync::Arc;

/// A filter expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Compare {
        column: String,
        op: Operator,
        value: Value,
    },
    Raw {
        sql: String,
        params: Vec<Value>,
    },
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
}

impl Condition {
    /// Comparison from a filter key such as `"p__name__startswith"`.
    pub fn compare(key: &str, value: impl Into<Value>) -> Self {
        let (column, op) = parser::parse_where(key);
        Condition::Compare {
            column: column.to_string(),
            op,
            value: value.into(),
        }
    }

    pub fn raw(sql: &str, params: Vec<Value>) -> Self {
        Condition::Raw {
            sql: sql.to_string(),
            params,
        }
    }

    pub fn and(self, other: Condition) -> Self {
        match self {
            Condition::And(mut items) => {
                items.push(other);
                Condition::And(items)
            }
            this => Condition::And(vec![this, other]),
        }
    }

    pub fn or(self, other: Condition) -> Self {
        match self {
            Condition::Or(mut items) => {
                items.push(other);
                Condition::Or(items)
            }
            this => Condition::Or(vec![this, other]),
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Condition::Not(Box::new(self))
    }
}

/// Columns to select and the shape to rebuild results into.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// `"name"` or `"alias__name"`; rows become scalars.
    Column(String),
    /// Raw SQL expression, e.g. `"COUNT(*)"`.
    Raw(String),
    /// Rows become arrays.
    List(Vec<Selection>),
    /// Rows become objects keyed by the given names.
    Map(Vec<(String, Selection)>),
}

impl Selection {
    pub fn raw(sql: &str) -> Self {
        Selection::Raw(sql.to_string())
    }

    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, Selection)>) -> Self {
        Selection::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Number of SQL expressions this selection expands to.
    pub fn width(&self) -> usize {
        match self {
            Selection::Column(_) | Selection::Raw(_) => 1,
            Selection::List(items) => items.iter().map(Selection::width).sum(),
            Selection::Map(entries) => entries.iter().map(|(_, s)| s.width()).sum(),
        }
    }

    /// Rebuild one row of flat values into this selection's shape.
    pub fn shape(&self, row: &mut impl Iterator<Item = Value>) -> Value {
        match self {
            Selection::Column(_) | Selection::Raw(_) => row.next().unwrap_or(Value::Null),
            Selection::List(items) => Value::Array(items.iter().map(|s| s.shape(&mut *row)).collect()),
            Selection::Map(entries) => {
                let mut object = Map::new();
                for (name, selection) in entries {
                    object.insert(name.clone(), selection.shape(&mut *row));
                }
                Value::Object(object)
            }
        }
    }
}

impl From<&str> for Selection {
    fn from(column: &str) -> Self {
        Selection::Column(column.to_string())
    }
}

impl From<String> for Selection {
    fn from(column: String) -> Self {
        Selection::Column(column)
    }
}

impl<const N: usize> From<[&str; N]> for Selection {
    fn from(columns: [&str; N]) -> Self {
        Selection::List(columns.into_iter().map(Selection::from).collect())
    }
}

impl From<Vec<Selection>> for Selection {
    fn from(items: Vec<Selection>) -> Self {
        Selection::List(items)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrderBy {
    Column { key: String, direction: Direction },
    Raw(String),
}

/// An immutable query against one model. Builder methods return a modified
/// copy and leave the receiver untouched.
#[derive(Debug, Clone)]
pub struct Query {
    model: Arc<Model>,
    selection: Option<Selection>,
    condition: Option<Condition>,
    order_bys: Vec<OrderBy>,
    joins: Vec<Join>,
    limit: Option<u64>,
    offset: Option<u64>,
    preloads: Vec<String>,
}

impl Query {
    pub fn new(model: Arc<Model>) -> Self {
        Query {
            model,
            selection: None,
            condition: None,
            order_bys: Vec::new(),
            joins: Vec::new(),
            limit: None,
            offset: None,
            preloads: Vec::new(),
        }
    }

    fn update(&self, f: impl FnOnce(&mut Query)) -> Query {
        let mut query = self.clone();
        f(&mut query);
        query
    }

    /// AND a comparison onto the current filters.
    pub fn filter(&self, key: &str, value: impl Into<Value>) -> Query {
        self.where_condition(Condition::compare(key, value))
    }

    /// Filter on several keys at once.
    pub fn filter_all<K: AsRef<str>, V: Into<Value>>(
        &self,
        filters: impl IntoIterator<Item = (K, V)>,
    ) -> Query {
        filters
            .into_iter()
            .fold(self.clone(), |query, (key, value)| query.filter(key.as_ref(), value))
    }

    /// OR a comparison with everything filtered so far.
    pub fn or_filter(&self, key: &str, value: impl Into<Value>) -> Query {
        let condition = Condition::compare(key, value);
        self.update(|q| {
            q.condition = Some(match q.condition.take() {
                Some(existing) => existing.or(condition),
                None => condition,
            })
        })
    }

    pub fn where_raw(&self, sql: &str, params: Vec<Value>) -> Query {
        self.where_condition(Condition::raw(sql, params))
    }

    pub fn where_condition(&self, condition: Condition) -> Query {
        self.update(|q| {
            q.condition = Some(match q.condition.take() {
                Some(existing) => existing.and(condition),
                None => condition,
            })
        })
    }

    pub fn order_by(&self, key: &str) -> Query {
        let (key, direction) = parser::parse_order(key);
        let order = OrderBy::Column {
            key: key.to_string(),
            direction,
        };
        self.update(|q| q.order_bys.push(order))
    }

    pub fn order_by_raw(&self, sql: &str) -> Query {
        self.update(|q| q.order_bys.push(OrderBy::Raw(sql.to_string())))
    }

    pub fn join(&self, path: &str, alias: Option<&str>) -> Query {
        self.update(|q| q.joins.push(Join::new(path, alias, false)))
    }

    pub fn outer_join(&self, path: &str, alias: Option<&str>) -> Query {
        self.update(|q| q.joins.push(Join::new(path, alias, true)))
    }

    pub fn select(&self, selection: impl Into<Selection>) -> Query {
        let selection = selection.into();
        self.update(|q| q.selection = Some(selection))
    }

    pub fn limit(&self, limit: u64) -> Query {
        self.update(|q| q.limit = Some(limit))
    }

    pub fn offset(&self, offset: u64) -> Query {
        self.update(|q| q.offset = Some(offset))
    }

    pub fn preload(&self, path: &str) -> Query {
        self.update(|q| q.preloads.push(path.to_string()))
    }

    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    pub fn condition(&self) -> Option<&Condition> {
        self.condition.as_ref()
    }

    pub fn order_bys(&self) -> &[OrderBy] {
        &self.order_bys
    }

    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    pub fn limit_value(&self) -> Option<u64> {
        self.limit
    }

    pub fn offset_value(&self) -> Option<u64> {
        self.offset
    }

    pub fn preloads(&self) -> &[String] {
        &self.preloads
    }

    pub fn to_sql(&self, schema: &Schema) -> Result<Statement> {
        compiler::Compiler::new(schema, self).select()
    }

    pub fn to_count_sql(&self, schema: &Schema) -> Result<Statement> {
        compiler::Compiler::new(schema, self).count()
    }

    pub fn to_update_sql(&self, schema: &Schema, changes: &Map<String, Value>) -> Result<Statement> {
        compiler::Compiler::new(schema, self).update(changes)
    }

    pub fn to_delete_sql(&self, schema: &Schema) -> Result<Statement> {
        compiler::Compiler::new(schema, self).delete()
    }
}

//! Execution of queries and changesets against SQLite.

mod connection;
mod preload;
mod transaction;

use crate::changeset::{Changeset, ChangesetData, MISSING_MESSAGE};
use crate::config::Config;
use crate::error::{DataMapperError, Result};
use crate::query::compiler::insert_sql;
use crate::query::Query;
use crate::raw::{Raw, RawRow};
use crate::record::Record;
use crate::schema::{create_tables_sql, Model, PrimaryKeyStrategy, Schema};
use crate::util::{assert_one, from_sql_value};
use connection::{bootstrap, Rows};
use rusqlite::Connection;
use serde_json::{Map, Value};
use std::cell::Cell;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Anything a repo can turn into a query.
pub trait Queryable {
    fn to_query(&self, schema: &Schema) -> Result<Query>;
}

impl Queryable for Query {
    fn to_query(&self, _schema: &Schema) -> Result<Query> {
        Ok(self.clone())
    }
}

/// A model name: every row of that model.
impl Queryable for str {
    fn to_query(&self, schema: &Schema) -> Result<Query> {
        schema.query(self)
    }
}

impl Queryable for String {
    fn to_query(&self, schema: &Schema) -> Result<Query> {
        schema.query(self)
    }
}

/// The row a record was loaded from, by primary key.
impl Queryable for Record {
    fn to_query(&self, _schema: &Schema) -> Result<Query> {
        let model = self.model();
        let key = self.primary_key_value();
        if key.is_null() {
            return Err(DataMapperError::InvalidExpression(format!(
                "{} record without a primary key",
                model.name()
            )));
        }
        Ok(Query::new(model.clone()).filter(model.primary_key(), key.clone()))
    }
}

/// A schema bound to one SQLite connection.
pub struct Repo {
    conn: Connection,
    schema: Schema,
    in_transaction: Cell<bool>,
}

impl Repo {
    /// Open or create the database file at `path`.
    pub fn open(path: &Path, schema: Schema) -> Result<Self> {
        Self::with_connection(Connection::open(path)?, schema, DEFAULT_BUSY_TIMEOUT)
    }

    pub fn open_in_memory(schema: Schema) -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, schema, DEFAULT_BUSY_TIMEOUT)
    }

    pub fn from_config(config: &Config, schema: Schema) -> Result<Self> {
        let conn = if config.is_in_memory() {
            Connection::open_in_memory()?
        } else {
            Connection::open(&config.database)?
        };
        log::info!("opening {} ({:?} profile)", config.database, config.profile);
        Self::with_connection(conn, schema, Duration::from_millis(config.busy_timeout_ms))
    }

    fn with_connection(conn: Connection, schema: Schema, busy_timeout: Duration) -> Result<Self> {
        bootstrap(&conn, busy_timeout)?;
        Ok(Repo {
            conn,
            schema,
            in_transaction: Cell::new(false),
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// `CREATE TABLE IF NOT EXISTS` for every model.
    pub fn create_tables(&self) -> Result<()> {
        for sql in create_tables_sql(&self.schema)? {
            log::debug!("{sql}");
            self.conn.execute_batch(&sql)?;
        }
        log::info!("created tables for {} models", self.schema.models().count());
        Ok(())
    }

    pub fn all<Q: Queryable + ?Sized>(&self, queryable: &Q) -> Result<Vec<Record>> {
        let query = queryable.to_query(&self.schema)?;
        if query.selection().is_some() {
            return Err(DataMapperError::InvalidExpression(
                "a query with a custom select (use Repo::select)".into(),
            ));
        }
        let statement = query.to_sql(&self.schema)?;
        let mut records = self.materialize(query.model(), self.fetch(&statement)?);
        if !query.preloads().is_empty() {
            self.preload(&mut records, query.preloads())?;
        }
        Ok(records)
    }

    /// First record, or `None` when nothing matches.
    pub fn first<Q: Queryable + ?Sized>(&self, queryable: &Q) -> Result<Option<Record>> {
        let query = queryable.to_query(&self.schema)?.limit(1);
        Ok(self.all(&query)?.into_iter().next())
    }

    /// Exactly one record; `NoResults` or `MultipleResults` otherwise.
    pub fn one<Q: Queryable + ?Sized>(&self, queryable: &Q) -> Result<Record> {
        assert_one(self.all(queryable)?)
    }

    pub fn get<Q: Queryable + ?Sized>(&self, queryable: &Q, id: impl Into<Value>) -> Result<Record> {
        let query = queryable.to_query(&self.schema)?;
        let primary_key = query.model().primary_key().to_string();
        self.one(&query.filter(&primary_key, id))
    }

    pub fn get_by<Q, K, V>(&self, queryable: &Q, filters: impl IntoIterator<Item = (K, V)>) -> Result<Record>
    where
        Q: Queryable + ?Sized,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let query = queryable.to_query(&self.schema)?;
        self.one(&query.filter_all(filters))
    }

    pub fn count<Q: Queryable + ?Sized>(&self, queryable: &Q) -> Result<u64> {
        let statement = queryable.to_query(&self.schema)?.to_count_sql(&self.schema)?;
        let rows = self.fetch(&statement)?;
        match rows.rows.first().and_then(|row| row.first()) {
            Some(rusqlite::types::Value::Integer(n)) => Ok(u64::try_from(*n).unwrap_or_default()),
            _ => Ok(0),
        }
    }

    pub fn exists<Q: Queryable + ?Sized>(&self, queryable: &Q) -> Result<bool> {
        let query = queryable.to_query(&self.schema)?.limit(1);
        Ok(self.count(&query)? > 0)
    }

    /// Rows as JSON values shaped like the query's selection. Without a
    /// selection every row is an object of the model's fields.
    pub fn select<Q: Queryable + ?Sized>(&self, queryable: &Q) -> Result<Vec<Value>> {
        let query = queryable.to_query(&self.schema)?;
        let statement = query.to_sql(&self.schema)?;
        let rows = self.fetch(&statement)?;
        Ok(match query.selection() {
            Some(selection) => rows
                .rows
                .into_iter()
                .map(|row| selection.shape(&mut row.into_iter().map(|v| from_sql_value(v, None))))
                .collect(),
            None => self
                .materialize(query.model(), rows)
                .into_iter()
                .map(|record| Value::Object(record.into_attributes()))
                .collect(),
        })
    }

    /// Insert a record or changeset, returning the stored record with its key.
    pub fn insert(&self, changeset: impl Into<Changeset<Record>>) -> Result<Record> {
        let changeset = changeset.into();
        let errors = changeset.errors();
        if !errors.is_empty() {
            return Err(DataMapperError::InvalidChangeset {
                action: "insert".into(),
                errors,
            });
        }

        let model = changeset.data().model().clone();
        let primary_key = model.primary_key().to_string();
        let strategy = model.primary_key_strategy();
        let mut values = changeset.changes();

        if values.get(&primary_key).map_or(true, Value::is_null) {
            values.remove(&primary_key);
            match generate_key(strategy) {
                Some(key) => {
                    values.insert(primary_key.clone(), key);
                }
                None if strategy == PrimaryKeyStrategy::Manual => {
                    return Err(DataMapperError::InvalidChangeset {
                        action: "insert".into(),
                        errors: [(primary_key, vec![MISSING_MESSAGE.to_string()])].into(),
                    });
                }
                None => {}
            }
        }

        self.execute(&insert_sql(&model, &values)?)?;
        if !values.contains_key(&primary_key) {
            values.insert(primary_key, Value::from(self.conn.last_insert_rowid()));
        }
        Ok(changeset.data().apply(&values))
    }

    /// Write the changes of `changeset` to the record's row.
    pub fn update(&self, changeset: Changeset<Record>) -> Result<Record> {
        let errors = changeset.errors();
        if !errors.is_empty() {
            return Err(DataMapperError::InvalidChangeset {
                action: "update".into(),
                errors,
            });
        }

        let changes = changeset.changes();
        let record = changeset.data();
        if changes.is_empty() {
            return Ok(record.clone());
        }

        let query = record.to_query(&self.schema)?;
        if self.execute(&query.to_update_sql(&self.schema, &changes)?)? == 0 {
            return Err(DataMapperError::NoResults);
        }
        Ok(record.apply(&changes))
    }

    pub fn delete(&self, record: Record) -> Result<Record> {
        let query = record.to_query(&self.schema)?;
        if self.execute(&query.to_delete_sql(&self.schema)?)? == 0 {
            return Err(DataMapperError::NoResults);
        }
        Ok(record)
    }

    /// Update every matching row; returns the number of rows changed.
    pub fn update_all<Q: Queryable + ?Sized>(&self, queryable: &Q, values: &Map<String, Value>) -> Result<usize> {
        let query = queryable.to_query(&self.schema)?;
        self.execute(&query.to_update_sql(&self.schema, values)?)
    }

    /// Delete every matching row; returns the number of rows removed.
    pub fn delete_all<Q: Queryable + ?Sized>(&self, queryable: &Q) -> Result<usize> {
        let query = queryable.to_query(&self.schema)?;
        self.execute(&query.to_delete_sql(&self.schema)?)
    }

    /// Run a raw statement that returns rows: a query, or a statement with
    /// result columns such as `INSERT ... RETURNING`. Statements without
    /// result columns go through [`Repo::execute_raw`].
    pub fn raw(&self, raw: &Raw) -> Result<Vec<RawRow>> {
        if !raw.is_query() && !self.returns_rows(raw.sql())? {
            return Err(DataMapperError::Unsupported(
                "Repo::raw only runs queries, use Repo::execute_raw".into(),
            ));
        }
        let Rows { columns, rows } = self.fetch_sql(raw.sql(), raw.params())?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let map = columns
                    .iter()
                    .cloned()
                    .zip(row.into_iter().map(|v| from_sql_value(v, None)))
                    .collect();
                raw.deserialize_row(map)
            })
            .collect())
    }

    /// Run a raw statement that isn't a query. Returns the number of rows
    /// affected, or the number of rows returned when the statement has
    /// result columns.
    pub fn execute_raw(&self, raw: &Raw) -> Result<usize> {
        if raw.is_query() {
            return Err(DataMapperError::Unsupported(
                "Repo::execute_raw doesn't return rows, use Repo::raw".into(),
            ));
        }
        if self.returns_rows(raw.sql())? {
            return Ok(self.fetch_sql(raw.sql(), raw.params())?.rows.len());
        }
        self.execute_sql(raw.sql(), raw.params())
    }

    fn materialize(&self, model: &Arc<Model>, rows: Rows) -> Vec<Record> {
        let Rows { columns, rows } = rows;
        rows.into_iter()
            .map(|row| {
                let attributes = columns
                    .iter()
                    .zip(row)
                    .map(|(column, value)| {
                        (column.clone(), from_sql_value(value, model.field_type(column)))
                    })
                    .collect();
                Record::with_attributes(model.clone(), attributes)
            })
            .collect()
    }
}

fn generate_key(strategy: PrimaryKeyStrategy) -> Option<Value> {
    let key = match strategy {
        PrimaryKeyStrategy::Ulid => ulid::Ulid::new().to_string().to_lowercase(),
        PrimaryKeyStrategy::Uuid => uuid::Uuid::new_v4().to_string(),
        PrimaryKeyStrategy::Nanoid => nanoid::nanoid!(),
        PrimaryKeyStrategy::Autoincrement | PrimaryKeyStrategy::Manual => return None,
    };
    Some(Value::String(key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Selection;
    use crate::testing;
    use serde_json::json;

    fn params(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    fn insert_user(repo: &Repo, name: &str) -> Record {
        let user = repo.schema().record("User").unwrap().with("name", json!(name));
        repo.insert(user).unwrap()
    }

    #[test]
    fn test_insert_assigns_primary_key() {
        let repo = testing::repo();
        let ray = insert_user(&repo, "Ray");
        let bear = insert_user(&repo, "Bear");

        assert_eq!(ray.get("id").unwrap(), &json!(1));
        assert_eq!(bear.get("id").unwrap(), &json!(2));
        assert_eq!(repo.get("User", 1).unwrap(), ray.clone().with("email", json!(null)));
    }

    #[test]
    fn test_insert_invalid_changeset() {
        let repo = testing::repo();
        let pet = repo.schema().record("Pet").unwrap();
        let changeset = Changeset::new(pet)
            .cast(&params(json!({"name": 7})), &["name"])
            .validate_required(&["name"]);

        let err = repo.insert(changeset).unwrap_err();
        assert_eq!(
            err.to_string(),
            "could not perform insert because changeset is invalid: name: Not a valid string."
        );
        assert_eq!(repo.count("Pet").unwrap(), 0);
    }

    #[test]
    fn test_generated_keys() {
        let schema = Schema::from_yaml_str(
            r#"
models:
  Ticket:
    primary_key_strategy: ulid
    fields:
      label: { type: string }
  Token:
    primary_key_strategy: uuid
  Code:
    primary_key_strategy: nanoid
  Slot:
    primary_key: key
    primary_key_strategy: manual
"#,
        )
        .unwrap();
        let repo = Repo::open_in_memory(schema).unwrap();
        repo.create_tables().unwrap();

        let ticket = repo.insert(repo.schema().record("Ticket").unwrap()).unwrap();
        let id = ticket.get("id").unwrap().as_str().unwrap().to_string();
        assert_eq!(id.len(), 26);
        assert_eq!(id, id.to_lowercase());

        let token = repo.insert(repo.schema().record("Token").unwrap()).unwrap();
        assert_eq!(token.get("id").unwrap().as_str().unwrap().len(), 36);

        let code = repo.insert(repo.schema().record("Code").unwrap()).unwrap();
        assert_eq!(code.get("id").unwrap().as_str().unwrap().len(), 21);

        let err = repo.insert(repo.schema().record("Slot").unwrap()).unwrap_err();
        assert!(matches!(err, DataMapperError::InvalidChangeset { .. }));
        let slot = repo.schema().record("Slot").unwrap().with("key", json!("a1"));
        assert_eq!(repo.insert(slot).unwrap().get("key").unwrap(), &json!("a1"));

        assert_eq!(repo.count("Ticket").unwrap(), 1);
    }

    #[test]
    fn test_first_one_and_errors() {
        let repo = testing::repo();
        assert_eq!(repo.first("User").unwrap(), None);
        assert!(matches!(repo.one("User"), Err(DataMapperError::NoResults)));

        insert_user(&repo, "Ray");
        insert_user(&repo, "Bear");

        let query = repo.schema().query("User").unwrap().order_by("-name");
        let first = repo.first(&query).unwrap().unwrap();
        assert_eq!(first.get("name").unwrap(), &json!("Ray"));

        let err = repo.one("User").unwrap_err();
        assert_eq!(err.to_string(), "expected at most one result but got 2");
        assert!(matches!(
            repo.get("User", 99),
            Err(DataMapperError::NoResults)
        ));
    }

    #[test]
    fn test_get_by_and_queryable_variants() {
        let repo = testing::repo();
        let ray = insert_user(&repo, "Ray");
        insert_user(&repo, "Bear");

        let found = repo.get_by("User", [("name", "Ray")]).unwrap();
        assert_eq!(found.get("id").unwrap(), ray.get("id").unwrap());

        let by_string = repo.all(&"User".to_string()).unwrap();
        assert_eq!(by_string.len(), 2);

        let reloaded = repo.one(&ray).unwrap();
        assert_eq!(reloaded.get("name").unwrap(), &json!("Ray"));

        let unsaved = repo.schema().record("User").unwrap();
        assert!(matches!(
            repo.one(&unsaved),
            Err(DataMapperError::InvalidExpression(_))
        ));
        assert!(matches!(
            repo.all("Cat"),
            Err(DataMapperError::UnknownModel(_))
        ));
    }

    #[test]
    fn test_filters_against_the_database() {
        let repo = testing::repo();
        for name in ["Ray", "Bear", "Raven"] {
            insert_user(&repo, name);
        }
        let users = repo.schema().query("User").unwrap();
        let count = |query: &Query| repo.count(query).unwrap();

        assert_eq!(count(&users.filter("name__startswith", "Ra")), 2);
        assert_eq!(count(&users.filter("name__endswith", "ar")), 1);
        assert_eq!(count(&users.filter("name__contains", "av")), 1);
        assert_eq!(count(&users.filter("name__ilike", "ray")), 1);
        assert_eq!(count(&users.filter("name__in", json!(["Ray", "Bear"]))), 2);
        assert_eq!(count(&users.filter("id__gt", 1).filter("id__lte", 3)), 2);
        assert_eq!(count(&users.filter("email", json!(null))), 3);
        assert_eq!(count(&users.filter("name", "Ray").or_filter("name", "Bear")), 2);
        assert_eq!(count(&users.limit(2)), 2);
        assert!(repo.exists(&users.filter("name", "Bear")).unwrap());
        assert!(!repo.exists(&users.filter("name", "Nobody")).unwrap());
    }

    #[test]
    fn test_join_filters() {
        let repo = testing::repo();
        let ray = insert_user(&repo, "Ray");
        insert_user(&repo, "Bear");
        let pet = repo
            .schema()
            .record("Pet")
            .unwrap()
            .with("name", json!("Fido"))
            .with("owner_id", ray.get("id").unwrap().clone());
        repo.insert(pet).unwrap();

        let query = repo
            .schema()
            .query("User")
            .unwrap()
            .join("pets", Some("p"))
            .filter("p__name", "Fido");
        let users = repo.all(&query).unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].get("name").unwrap(), &json!("Ray"));

        let outer = repo.schema().query("User").unwrap().outer_join("pets", Some("p"));
        assert_eq!(repo.count(&outer.filter("p__id", json!(null))).unwrap(), 1);
    }

    #[test]
    fn test_select_shapes_rows() {
        let repo = testing::repo();
        insert_user(&repo, "Ray");
        insert_user(&repo, "Bear");
        let users = repo.schema().query("User").unwrap().order_by("id");

        assert_eq!(
            repo.select(&users.select("name")).unwrap(),
            vec![json!("Ray"), json!("Bear")]
        );
        assert_eq!(
            repo.select(&users.select(["id", "name"])).unwrap(),
            vec![json!([1, "Ray"]), json!([2, "Bear"])]
        );
        assert_eq!(
            repo.select(&users.select(Selection::map([("n", Selection::from("name"))])).limit(1))
                .unwrap(),
            vec![json!({"n": "Ray"})]
        );
        assert_eq!(
            repo.select(&users.limit(1)).unwrap(),
            vec![json!({"id": 1, "name": "Ray", "email": null})]
        );
        assert!(matches!(
            repo.all(&users.select("name")),
            Err(DataMapperError::InvalidExpression(_))
        ));
    }

    #[test]
    fn test_update() {
        let repo = testing::repo();
        let ray = insert_user(&repo, "Ray");

        let changeset = Changeset::new(ray.clone()).cast(&params(json!({"name": "Bear"})), &["name"]);
        let updated = repo.update(changeset).unwrap();
        assert_eq!(updated.get("name").unwrap(), &json!("Bear"));
        assert_eq!(repo.get("User", 1).unwrap().get("name").unwrap(), &json!("Bear"));

        let unchanged = repo.update(Changeset::new(updated.clone())).unwrap();
        assert_eq!(unchanged, updated);

        let invalid = Changeset::new(ray.clone()).cast(&params(json!({"name": 1})), &["name"]);
        assert!(matches!(
            repo.update(invalid),
            Err(DataMapperError::InvalidChangeset { .. })
        ));

        let ghost = ray.with("id", json!(42));
        let stale = Changeset::new(ghost).put_change("name", "Ghost");
        assert!(matches!(repo.update(stale), Err(DataMapperError::NoResults)));
    }

    #[test]
    fn test_delete() {
        let repo = testing::repo();
        let ray = insert_user(&repo, "Ray");
        insert_user(&repo, "Bear");

        let deleted = repo.delete(ray.clone()).unwrap();
        assert_eq!(deleted, ray);
        assert_eq!(repo.count("User").unwrap(), 1);
        assert!(matches!(repo.delete(ray), Err(DataMapperError::NoResults)));
    }

    #[test]
    fn test_update_all_and_delete_all() {
        let repo = testing::repo();
        for name in ["Ray", "Bear", "Raven"] {
            insert_user(&repo, name);
        }
        let users = repo.schema().query("User").unwrap();

        let changed = repo
            .update_all(&users.filter("name__startswith", "Ra"), &params(json!({"email": "r@x"})))
            .unwrap();
        assert_eq!(changed, 2);
        assert_eq!(repo.count(&users.filter("email", "r@x")).unwrap(), 2);

        let removed = repo.delete_all(&users.order_by("id").limit(1)).unwrap();
        assert_eq!(removed, 1);
        assert!(matches!(repo.get("User", 1), Err(DataMapperError::NoResults)));

        assert_eq!(repo.delete_all("User").unwrap(), 2);
    }

    #[test]
    fn test_raw_queries() {
        let repo = testing::repo();
        insert_user(&repo, "Ray");

        let raw = Raw::new("SELECT id, name FROM users WHERE name = ?").unwrap().bind("Ray");
        assert_eq!(
            repo.raw(&raw).unwrap(),
            vec![RawRow::Row(params(json!({"id": 1, "name": "Ray"})))]
        );

        let raw = raw.with_model(repo.schema().model("User").unwrap());
        match &repo.raw(&raw).unwrap()[0] {
            RawRow::Record(user) => assert_eq!(user.get("name").unwrap(), &json!("Ray")),
            other => panic!("expected a record, got {other:?}"),
        }

        let update = Raw::new("UPDATE users SET email = ?").unwrap().bind("r@x");
        assert_eq!(repo.execute_raw(&update).unwrap(), 1);
        assert!(matches!(
            repo.raw(&update),
            Err(DataMapperError::Unsupported(_))
        ));
        let select = Raw::new("SELECT 1").unwrap();
        assert!(matches!(
            repo.execute_raw(&select),
            Err(DataMapperError::Unsupported(_))
        ));
    }

    #[test]
    fn test_raw_statements_with_result_columns() {
        let repo = testing::repo();

        let insert = Raw::new("INSERT INTO users (name) VALUES (?) RETURNING id, name")
            .unwrap()
            .bind("Ray");
        assert!(!insert.is_query());
        assert_eq!(
            repo.raw(&insert).unwrap(),
            vec![RawRow::Row(params(json!({"id": 1, "name": "Ray"})))]
        );

        let insert = Raw::new("INSERT INTO users (name) VALUES (?) RETURNING id")
            .unwrap()
            .bind("Bear");
        assert_eq!(repo.execute_raw(&insert).unwrap(), 1);
        assert_eq!(repo.count("User").unwrap(), 2);
    }

    #[test]
    fn test_file_database_persists() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("app.db");
        {
            let repo = Repo::open(&path, testing::schema()).unwrap();
            repo.create_tables().unwrap();
            insert_user(&repo, "Ray");
        }
        let repo = Repo::open(&path, testing::schema()).unwrap();
        assert_eq!(repo.count("User").unwrap(), 1);
    }

    #[test]
    fn test_from_config() {
        let config = Config::default()
            .with_overrides(|key| (key == crate::config::ENV_PROFILE).then(|| "test".to_string()))
            .unwrap();
        let repo = Repo::from_config(&config, testing::schema()).unwrap();
        repo.create_tables().unwrap();
        assert_eq!(repo.count("User").unwrap(), 0);
    }
}

use super::Repo;
use crate::error::Result;
use crate::query::Statement;
use crate::util::to_sql_value;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection};
use serde_json::Value;
use std::time::Duration;

/// Raw result set: column names plus SQLite values per row.
pub(crate) struct Rows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
}

/// Per-connection settings every repo runs with.
pub(crate) fn bootstrap(conn: &Connection, busy_timeout: Duration) -> Result<()> {
    conn.busy_timeout(busy_timeout)?;
    conn.execute_batch(
        "
        PRAGMA foreign_keys = ON;
        PRAGMA case_sensitive_like = ON;
        ",
    )?;
    log::debug!("connection ready (busy timeout {}ms)", busy_timeout.as_millis());
    Ok(())
}

impl Repo {
    pub(crate) fn execute(&self, statement: &Statement) -> Result<usize> {
        self.execute_sql(&statement.sql, &statement.params)
    }

    pub(crate) fn execute_sql(&self, sql: &str, params: &[Value]) -> Result<usize> {
        log::debug!("{sql} {params:?}");
        let affected = self
            .conn
            .execute(sql, params_from_iter(params.iter().map(to_sql_value)))?;
        Ok(affected)
    }

    pub(crate) fn fetch(&self, statement: &Statement) -> Result<Rows> {
        self.fetch_sql(&statement.sql, &statement.params)
    }

    pub(crate) fn fetch_sql(&self, sql: &str, params: &[Value]) -> Result<Rows> {
        log::debug!("{sql} {params:?}");
        let mut stmt = self.conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let width = columns.len();

        let rows = stmt
            .query_map(params_from_iter(params.iter().map(to_sql_value)), |row| {
                (0..width)
                    .map(|i| row.get::<_, SqlValue>(i))
                    .collect::<rusqlite::Result<Vec<_>>>()
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(Rows { columns, rows })
    }

    /// Whether `sql` produces result columns once prepared.
    pub(crate) fn returns_rows(&self, sql: &str) -> Result<bool> {
        Ok(self.conn.prepare(sql)?.column_count() > 0)
    }

    pub(crate) fn begin_transaction(&self) -> Result<()> {
        self.conn.execute_batch("BEGIN TRANSACTION")?;
        Ok(())
    }

    pub(crate) fn commit_transaction(&self) -> Result<()> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    pub(crate) fn rollback_transaction(&self) -> Result<()> {
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::testing;
    use rusqlite::types::Value as SqlValue;
    use serde_json::json;

    #[test]
    fn test_foreign_keys_are_enforced() {
        let repo = testing::repo();
        let enabled: i64 = repo
            .conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(enabled, 1);
    }

    #[test]
    fn test_fetch_returns_columns_and_values() {
        let repo = testing::repo();
        repo.execute_sql(
            "INSERT INTO users (name, email) VALUES (?, ?)",
            &[json!("Ray"), json!(null)],
        )
        .unwrap();

        let rows = repo
            .fetch_sql("SELECT id, name, email FROM users WHERE name = ?", &[json!("Ray")])
            .unwrap();
        assert_eq!(rows.columns, vec!["id", "name", "email"]);
        assert_eq!(
            rows.rows,
            vec![vec![
                SqlValue::Integer(1),
                SqlValue::Text("Ray".into()),
                SqlValue::Null
            ]]
        );
    }

    #[test]
    fn test_returns_rows() {
        let repo = testing::repo();
        assert!(repo.returns_rows("SELECT * FROM users").unwrap());
        assert!(repo.returns_rows("PRAGMA table_info(users)").unwrap());
        assert!(!repo.returns_rows("DELETE FROM users").unwrap());
    }

    #[test]
    fn test_rollback_discards_writes() {
        let repo = testing::repo();
        repo.begin_transaction().unwrap();
        repo.execute_sql("INSERT INTO users (name) VALUES ('Ray')", &[]).unwrap();
        repo.rollback_transaction().unwrap();

        let rows = repo.fetch_sql("SELECT * FROM users", &[]).unwrap();
        assert!(rows.rows.is_empty());
    }
}

use crate::dump::unpack_dump;
use crate::error::{PressDbError, Result};
use crate::schema::{table_name, INFO_COLLECTION};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use serde_json::{Map, Value};
use std::path::Path;

/// One result row, keyed by column name.
pub type Row = Map<String, Value>;

/// The three-operation contract the compiled dump is executed through. The
/// pipeline never depends on a specific engine beyond this trait.
pub trait DatabaseAdapter {
    fn first(&self, sql: &str, params: &[Value]) -> Result<Option<Row>>;
    fn all(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;
    fn exec(&self, sql: &str) -> Result<()>;
}

/// Built-in adapter over a SQLite database file.
pub struct SqliteAdapter {
    conn: Connection,
}

impl SqliteAdapter {
    /// Open or create the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Ok(SqliteAdapter { conn })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        Ok(SqliteAdapter {
            conn: Connection::open_in_memory()?,
        })
    }

    pub fn begin_transaction(&self) -> Result<()> {
        self.conn.execute_batch("BEGIN")?;
        Ok(())
    }

    pub fn commit_transaction(&self) -> Result<()> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    pub fn rollback_transaction(&self) -> Result<()> {
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }

    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let mut stmt = self.conn.prepare(sql)?;
        let columns: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(|name| name.to_string())
            .collect();

        let bound = rusqlite::params_from_iter(params.iter().map(to_sql_value));
        let mut rows = stmt.query(bound)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut object = Map::with_capacity(columns.len());
            for (index, column) in columns.iter().enumerate() {
                object.insert(column.clone(), from_sql_value(row.get_ref(index)?));
            }
            out.push(object);
        }
        Ok(out)
    }
}

impl DatabaseAdapter for SqliteAdapter {
    fn first(&self, sql: &str, params: &[Value]) -> Result<Option<Row>> {
        Ok(self.query(sql, params)?.into_iter().next())
    }

    fn all(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.query(sql, params)
    }

    fn exec(&self, sql: &str) -> Result<()> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }
}

fn to_sql_value(value: &Value) -> rusqlite::types::Value {
    match value {
        Value::Null => rusqlite::types::Value::Null,
        Value::Bool(b) => rusqlite::types::Value::Integer(i64::from(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                rusqlite::types::Value::Integer(i)
            } else {
                rusqlite::types::Value::Real(n.as_f64().unwrap_or(0.0))
            }
        }
        Value::String(s) => rusqlite::types::Value::Text(s.clone()),
        other => rusqlite::types::Value::Text(other.to_string()),
    }
}

fn from_sql_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(BASE64.encode(b)),
    }
}

/// Execute a packaged dump artifact against an adapter, then verify the
/// recorded integrity version. A mismatch between the loaded artifact and
/// the current collection shapes is a hard load-time failure.
pub fn load_dump(
    adapter: &dyn DatabaseAdapter,
    artifact: &str,
    expected_version: &str,
) -> Result<()> {
    let statements = unpack_dump(artifact)?;
    for statement in &statements {
        adapter.exec(statement)?;
    }
    verify_integrity(adapter, expected_version)
}

/// Check the `_info` version row against the expected integrity version.
pub fn verify_integrity(adapter: &dyn DatabaseAdapter, expected_version: &str) -> Result<()> {
    let table = table_name(INFO_COLLECTION);
    let row = adapter.first(
        &format!("SELECT version FROM {table} WHERE id = ?1"),
        &[Value::String("version".to_string())],
    )?;
    let found = row
        .and_then(|r| r.get("version").and_then(|v| v.as_str().map(String::from)))
        .unwrap_or_else(|| "<missing>".to_string());
    if found != expected_version {
        return Err(PressDbError::IntegrityMismatch {
            expected: expected_version.to_string(),
            found,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dump::package_dump;
    use serde_json::json;

    fn sample_dump(version: &str) -> Vec<String> {
        vec![
            "CREATE TABLE IF NOT EXISTS content_posts (\"contentId\" TEXT PRIMARY KEY, \"title\" TEXT);".to_string(),
            "CREATE TABLE IF NOT EXISTS content__info (\"id\" TEXT PRIMARY KEY, \"version\" TEXT);".to_string(),
            "INSERT INTO content_posts (\"contentId\", \"title\") VALUES ('posts/a.md', 'A');".to_string(),
            format!("INSERT INTO content__info (\"id\", \"version\") VALUES ('version', '{version}');"),
        ]
    }

    #[test]
    fn adapter_round_trips_rows() {
        let adapter = SqliteAdapter::open_in_memory().unwrap();
        for statement in sample_dump("0.1.0-abc") {
            adapter.exec(&statement).unwrap();
        }

        let row = adapter
            .first(
                "SELECT title FROM content_posts WHERE \"contentId\" = ?1",
                &[json!("posts/a.md")],
            )
            .unwrap()
            .unwrap();
        assert_eq!(row["title"], json!("A"));

        let rows = adapter.all("SELECT * FROM content_posts", &[]).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn first_returns_none_when_absent() {
        let adapter = SqliteAdapter::open_in_memory().unwrap();
        adapter
            .exec("CREATE TABLE t (a TEXT);")
            .unwrap();
        assert!(adapter.first("SELECT * FROM t", &[]).unwrap().is_none());
    }

    #[test]
    fn load_dump_verifies_integrity() {
        let adapter = SqliteAdapter::open_in_memory().unwrap();
        let artifact = package_dump(&sample_dump("0.1.0-abc")).unwrap();
        load_dump(&adapter, &artifact, "0.1.0-abc").unwrap();
    }

    #[test]
    fn integrity_mismatch_is_reported() {
        let adapter = SqliteAdapter::open_in_memory().unwrap();
        let artifact = package_dump(&sample_dump("0.1.0-abc")).unwrap();
        let err = load_dump(&adapter, &artifact, "0.1.0-zzz").unwrap_err();
        match err {
            PressDbError::IntegrityMismatch { expected, found } => {
                assert_eq!(expected, "0.1.0-zzz");
                assert_eq!(found, "0.1.0-abc");
            }
            other => panic!("expected integrity mismatch, got {other}"),
        }
    }
}

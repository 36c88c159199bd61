//! SQLite-backed [`RecordStore`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, ToSql};

use fieldaudit_recon::model::RecordColumns;
use fieldaudit_recon::query::ParameterizedQuery;
use fieldaudit_recon::{RecordStore, StoreError};

use crate::error::IoError;

/// Read-only connection to an SQLite database.
pub struct SqliteStore {
    path: PathBuf,
    busy_timeout: Option<Duration>,
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path, busy_timeout_ms: Option<u64>) -> Result<Self, IoError> {
        let busy_timeout = busy_timeout_ms.map(Duration::from_millis);
        let conn = connect(path, busy_timeout).map_err(|e| IoError::Store {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        log::debug!("opened store {} read-only", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            busy_timeout,
            conn,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn connect(path: &Path, busy_timeout: Option<Duration>) -> rusqlite::Result<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX | OpenFlags::SQLITE_OPEN_URI,
    )?;
    if let Some(timeout) = busy_timeout {
        conn.busy_timeout(timeout)?;
    }
    // Opening is lazy; touch the schema so a bad file fails here.
    conn.query_row("SELECT count(*) FROM sqlite_master", [], |_| Ok(()))?;
    Ok(conn)
}

fn store_error(e: rusqlite::Error) -> StoreError {
    StoreError::new(e.to_string())
}

/// NULL → `None`; numbers via `Display`; text as is; blobs lossily.
fn value_text(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(n) => Some(n.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(t) | ValueRef::Blob(t) => Some(String::from_utf8_lossy(t).into_owned()),
    }
}

impl RecordStore for SqliteStore {
    fn fetch_one(&mut self, query: &ParameterizedQuery) -> Result<Option<RecordColumns>, StoreError> {
        let mut stmt = self.conn.prepare_cached(&query.sql).map_err(store_error)?;
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let params: Vec<(&str, &dyn ToSql)> = query
            .params
            .iter()
            .map(|(name, value)| (name.as_str(), value as &dyn ToSql))
            .collect();
        let mut rows = stmt.query(params.as_slice()).map_err(store_error)?;

        let Some(row) = rows.next().map_err(store_error)? else {
            return Ok(None);
        };
        let mut columns = RecordColumns::new();
        for (i, name) in names.into_iter().enumerate() {
            let value = row.get_ref(i).map_err(store_error)?;
            columns.insert(name, value_text(value));
        }
        Ok(Some(columns))
    }

    fn reset_cursor(&mut self) -> Result<(), StoreError> {
        self.conn.flush_prepared_statement_cache();
        self.conn
            .query_row("SELECT 1", [], |_| Ok(()))
            .map_err(store_error)
    }

    fn reconnect(&mut self) -> Result<(), StoreError> {
        log::info!("reconnecting to {}", self.path.display());
        self.conn = connect(&self.path, self.busy_timeout).map_err(store_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldaudit_recon::query::{FilterContext, QueryBuilder};

    fn fixture() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE invoice (id INTEGER PRIMARY KEY, number TEXT, amount REAL, lines INTEGER, note TEXT, raw BLOB);
             INSERT INTO invoice VALUES (1, 'F-17', 100.5, 3, NULL, X'6869');
             INSERT INTO invoice VALUES (2, 'F-18', 20.0, 1, 'late', NULL);",
        )
        .unwrap();
        (dir, path)
    }

    fn query(sql: &str, params: &[(&str, &str)]) -> ParameterizedQuery {
        ParameterizedQuery {
            sql: sql.to_string(),
            params: params.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        }
    }

    #[test]
    fn values_convert_to_text() {
        let (_dir, path) = fixture();
        let mut store = SqliteStore::open(&path, Some(1000)).unwrap();
        let row = store
            .fetch_one(&query(
                "SELECT amount, lines, note, raw FROM invoice WHERE number = :doc_id",
                &[(":doc_id", "F-17")],
            ))
            .unwrap()
            .unwrap();
        assert_eq!(row["amount"].as_deref(), Some("100.5"));
        assert_eq!(row["lines"].as_deref(), Some("3"));
        assert_eq!(row["note"], None);
        assert_eq!(row["raw"].as_deref(), Some("hi"));
    }

    #[test]
    fn no_row_is_none() {
        let (_dir, path) = fixture();
        let mut store = SqliteStore::open(&path, None).unwrap();
        let row = store
            .fetch_one(&query("SELECT amount FROM invoice WHERE number = :doc_id", &[(":doc_id", "X")]))
            .unwrap();
        assert!(row.is_none());
    }

    #[test]
    fn built_queries_run() {
        let (_dir, path) = fixture();
        let mut store = SqliteStore::open(&path, None).unwrap();
        let builder = QueryBuilder::new(
            Default::default(),
            fieldaudit_recon::config::FilterConfig {
                id_column: Some("number".into()),
                ..Default::default()
            },
        );
        let q = builder.build("invoice", "note", &FilterContext::default().with_document_id("F-18"));
        let row = store.fetch_one(&q).unwrap().unwrap();
        assert_eq!(row["note"].as_deref(), Some("late"));
    }

    #[test]
    fn unknown_column_is_a_schema_error() {
        let (_dir, path) = fixture();
        let mut store = SqliteStore::open(&path, None).unwrap();
        let err = store.fetch_one(&query("SELECT t.\"ghost\" FROM invoice t", &[])).unwrap_err();
        assert!(err.is_schema_error(), "{err}");
        let err = store.fetch_one(&query("SELECT x FROM nowhere", &[])).unwrap_err();
        assert!(err.is_schema_error(), "{err}");
    }

    #[test]
    fn store_is_read_only() {
        let (_dir, path) = fixture();
        let mut store = SqliteStore::open(&path, None).unwrap();
        let err = store
            .fetch_one(&query("DELETE FROM invoice RETURNING id", &[]))
            .unwrap_err();
        assert!(err.message.contains("readonly") || err.message.contains("read-only"), "{err}");
    }

    #[test]
    fn reset_and_reconnect_keep_working() {
        let (_dir, path) = fixture();
        let mut store = SqliteStore::open(&path, None).unwrap();
        let q = query("SELECT number FROM invoice WHERE id = 1", &[]);
        store.fetch_one(&q).unwrap();
        store.reset_cursor().unwrap();
        store.reconnect().unwrap();
        let row = store.fetch_one(&q).unwrap().unwrap();
        assert_eq!(row["number"].as_deref(), Some("F-17"));
    }

    #[test]
    fn missing_database_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        let err = SqliteStore::open(&dir.path().join("missing.db"), None).err().unwrap();
        assert!(matches!(err, IoError::Store { .. }));
    }
}

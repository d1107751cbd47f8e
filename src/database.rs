//! Procurement database access: SQLite behind an r2d2 pool.
//!
//! Every pooled connection starts as an empty in-memory database with the
//! procurement file attached under the configured schema alias, so the
//! generated `upeg.purchase_order_main.po_id` style references resolve.
//! The file is attached read-only unless configured otherwise.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, InterruptHandle};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::DatabaseConfig;
use crate::error::DatabaseError;
use crate::result_set::{parse_timestamp, ResultSet, Value};

#[derive(Clone)]
pub struct Database {
    pool:   Pool<SqliteConnectionManager>,
    schema: String,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").field("schema", &self.schema).finish()
    }
}

impl Database {
    /// Open a pool over an existing database file.
    pub fn open(cfg: &DatabaseConfig) -> Result<Self, DatabaseError> {
        Self::open_with(cfg, true)
    }

    /// Same as [`Database::open`], choosing whether the attachment is read-only.
    pub fn open_with(cfg: &DatabaseConfig, read_only: bool) -> Result<Self, DatabaseError> {
        if !is_identifier(&cfg.schema) {
            return Err(DatabaseError::Worker(format!("invalid schema alias: {:?}", cfg.schema)));
        }
        if !Path::new(&cfg.path).exists() {
            return Err(DatabaseError::Worker(format!("Database not found: {}", cfg.path)));
        }

        let target = if read_only {
            read_only_uri(&cfg.path)?
        } else {
            cfg.path.clone()
        };
        let schema = cfg.schema.clone();
        let manager = SqliteConnectionManager::memory().with_init(move |conn| {
            attach(conn, &target, &schema)
        });

        let pool = Pool::builder()
            .max_size(cfg.pool_size.max(1))
            .connection_timeout(Duration::from_secs(30))
            .build(manager)?;

        info!(
            path = %cfg.path,
            schema = %cfg.schema,
            pool_size = cfg.pool_size,
            read_only,
            "Procurement database pool ready"
        );

        Ok(Self { pool, schema: cfg.schema.clone() })
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, DatabaseError> {
        Ok(self.pool.get()?)
    }

    /// `CREATE` statements of the visible tables and views, for the model.
    /// An empty `tables` slice means every table in the schema.
    pub fn table_info(&self, tables: &[String]) -> Result<String, DatabaseError> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT name, sql FROM {}.sqlite_master \
             WHERE type IN ('table', 'view') AND sql IS NOT NULL ORDER BY name",
            self.schema
        );
        let mut stmt = conn.prepare(&sql)?;
        let ddl: Vec<String> = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .filter(|(name, _)| tables.is_empty() || tables.iter().any(|t| t == name))
            .map(|(_, sql)| sql)
            .collect();
        Ok(ddl.join("\n\n"))
    }

    /// Run one statement on a pooled connection and materialize every row.
    /// Blocking; use [`Database::execute`] from async code.
    pub fn execute_query(&self, sql: &str) -> Result<ResultSet, DatabaseError> {
        let conn = self.conn()?;
        materialize(&conn, sql)
    }

    /// Run [`Database::execute_query`] on the blocking thread pool.
    ///
    /// Dropping the returned future (a request deadline firing, say)
    /// interrupts the statement, so its pooled connection comes back as
    /// soon as SQLite notices instead of when the query would have finished.
    pub async fn execute(&self, sql: String) -> Result<ResultSet, DatabaseError> {
        let db = self.clone();
        let cancel = Arc::new(Mutex::new(Cancellation::default()));
        let _guard = InterruptOnDrop(cancel.clone());

        tokio::task::spawn_blocking(move || db.execute_cancellable(&sql, &cancel))
            .await
            .map_err(|e| DatabaseError::Worker(e.to_string()))?
    }

    fn execute_cancellable(
        &self,
        sql: &str,
        cancel: &Mutex<Cancellation>,
    ) -> Result<ResultSet, DatabaseError> {
        let conn = self.conn()?;
        {
            let mut state = lock(cancel);
            if state.cancelled {
                return Err(DatabaseError::Interrupted);
            }
            state.handle = Some(conn.get_interrupt_handle());
        }

        let result = materialize(&conn, sql);
        lock(cancel).handle = None;
        if result.is_err() && lock(cancel).cancelled {
            warn!("Statement interrupted after its caller gave up");
        }
        result
    }

    /// Async counterpart of [`Database::table_info`].
    pub async fn describe(&self, tables: Vec<String>) -> Result<String, DatabaseError> {
        let db = self.clone();
        tokio::task::spawn_blocking(move || db.table_info(&tables))
            .await
            .map_err(|e| DatabaseError::Worker(e.to_string()))?
    }
}

fn materialize(conn: &Connection, sql: &str) -> Result<ResultSet, DatabaseError> {
    let mut stmt = conn.prepare(sql)?;

    let columns: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
    let temporal: Vec<bool> = stmt
        .columns()
        .iter()
        .map(|c| c.decl_type().map(is_temporal_decl).unwrap_or(false))
        .collect();

    let mut rows = Vec::new();
    let mut cursor = stmt.query([])?;
    while let Some(row) = cursor.next()? {
        let mut values = Vec::with_capacity(columns.len());
        for (i, is_temporal) in temporal.iter().enumerate() {
            values.push(convert(row.get_ref(i)?, *is_temporal));
        }
        rows.push(values);
    }

    debug!(rows = rows.len(), columns = columns.len(), "Query materialized");
    Ok(ResultSet::new(columns, rows))
}

/// Shared between an awaiting request and the blocking worker running its
/// statement. `handle` is only set while the statement runs.
#[derive(Default)]
struct Cancellation {
    handle:    Option<InterruptHandle>,
    cancelled: bool,
}

struct InterruptOnDrop(Arc<Mutex<Cancellation>>);

impl Drop for InterruptOnDrop {
    fn drop(&mut self) {
        let mut state = lock(&self.0);
        state.cancelled = true;
        if let Some(handle) = state.handle.take() {
            handle.interrupt();
        }
    }
}

fn lock(cancel: &Mutex<Cancellation>) -> MutexGuard<'_, Cancellation> {
    cancel.lock().unwrap_or_else(|e| e.into_inner())
}

/// `file:` URI that opens `path` read-only; the path is percent-encoded.
fn read_only_uri(path: &str) -> Result<String, DatabaseError> {
    let absolute = std::fs::canonicalize(path)
        .map_err(|e| DatabaseError::Worker(format!("cannot resolve {}: {}", path, e)))?;
    let mut uri = Url::from_file_path(&absolute)
        .map_err(|_| DatabaseError::Worker(format!("cannot build file URI for {}", absolute.display())))?;
    uri.set_query(Some("mode=ro"));
    Ok(uri.to_string())
}

fn attach(conn: &mut Connection, target: &str, schema: &str) -> Result<(), rusqlite::Error> {
    conn.execute("ATTACH DATABASE ?1 AS ?2", params![target, schema])?;
    conn.busy_timeout(Duration::from_secs(5))?;
    Ok(())
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_temporal_decl(decl: &str) -> bool {
    let upper = decl.to_ascii_uppercase();
    upper.contains("DATE") || upper.contains("TIME")
}

fn convert(value: ValueRef<'_>, temporal: bool) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(n) => Value::Integer(n),
        ValueRef::Real(f) => Value::Real(f),
        ValueRef::Text(bytes) => {
            let text = String::from_utf8_lossy(bytes).into_owned();
            match temporal.then(|| parse_timestamp(&text)).flatten() {
                Some(ts) => Value::Timestamp(ts),
                None => Value::Text(text),
            }
        }
        ValueRef::Blob(_) => Value::Text("[BLOB]".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const LONG_RUNNING: &str = "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c WHERE x < 2000000000) \
                                SELECT count(*) AS n FROM c";

    fn seeded() -> (TempDir, DatabaseConfig) {
        seeded_at("procurement.db")
    }

    fn seeded_at(file_name: &str) -> (TempDir, DatabaseConfig) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(file_name);
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE purchase_order_main (
                 po_id TEXT PRIMARY KEY,
                 po_amount REAL,
                 created_date DATE,
                 buyer_name TEXT
             );
             CREATE TABLE vendor_notes (id INTEGER, note TEXT);
             INSERT INTO purchase_order_main VALUES
                 ('PO-1', 150000.5, '2024-03-01', 'Asha'),
                 ('PO-2', 90000, NULL, NULL);",
        )
        .unwrap();
        let cfg = DatabaseConfig {
            path: path.to_string_lossy().into_owned(),
            schema: "upeg".into(),
            included_tables: vec!["purchase_order_main".into()],
            pool_size: 2,
        };
        (dir, cfg)
    }

    #[test]
    fn qualified_names_resolve_through_attachment() {
        let (_dir, cfg) = seeded();
        let db = Database::open(&cfg).unwrap();
        let rs = db
            .execute_query(
                "SELECT upeg.purchase_order_main.po_id, upeg.purchase_order_main.po_amount \
                 FROM upeg.purchase_order_main ORDER BY 1",
            )
            .unwrap();
        assert_eq!(rs.columns, vec!["po_id", "po_amount"]);
        assert_eq!(rs.rows[0], vec![Value::Text("PO-1".into()), Value::Real(150000.5)]);
        assert_eq!(rs.len(), 2);
    }

    #[test]
    fn date_declared_columns_become_timestamps() {
        let (_dir, cfg) = seeded();
        let db = Database::open(&cfg).unwrap();
        let rs = db
            .execute_query("SELECT created_date FROM upeg.purchase_order_main ORDER BY po_id")
            .unwrap();
        assert!(matches!(rs.rows[0][0], Value::Timestamp(_)));
        assert_eq!(rs.rows[1][0], Value::Null);
    }

    #[test]
    fn attachment_is_read_only() {
        let (_dir, cfg) = seeded();
        let db = Database::open(&cfg).unwrap();
        assert!(db.execute_query("DELETE FROM upeg.purchase_order_main").is_err());
    }

    #[test]
    fn table_info_honours_included_tables() {
        let (_dir, cfg) = seeded();
        let db = Database::open(&cfg).unwrap();
        let ddl = db.table_info(&cfg.included_tables).unwrap();
        assert!(ddl.contains("CREATE TABLE purchase_order_main"));
        assert!(!ddl.contains("vendor_notes"));

        let all = db.table_info(&[]).unwrap();
        assert!(all.contains("vendor_notes"));
    }

    #[test]
    fn syntax_errors_surface_driver_message() {
        let (_dir, cfg) = seeded();
        let db = Database::open(&cfg).unwrap();
        let err = db.execute_query("SELEC nonsense").unwrap_err();
        assert!(err.to_string().contains("syntax error"), "{err}");
    }

    #[test]
    fn missing_file_and_bad_alias_are_rejected() {
        let (_dir, mut cfg) = seeded();
        cfg.schema = "up-eg".into();
        assert!(Database::open(&cfg).is_err());

        cfg.schema = "upeg".into();
        cfg.path = "/nonexistent/procurement.db".into();
        assert!(Database::open(&cfg).is_err());
    }

    #[tokio::test]
    async fn async_execute_runs_on_blocking_pool() {
        let (_dir, cfg) = seeded();
        let db = Database::open(&cfg).unwrap();
        let rs = db.execute("SELECT COUNT(*) AS n FROM upeg.purchase_order_main".into()).await.unwrap();
        assert_eq!(rs.rows[0][0], Value::Integer(2));
    }

    #[test]
    fn read_only_attach_handles_uri_special_characters() {
        let (_dir, cfg) = seeded_at("po #1?100%.db");
        let db = Database::open(&cfg).unwrap();
        let rs = db.execute_query("SELECT COUNT(*) FROM upeg.purchase_order_main").unwrap();
        assert_eq!(rs.rows[0][0], Value::Integer(2));
        assert!(db.execute_query("DELETE FROM upeg.purchase_order_main").is_err());
    }

    #[tokio::test]
    async fn dropped_execute_interrupts_and_frees_connection() {
        let (_dir, mut cfg) = seeded();
        cfg.pool_size = 1;
        let db = Database::open(&cfg).unwrap();

        let slow = tokio::time::timeout(Duration::from_millis(200), db.execute(LONG_RUNNING.into())).await;
        assert!(slow.is_err());

        let next = tokio::time::timeout(Duration::from_secs(5), db.execute("SELECT 1 AS n".into()))
            .await
            .expect("single pooled connection was not released")
            .unwrap();
        assert_eq!(next.rows[0][0], Value::Integer(1));
    }
}

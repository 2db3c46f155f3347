use crate::config::Config;
use crate::error::{MetricError, Result};
use crate::model::QueryResult;
use crate::util::ensure_parent_dir;
use log::debug;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug)]
struct ConnectionCustomizer;

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for ConnectionCustomizer {
    fn on_acquire(&self, conn: &mut Connection) -> std::result::Result<(), rusqlite::Error> {
        conn.busy_timeout(Duration::from_secs(30))?;
        Ok(())
    }

    fn on_release(&self, _conn: Connection) {}
}

/// Process-wide result cache keyed by the exact post-substitution SQL text.
/// Only successful reads are stored; any successful write clears everything.
pub struct QueryCache {
    entries: Mutex<HashMap<String, Arc<QueryResult>>>,
}

impl QueryCache {
    fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, sql: &str) -> Option<Arc<QueryResult>> {
        self.entries.lock().unwrap().get(sql).cloned()
    }

    pub fn put(&self, sql: String, result: Arc<QueryResult>) {
        self.entries.lock().unwrap().insert(sql, result);
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Resets the write-in-flight flag even if a write panics.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Cache-backed executor over one embedded SQLite file.
///
/// Writes are serialized behind an exclusive lock scoped to the whole
/// connect-execute-disconnect span; reads go through a read-only pool and
/// fail fast with [`MetricError::DatabaseBusy`] while a write is in flight
/// instead of queuing behind it. The store file is created lazily by the
/// first write; reads against a missing file fail with
/// [`MetricError::StoreNotInitialized`].
pub struct Database {
    db_path: PathBuf,
    write_lock: Mutex<()>,
    write_in_flight: AtomicBool,
    cache: QueryCache,
    read_pool: Mutex<Option<Pool<SqliteConnectionManager>>>,
}

impl Database {
    pub fn new(db_path: &Path) -> Self {
        Self {
            db_path: db_path.to_path_buf(),
            write_lock: Mutex::new(()),
            write_in_flight: AtomicBool::new(false),
            cache: QueryCache::new(),
            read_pool: Mutex::new(None),
        }
    }

    /// Get the database file path
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Execute a mutating statement or script. Exclusive: one writer at a
    /// time, and the whole result cache is cleared on success (any write may
    /// affect any cached read). On failure the cache is left untouched.
    pub fn execute_write(&self, sql: &str) -> Result<()> {
        if sql.trim().is_empty() {
            return Err(MetricError::InvalidArgument(
                "blank SQL passed to execute_write".to_string(),
            ));
        }
        let _guard = self.write_lock.lock().unwrap();
        let _in_flight = InFlight::raise(&self.write_in_flight);
        self.run_write(sql)?;
        self.cache.clear();
        Ok(())
    }

    fn run_write(&self, sql: &str) -> Result<()> {
        ensure_parent_dir(&self.db_path).map_err(|err| MetricError::Database(err.to_string()))?;
        let conn = Connection::open(&self.db_path)?;
        conn.busy_timeout(Duration::from_secs(30))?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;
        conn.execute_batch(sql)?;
        Ok(())
    }

    /// Execute a read query. Consults the cache by exact SQL text first; a
    /// hit never touches the store. On a miss, fails fast while a write is
    /// in flight, then materializes the full result set eagerly and caches
    /// it. Failed reads are not cached.
    pub fn execute_read(&self, sql: &str) -> Result<Arc<QueryResult>> {
        if sql.trim().is_empty() {
            return Err(MetricError::InvalidArgument(
                "blank SQL passed to execute_read".to_string(),
            ));
        }
        if let Some(hit) = self.cache.get(sql) {
            debug!("cache hit for read ({} rows)", hit.rows.len());
            return Ok(hit);
        }
        if self.write_in_flight.load(Ordering::SeqCst) {
            return Err(MetricError::DatabaseBusy);
        }
        if !self.db_path.exists() {
            return Err(MetricError::StoreNotInitialized(self.db_path.clone()));
        }
        let pool = self.read_pool()?;
        let conn = pool.get()?;
        let result = Arc::new(materialize(&conn, sql)?);
        self.cache.put(sql.to_string(), Arc::clone(&result));
        Ok(result)
    }

    fn read_pool(&self) -> Result<Pool<SqliteConnectionManager>> {
        let mut slot = self.read_pool.lock().unwrap();
        if let Some(pool) = slot.as_ref() {
            return Ok(pool.clone());
        }
        let config = Config::get();
        let manager = SqliteConnectionManager::file(&self.db_path)
            .with_flags(OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX);
        let pool = Pool::builder()
            .max_size(config.pool_size)
            .min_idle(Some(config.pool_min_idle))
            .connection_timeout(Duration::from_secs(30))
            .connection_customizer(Box::new(ConnectionCustomizer))
            .build(manager)
            .map_err(|err| MetricError::Database(err.to_string()))?;
        *slot = Some(pool.clone());
        Ok(pool)
    }

    #[cfg(test)]
    fn force_write_in_flight(&self, value: bool) {
        self.write_in_flight.store(value, Ordering::SeqCst);
    }
}

fn materialize(conn: &Connection, sql: &str) -> Result<QueryResult> {
    let mut stmt = conn.prepare(sql)?;
    let column_names: Vec<String> = stmt
        .column_names()
        .iter()
        .map(|name| name.to_string())
        .collect();
    let column_types: Vec<String> = stmt
        .columns()
        .iter()
        .map(|column| column.decl_type().unwrap_or("").to_string())
        .collect();
    let column_count = column_names.len();
    let mut rows = Vec::new();
    let mut raw = stmt.query([])?;
    while let Some(row) = raw.next()? {
        let mut values = Vec::with_capacity(column_count);
        for idx in 0..column_count {
            values.push(json_value(row.get_ref(idx)?));
        }
        rows.push(values);
    }
    Ok(QueryResult {
        column_names,
        column_types,
        rows,
    })
}

fn json_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(v) => Value::from(v),
        ValueRef::Real(v) => serde_json::Number::from_f64(v)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(v) => Value::String(String::from_utf8_lossy(v).into_owned()),
        ValueRef::Blob(v) => Value::String(v.iter().map(|b| format!("{b:02x}")).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_sql_is_rejected_before_any_connection() {
        let db = Database::new(Path::new("/nonexistent/never/created.sqlite"));
        assert!(matches!(
            db.execute_read(""),
            Err(MetricError::InvalidArgument(_))
        ));
        assert!(matches!(
            db.execute_write("  "),
            Err(MetricError::InvalidArgument(_))
        ));
        assert!(!Path::new("/nonexistent/never/created.sqlite").exists());
    }

    #[test]
    fn read_during_write_fails_fast() {
        let dir = tempfile::TempDir::new().unwrap();
        let db = Database::new(&dir.path().join("m.sqlite"));
        db.execute_write("CREATE TABLE t (n INTEGER)").unwrap();

        db.force_write_in_flight(true);
        assert!(matches!(
            db.execute_read("SELECT n FROM t"),
            Err(MetricError::DatabaseBusy)
        ));
        db.force_write_in_flight(false);
        assert!(db.execute_read("SELECT n FROM t").is_ok());
    }

    #[test]
    fn cached_read_is_served_even_while_write_in_flight() {
        let dir = tempfile::TempDir::new().unwrap();
        let db = Database::new(&dir.path().join("m.sqlite"));
        db.execute_write("CREATE TABLE t (n INTEGER); INSERT INTO t VALUES (7)")
            .unwrap();
        db.execute_read("SELECT n FROM t").unwrap();

        db.force_write_in_flight(true);
        let hit = db.execute_read("SELECT n FROM t").unwrap();
        assert_eq!(hit.rows[0][0], serde_json::json!(7));
    }

    #[test]
    fn read_before_first_write_reports_uninitialized_store() {
        let dir = tempfile::TempDir::new().unwrap();
        let db = Database::new(&dir.path().join("m.sqlite"));
        assert!(matches!(
            db.execute_read("SELECT 1"),
            Err(MetricError::StoreNotInitialized(_))
        ));
    }

    #[test]
    fn failed_read_is_not_cached() {
        let dir = tempfile::TempDir::new().unwrap();
        let db = Database::new(&dir.path().join("m.sqlite"));
        db.execute_write("CREATE TABLE t (n INTEGER)").unwrap();

        assert!(db.execute_read("SELECT n FROM missing").is_err());
        assert!(db.cache.is_empty());

        // Once the table appears the same SQL must succeed.
        db.execute_write("CREATE TABLE missing (n INTEGER); INSERT INTO missing VALUES (1)")
            .unwrap();
        let result = db.execute_read("SELECT n FROM missing").unwrap();
        assert_eq!(result.rows.len(), 1);
    }

    #[test]
    fn failed_write_leaves_cache_untouched() {
        let dir = tempfile::TempDir::new().unwrap();
        let db = Database::new(&dir.path().join("m.sqlite"));
        db.execute_write("CREATE TABLE t (n INTEGER); INSERT INTO t VALUES (1)")
            .unwrap();
        db.execute_read("SELECT n FROM t").unwrap();
        assert_eq!(db.cache.len(), 1);

        assert!(db.execute_write("INSERT INTO nowhere VALUES (1)").is_err());
        assert_eq!(db.cache.len(), 1);
    }
}

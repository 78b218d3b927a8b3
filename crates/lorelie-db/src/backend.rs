//! [`SqliteBackend`] -- the connection plus SQL-dialect helpers.
//!
//! One backend wraps one [`rusqlite::Connection`] behind a `Mutex`. Every
//! user-defined function is registered at open time so queries can rely on
//! `hash`, `regexp`, `variance` and friends being present. A process-wide
//! [`ConnectionRegistry`] memoises one backend per database name and exposes
//! the most recent one to subsystems that are handed no explicit context
//! (migrations, row saving).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, Weak};

use rusqlite::Connection;
use tracing::{debug, info};

use lorelie_core::literal::Literal;
use lorelie_core::sql;

use crate::error::{LorelieError, Result};
use crate::functions;
use crate::rows::Row;

/// Converts a raw SQLite value into a [`Literal`].
pub fn value_to_literal(value: rusqlite::types::Value) -> Literal {
    match value {
        rusqlite::types::Value::Null => Literal::Null,
        rusqlite::types::Value::Integer(i) => Literal::Int(i),
        rusqlite::types::Value::Real(f) => Literal::Float(f),
        rusqlite::types::Value::Text(s) => Literal::Text(s),
        rusqlite::types::Value::Blob(b) => Literal::Blob(b),
    }
}

/// The connection and dialect side of a database.
pub struct SqliteBackend {
    conn: Mutex<Connection>,
    /// Logical database name; `None` for in-memory databases.
    pub database_name: Option<String>,
    /// Physical path of the database file, when one exists.
    pub database_path: Option<PathBuf>,
    /// Emit executed statements through `tracing` when set.
    pub log_queries: bool,
}

impl SqliteBackend {
    /// Opens (or creates) a database file `<name>.sqlite` under `dir`, or an
    /// in-memory database when `name` is `None`. Registers every
    /// user-defined function and publishes the backend in the registry.
    pub fn open(name: Option<&str>, dir: &Path, log_queries: bool) -> Result<Arc<Self>> {
        let (conn, database_path) = match name {
            Some(name) => {
                let path = dir.join(format!("{name}.sqlite"));
                info!(?path, "opening sqlite database");
                let conn = Connection::open(&path).map_err(|e| {
                    LorelieError::Connection(format!("failed to open {}: {e}", path.display()))
                })?;
                (conn, Some(path))
            }
            None => {
                debug!("opening in-memory sqlite database");
                let conn = Connection::open_in_memory().map_err(|e| {
                    LorelieError::Connection(format!("failed to open in-memory db: {e}"))
                })?;
                (conn, None)
            }
        };

        functions::register_udfs(&conn)
            .map_err(|e| LorelieError::Connection(format!("failed to register functions: {e}")))?;

        let backend = Arc::new(Self {
            conn: Mutex::new(conn),
            database_name: name.map(str::to_string),
            database_path,
            log_queries,
        });
        connections().register(&backend);
        Ok(backend)
    }

    /// Opens an in-memory backend, useful in tests.
    pub fn in_memory() -> Result<Arc<Self>> {
        Self::open(None, Path::new("."), false)
    }

    /// The registry key for this backend.
    pub fn registry_name(&self) -> String {
        self.database_name
            .clone()
            .unwrap_or_else(|| ":memory:".to_string())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| LorelieError::Connection(format!("mutex poisoned: {e}")))
    }

    /// Executes a single statement. Statements that produce columns return
    /// their rows; anything else returns an empty set.
    pub fn execute(self: &Arc<Self>, sql: &str) -> Result<Vec<Row>> {
        if self.log_queries {
            debug!(sql, "executing statement");
        }
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        if stmt.column_count() == 0 {
            stmt.execute([])?;
            return Ok(Vec::new());
        }

        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let mut rows = stmt.query([])?;
        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(columns.len());
            for (i, column) in columns.iter().enumerate() {
                let value: rusqlite::types::Value = row.get(i)?;
                values.push((column.clone(), value_to_literal(value)));
            }
            result.push(Row::new(columns.clone(), values, Arc::downgrade(self)));
        }
        Ok(result)
    }

    /// Executes a write statement and returns the number of affected rows.
    pub fn execute_affected(&self, sql: &str) -> Result<usize> {
        if self.log_queries {
            debug!(sql, "executing statement");
        }
        let conn = self.lock()?;
        Ok(conn.execute(sql, [])?)
    }

    /// Runs several statements as one `begin … commit` script. Any error
    /// rolls the whole script back.
    pub fn execute_script<S: AsRef<str>>(&self, statements: &[S]) -> Result<()> {
        if statements.is_empty() {
            return Ok(());
        }
        let body = sql::build_script(statements.iter().map(|s| s.as_ref()));
        let script = format!("begin;\n{body}\ncommit;");
        if self.log_queries {
            debug!(script, "executing script");
        }
        let conn = self.lock()?;
        conn.execute_batch(&script)?;
        Ok(())
    }

    // -- Introspection -------------------------------------------------------

    /// Lists user tables from `sqlite_schema`, excluding internal
    /// `sqlite_%` entries.
    pub fn list_tables(&self) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "select name from sqlite_schema where type='table' and name not like 'sqlite_%'",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names)
    }

    /// Lists index names from `sqlite_master`.
    pub fn list_indexes(&self) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("select name from sqlite_master where type='index'")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names)
    }

    /// Lists the physical columns of a table via `pragma table_info`.
    pub fn list_table_columns(&self, table: &str) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!("pragma table_info({table})"))?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names)
    }

    // -- Row write-back ------------------------------------------------------

    /// Writes a row delta back as a targeted update.
    pub fn save_row(&self, table: &str, id: i64, delta: &[(String, Literal)]) -> Result<usize> {
        if delta.is_empty() {
            return Ok(0);
        }
        let assignments: Vec<String> = delta
            .iter()
            .map(|(column, value)| format!("{column}={}", value.quote()))
            .collect();
        let statement = format!(
            "update {table} set {} where id={id}",
            sql::comma_join(assignments)
        );
        self.execute_affected(&statement)
    }
}

impl std::fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend")
            .field("database_name", &self.database_name)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Connection registry
// ---------------------------------------------------------------------------

#[derive(Default)]
struct RegistryInner {
    pool: HashMap<String, Weak<SqliteBackend>>,
    last: Option<Weak<SqliteBackend>>,
}

/// Process-wide pool memoising one backend per database name.
#[derive(Default)]
pub struct ConnectionRegistry {
    inner: Mutex<RegistryInner>,
}

impl ConnectionRegistry {
    fn register(&self, backend: &Arc<SqliteBackend>) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner
            .pool
            .insert(backend.registry_name(), Arc::downgrade(backend));
        inner.last = Some(Arc::downgrade(backend));
    }

    /// Returns the backend registered under `name`.
    pub fn get(&self, name: &str) -> Result<Arc<SqliteBackend>> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner
            .pool
            .get(name)
            .and_then(Weak::upgrade)
            .ok_or(LorelieError::ConnectionExists)
    }

    /// Returns the most recently opened backend.
    pub fn last_connection(&self) -> Result<Arc<SqliteBackend>> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner
            .last
            .as_ref()
            .and_then(Weak::upgrade)
            .ok_or(LorelieError::ConnectionExists)
    }
}

/// The process-wide connection registry.
pub fn connections() -> &'static ConnectionRegistry {
    static REGISTRY: OnceLock<ConnectionRegistry> = OnceLock::new();
    REGISTRY.get_or_init(ConnectionRegistry::default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execute_returns_rows() {
        let backend = SqliteBackend::in_memory().unwrap();
        backend
            .execute_affected("create table items (id integer primary key autoincrement, name text)")
            .unwrap();
        backend
            .execute_affected("insert into items (name) values('Kendall')")
            .unwrap();

        let rows = backend.execute("select id, name from items").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].raw("name"), Some(&Literal::Text("Kendall".into())));
    }

    #[test]
    fn script_rolls_back_on_error() {
        let backend = SqliteBackend::in_memory().unwrap();
        backend
            .execute_affected("create table items (id integer primary key autoincrement, name text)")
            .unwrap();

        let result = backend.execute_script(&[
            "insert into items (name) values('a')",
            "insert into nowhere (name) values('b')",
        ]);
        assert!(result.is_err());

        let rows = backend.execute("select * from items").unwrap();
        assert!(rows.is_empty(), "failed script should leave no rows behind");
    }

    #[test]
    fn introspection_lists_tables_and_columns() {
        let backend = SqliteBackend::in_memory().unwrap();
        backend
            .execute_affected("create table celebrities (id integer primary key, name text)")
            .unwrap();

        let tables = backend.list_tables().unwrap();
        assert!(tables.contains(&"celebrities".to_string()));

        let columns = backend.list_table_columns("celebrities").unwrap();
        assert_eq!(columns, vec!["id", "name"]);
    }

    #[test]
    fn registered_functions_are_callable() {
        let backend = SqliteBackend::in_memory().unwrap();
        let rows = backend.execute("select hash('kendall') as h").unwrap();
        let digest = rows[0].raw("h").unwrap().as_text();
        assert_eq!(digest.len(), 32);

        let rows = backend
            .execute("select regexp('^ken', 'kendall') as matched")
            .unwrap();
        assert_eq!(rows[0].raw("matched"), Some(&Literal::Int(1)));
    }

    #[test]
    fn last_connection_is_tracked() {
        let backend = SqliteBackend::in_memory().unwrap();
        let last = connections().last_connection().unwrap();
        assert_eq!(last.registry_name(), backend.registry_name());
    }
}

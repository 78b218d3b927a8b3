//! Schema migrations: reconciling declared tables against the physical
//! database.
//!
//! One run walks `idle → introspected → reconciled → executed → migrated`.
//! `make_migrations` snapshots the declared schema into the JSON history
//! file; `migrate` introspects the database, creates missing tables, adds
//! missing columns, rebuilds indexes as one transactional script and records
//! the pending migration in the `lorelie_migrations` bookkeeping table.
//! Tables present in the database but no longer declared are collected but
//! deliberately not dropped.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use lorelie_core::fields::Field;
use lorelie_core::literal::Literal;
use lorelie_core::sql;

use crate::backend::SqliteBackend;
use crate::error::Result;
use crate::tables::Table;

/// Name of the JSON history file, written next to the database.
pub const MIGRATIONS_FILE: &str = "migrations.json";

/// Name of the bookkeeping table.
pub const MIGRATIONS_TABLE: &str = "lorelie_migrations";

/// One field of a table schema snapshot, `(name, parameter-list)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldSchema {
    pub name: String,
    pub params: Vec<String>,
}

/// The serialisable snapshot of one declared table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableSchema {
    pub name: String,
    pub fields: Vec<FieldSchema>,
    pub indexes: BTreeMap<String, Vec<String>>,
    pub constraints: BTreeMap<String, String>,
    pub ordering: Vec<String>,
    pub str_field: String,
}

impl TableSchema {
    pub fn from_table(table: &Table) -> Result<TableSchema> {
        let fields = table
            .fields()
            .iter()
            .map(|field| {
                let (name, params) = field.deconstruct();
                FieldSchema { name, params }
            })
            .collect();

        let mut indexes = BTreeMap::new();
        for index in &table.indexes {
            indexes.insert(index.index_name.clone(), index.fields.clone());
        }

        let mut constraints = BTreeMap::new();
        for constraint in &table.constraints {
            let (name, fragment) = constraint.deconstruct()?;
            constraints.insert(name, fragment);
        }

        Ok(TableSchema {
            name: table.name.clone(),
            fields,
            indexes,
            constraints,
            ordering: table.ordering.clone(),
            str_field: table.str_field.clone(),
        })
    }
}

/// One run of the history file: id, timestamp, monotonic number and the
/// declared table schemas.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MigrationFile {
    pub id: String,
    pub date: String,
    pub number: u64,
    pub tables: Vec<TableSchema>,
}

impl MigrationFile {
    fn blank() -> MigrationFile {
        MigrationFile {
            id: sql::token_hex(5),
            date: now_string(),
            number: 1,
            tables: Vec::new(),
        }
    }
}

fn now_string() -> String {
    chrono::Utc::now()
        .naive_utc()
        .format("%Y-%m-%d %H:%M:%S%.6f")
        .to_string()
}

/// Progress of one migration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationState {
    Idle,
    Introspected,
    Reconciled,
    Executed,
    Migrated,
}

/// Manages the states of a database schema: which tables exist, which need
/// creating or altering, and the persisted history of those decisions.
#[derive(Debug)]
pub struct Migrations {
    /// Path of the history file; `None` for in-memory databases, whose
    /// history lives only for the process lifetime.
    pub file: Option<PathBuf>,
    pub content: MigrationFile,
    pending: Option<MigrationFile>,
    pub state: MigrationState,
    /// Set once `migrate` completed; later calls become no-ops.
    pub migrated: bool,
    pub has_migrations: bool,
    pub tables_for_creation: BTreeSet<String>,
    /// Reserved: collected but not executed.
    pub tables_for_deletion: BTreeSet<String>,
}

impl Migrations {
    /// Loads (or creates) the migration file under `directory`. In-memory
    /// databases pass `None` and keep the history in memory only.
    pub fn new(directory: Option<&std::path::Path>) -> Result<Migrations> {
        let (file, content) = match directory {
            Some(directory) => {
                let path = directory.join(MIGRATIONS_FILE);
                let content = if path.exists() {
                    serde_json::from_str(&std::fs::read_to_string(&path)?)?
                } else {
                    let blank = MigrationFile::blank();
                    std::fs::write(&path, serde_json::to_string_pretty(&blank)?)?;
                    blank
                };
                (Some(path), content)
            }
            None => (None, MigrationFile::blank()),
        };

        Ok(Migrations {
            file,
            content,
            pending: None,
            state: MigrationState::Idle,
            migrated: false,
            has_migrations: false,
            tables_for_creation: BTreeSet::new(),
            tables_for_deletion: BTreeSet::new(),
        })
    }

    /// Snapshots the declared tables into a new pending migration and writes
    /// the history file.
    pub fn make_migrations(&mut self, tables: &[Table]) -> Result<()> {
        let schemas = tables
            .iter()
            .map(TableSchema::from_table)
            .collect::<Result<Vec<_>>>()?;

        let number = if self.content.tables.is_empty() {
            self.content.number
        } else {
            self.content.number + 1
        };
        let migration = MigrationFile {
            id: sql::token_hex(5),
            date: now_string(),
            number,
            tables: schemas,
        };

        if let Some(path) = &self.file {
            std::fs::write(path, serde_json::to_string_pretty(&migration)?)?;
        }
        self.content = migration.clone();
        self.pending = Some(migration);
        self.has_migrations = true;
        Ok(())
    }

    /// The declaration of the bookkeeping table.
    pub fn migrations_table() -> Result<Table> {
        Table::new(
            MIGRATIONS_TABLE,
            vec![
                Field::char("name").unique(),
                Field::char("table_name").null(),
                Field::json("migration"),
                Field::datetime("applied").null(),
            ],
        )
        .map(|table| table.with_str_field("name"))
    }

    /// Reconciles the declared tables against the physical schema and
    /// executes the minimum DDL. Idempotent: once migrated, later calls do
    /// nothing.
    pub fn migrate(&mut self, backend: &Arc<SqliteBackend>, tables: &mut [Table]) -> Result<()> {
        if self.migrated {
            debug!("already migrated, skipping");
            return Ok(());
        }

        // Introspection.
        let database_tables: BTreeSet<String> = backend.list_tables()?.into_iter().collect();
        let database_indexes = backend.list_indexes()?;
        self.state = MigrationState::Introspected;

        // Reconciliation.
        let declared: BTreeSet<String> = tables.iter().map(|t| t.name.clone()).collect();
        self.tables_for_creation = declared
            .difference(&database_tables)
            .cloned()
            .collect();
        self.tables_for_deletion = database_tables
            .difference(&declared)
            .filter(|name| name.as_str() != MIGRATIONS_TABLE)
            .cloned()
            .collect();

        let bookkeeping_missing = !database_tables.contains(MIGRATIONS_TABLE);
        self.state = MigrationState::Reconciled;

        // Table creation.
        for table in tables.iter_mut() {
            if self.tables_for_creation.contains(&table.name) {
                for statement in table.create_table_sql()? {
                    backend.execute_affected(&statement)?;
                }
                info!(table = %table.name, "created table");
                self.has_migrations = true;
            }
            table.is_prepared = true;
        }

        if bookkeeping_missing {
            let bookkeeping = Self::migrations_table()?;
            for statement in bookkeeping.create_table_sql()? {
                backend.execute_affected(&statement)?;
            }
        }

        // Existing tables: add missing columns. Dropped columns stay.
        for table in tables.iter() {
            if self.tables_for_creation.contains(&table.name) {
                continue;
            }
            let existing_columns = backend.list_table_columns(&table.name)?;
            for field in table.fields() {
                if !existing_columns.iter().any(|c| c == &field.name) {
                    for statement in table.add_column_sql(field) {
                        backend.execute_affected(&statement)?;
                    }
                    info!(table = %table.name, column = %field.name, "added column");
                    self.has_migrations = true;
                }
            }
        }

        // Indexes run as one transactional script: create the declared ones,
        // drop the obsolete ones. SQLite's own autoindexes are untouchable.
        let mut index_statements = Vec::new();
        let mut declared_indexes = BTreeSet::new();
        for table in tables.iter() {
            for index in &table.indexes {
                declared_indexes.insert(index.index_name.clone());
                index_statements.push(index.as_sql(table)?);
            }
        }
        for existing in &database_indexes {
            if declared_indexes.contains(existing) || existing.starts_with("sqlite_autoindex") {
                continue;
            }
            index_statements.push(format!("drop index if exists {existing}"));
        }
        backend.execute_script(&index_statements)?;
        self.state = MigrationState::Executed;

        // Record the run. A migrate without a prior make_migrations still
        // books the snapshot it just applied.
        if self.pending.is_none() && self.has_migrations {
            let schemas = tables
                .iter()
                .map(TableSchema::from_table)
                .collect::<Result<Vec<_>>>()?;
            self.pending = Some(MigrationFile {
                id: sql::token_hex(5),
                date: now_string(),
                number: self.content.number,
                tables: schemas,
            });
        }
        if let Some(pending) = self.pending.take() {
            let document = serde_json::to_string(&pending)?;
            let statement = format!(
                "insert into {MIGRATIONS_TABLE} (name, table_name, migration, applied) \
                 values({}, {}, {}, {})",
                Literal::Text(format!("mig_{}", sql::token_hex(5))).quote(),
                Literal::Null.quote(),
                Literal::Text(document).quote(),
                Literal::Text(now_string()).quote(),
            );
            backend.execute_affected(&statement)?;
        }

        self.migrated = true;
        self.state = MigrationState::Migrated;
        Ok(())
    }
}

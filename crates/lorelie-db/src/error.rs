//! Engine error types.

use lorelie_core::CoreError;

/// Errors raised by the database engine.
#[derive(Debug, thiserror::Error)]
pub enum LorelieError {
    /// A value failed a field's type, range or format rule, or an
    /// expression could not be lowered to SQL.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Reference to an unknown column.
    #[error("field with name \"{name}\" does not exist on {table}: {available}")]
    FieldExists {
        /// The unknown field name.
        name: String,
        /// The table that was searched.
        table: String,
        /// Comma-joined list of the fields the table does have.
        available: String,
    },

    /// Reference to an unknown table.
    #[error("table with name \"{name}\" does not exist in the database")]
    TableExists {
        /// The unknown table name.
        name: String,
    },

    /// An operation was attempted before `migrate()` was called.
    #[error(
        "no migrations exist for the database tables; \
         call migrate() before running query functions"
    )]
    MigrationsExists,

    /// An operation was run on a table with no backend attached.
    #[error("table '{table}' is used outside of a database: {message}")]
    ImproperlyConfigured {
        /// The unbound table.
        table: String,
        /// Why the configuration is invalid.
        message: String,
    },

    /// No connection was found in the process-wide pool.
    #[error("no existing connection was found in the connections pool")]
    ConnectionExists,

    /// Failed to establish or use a database connection.
    #[error("connection error: {0}")]
    Connection(String),

    /// A table was created without a database context when one was required.
    #[error("table '{table}' requires a database context")]
    NoDatabase {
        /// The orphaned table.
        table: String,
    },

    /// A refused operation, e.g. update/delete without a predicate or a
    /// `get` matching several rows.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Why the operation was refused.
        message: String,
    },

    /// A raw SQLite error, propagated unchanged.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON serialization/deserialization failed (migration file).
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Migration file could not be read or written.
    #[error("migration file error: {0}")]
    MigrationFile(#[from] std::io::Error),
}

/// Convenience alias used throughout the engine crate.
pub type Result<T> = std::result::Result<T, LorelieError>;

impl LorelieError {
    // -- Constructors --------------------------------------------------------

    /// Creates a [`LorelieError::FieldExists`] for the given field and table.
    pub fn field_exists(name: impl Into<String>, table: &str, available: &[String]) -> Self {
        Self::FieldExists {
            name: name.into(),
            table: table.to_string(),
            available: available.join(", "),
        }
    }

    /// Creates a [`LorelieError::InvalidOperation`] with the given message.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates a validation error (delegates to the core taxonomy).
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Core(CoreError::validation(message))
    }

    // -- Predicates ----------------------------------------------------------

    /// Returns `true` when the error is a field validation failure.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Core(e) if e.is_validation())
    }

    /// Returns `true` when the underlying SQLite error is a uniqueness or
    /// check constraint violation. Used by the get-or-create probe path.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            Self::Sqlite(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation
        )
    }
}

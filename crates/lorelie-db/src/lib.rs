//! An embeddable, file-or-memory SQLite object-relational query layer.
//!
//! Tables are declared as typed schemas, reconciled against the physical
//! database by the migration manager, and queried through a chainable, lazy
//! queryset API that compiles to SQL, executes on SQLite and reconstructs
//! native values from the underlying column types.
//!
//! ```no_run
//! use lorelie_core::fields::Field;
//! use lorelie_core::lit;
//! use lorelie_db::database::Database;
//! use lorelie_db::tables::Table;
//!
//! let table = Table::new("celebrities", vec![
//!     Field::char("name"),
//!     Field::integer("height").default(150).min_value(150),
//! ])?;
//! let mut db = Database::in_memory(vec![table])?;
//! db.migrate()?;
//!
//! db.objects().create("celebrities", [
//!     ("name", lit("Kendall")),
//!     ("height", lit(184)),
//! ])?;
//! let row = db.objects()
//!     .filter("celebrities", [("name", lit("Kendall"))])?
//!     .first()?
//!     .expect("just created");
//! assert_eq!(row.get("height").unwrap().as_int(), Some(184));
//! # Ok::<(), lorelie_db::error::LorelieError>(())
//! ```

pub mod backend;
pub mod database;
pub mod error;
pub mod functions;
pub mod indexes;
pub mod migrations;
pub mod nodes;
pub mod query;
pub mod queryset;
pub mod rows;
pub mod tables;
pub mod triggers;

pub use backend::{ConnectionRegistry, SqliteBackend, connections};
pub use database::{Database, Manager};
pub use error::{LorelieError, Result};
pub use functions::{Annotation, SqlFunction, Window, WindowFunction};
pub use indexes::Index;
pub use migrations::{MigrationFile, MigrationState, Migrations, TableSchema};
pub use nodes::{
    ComplexNode, DeleteNode, GroupByNode, HavingNode, InsertNode, IntersectNode, JoinNode, Node,
    OrderByNode, SelectMap, SelectNode, UpdateNode, ViewNode, WhereNode,
};
pub use query::Query;
pub use queryset::QuerySet;
pub use rows::Row;
pub use tables::{Column, Table};
pub use triggers::{TriggerContext, TriggerEvent, TriggerRegistry};

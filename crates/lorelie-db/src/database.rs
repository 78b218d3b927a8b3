//! [`Database`] -- the top-level façade owning the connection, the table
//! registry, the migration manager and the trigger registry.
//!
//! Queries go through the chainable manager, `db.objects()`:
//!
//! ```no_run
//! # use lorelie_db::database::Database;
//! # use lorelie_db::tables::Table;
//! # use lorelie_core::fields::Field;
//! # use lorelie_core::lit;
//! let table = Table::new("celebrities", vec![Field::char("name")])?;
//! let mut db = Database::in_memory(vec![table])?;
//! db.migrate()?;
//! db.objects().create("celebrities", [("name", lit("Kendall"))])?;
//! # Ok::<(), lorelie_db::error::LorelieError>(())
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use lorelie_core::expressions::Expr;
use lorelie_core::fields::NativeValue;
use lorelie_core::literal::Literal;

use crate::backend::SqliteBackend;
use crate::error::{LorelieError, Result};
use crate::functions::{Annotation, SqlFunction};
use crate::migrations::Migrations;
use crate::nodes::{
    DeleteNode, InsertNode, Node, OrderByNode, SelectNode, UpdateNode, ViewNode, WhereNode,
};
use crate::query::Query;
use crate::queryset::QuerySet;
use crate::rows::Row;
use crate::tables::Table;
use crate::triggers::{TriggerEvent, TriggerRegistry};

/// Links independent tables into one database and manages them through a
/// migration file.
pub struct Database {
    backend: Arc<SqliteBackend>,
    tables: Vec<Table>,
    pub migrations: Migrations,
    pub triggers: TriggerRegistry,
    pub log_queries: bool,
    name: Option<String>,
    directory: PathBuf,
}

impl Database {
    /// Opens a file-backed database `<name>.sqlite` under `directory` and
    /// binds every table to it.
    pub fn open(
        tables: Vec<Table>,
        name: &str,
        directory: impl AsRef<Path>,
        log_queries: bool,
    ) -> Result<Database> {
        Self::build(tables, Some(name), directory.as_ref(), log_queries)
    }

    /// Opens an in-memory database. The migration history stays in memory.
    pub fn in_memory(tables: Vec<Table>) -> Result<Database> {
        Self::build(tables, None, Path::new("."), false)
    }

    fn build(
        mut tables: Vec<Table>,
        name: Option<&str>,
        directory: &Path,
        log_queries: bool,
    ) -> Result<Database> {
        let backend = SqliteBackend::open(name, directory, log_queries)?;
        for table in &mut tables {
            table.bind(name);
        }
        let migrations = Migrations::new(name.map(|_| directory))?;

        Ok(Database {
            backend,
            tables,
            migrations,
            triggers: TriggerRegistry::default(),
            log_queries,
            name: name.map(str::to_string),
            directory: directory.to_path_buf(),
        })
    }

    /// `true` when no name was provided and the database lives in memory.
    pub fn is_in_memory(&self) -> bool {
        self.name.is_none()
    }

    /// `true` once `migrate()` ran.
    pub fn is_ready(&self) -> bool {
        self.migrations.migrated
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.iter().map(|t| t.name.clone()).collect()
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn backend(&self) -> &Arc<SqliteBackend> {
        &self.backend
    }

    /// Looks a declared table up by name.
    pub fn get_table(&self, name: &str) -> Result<&Table> {
        self.tables
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| LorelieError::TableExists {
                name: name.to_string(),
            })
    }

    /// Writes the declared schema into the migration history file.
    pub fn make_migrations(&mut self) -> Result<()> {
        self.migrations.make_migrations(&self.tables)
    }

    /// Applies the declared schema to the physical database.
    pub fn migrate(&mut self) -> Result<()> {
        self.migrations.migrate(&self.backend, &mut self.tables)
    }

    /// The chainable query manager.
    pub fn objects(&self) -> Manager<'_> {
        Manager { database: self }
    }

    /// Registers a trigger callback for an event, optionally scoped to one
    /// table. Unscoped triggers fire for every table.
    pub fn register_trigger(
        &mut self,
        event: TriggerEvent,
        table: Option<&str>,
        name: impl Into<String>,
        callback: impl Fn(&crate::triggers::TriggerContext<'_>) + Send + 'static,
    ) {
        self.triggers.register(event, table, name, callback);
    }

    /// Packs a queryset into a named view and returns a queryset reading
    /// from it.
    pub fn create_view(
        &self,
        name: &str,
        queryset: &QuerySet,
        temporary: bool,
    ) -> Result<QuerySet> {
        let mut inner = queryset.query.clone();
        let select_statement = inner.pre_sql_setup()?;

        let mut node = ViewNode::new(name, select_statement);
        if temporary {
            node = node.temporary();
        }
        let statement =
            lorelie_core::sql::finalize_sql(&lorelie_core::sql::simple_join(node.as_sql(), true));
        self.backend.execute_affected(&statement)?;
        debug!(view = name, "created view");

        let mut query = Query::new(self.backend.clone(), queryset.query.table.clone());
        query.alias_fields = queryset.query.alias_fields.clone();
        query.add_sql_node(Node::from(SelectNode::new(name)))?;
        Ok(QuerySet::new(query))
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.name)
            .field("tables", &self.table_names())
            .finish_non_exhaustive()
    }
}

/// Implements the query functionality for inserting, updating, deleting and
/// retrieving rows from the database tables.
pub struct Manager<'a> {
    database: &'a Database,
}

impl Manager<'_> {
    fn before_action(&self, table_name: &str) -> Result<&Table> {
        match self.database.tables.iter().find(|t| t.name == table_name) {
            Some(table) => {
                table.check_bound()?;
                Ok(table)
            }
            None if !self.database.migrations.migrated => Err(LorelieError::MigrationsExists),
            None => Err(LorelieError::TableExists {
                name: table_name.to_string(),
            }),
        }
    }

    fn base_query(&self, table: &Table) -> Query {
        Query::new(self.database.backend.clone(), Some(table.clone()))
    }

    /// The full table as a lazy queryset, with the declared default
    /// ordering applied.
    pub fn all(&self, table_name: &str) -> Result<QuerySet> {
        let table = self.before_action(table_name)?;
        let mut query = self.base_query(table);
        query.add_sql_node(Node::from(SelectNode::new(&table.name)))?;
        if !table.ordering.is_empty() {
            query.add_sql_node(Node::from(OrderByNode::new(&table.ordering)?))?;
        }
        Ok(QuerySet::new(query))
    }

    /// Filters with key/value criteria, `age__gt=20`.
    pub fn filter(
        &self,
        table_name: &str,
        pairs: impl IntoIterator<Item = (impl AsRef<str>, Literal)>,
    ) -> Result<QuerySet> {
        let table = self.before_action(table_name)?;
        let mut query = self.base_query(table);
        query.add_sql_node(Node::from(SelectNode::new(&table.name)))?;
        query.add_sql_node(Node::from(WhereNode::from_pairs(pairs)?))?;
        Ok(QuerySet::new(query))
    }

    /// Filters with a composed expression, `Q(..) | Q(..)`.
    pub fn filter_expr(&self, table_name: &str, expression: impl Into<Expr>) -> Result<QuerySet> {
        let table = self.before_action(table_name)?;
        let mut query = self.base_query(table);
        query.add_sql_node(Node::from(SelectNode::new(&table.name)))?;
        query.add_sql_node(Node::from(WhereNode::new().expr(expression)))?;
        Ok(QuerySet::new(query))
    }

    /// Returns exactly one row: `None` on zero hits, an error on several.
    pub fn get(
        &self,
        table_name: &str,
        pairs: impl IntoIterator<Item = (impl AsRef<str>, Literal)>,
    ) -> Result<Option<Row>> {
        self.all(table_name)?.get(pairs)
    }

    /// Creates a new row and returns it, fully materialised.
    pub fn create(
        &self,
        table_name: &str,
        values: impl IntoIterator<Item = (impl AsRef<str>, Literal)>,
    ) -> Result<Row> {
        let table = self.before_action(table_name)?;
        let pairs: Vec<(String, Literal)> = values
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_string(), v))
            .collect();
        let validated = self.prepare_insert_values(table, &pairs)?;

        self.database
            .triggers
            .run(TriggerEvent::BeforeCreate, &table.name, &validated);

        let node = InsertNode::single(&table.name, validated.clone(), table.field_names());
        let mut query = self.base_query(table);
        query.add_sql_node(Node::from(node))?;

        self.database
            .triggers
            .run(TriggerEvent::PreInit, &table.name, &validated);
        let rows = query.run()?;
        let row = rows.into_iter().next().ok_or_else(|| {
            LorelieError::invalid_operation("insert returned no row")
        })?;
        self.database
            .triggers
            .run(TriggerEvent::PostInit, &table.name, &validated);
        self.database
            .triggers
            .run(TriggerEvent::AfterCreate, &table.name, &validated);
        Ok(row)
    }

    /// Creates several rows in one statement and returns them.
    pub fn bulk_create(
        &self,
        table_name: &str,
        batches: Vec<Vec<(String, Literal)>>,
    ) -> Result<Vec<Row>> {
        let table = self.before_action(table_name)?;
        let mut validated_batches = Vec::with_capacity(batches.len());
        for batch in &batches {
            validated_batches.push(self.prepare_insert_values(table, batch)?);
        }

        let node = InsertNode::batch(&table.name, validated_batches, table.field_names());
        let mut query = self.base_query(table);
        query.add_sql_node(Node::from(node))?;
        query.run()
    }

    /// Fetches the row matching `pairs`, creating it (with `defaults`
    /// merged in) when absent. A uniqueness violation on the probe insert
    /// falls back to the read path.
    pub fn get_or_create(
        &self,
        table_name: &str,
        defaults: Vec<(String, Literal)>,
        pairs: Vec<(String, Literal)>,
    ) -> Result<Row> {
        if let Some(row) = self.get(table_name, pairs.clone())? {
            return Ok(row);
        }

        let mut values = pairs.clone();
        values.extend(defaults);
        match self.create(table_name, values) {
            Ok(row) => Ok(row),
            Err(error) if error.is_constraint_violation() => self
                .get(table_name, pairs)?
                .ok_or(error),
            Err(error) => Err(error),
        }
    }

    /// Updates the row matching `pairs` with `defaults`, creating it when
    /// absent.
    pub fn update_or_create(
        &self,
        table_name: &str,
        pairs: Vec<(String, Literal)>,
        defaults: Vec<(String, Literal)>,
    ) -> Result<Row> {
        match self.get(table_name, pairs.clone())? {
            Some(_) => {
                let mut queryset = self.filter(table_name, pairs.clone())?;
                queryset.update(defaults)?;
                self.get(table_name, pairs)?
                    .ok_or_else(|| LorelieError::invalid_operation("updated row disappeared"))
            }
            None => {
                let mut values = pairs;
                values.extend(defaults);
                self.create(table_name, values)
            }
        }
    }

    /// Updates rows matching the filters. Refused without a predicate.
    pub fn update(
        &self,
        table_name: &str,
        set_values: impl IntoIterator<Item = (impl AsRef<str>, Literal)>,
        filters: impl IntoIterator<Item = (impl AsRef<str>, Literal)>,
    ) -> Result<usize> {
        let table = self.before_action(table_name)?;
        let pairs: Vec<(String, Literal)> = set_values
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_string(), v))
            .collect();
        let validated = table.validate_values(&pairs)?;

        self.database
            .triggers
            .run(TriggerEvent::PreSave, &table.name, &validated);

        let node = UpdateNode::new(&table.name, validated.clone(), WhereNode::from_pairs(filters)?);
        let statement = lorelie_core::sql::finalize_sql(&lorelie_core::sql::simple_join(
            node.as_sql()?,
            true,
        ));
        let affected = self.database.backend.execute_affected(&statement)?;

        self.database
            .triggers
            .run(TriggerEvent::PostSave, &table.name, &validated);
        Ok(affected)
    }

    /// Deletes rows matching the filters. Refused without a predicate.
    pub fn delete(
        &self,
        table_name: &str,
        filters: impl IntoIterator<Item = (impl AsRef<str>, Literal)>,
    ) -> Result<usize> {
        let table = self.before_action(table_name)?;

        self.database
            .triggers
            .run(TriggerEvent::PreDelete, &table.name, &[]);

        let node = DeleteNode::new(&table.name, WhereNode::from_pairs(filters)?);
        let statement = lorelie_core::sql::finalize_sql(&lorelie_core::sql::simple_join(
            node.as_sql()?,
            true,
        ));
        let affected = self.database.backend.execute_affected(&statement)?;

        self.database
            .triggers
            .run(TriggerEvent::PostDelete, &table.name, &[]);
        Ok(affected)
    }

    /// Attaches aliased annotations (functions, windows, cases).
    pub fn annotate(
        &self,
        table_name: &str,
        annotations: impl IntoIterator<Item = (impl Into<String>, Annotation)>,
    ) -> Result<QuerySet> {
        self.all(table_name)?.annotate(annotations)
    }

    /// Rows as name→value maps.
    pub fn values(
        &self,
        table_name: &str,
        columns: &[&str],
    ) -> Result<Vec<BTreeMap<String, NativeValue>>> {
        self.all(table_name)?.values(columns)
    }

    /// The full set ordered by the given fields, `-field` descending.
    pub fn order_by(
        &self,
        table_name: &str,
        fields: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Result<QuerySet> {
        self.all(table_name)?.order_by(fields)
    }

    /// Distinct values of the given columns.
    pub fn distinct(
        &self,
        table_name: &str,
        columns: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<QuerySet> {
        Ok(self.all(table_name)?.distinct(columns))
    }

    /// Aggregate values computed in the database, keyed by
    /// `<field>__<function>` or the provided alias.
    pub fn aggregate(
        &self,
        table_name: &str,
        functions: impl IntoIterator<Item = (Option<String>, SqlFunction)>,
    ) -> Result<BTreeMap<String, NativeValue>> {
        self.all(table_name)?.aggregate(functions)
    }

    /// The number of rows in the table.
    pub fn count(&self, table_name: &str) -> Result<i64> {
        let result = self.aggregate(table_name, [(None, SqlFunction::Count("id".into()))])?;
        Ok(result
            .get("id__count")
            .and_then(NativeValue::as_int)
            .unwrap_or_default())
    }

    /// The first row by ascending id.
    pub fn first(&self, table_name: &str) -> Result<Option<Row>> {
        self.all(table_name)?.first()
    }

    /// The last row by descending id.
    pub fn last(&self, table_name: &str) -> Result<Option<Row>> {
        self.all(table_name)?.last()
    }

    fn prepare_insert_values(
        &self,
        table: &Table,
        pairs: &[(String, Literal)],
    ) -> Result<Vec<(String, Literal)>> {
        let mut validated = table.validate_values(pairs)?;

        // Fill declared defaults for omitted columns, then stamp auto-add
        // timestamp fields with the current moment.
        for field in table.fields() {
            if field.primary_key || validated.iter().any(|(name, _)| name == &field.name) {
                continue;
            }
            if let Some(default) = field.resolve_default() {
                let clean = field.to_database(&default).map_err(LorelieError::Core)?;
                validated.push((field.name.clone(), clean));
            }
        }
        for field_name in &table.auto_add_fields {
            if validated.iter().any(|(name, _)| name == field_name) {
                continue;
            }
            let now = chrono::Utc::now()
                .naive_utc()
                .format(lorelie_core::fields::DATETIME_FORMAT)
                .to_string();
            validated.push((field_name.clone(), Literal::Text(now)));
        }
        Ok(validated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lorelie_core::expressions::Q;
    use lorelie_core::fields::Field;
    use lorelie_core::lit;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn celebrities_db() -> Database {
        let table = Table::new(
            "celebrities",
            vec![
                Field::char("name"),
                Field::integer("height").default(150).min_value(150),
            ],
        )
        .unwrap();
        let mut db = Database::in_memory(vec![table]).unwrap();
        db.migrate().unwrap();
        db
    }

    #[test]
    fn create_and_read_back() {
        // In-memory table; create then filter and take the first row.
        let db = celebrities_db();
        db.objects()
            .create("celebrities", [("name", lit("Kendall")), ("height", lit(184))])
            .unwrap();

        let row = db
            .objects()
            .filter("celebrities", [("name", lit("Kendall"))])
            .unwrap()
            .first()
            .unwrap()
            .unwrap();
        assert_eq!(row.id(), Some(1));
        assert_eq!(row.get("name").unwrap().as_str(), Some("Kendall"));
        assert_eq!(row.get("height").unwrap().as_int(), Some(184));
    }

    #[test]
    fn create_applies_declared_default() {
        let db = celebrities_db();
        let row = db
            .objects()
            .create("celebrities", [("name", lit("Kylie"))])
            .unwrap();
        assert_eq!(row.get("height").unwrap().as_int(), Some(150));
    }

    #[test]
    fn create_runs_validators_before_sql() {
        let db = celebrities_db();
        let result = db
            .objects()
            .create("celebrities", [("name", lit("Tiny")), ("height", lit(120))]);
        assert!(result.unwrap_err().is_validation());
        assert_eq!(db.objects().count("celebrities").unwrap(), 0);
    }

    #[test]
    fn annotate_lower_names() {
        let db = celebrities_db();
        for name in ["Julie", "Pauline"] {
            db.objects()
                .create("celebrities", [("name", lit(name))])
                .unwrap();
        }

        let mut set = db
            .objects()
            .annotate(
                "celebrities",
                [("lower", Annotation::from(SqlFunction::Lower("name".into())))],
            )
            .unwrap();
        let values = set.values(&["lower"]).unwrap();
        assert_eq!(
            values,
            vec![
                BTreeMap::from([("lower".to_string(), NativeValue::Text("julie".into()))]),
                BTreeMap::from([("lower".to_string(), NativeValue::Text("pauline".into()))]),
            ]
        );
    }

    #[test]
    fn disjunction_keeps_insertion_order() {
        let db = celebrities_db();
        for name in ["Kendall", "Kylie", "Addison"] {
            db.objects()
                .create("celebrities", [("name", lit(name))])
                .unwrap();
        }

        let q = Q::filter("name", "Kendall") | Q::filter("name", "Kylie");
        let mut set = db.objects().filter_expr("celebrities", q).unwrap();
        let names: Vec<String> = set
            .iter()
            .unwrap()
            .map(|row| row.get("name").unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["Kendall", "Kylie"]);
    }

    #[test]
    fn aggregate_sum_and_avg() {
        let db = celebrities_db();
        for height in [180, 165, 170] {
            db.objects()
                .create("celebrities", [("name", lit("x")), ("height", lit(height))])
                .unwrap();
        }

        let result = db
            .objects()
            .aggregate(
                "celebrities",
                [
                    (None, SqlFunction::Sum("height".into())),
                    (None, SqlFunction::Avg("height".into())),
                ],
            )
            .unwrap();
        assert_eq!(
            result.get("height__sum").and_then(NativeValue::as_f64),
            Some(515.0)
        );
        let avg = result
            .get("height__avg")
            .and_then(NativeValue::as_f64)
            .unwrap();
        assert!((avg - 171.6666).abs() < 0.001);
    }

    #[test]
    fn update_without_predicate_is_refused() {
        let db = celebrities_db();
        db.objects()
            .create("celebrities", [("name", lit("Kendall"))])
            .unwrap();

        let empty: [(&str, Literal); 0] = [];
        let result = db
            .objects()
            .update("celebrities", [("height", lit(200))], empty);
        assert!(matches!(
            result.unwrap_err(),
            LorelieError::InvalidOperation { .. }
        ));
    }

    #[test]
    fn queryset_update_from_all_rewrites_every_row() {
        let db = celebrities_db();
        for name in ["Kendall", "Kylie"] {
            db.objects()
                .create("celebrities", [("name", lit(name))])
                .unwrap();
        }

        let mut set = db.objects().all("celebrities").unwrap();
        assert_eq!(set.update([("height", lit(200))]).unwrap(), 2);

        let mut set = db
            .objects()
            .filter("celebrities", [("height", lit(200))])
            .unwrap();
        assert_eq!(set.count().unwrap(), 2);
    }

    #[test]
    fn delete_without_predicate_is_refused() {
        let db = celebrities_db();
        let empty: [(&str, Literal); 0] = [];
        assert!(db.objects().delete("celebrities", empty).is_err());

        db.objects()
            .create("celebrities", [("name", lit("Kendall"))])
            .unwrap();
        let affected = db
            .objects()
            .delete("celebrities", [("name", lit("Kendall"))])
            .unwrap();
        assert_eq!(affected, 1);
    }

    #[test]
    fn unknown_table_errors_depend_on_migration_state() {
        let table = Table::new("celebrities", vec![Field::char("name")]).unwrap();
        let mut db = Database::in_memory(vec![table]).unwrap();

        assert!(matches!(
            db.objects().all("nowhere").unwrap_err(),
            LorelieError::MigrationsExists
        ));

        db.migrate().unwrap();
        assert!(matches!(
            db.objects().all("nowhere").unwrap_err(),
            LorelieError::TableExists { .. }
        ));
    }

    #[test]
    fn get_or_create_probes_then_reads() {
        let table = Table::new("celebrities", vec![Field::char("name").unique()]).unwrap();
        let mut db = Database::in_memory(vec![table]).unwrap();
        db.migrate().unwrap();

        let created = db
            .objects()
            .get_or_create(
                "celebrities",
                vec![],
                vec![("name".to_string(), lit("Kendall"))],
            )
            .unwrap();
        let fetched = db
            .objects()
            .get_or_create(
                "celebrities",
                vec![],
                vec![("name".to_string(), lit("Kendall"))],
            )
            .unwrap();
        assert_eq!(created.id(), fetched.id());
        assert_eq!(db.objects().count("celebrities").unwrap(), 1);
    }

    #[test]
    fn update_or_create_switches_paths() {
        let db = celebrities_db();

        let created = db
            .objects()
            .update_or_create(
                "celebrities",
                vec![("name".to_string(), lit("Kendall"))],
                vec![("height".to_string(), lit(184))],
            )
            .unwrap();
        assert_eq!(created.get("height").unwrap().as_int(), Some(184));

        let updated = db
            .objects()
            .update_or_create(
                "celebrities",
                vec![("name".to_string(), lit("Kendall"))],
                vec![("height".to_string(), lit(200))],
            )
            .unwrap();
        assert_eq!(updated.get("height").unwrap().as_int(), Some(200));
        assert_eq!(db.objects().count("celebrities").unwrap(), 1);
    }

    #[test]
    fn bulk_create_returns_rows() {
        let db = celebrities_db();
        let rows = db
            .objects()
            .bulk_create(
                "celebrities",
                vec![
                    vec![("name".to_string(), lit("Kendall"))],
                    vec![("name".to_string(), lit("Kylie"))],
                ],
            )
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(db.objects().count("celebrities").unwrap(), 2);
    }

    #[test]
    fn first_and_last() {
        let db = celebrities_db();
        for name in ["Kendall", "Kylie"] {
            db.objects()
                .create("celebrities", [("name", lit(name))])
                .unwrap();
        }
        let first = db.objects().first("celebrities").unwrap().unwrap();
        let last = db.objects().last("celebrities").unwrap().unwrap();
        assert_eq!(first.get("name").unwrap().as_str(), Some("Kendall"));
        assert_eq!(last.get("name").unwrap().as_str(), Some("Kylie"));
    }

    #[test]
    fn triggers_fire_around_creation() {
        static CREATED: AtomicUsize = AtomicUsize::new(0);

        let table = Table::new("celebrities", vec![Field::char("name")]).unwrap();
        let mut db = Database::in_memory(vec![table]).unwrap();
        db.migrate().unwrap();
        db.register_trigger(
            TriggerEvent::AfterCreate,
            Some("celebrities"),
            "count_created",
            |ctx| {
                assert_eq!(ctx.table, "celebrities");
                CREATED.fetch_add(1, Ordering::SeqCst);
            },
        );

        db.objects()
            .create("celebrities", [("name", lit("Kendall"))])
            .unwrap();
        assert_eq!(CREATED.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn view_packs_a_queryset() {
        let db = celebrities_db();
        for (name, height) in [("Kendall", 184), ("Addison", 165)] {
            db.objects()
                .create("celebrities", [("name", lit(name)), ("height", lit(height))])
                .unwrap();
        }

        let tall = db
            .objects()
            .filter("celebrities", [("height__gte", lit(180))])
            .unwrap();
        let mut view_set = db.create_view("tall_celebrities", &tall, false).unwrap();
        assert_eq!(view_set.count().unwrap(), 1);
        assert_eq!(
            view_set.at(0).unwrap().unwrap().get("name").unwrap().as_str(),
            Some("Kendall")
        );
    }

    #[test]
    fn annotate_extracts_date_parts() {
        let table = Table::new(
            "articles",
            vec![Field::char("title"), Field::date("published_on")],
        )
        .unwrap();
        let mut db = Database::in_memory(vec![table]).unwrap();
        db.migrate().unwrap();
        db.objects()
            .create(
                "articles",
                [("title", lit("launch")), ("published_on", lit("1995-11-03"))],
            )
            .unwrap();

        let mut set = db
            .objects()
            .annotate(
                "articles",
                [
                    ("year", Annotation::from(SqlFunction::ExtractYear("published_on".into()))),
                    ("month", Annotation::from(SqlFunction::ExtractMonth("published_on".into()))),
                ],
            )
            .unwrap();
        let row = set.at(0).unwrap().unwrap();
        assert_eq!(row.get("year").unwrap().as_int(), Some(1995));
        assert_eq!(row.get("month").unwrap().as_int(), Some(11));
    }

    #[test]
    fn annotate_hash_functions() {
        let db = celebrities_db();
        db.objects()
            .create("celebrities", [("name", lit("Kendall"))])
            .unwrap();

        let mut set = db
            .objects()
            .annotate(
                "celebrities",
                [
                    ("hashed", Annotation::from(SqlFunction::Md5Hash("name".into()))),
                    ("digest", Annotation::from(SqlFunction::Sha256Hash("name".into()))),
                ],
            )
            .unwrap();
        let row = set.at(0).unwrap().unwrap();
        let md5 = row.raw("hashed").unwrap().as_text();
        let sha256 = row.raw("digest").unwrap().as_text();
        assert_eq!(md5.len(), 32);
        assert_eq!(sha256.len(), 64);
        assert!(md5.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn aggregate_registered_spread_functions() {
        let db = celebrities_db();
        for height in [180, 165, 170] {
            db.objects()
                .create("celebrities", [("name", lit("x")), ("height", lit(height))])
                .unwrap();
        }

        let result = db
            .objects()
            .aggregate(
                "celebrities",
                [
                    (None, SqlFunction::Variance("height".into())),
                    (None, SqlFunction::StDev("height".into())),
                ],
            )
            .unwrap();
        let variance = result
            .get("height__variance")
            .and_then(NativeValue::as_f64)
            .unwrap();
        let stdev = result
            .get("height__stdev")
            .and_then(NativeValue::as_f64)
            .unwrap();
        assert!((variance - 38.888).abs() < 0.01);
        assert!((stdev - variance.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn filter_with_string_and_triple_encodings() {
        let db = celebrities_db();
        for (name, height) in [("Kendall", 184), ("Addison", 165)] {
            db.objects()
                .create("celebrities", [("name", lit(name)), ("height", lit(height))])
                .unwrap();
        }

        let q = Q::from_expression("height__gte=180").unwrap();
        let mut set = db.objects().filter_expr("celebrities", q).unwrap();
        assert_eq!(set.count().unwrap(), 1);

        let q = Q::from_triples([("height", "<", lit(180))]).unwrap();
        let mut set = db.objects().filter_expr("celebrities", q).unwrap();
        assert_eq!(set.count().unwrap(), 1);
    }

    #[test]
    fn default_table_ordering_applies_to_all() {
        let table = Table::new("celebrities", vec![Field::char("name")])
            .unwrap()
            .with_ordering(["-name"]);
        let mut db = Database::in_memory(vec![table]).unwrap();
        db.migrate().unwrap();
        for name in ["Addison", "Kylie", "Kendall"] {
            db.objects()
                .create("celebrities", [("name", lit(name))])
                .unwrap();
        }

        let mut set = db.objects().all("celebrities").unwrap();
        let names: Vec<String> = set
            .iter()
            .unwrap()
            .map(|row| row.get("name").unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["Kylie", "Kendall", "Addison"]);
    }

    #[test]
    fn file_backed_database_writes_migration_history() {
        let dir = tempfile::tempdir().unwrap();
        let table = Table::new("celebrities", vec![Field::char("name")]).unwrap();
        let mut db =
            Database::open(vec![table], "celebs", dir.path(), false).unwrap();
        db.make_migrations().unwrap();
        db.migrate().unwrap();

        assert!(dir.path().join("celebs.sqlite").exists());
        assert!(dir.path().join("migrations.json").exists());
        assert!(db.is_ready());
    }
}

//! [`Query`] -- one SQL statement (or script) and its execution.

use std::sync::Arc;

use tracing::debug;

use lorelie_core::fields::AliasField;
use lorelie_core::sql;

use crate::backend::SqliteBackend;
use crate::error::{LorelieError, Result};
use crate::nodes::{Node, SelectMap};
use crate::rows::Row;
use crate::tables::Table;

/// Checks that a statement is complete: it ends with `;` and has no
/// dangling string literal.
pub fn is_complete_statement(statement: &str) -> bool {
    let trimmed = statement.trim_end();
    if !trimmed.ends_with(';') {
        return false;
    }
    let mut in_string = false;
    for c in trimmed.chars() {
        if c == '\'' {
            in_string = !in_string;
        }
    }
    !in_string
}

/// An SQL statement under construction, executed on demand.
///
/// Nodes with a select slot land in the [`SelectMap`] and resolve in
/// canonical order; everything else concatenates in insertion order.
#[derive(Debug, Clone)]
pub struct Query {
    backend: Arc<SqliteBackend>,
    pub table: Option<Table>,
    statements: Vec<Node>,
    pub select_map: SelectMap,
    /// Columns that carry an annotation alias; their values are inferred
    /// instead of running through a declared field.
    pub alias_fields: Vec<String>,
    /// The final statement text, available after execution.
    pub sql: Option<String>,
}

impl Query {
    pub fn new(backend: Arc<SqliteBackend>, table: Option<Table>) -> Query {
        Query {
            backend,
            table,
            statements: Vec::new(),
            select_map: SelectMap::default(),
            alias_fields: Vec::new(),
            sql: None,
        }
    }

    pub fn backend(&self) -> &Arc<SqliteBackend> {
        &self.backend
    }

    /// Adds a node, routing select-slot kinds into the map.
    pub fn add_sql_node(&mut self, node: Node) -> Result<()> {
        match &node {
            Node::Select(_)
            | Node::Join(_)
            | Node::Where(_)
            | Node::GroupBy(_)
            | Node::Having(_)
            | Node::OrderBy(_) => self.select_map.insert(node),
            _ => {
                self.statements.push(node);
                Ok(())
            }
        }
    }

    pub fn add_sql_nodes(&mut self, nodes: impl IntoIterator<Item = Node>) -> Result<()> {
        for node in nodes {
            self.add_sql_node(node)?;
        }
        Ok(())
    }

    /// Joins the fragments, appends `;` and validates completeness.
    pub fn pre_sql_setup(&mut self) -> Result<String> {
        let mut fragments = Vec::new();
        if self.select_map.should_resolve() {
            fragments.extend(self.select_map.resolve()?);
        } else {
            for node in &self.statements {
                fragments.extend(node.as_sql()?);
            }
        }

        let statement = sql::finalize_sql(&sql::simple_join(fragments, true));
        if !is_complete_statement(&statement) {
            return Err(LorelieError::invalid_operation(format!(
                "statement is not complete: {statement}"
            )));
        }
        self.sql = Some(statement.clone());
        Ok(statement)
    }

    /// Executes the statement and materialises typed rows.
    pub fn run(&mut self) -> Result<Vec<Row>> {
        let statement = self.pre_sql_setup()?;
        debug!(sql = %statement, "running query");
        let mut rows = self.backend.execute(&statement)?;
        self.transform_to_python(&mut rows)?;
        Ok(rows)
    }

    /// Executes a transactional script (`begin … commit`).
    pub fn run_script(backend: &SqliteBackend, statements: &[String]) -> Result<()> {
        backend.execute_script(statements)
    }

    /// Passes every column of every row through the owning field's
    /// `to_python`; alias columns infer their type from the runtime value.
    fn transform_to_python(&self, rows: &mut [Row]) -> Result<()> {
        let Some(table) = &self.table else {
            return Ok(());
        };
        for row in rows.iter_mut() {
            row.set_table(&table.name);
            for column in row.columns().to_vec() {
                let Some(raw) = row.raw(&column).cloned() else {
                    continue;
                };
                if self.alias_fields.contains(&column) || !table.has_field(&column) {
                    let value = AliasField::new(&column).infer(&raw);
                    row.set_native(&column, value);
                    continue;
                }
                let field = table.get_field(&column)?;
                let value = field.to_python(&raw).map_err(LorelieError::Core)?;
                row.set_native(&column, value);
            }
        }
        Ok(())
    }
}

//! Materialised rows.
//!
//! A [`Row`] is a snapshot of one record: ordered column names mapped to
//! native values, plus a delta of pending changes. Mutations accumulate in
//! the delta and `save()` writes them back as one targeted update through
//! the connection the row came from.

use std::collections::HashMap;
use std::sync::Weak;

use lorelie_core::fields::{AliasField, NativeValue};
use lorelie_core::literal::Literal;

use crate::backend::SqliteBackend;
use crate::error::{LorelieError, Result};

/// A single record read from the database.
#[derive(Debug, Clone)]
pub struct Row {
    columns: Vec<String>,
    raw: HashMap<String, Literal>,
    values: HashMap<String, NativeValue>,
    delta: Vec<(String, Literal)>,
    /// The table the row belongs to, when known.
    pub table_name: Option<String>,
    backend: Weak<SqliteBackend>,
}

impl Row {
    /// Builds a row from the cursor description: column names zipped with
    /// their raw values. Values start out inferred; the query layer replaces
    /// them with field-coerced natives.
    pub(crate) fn new(
        columns: Vec<String>,
        raw_values: Vec<(String, Literal)>,
        backend: Weak<SqliteBackend>,
    ) -> Row {
        let mut values = HashMap::with_capacity(raw_values.len());
        for (name, raw) in &raw_values {
            values.insert(name.clone(), AliasField::new(name).infer(raw));
        }
        Row {
            columns,
            raw: raw_values.into_iter().collect(),
            values,
            delta: Vec::new(),
            table_name: None,
            backend,
        }
    }

    /// The column names, in cursor order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// The native value of a column.
    pub fn get(&self, name: &str) -> Option<&NativeValue> {
        self.values.get(name)
    }

    /// The raw column value as it came from the database.
    pub fn raw(&self, name: &str) -> Option<&Literal> {
        self.raw.get(name)
    }

    /// The row identity.
    pub fn id(&self) -> Option<i64> {
        self.values.get("id").and_then(NativeValue::as_int)
    }

    /// Replaces a column with its field-coerced native value.
    pub(crate) fn set_native(&mut self, name: &str, value: NativeValue) {
        self.values.insert(name.to_string(), value);
    }

    pub(crate) fn set_table(&mut self, table_name: &str) {
        self.table_name = Some(table_name.to_string());
    }

    /// Stages a change; nothing is written until [`Row::save`].
    pub fn set(&mut self, name: &str, value: impl Into<Literal>) {
        let literal = value.into();
        self.values
            .insert(name.to_string(), AliasField::new(name).infer(&literal));
        self.delta.retain(|(column, _)| column != name);
        self.delta.push((name.to_string(), literal));
    }

    /// Returns `true` when changes are staged for update.
    pub fn is_marked_for_update(&self) -> bool {
        !self.delta.is_empty()
    }

    /// Writes staged changes back as `update … where id=<id>`.
    pub fn save(&mut self) -> Result<usize> {
        if self.delta.is_empty() {
            return Ok(0);
        }
        let backend = self
            .backend
            .upgrade()
            .ok_or(LorelieError::ConnectionExists)?;
        let table = self.table_name.clone().ok_or_else(|| {
            LorelieError::invalid_operation("row is not attached to a table")
        })?;
        let id = self
            .id()
            .ok_or_else(|| LorelieError::invalid_operation("row has no id column"))?;

        let affected = backend.save_row(&table, id, &self.delta)?;
        self.delta.clear();
        Ok(affected)
    }

    /// Returns `true` when any column holds the given value.
    pub fn contains_value(&self, value: &NativeValue) -> bool {
        self.values.values().any(|v| v == value)
    }
}

impl std::fmt::Display for Row {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.id() {
            Some(id) => write!(f, "<id: {id}>"),
            None => write!(f, "<id: ?>"),
        }
    }
}

impl PartialEq<NativeValue> for Row {
    fn eq(&self, other: &NativeValue) -> bool {
        self.contains_value(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SqliteBackend;
    use std::sync::Arc;

    fn sample_row(backend: &Arc<SqliteBackend>) -> Row {
        Row::new(
            vec!["id".to_string(), "name".to_string()],
            vec![
                ("id".to_string(), Literal::Int(1)),
                ("name".to_string(), Literal::Text("Kendall".into())),
            ],
            Arc::downgrade(backend),
        )
    }

    #[test]
    fn access_by_name() {
        let backend = SqliteBackend::in_memory().unwrap();
        let row = sample_row(&backend);
        assert_eq!(row.id(), Some(1));
        assert_eq!(
            row.get("name"),
            Some(&NativeValue::Text("Kendall".to_string()))
        );
        assert_eq!(row.get("missing"), None);
    }

    #[test]
    fn membership_equality() {
        let backend = SqliteBackend::in_memory().unwrap();
        let row = sample_row(&backend);
        assert!(row.contains_value(&NativeValue::Text("Kendall".to_string())));
        assert!(!row.contains_value(&NativeValue::Text("Kylie".to_string())));
    }

    #[test]
    fn save_writes_delta_back() {
        let backend = SqliteBackend::in_memory().unwrap();
        backend
            .execute_affected(
                "create table celebrities (id integer primary key autoincrement, name text)",
            )
            .unwrap();
        backend
            .execute_affected("insert into celebrities (name) values('Kendall')")
            .unwrap();

        let mut rows = backend.execute("select id, name from celebrities").unwrap();
        let row = &mut rows[0];
        row.set_table("celebrities");
        assert!(!row.is_marked_for_update());

        row.set("name", "Kylie");
        assert!(row.is_marked_for_update());
        assert_eq!(row.save().unwrap(), 1);
        assert!(!row.is_marked_for_update());

        let rows = backend.execute("select name from celebrities").unwrap();
        assert_eq!(rows[0].raw("name"), Some(&Literal::Text("Kylie".into())));
    }

    #[test]
    fn save_without_table_is_refused() {
        let backend = SqliteBackend::in_memory().unwrap();
        let mut row = sample_row(&backend);
        row.set("name", "Kylie");
        assert!(row.save().is_err());
    }
}

//! [`QuerySet`] -- a lazy, chainable result set backed by a [`Query`].
//!
//! Chain operations mutate the underlying select map; nothing touches the
//! database until the rows are needed (iteration, `count`, `values`, …).
//! Once evaluated the rows are cached and aggregate fallbacks run locally.

use std::collections::BTreeMap;

use lorelie_core::expressions::{Expr, Q};
use lorelie_core::fields::NativeValue;
use lorelie_core::literal::Literal;

use crate::error::{LorelieError, Result};
use crate::functions::{Annotation, SqlFunction};
use crate::nodes::{Node, OrderByNode, SelectNode, UpdateNode, WhereNode};
use crate::query::Query;
use crate::rows::Row;

/// A lazy result set.
#[derive(Debug, Clone)]
pub struct QuerySet {
    pub query: Query,
    cache: Option<Vec<Row>>,
}

impl QuerySet {
    pub fn new(query: Query) -> QuerySet {
        QuerySet { query, cache: None }
    }

    /// The SQL of the last execution, if any.
    pub fn sql_statement(&self) -> Option<&str> {
        self.query.sql.as_deref()
    }

    /// Returns `true` once the rows are materialised.
    pub fn is_evaluated(&self) -> bool {
        self.cache.is_some()
    }

    /// Runs the query on first access and caches the rows.
    pub fn load(&mut self) -> Result<&[Row]> {
        if self.cache.is_none() {
            let rows = self.query.run()?;
            self.cache = Some(rows);
        }
        Ok(self.cache.as_deref().unwrap_or_default())
    }

    /// Iterates the materialised rows.
    pub fn iter(&mut self) -> Result<std::slice::Iter<'_, Row>> {
        Ok(self.load()?.iter())
    }

    /// The row at `index`, if any.
    pub fn at(&mut self, index: usize) -> Result<Option<Row>> {
        Ok(self.load()?.get(index).cloned())
    }

    /// The number of rows.
    pub fn count(&mut self) -> Result<usize> {
        Ok(self.load()?.len())
    }

    fn invalidate(&mut self) {
        self.cache = None;
    }

    // -- Chain operations ----------------------------------------------------

    /// The full set; a no-op kept for call-site symmetry.
    pub fn all(self) -> QuerySet {
        self
    }

    /// Merges key/value filters into the existing where clause, or installs
    /// a new one.
    pub fn filter(
        mut self,
        pairs: impl IntoIterator<Item = (impl AsRef<str>, Literal)>,
    ) -> Result<QuerySet> {
        let node = match self.query.select_map.where_node.take() {
            Some(mut existing) => {
                existing.and_filters(pairs)?;
                existing
            }
            None => WhereNode::from_pairs(pairs)?,
        };
        self.query.select_map.where_node = Some(node);
        self.invalidate();
        Ok(self)
    }

    /// Merges an expression (`Q`, combined, negated) into the where clause.
    pub fn filter_expr(mut self, expression: impl Into<Expr>) -> Result<QuerySet> {
        let node = match self.query.select_map.where_node.take() {
            Some(mut existing) => {
                existing.and_expr(expression);
                existing
            }
            None => WhereNode::new().expr(expression),
        };
        self.query.select_map.where_node = Some(node);
        self.invalidate();
        Ok(self)
    }

    /// Excludes rows matching the filters (negated where clause).
    pub fn exclude(
        self,
        pairs: impl IntoIterator<Item = (impl AsRef<str>, Literal)>,
    ) -> Result<QuerySet> {
        let mut q = Q::default();
        for (key, value) in pairs {
            q = q.and_filter(key.as_ref(), value);
        }
        self.filter_expr(!q)
    }

    /// Returns exactly one row: `None` on zero hits, an error on several.
    pub fn get(
        self,
        pairs: impl IntoIterator<Item = (impl AsRef<str>, Literal)>,
    ) -> Result<Option<Row>> {
        let mut queryset = self.filter(pairs)?;
        let rows = queryset.load()?;
        if rows.len() > 1 {
            return Err(LorelieError::invalid_operation(
                "get returned more than one value",
            ));
        }
        Ok(rows.first().cloned())
    }

    /// Installs or combines an ordering; a leading `-` marks descending.
    pub fn order_by(
        mut self,
        fields: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Result<QuerySet> {
        self.query
            .select_map
            .add_ordering(OrderByNode::new(fields)?)?;
        self.invalidate();
        Ok(self)
    }

    /// The first row by ascending `id`.
    pub fn first(mut self) -> Result<Option<Row>> {
        self.query.select_map.limit = Some(1);
        self.query.select_map.order_by = Some(OrderByNode::new(["id"])?);
        self.invalidate();
        Ok(self.load()?.first().cloned())
    }

    /// The last row, i.e. the first by descending `id`.
    pub fn last(mut self) -> Result<Option<Row>> {
        self.query.select_map.limit = Some(1);
        self.query.select_map.order_by = Some(OrderByNode::new(["-id"])?);
        self.invalidate();
        Ok(self.load()?.first().cloned())
    }

    /// Restricts the select to distinct values of the given columns.
    pub fn distinct(
        mut self,
        columns: impl IntoIterator<Item = impl Into<String>>,
    ) -> QuerySet {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        if let Some(select) = self.query.select_map.select.take() {
            let mut select = if columns.is_empty() {
                select
            } else {
                select.with_fields(columns)
            };
            select.distinct = true;
            self.query.select_map.select = Some(select);
        }
        self.invalidate();
        self
    }

    /// Attaches aliased annotations to the select.
    pub fn annotate(
        mut self,
        annotations: impl IntoIterator<Item = (impl Into<String>, Annotation)>,
    ) -> Result<QuerySet> {
        let table_name = self
            .query
            .table
            .as_ref()
            .map(|t| t.name.clone())
            .unwrap_or_default();
        let mut select = self
            .query
            .select_map
            .select
            .take()
            .unwrap_or_else(|| SelectNode::new(table_name));

        if select.fields == vec!["*".to_string()] {
            select.fields = vec!["rowid".to_string(), "*".to_string()];
        }
        for (alias, annotation) in annotations {
            let alias = alias.into();
            select.fields.push(annotation.as_sql(&alias)?);
            self.query.alias_fields.push(alias);
        }
        self.query.select_map.select = Some(select);
        self.invalidate();
        Ok(self)
    }

    // -- Terminal operations -------------------------------------------------

    /// Rows as name→value maps. With no columns, the table's declared
    /// field names are used and alias fields appended.
    pub fn values(&mut self, columns: &[&str]) -> Result<Vec<BTreeMap<String, NativeValue>>> {
        let mut fields: Vec<String> = if columns.is_empty() {
            let mut names = self
                .query
                .table
                .as_ref()
                .map(|t| t.field_names())
                .unwrap_or_default();
            names.extend(self.query.alias_fields.iter().cloned());
            names
        } else {
            columns.iter().map(|c| c.to_string()).collect()
        };
        if fields.is_empty() {
            fields = self.load()?.first().map(|r| r.columns().to_vec()).unwrap_or_default();
        }

        let mut result = Vec::new();
        for row in self.load()? {
            let mut record = BTreeMap::new();
            for field in &fields {
                if let Some(value) = row.get(field) {
                    record.insert(field.clone(), value.clone());
                }
            }
            result.push(record);
        }
        Ok(result)
    }

    /// Updates every row currently in the set, targeting their ids.
    pub fn update(
        &mut self,
        values: impl IntoIterator<Item = (impl AsRef<str>, Literal)>,
    ) -> Result<usize> {
        let table = self.query.table.clone().ok_or_else(|| {
            LorelieError::invalid_operation("update requires a table-backed queryset")
        })?;

        let pairs: Vec<(String, Literal)> = values
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_string(), v))
            .collect();
        let mut validated = table.validate_values(&pairs)?;
        for field_name in &table.auto_update_fields {
            let now = chrono::Utc::now()
                .naive_utc()
                .format(lorelie_core::fields::DATETIME_FORMAT)
                .to_string();
            validated.push((field_name.clone(), Literal::Text(now)));
        }

        let ids: Vec<Literal> = self
            .load()?
            .iter()
            .filter_map(Row::id)
            .map(Literal::Int)
            .collect();
        if ids.is_empty() {
            return Ok(0);
        }

        let where_node = WhereNode::from_pairs([("id__in", Literal::List(ids))])?;
        let node = UpdateNode::new(&table.name, validated, where_node);
        let statement = lorelie_core::sql::finalize_sql(&lorelie_core::sql::simple_join(
            node.as_sql()?,
            true,
        ));
        let affected = self.query.backend().execute_affected(&statement)?;
        self.invalidate();
        Ok(affected)
    }

    /// Evaluates aggregate functions, as SQL while the set is unevaluated
    /// and locally over the materialised rows afterwards.
    pub fn aggregate(
        &mut self,
        functions: impl IntoIterator<Item = (Option<String>, SqlFunction)>,
    ) -> Result<BTreeMap<String, NativeValue>> {
        let functions: Vec<(String, SqlFunction)> = functions
            .into_iter()
            .map(|(alias, func)| {
                if !func.is_aggregate() {
                    return Err(LorelieError::invalid_operation(
                        "aggregate requires aggregate functions",
                    ));
                }
                Ok((alias.unwrap_or_else(|| func.aggregate_name()), func))
            })
            .collect::<Result<_>>()?;

        if self.is_evaluated() {
            return self.local_aggregate(&functions);
        }

        let table = self.query.table.clone().ok_or_else(|| {
            LorelieError::invalid_operation("aggregate requires a table-backed queryset")
        })?;

        let fields: Vec<String> = functions
            .iter()
            .map(|(alias, func)| lorelie_core::sql::build_alias(&func.as_sql(), alias))
            .collect();

        let mut query = Query::new(self.query.backend().clone(), Some(table.clone()));
        query.alias_fields = functions.iter().map(|(alias, _)| alias.clone()).collect();
        let select = SelectNode::new(&table.name).with_fields(fields);
        query.add_sql_node(Node::from(select))?;
        if let Some(where_node) = &self.query.select_map.where_node {
            query.add_sql_node(Node::from(where_node.clone()))?;
        }

        let rows = query.run()?;
        let mut result = BTreeMap::new();
        if let Some(row) = rows.first() {
            for (alias, _) in &functions {
                result.insert(
                    alias.clone(),
                    row.get(alias).cloned().unwrap_or(NativeValue::Null),
                );
            }
        }
        Ok(result)
    }

    fn local_aggregate(
        &mut self,
        functions: &[(String, SqlFunction)],
    ) -> Result<BTreeMap<String, NativeValue>> {
        let mut result = BTreeMap::new();
        for (alias, func) in functions {
            let values: Vec<f64> = self
                .load()?
                .iter()
                .filter_map(|row| row.get(func.field_name()))
                .filter_map(NativeValue::as_f64)
                .collect();
            let value = func
                .python_aggregation(&values)
                .map(NativeValue::Float)
                .unwrap_or(NativeValue::Null);
            result.insert(alias.clone(), value);
        }
        Ok(result)
    }
}

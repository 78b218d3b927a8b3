//! SQL-fragment producers ("nodes") and the [`SelectMap`] that slots them
//! into canonical statement order.
//!
//! A node is an SQL bit that concatenates with other bits into the full
//! statement text. Nodes share one rendering contract (`node_name` +
//! `as_sql`) and a small algebra: `+` builds a [`ComplexNode`], two
//! [`OrderByNode`]s combine with `&`, an existing [`WhereNode`] can be
//! enriched with further conditions.

use std::ops::{Add, BitAnd};

use lorelie_core::expressions::Expr;
use lorelie_core::filters::{self, FilterExpr};
use lorelie_core::literal::Literal;
use lorelie_core::sql;

use crate::error::{LorelieError, Result};

/// A tagged SQL-fragment producer.
#[derive(Debug, Clone)]
pub enum Node {
    Select(SelectNode),
    Where(WhereNode),
    OrderBy(OrderByNode),
    GroupBy(GroupByNode),
    Having(HavingNode),
    Insert(InsertNode),
    Update(UpdateNode),
    Delete(DeleteNode),
    Join(JoinNode),
    View(ViewNode),
    Intersect(IntersectNode),
    Complex(ComplexNode),
    Raw(String),
}

impl Node {
    /// The fixed slot name of the node.
    pub fn node_name(&self) -> &'static str {
        match self {
            Node::Select(_) => "select",
            Node::Where(_) => "where",
            Node::OrderBy(_) => "order_by",
            Node::GroupBy(_) => "group_by",
            Node::Having(_) => "having",
            Node::Insert(_) => "insert",
            Node::Update(_) => "update",
            Node::Delete(_) => "delete",
            Node::Join(_) => "join",
            Node::View(_) => "view",
            Node::Intersect(_) => "intersect",
            Node::Complex(_) => "complex",
            Node::Raw(_) => "raw",
        }
    }

    /// Lowers the node to its ordered SQL fragments.
    pub fn as_sql(&self) -> Result<Vec<String>> {
        match self {
            Node::Select(n) => Ok(n.as_sql()),
            Node::Where(n) => n.as_sql(),
            Node::OrderBy(n) => Ok(n.as_sql()),
            Node::GroupBy(n) => Ok(n.as_sql()),
            Node::Having(n) => n.as_sql(),
            Node::Insert(n) => n.as_sql(),
            Node::Update(n) => n.as_sql(),
            Node::Delete(n) => n.as_sql(),
            Node::Join(n) => Ok(n.as_sql()),
            Node::View(n) => Ok(n.as_sql()),
            Node::Intersect(n) => n.as_sql(),
            Node::Complex(n) => n.as_sql(),
            Node::Raw(statement) => Ok(vec![statement.clone()]),
        }
    }
}

impl Add for Node {
    type Output = Node;

    fn add(self, rhs: Node) -> Node {
        match self {
            Node::Complex(mut complex) => {
                complex.nodes.push(rhs);
                Node::Complex(complex)
            }
            lhs => Node::Complex(ComplexNode {
                nodes: vec![lhs, rhs],
            }),
        }
    }
}

macro_rules! node_from {
    ($($variant:ident => $ty:ty),*) => {
        $(impl From<$ty> for Node {
            fn from(value: $ty) -> Node {
                Node::$variant(value)
            }
        })*
    };
}

node_from!(
    Select => SelectNode,
    Where => WhereNode,
    OrderBy => OrderByNode,
    GroupBy => GroupByNode,
    Having => HavingNode,
    Insert => InsertNode,
    Update => UpdateNode,
    Delete => DeleteNode,
    Join => JoinNode,
    View => ViewNode,
    Intersect => IntersectNode,
    Complex => ComplexNode
);

// ---------------------------------------------------------------------------
// Select
// ---------------------------------------------------------------------------

/// `select {fields} from {table}`, with optional `distinct` and `limit`.
#[derive(Debug, Clone)]
pub struct SelectNode {
    pub table_name: String,
    pub fields: Vec<String>,
    pub distinct: bool,
    pub limit: Option<i64>,
}

impl SelectNode {
    pub fn new(table_name: impl Into<String>) -> SelectNode {
        SelectNode {
            table_name: table_name.into(),
            fields: vec!["*".to_string()],
            distinct: false,
            limit: None,
        }
    }

    pub fn with_fields(mut self, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.fields = fields.into_iter().map(Into::into).collect();
        if self.fields.is_empty() {
            self.fields.push("*".to_string());
        }
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn as_sql(&self) -> Vec<String> {
        let keyword = if self.distinct {
            "select distinct"
        } else {
            "select"
        };
        let mut statement = format!(
            "{keyword} {} from {}",
            sql::comma_join(&self.fields),
            self.table_name
        );
        if let Some(limit) = self.limit {
            statement.push_str(&format!(" limit {limit}"));
        }
        vec![statement]
    }
}

// ---------------------------------------------------------------------------
// Where / Having
// ---------------------------------------------------------------------------

fn render_conditions(expressions: &[Expr], filter_exprs: &[FilterExpr]) -> Result<String> {
    let mut resolved = Vec::new();
    for expression in expressions {
        resolved.extend(expression.as_sql().map_err(LorelieError::Core)?);
    }
    resolved.extend(filters::build_filters(filter_exprs, false).map_err(LorelieError::Core)?);
    Ok(sql::operator_join(resolved, "and"))
}

/// `where {conditions}`; expressions first, then plain filters, all joined
/// with `and`.
#[derive(Debug, Clone, Default)]
pub struct WhereNode {
    pub expressions: Vec<Expr>,
    pub filters: Vec<FilterExpr>,
}

impl WhereNode {
    pub fn new() -> WhereNode {
        WhereNode::default()
    }

    /// Builds a node from key/value filter pairs.
    pub fn from_pairs(
        pairs: impl IntoIterator<Item = (impl AsRef<str>, Literal)>,
    ) -> Result<WhereNode> {
        Ok(WhereNode {
            expressions: Vec::new(),
            filters: filters::decompose_pairs(pairs).map_err(LorelieError::Core)?,
        })
    }

    pub fn expr(mut self, expression: impl Into<Expr>) -> WhereNode {
        self.expressions.push(expression.into());
        self
    }

    /// Enriches the node with more filters; used when `filter()` is called
    /// on a queryset that already carries a where clause.
    pub fn and_filters(
        &mut self,
        pairs: impl IntoIterator<Item = (impl AsRef<str>, Literal)>,
    ) -> Result<()> {
        self.filters
            .extend(filters::decompose_pairs(pairs).map_err(LorelieError::Core)?);
        Ok(())
    }

    pub fn and_expr(&mut self, expression: impl Into<Expr>) {
        self.expressions.push(expression.into());
    }

    pub fn merge(&mut self, other: WhereNode) {
        self.expressions.extend(other.expressions);
        self.filters.extend(other.filters);
    }

    pub fn is_empty(&self) -> bool {
        self.expressions.is_empty() && self.filters.is_empty()
    }

    pub fn as_sql(&self) -> Result<Vec<String>> {
        if self.is_empty() {
            return Err(LorelieError::invalid_operation(
                "where clause has no conditions",
            ));
        }
        Ok(vec![format!(
            "where {}",
            render_conditions(&self.expressions, &self.filters)?
        )])
    }
}

/// `having {conditions}`, the post-grouping filter.
#[derive(Debug, Clone, Default)]
pub struct HavingNode {
    pub expressions: Vec<Expr>,
    pub filters: Vec<FilterExpr>,
}

impl HavingNode {
    pub fn from_pairs(
        pairs: impl IntoIterator<Item = (impl AsRef<str>, Literal)>,
    ) -> Result<HavingNode> {
        Ok(HavingNode {
            expressions: Vec::new(),
            filters: filters::decompose_pairs(pairs).map_err(LorelieError::Core)?,
        })
    }

    pub fn as_sql(&self) -> Result<Vec<String>> {
        if self.expressions.is_empty() && self.filters.is_empty() {
            return Err(LorelieError::invalid_operation(
                "having clause has no conditions",
            ));
        }
        Ok(vec![format!(
            "having {}",
            render_conditions(&self.expressions, &self.filters)?
        )])
    }
}

// ---------------------------------------------------------------------------
// Order by / Group by
// ---------------------------------------------------------------------------

/// `order by {fields}`; a leading `-` marks a descending field.
///
/// Ascending and descending sets are mutually exclusive and a field may be
/// registered only once.
#[derive(Debug, Clone, Default)]
pub struct OrderByNode {
    pub ascending: Vec<String>,
    pub descending: Vec<String>,
}

impl OrderByNode {
    pub fn new(fields: impl IntoIterator<Item = impl AsRef<str>>) -> Result<OrderByNode> {
        let mut node = OrderByNode::default();
        for field in fields {
            node.push(field.as_ref())?;
        }
        Ok(node)
    }

    fn push(&mut self, field: &str) -> Result<()> {
        let (descending, name) = match field.strip_prefix('-') {
            Some(name) => (true, name),
            None => (false, field),
        };
        if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
            return Err(LorelieError::validation(format!(
                "ordering field is not valid: {field}"
            )));
        }
        if self.ascending.iter().any(|f| f == name) || self.descending.iter().any(|f| f == name) {
            return Err(LorelieError::validation(format!(
                "the field '{name}' has been registered twice in ascending or descending fields"
            )));
        }
        if descending {
            self.descending.push(name.to_string());
        } else {
            self.ascending.push(name.to_string());
        }
        Ok(())
    }

    /// Combines two order-bys into one, rejecting duplicate fields.
    pub fn merge(&self, other: &OrderByNode) -> Result<OrderByNode> {
        let mut merged = self.clone();
        for field in &other.ascending {
            merged.push(field)?;
        }
        for field in &other.descending {
            merged.push(&format!("-{field}"))?;
        }
        Ok(merged)
    }

    pub fn as_sql(&self) -> Vec<String> {
        let mut conditions: Vec<String> = self
            .ascending
            .iter()
            .map(|field| format!("{field} asc"))
            .collect();
        conditions.extend(self.descending.iter().map(|field| format!("{field} desc")));
        vec![format!("order by {}", sql::comma_join(conditions))]
    }
}

impl BitAnd for OrderByNode {
    type Output = Result<OrderByNode>;

    fn bitand(self, rhs: OrderByNode) -> Result<OrderByNode> {
        self.merge(&rhs)
    }
}

/// `group by {fields}`.
#[derive(Debug, Clone)]
pub struct GroupByNode {
    pub fields: Vec<String>,
}

impl GroupByNode {
    pub fn new(fields: impl IntoIterator<Item = impl Into<String>>) -> GroupByNode {
        GroupByNode {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn as_sql(&self) -> Vec<String> {
        vec![format!("group by {}", sql::comma_join(&self.fields))]
    }
}

// ---------------------------------------------------------------------------
// Insert / Update / Delete
// ---------------------------------------------------------------------------

/// `insert into {table} ({fields}) values(…)`, single record or batch,
/// always followed by a `returning` clause over the full field set.
#[derive(Debug, Clone)]
pub struct InsertNode {
    pub table_name: String,
    pub insert_values: Vec<(String, Literal)>,
    pub batch_values: Vec<Vec<(String, Literal)>>,
    pub returning: Vec<String>,
}

impl InsertNode {
    pub fn single(
        table_name: impl Into<String>,
        values: Vec<(String, Literal)>,
        returning: Vec<String>,
    ) -> InsertNode {
        InsertNode {
            table_name: table_name.into(),
            insert_values: values,
            batch_values: Vec::new(),
            returning,
        }
    }

    pub fn batch(
        table_name: impl Into<String>,
        batches: Vec<Vec<(String, Literal)>>,
        returning: Vec<String>,
    ) -> InsertNode {
        InsertNode {
            table_name: table_name.into(),
            insert_values: Vec::new(),
            batch_values: batches,
            returning,
        }
    }

    pub fn as_sql(&self) -> Result<Vec<String>> {
        let statement = if self.batch_values.is_empty() {
            if self.insert_values.is_empty() {
                return Err(LorelieError::invalid_operation("nothing to insert"));
            }
            let fields: Vec<&str> = self.insert_values.iter().map(|(k, _)| k.as_str()).collect();
            let values: Vec<String> = self
                .insert_values
                .iter()
                .map(|(_, v)| v.quote())
                .collect();
            format!(
                "insert into {} ({}) values({})",
                self.table_name,
                sql::comma_join(fields),
                sql::comma_join(values)
            )
        } else {
            let fields: Vec<&str> = self.batch_values[0]
                .iter()
                .map(|(k, _)| k.as_str())
                .collect();
            let mut rows = Vec::with_capacity(self.batch_values.len());
            for batch in &self.batch_values {
                let keys: Vec<&str> = batch.iter().map(|(k, _)| k.as_str()).collect();
                if keys != fields {
                    return Err(LorelieError::invalid_operation(
                        "batch values should all carry the same columns",
                    ));
                }
                let values: Vec<String> = batch.iter().map(|(_, v)| v.quote()).collect();
                rows.push(format!("({})", sql::comma_join(values)));
            }
            format!(
                "insert into {} ({}) values {}",
                self.table_name,
                sql::comma_join(fields),
                sql::comma_join(rows)
            )
        };

        let returning = if self.returning.is_empty() {
            "returning id".to_string()
        } else {
            format!("returning {}", sql::comma_join(&self.returning))
        };
        Ok(vec![statement, returning])
    }
}

/// `update {table} set {assignments}` with a mandatory predicate.
#[derive(Debug, Clone)]
pub struct UpdateNode {
    pub table_name: String,
    pub set_values: Vec<(String, Literal)>,
    pub where_node: WhereNode,
}

impl UpdateNode {
    pub fn new(
        table_name: impl Into<String>,
        set_values: Vec<(String, Literal)>,
        where_node: WhereNode,
    ) -> UpdateNode {
        UpdateNode {
            table_name: table_name.into(),
            set_values,
            where_node,
        }
    }

    pub fn as_sql(&self) -> Result<Vec<String>> {
        if self.where_node.is_empty() {
            return Err(LorelieError::invalid_operation(
                "update without a predicate is refused",
            ));
        }
        if self.set_values.is_empty() {
            return Err(LorelieError::invalid_operation("nothing to update"));
        }
        let assignments: Vec<String> = self
            .set_values
            .iter()
            .map(|(column, value)| format!("{column}={}", value.quote()))
            .collect();
        let mut fragments = vec![format!(
            "update {} set {}",
            self.table_name,
            sql::comma_join(assignments)
        )];
        fragments.extend(self.where_node.as_sql()?);
        Ok(fragments)
    }
}

/// `delete from {table}` with a mandatory predicate.
#[derive(Debug, Clone)]
pub struct DeleteNode {
    pub table_name: String,
    pub where_node: WhereNode,
}

impl DeleteNode {
    pub fn new(table_name: impl Into<String>, where_node: WhereNode) -> DeleteNode {
        DeleteNode {
            table_name: table_name.into(),
            where_node,
        }
    }

    pub fn as_sql(&self) -> Result<Vec<String>> {
        if self.where_node.is_empty() {
            return Err(LorelieError::invalid_operation(
                "delete without a predicate is refused",
            ));
        }
        let mut fragments = vec![format!("delete from {}", self.table_name)];
        fragments.extend(self.where_node.as_sql()?);
        Ok(fragments)
    }
}

// ---------------------------------------------------------------------------
// Join / View / Intersect / Complex
// ---------------------------------------------------------------------------

/// `inner join {other} on {other}.id = {self}.{other}_id`.
#[derive(Debug, Clone)]
pub struct JoinNode {
    pub left_table: String,
    pub right_table: String,
}

impl JoinNode {
    pub fn new(left_table: impl Into<String>, right_table: impl Into<String>) -> JoinNode {
        JoinNode {
            left_table: left_table.into(),
            right_table: right_table.into(),
        }
    }

    pub fn as_sql(&self) -> Vec<String> {
        vec![format!(
            "inner join {right} on {right}.id = {left}.{right}_id",
            right = self.right_table,
            left = self.left_table
        )]
    }
}

/// `create [temporary] view if not exists {name} as {select};`.
#[derive(Debug, Clone)]
pub struct ViewNode {
    pub name: String,
    pub select_statement: String,
    pub temporary: bool,
}

impl ViewNode {
    pub fn new(name: impl Into<String>, select_statement: impl Into<String>) -> ViewNode {
        ViewNode {
            name: name.into(),
            select_statement: sql::de_sqlize_statement(&select_statement.into()),
            temporary: false,
        }
    }

    pub fn temporary(mut self) -> ViewNode {
        self.temporary = true;
        self
    }

    pub fn as_sql(&self) -> Vec<String> {
        let keyword = if self.temporary {
            "create temporary view"
        } else {
            "create view"
        };
        vec![format!(
            "{keyword} if not exists {} as {};",
            self.name, self.select_statement
        )]
    }
}

/// `{left} intersect {right}`.
#[derive(Debug, Clone)]
pub struct IntersectNode {
    pub left: Box<Node>,
    pub right: Box<Node>,
}

impl IntersectNode {
    pub fn new(left: impl Into<Node>, right: impl Into<Node>) -> IntersectNode {
        IntersectNode {
            left: Box::new(left.into()),
            right: Box::new(right.into()),
        }
    }

    pub fn as_sql(&self) -> Result<Vec<String>> {
        let left = sql::simple_join(self.left.as_sql()?, true);
        let right = sql::simple_join(self.right.as_sql()?, true);
        Ok(vec![format!("{left} intersect {right}")])
    }
}

/// A concatenation of nodes rendered in insertion order.
#[derive(Debug, Clone, Default)]
pub struct ComplexNode {
    pub nodes: Vec<Node>,
}

impl ComplexNode {
    pub fn new(nodes: impl IntoIterator<Item = Node>) -> ComplexNode {
        ComplexNode {
            nodes: nodes.into_iter().collect(),
        }
    }

    pub fn as_sql(&self) -> Result<Vec<String>> {
        let mut fragments = Vec::new();
        for node in &self.nodes {
            fragments.extend(node.as_sql()?);
        }
        Ok(fragments)
    }
}

// ---------------------------------------------------------------------------
// SelectMap
// ---------------------------------------------------------------------------

/// Slots at most one node of each select kind and resolves them in the
/// canonical order `select → join → where → group by → having → order by →
/// limit → offset`, regardless of insertion order.
#[derive(Debug, Clone, Default)]
pub struct SelectMap {
    pub select: Option<SelectNode>,
    pub join: Option<JoinNode>,
    pub where_node: Option<WhereNode>,
    pub group_by: Option<GroupByNode>,
    pub having: Option<HavingNode>,
    pub order_by: Option<OrderByNode>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl SelectMap {
    /// The map resolves once a select node is present.
    pub fn should_resolve(&self) -> bool {
        self.select.is_some()
    }

    /// Slots a node. Another `where` merges into the existing one, another
    /// `order by` combines through the node algebra.
    pub fn insert(&mut self, node: Node) -> Result<()> {
        match node {
            Node::Select(select) => self.select = Some(select),
            Node::Join(join) => self.join = Some(join),
            Node::Where(where_node) => {
                self.where_node = Some(match self.where_node.take() {
                    Some(mut existing) => {
                        existing.merge(where_node);
                        existing
                    }
                    None => where_node,
                });
            }
            Node::GroupBy(group_by) => self.group_by = Some(group_by),
            Node::Having(having) => self.having = Some(having),
            Node::OrderBy(order_by) => self.add_ordering(order_by)?,
            other => {
                return Err(LorelieError::invalid_operation(format!(
                    "node '{}' has no select slot",
                    other.node_name()
                )));
            }
        }
        Ok(())
    }

    /// Combines an ordering into the existing slot.
    pub fn add_ordering(&mut self, node: OrderByNode) -> Result<()> {
        self.order_by = Some(match self.order_by.take() {
            Some(existing) => existing.merge(&node)?,
            None => node,
        });
        Ok(())
    }

    /// Resolves the slots into ordered fragments.
    pub fn resolve(&self) -> Result<Vec<String>> {
        let mut fragments = Vec::new();
        if let Some(select) = &self.select {
            fragments.extend(select.as_sql());
        }
        if let Some(join) = &self.join {
            fragments.extend(join.as_sql());
        }
        if let Some(where_node) = &self.where_node {
            fragments.extend(where_node.as_sql()?);
        }
        if let Some(group_by) = &self.group_by {
            fragments.extend(group_by.as_sql());
        }
        if let Some(having) = &self.having {
            fragments.extend(having.as_sql()?);
        }
        if let Some(order_by) = &self.order_by {
            fragments.extend(order_by.as_sql());
        }
        if let Some(limit) = self.limit {
            fragments.push(format!("limit {limit}"));
        }
        if let Some(offset) = self.offset {
            fragments.push(format!("offset {offset}"));
        }
        Ok(fragments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lorelie_core::expressions::Q;
    use lorelie_core::lit;
    use pretty_assertions::assert_eq;

    #[test]
    fn select_node() {
        assert_eq!(
            SelectNode::new("celebrities").as_sql(),
            vec!["select * from celebrities"]
        );
        assert_eq!(
            SelectNode::new("celebrities").distinct().as_sql(),
            vec!["select distinct * from celebrities"]
        );
        assert_eq!(
            SelectNode::new("celebrities").limit(10).as_sql(),
            vec!["select * from celebrities limit 10"]
        );
    }

    #[test]
    fn where_node_filters() {
        let node = WhereNode::from_pairs([("firstname", lit("Kendall"))]).unwrap();
        assert_eq!(node.as_sql().unwrap(), vec!["where firstname='Kendall'"]);

        let node = WhereNode::from_pairs([
            ("firstname", lit("Kendall")),
            ("lastname", lit("Jenner")),
        ])
        .unwrap();
        assert_eq!(
            node.as_sql().unwrap(),
            vec!["where firstname='Kendall' and lastname='Jenner'"]
        );
    }

    #[test]
    fn where_node_expressions() {
        let node = WhereNode::new().expr(Q::filter("firstname", "Kendall"));
        assert_eq!(node.as_sql().unwrap(), vec!["where firstname='Kendall'"]);

        let combined = Q::filter("firstname", "Kendall") & Q::filter("lastname", "Jenner");
        let node = WhereNode::new().expr(combined);
        assert_eq!(
            node.as_sql().unwrap(),
            vec!["where (firstname='Kendall' and lastname='Jenner')"]
        );
    }

    #[test]
    fn where_node_lookup_parameters() {
        let node =
            WhereNode::from_pairs([("age__gte", lit(10)), ("age__lte", lit(40))]).unwrap();
        assert_eq!(node.as_sql().unwrap(), vec!["where age>=10 and age<=40"]);
    }

    #[test]
    fn where_node_mixed_arguments() {
        let mut node = WhereNode::new().expr(Q::filter("lastname", "Jenner"));
        node.and_filters([("firstname", lit("Kendall")), ("age__gt", lit(40))])
            .unwrap();
        assert_eq!(
            node.as_sql().unwrap(),
            vec!["where lastname='Jenner' and firstname='Kendall' and age>40"]
        );
    }

    #[test]
    fn where_node_enrichment() {
        let mut node = WhereNode::from_pairs([("firstname", lit("Kendall"))]).unwrap();
        node.and_filters([("lastname", lit("Jenner"))]).unwrap();
        assert_eq!(
            node.as_sql().unwrap(),
            vec!["where firstname='Kendall' and lastname='Jenner'"]
        );
    }

    #[test]
    fn order_by_node() {
        let node = OrderByNode::new(["id"]).unwrap();
        assert_eq!(node.as_sql(), vec!["order by id asc"]);

        let node = OrderByNode::new(["-id"]).unwrap();
        assert_eq!(node.as_sql(), vec!["order by id desc"]);
    }

    #[test]
    fn order_by_combination() {
        let a = OrderByNode::new(["name"]).unwrap();
        let b = OrderByNode::new(["-age"]).unwrap();
        let c = (a & b).unwrap();
        assert_eq!(c.as_sql(), vec!["order by name asc, age desc"]);
    }

    #[test]
    fn order_by_rejects_duplicates() {
        assert!(OrderByNode::new(["name", "name"]).is_err());
        assert!(OrderByNode::new(["name", "-name"]).is_err());

        let a = OrderByNode::new(["name"]).unwrap();
        let b = OrderByNode::new(["-name"]).unwrap();
        assert!(a.merge(&b).is_err());
    }

    #[test]
    fn insert_node_single() {
        let node = InsertNode::single(
            "celebrities",
            vec![("firstname".to_string(), lit("Kendall"))],
            vec!["id".to_string()],
        );
        assert_eq!(
            node.as_sql().unwrap(),
            vec![
                "insert into celebrities (firstname) values('Kendall')",
                "returning id"
            ]
        );
    }

    #[test]
    fn insert_node_value_types() {
        let node = InsertNode::single(
            "celebrities",
            vec![
                ("name".to_string(), lit("Kendall")),
                ("age".to_string(), lit(22)),
                ("height".to_string(), lit(154.5)),
            ],
            vec!["id".to_string()],
        );
        assert_eq!(
            node.as_sql().unwrap(),
            vec![
                "insert into celebrities (name, age, height) values('Kendall', 22, 154.5)",
                "returning id"
            ]
        );
    }

    #[test]
    fn insert_node_batch() {
        let node = InsertNode::batch(
            "celebrities",
            vec![
                vec![("name".to_string(), lit("Kendall"))],
                vec![("name".to_string(), lit("Kylie"))],
            ],
            vec!["id".to_string(), "name".to_string()],
        );
        assert_eq!(
            node.as_sql().unwrap(),
            vec![
                "insert into celebrities (name) values ('Kendall'), ('Kylie')",
                "returning id, name"
            ]
        );
    }

    #[test]
    fn insert_node_batch_mismatch() {
        let node = InsertNode::batch(
            "celebrities",
            vec![
                vec![("name".to_string(), lit("Kendall"))],
                vec![("age".to_string(), lit(22))],
            ],
            vec![],
        );
        assert!(node.as_sql().is_err());
    }

    #[test]
    fn update_node() {
        let node = UpdateNode::new(
            "celebrities",
            vec![("name".to_string(), lit("Kendall"))],
            WhereNode::from_pairs([("name", lit("Kylie"))]).unwrap(),
        );
        assert_eq!(
            node.as_sql().unwrap(),
            vec!["update celebrities set name='Kendall'", "where name='Kylie'"]
        );
    }

    #[test]
    fn update_node_refused_without_predicate() {
        let node = UpdateNode::new(
            "celebrities",
            vec![("name".to_string(), lit("Kendall"))],
            WhereNode::new(),
        );
        assert!(matches!(
            node.as_sql().unwrap_err(),
            LorelieError::InvalidOperation { .. }
        ));
    }

    #[test]
    fn delete_node() {
        let node = DeleteNode::new(
            "celebrities",
            WhereNode::new().expr(Q::filter("name", "Kendall")),
        );
        assert_eq!(
            node.as_sql().unwrap(),
            vec!["delete from celebrities", "where name='Kendall'"]
        );
    }

    #[test]
    fn delete_node_refused_without_predicate() {
        let node = DeleteNode::new("celebrities", WhereNode::new());
        assert!(node.as_sql().is_err());
    }

    #[test]
    fn join_node() {
        let node = JoinNode::new("celebrities", "followers");
        assert_eq!(
            node.as_sql(),
            vec!["inner join followers on followers.id = celebrities.followers_id"]
        );
    }

    #[test]
    fn view_node() {
        let node = ViewNode::new("my_view", "select * from celebrities");
        assert_eq!(
            node.as_sql(),
            vec!["create view if not exists my_view as select * from celebrities;"]
        );

        let node = ViewNode::new("my_view", "select * from celebrities;").temporary();
        assert_eq!(
            node.as_sql(),
            vec!["create temporary view if not exists my_view as select * from celebrities;"]
        );
    }

    #[test]
    fn intersect_node() {
        let node = IntersectNode::new(
            SelectNode::new("celebrities"),
            SelectNode::new("celebrities"),
        );
        assert_eq!(
            node.as_sql().unwrap(),
            vec!["select * from celebrities intersect select * from celebrities"]
        );
    }

    #[test]
    fn complex_node_from_add() {
        let node = Node::from(SelectNode::new("celebrities"))
            + Node::from(WhereNode::from_pairs([("name", lit("Kendall"))]).unwrap());
        assert_eq!(node.node_name(), "complex");
        assert_eq!(
            node.as_sql().unwrap(),
            vec!["select * from celebrities", "where name='Kendall'"]
        );
    }

    #[test]
    fn select_map_canonical_order() {
        // Insertion order does not matter: two maps built from the same
        // nodes in different orders resolve to identical SQL.
        let mut forward = SelectMap::default();
        forward.insert(SelectNode::new("celebrities").into()).unwrap();
        forward
            .insert(WhereNode::from_pairs([("age__gte", lit(18))]).unwrap().into())
            .unwrap();
        forward.insert(OrderByNode::new(["name"]).unwrap().into()).unwrap();
        forward.limit = Some(5);
        forward.offset = Some(10);

        let mut scrambled = SelectMap::default();
        scrambled.limit = Some(5);
        scrambled.insert(OrderByNode::new(["name"]).unwrap().into()).unwrap();
        scrambled
            .insert(WhereNode::from_pairs([("age__gte", lit(18))]).unwrap().into())
            .unwrap();
        scrambled.offset = Some(10);
        scrambled.insert(SelectNode::new("celebrities").into()).unwrap();

        let expected = vec![
            "select * from celebrities",
            "where age>=18",
            "order by name asc",
            "limit 5",
            "offset 10",
        ];
        assert_eq!(forward.resolve().unwrap(), expected);
        assert_eq!(scrambled.resolve().unwrap(), expected);
    }

    #[test]
    fn select_map_grouping_and_having() {
        let mut map = SelectMap::default();
        map.insert(
            SelectNode::new("celebrities")
                .with_fields(["name", "count(id) as total"])
                .into(),
        )
        .unwrap();
        map.insert(GroupByNode::new(["name"]).into()).unwrap();
        map.insert(HavingNode::from_pairs([("total__gt", lit(1))]).unwrap().into())
            .unwrap();

        assert_eq!(
            map.resolve().unwrap(),
            vec![
                "select name, count(id) as total from celebrities",
                "group by name",
                "having total>1",
            ]
        );
    }

    #[test]
    fn select_map_merges_where_and_ordering() {
        let mut map = SelectMap::default();
        map.insert(SelectNode::new("celebrities").into()).unwrap();
        map.insert(WhereNode::from_pairs([("name", lit("Kendall"))]).unwrap().into())
            .unwrap();
        map.insert(WhereNode::from_pairs([("age__gt", lit(20))]).unwrap().into())
            .unwrap();
        map.insert(OrderByNode::new(["name"]).unwrap().into()).unwrap();
        map.insert(OrderByNode::new(["-age"]).unwrap().into()).unwrap();

        assert_eq!(
            map.resolve().unwrap(),
            vec![
                "select * from celebrities",
                "where name='Kendall' and age>20",
                "order by name asc, age desc",
            ]
        );
    }
}

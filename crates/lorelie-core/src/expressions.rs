//! Expression algebra.
//!
//! `Q`, `F`, `Value`, `When`/`Case` and the combined/negated trees they form
//! all lower to an ordered sequence of SQL fragments through a single
//! [`Expr`] type. Rust operators mirror the algebra: `&`/`|` combine,
//! `!` negates, `+ - * /` build arithmetic over column references.

use std::ops::{Add, BitAnd, BitOr, Div, Mul, Not, Sub};

use crate::error::{CoreError, Result};
use crate::fields::Field;
use crate::filters::{self, FilterExpr};
use crate::literal::Literal;
use crate::sql;

/// Binary operator joining two sides of a combined expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprOperator {
    And,
    Or,
    Add,
    Sub,
    Mul,
    Div,
}

impl ExprOperator {
    fn as_str(&self) -> &'static str {
        match self {
            ExprOperator::And => "and",
            ExprOperator::Or => "or",
            ExprOperator::Add => "+",
            ExprOperator::Sub => "-",
            ExprOperator::Mul => "*",
            ExprOperator::Div => "/",
        }
    }
}

/// A composable SQL expression.
#[derive(Debug, Clone)]
pub enum Expr {
    Q(Q),
    F(F),
    Value(Value),
    Combined(CombinedExpression),
    Negated(Box<Expr>),
    Case(Case),
}

impl Expr {
    /// Lowers the expression to its ordered SQL fragments.
    pub fn as_sql(&self) -> Result<Vec<String>> {
        match self {
            Expr::Q(q) => q.as_sql(),
            Expr::F(f) => Ok(vec![f.column.clone()]),
            Expr::Value(value) => value.as_sql(),
            Expr::Combined(combined) => combined.as_sql(),
            Expr::Negated(inner) => {
                let fragment = render_fragment(inner)?;
                Ok(vec![format!("not {fragment}")])
            }
            Expr::Case(case) => case.as_sql(),
        }
    }

    /// Combines two expressions, flattening same-operator chains so that
    /// `age + age + 1` renders as one parenthesised run.
    pub fn combine(self, op: ExprOperator, rhs: Expr) -> Expr {
        match self {
            Expr::Combined(mut combined) if combined.op == op => {
                combined.children.push(rhs);
                Expr::Combined(combined)
            }
            lhs => Expr::Combined(CombinedExpression {
                op,
                children: vec![lhs, rhs],
            }),
        }
    }
}

fn render_fragment(expr: &Expr) -> Result<String> {
    Ok(expr.as_sql()?.join(" "))
}

/// A conjunctive set of filters, `Q(firstname='Kendall', age__gt=20)`.
///
/// Filters are kept in declaration order; lowering joins the built
/// conditions with ` and ` into a single fragment.
#[derive(Debug, Clone, Default)]
pub struct Q {
    filters: Vec<(String, Literal)>,
}

impl Q {
    /// Creates a `Q` holding a single filter.
    pub fn filter(key: impl Into<String>, value: impl Into<Literal>) -> Q {
        Q {
            filters: vec![(key.into(), value.into())],
        }
    }

    /// Appends another filter to the conjunction.
    pub fn and_filter(mut self, key: impl Into<String>, value: impl Into<Literal>) -> Q {
        self.filters.push((key.into(), value.into()));
        self
    }

    /// Parses a string expression, `Q::from_expression("age__gte=1")`.
    pub fn from_expression(expression: &str) -> Result<Q> {
        let decomposed = filters::decompose_str(expression)?;
        Ok(Q {
            filters: decomposed
                .into_iter()
                .map(|f| {
                    let mut key = f.path.join("__");
                    if f.op != filters::Op::Eq {
                        key = format!("{key}__{}", f.op.suffix());
                    }
                    (key, f.value)
                })
                .collect(),
        })
    }

    /// Builds a conjunction from explicit `(column, operator, value)`
    /// triples, `Q::from_triples([("age", ">=", lit(1))])`.
    pub fn from_triples(
        triples: impl IntoIterator<Item = (impl AsRef<str>, impl AsRef<str>, Literal)>,
    ) -> Result<Q> {
        let decomposed = filters::decompose_triples(triples)?;
        Ok(Q {
            filters: decomposed
                .into_iter()
                .map(|f| {
                    let mut key = f.path.join("__");
                    if f.op != filters::Op::Eq {
                        key = format!("{key}__{}", f.op.suffix());
                    }
                    (key, f.value)
                })
                .collect(),
        })
    }

    /// The decomposed filter expressions, in declaration order.
    pub fn decompose(&self) -> Result<Vec<FilterExpr>> {
        filters::decompose_pairs(self.filters.iter().map(|(k, v)| (k.as_str(), v.clone())))
    }

    /// Lowers to a single ` and `-joined fragment with unspaced conditions.
    pub fn as_sql(&self) -> Result<Vec<String>> {
        let decomposed = self.decompose()?;
        let built = filters::build_filters(&decomposed, false)?;
        Ok(vec![sql::operator_join(built, "and")])
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

/// A bare column reference usable in arithmetic trees.
#[derive(Debug, Clone)]
pub struct F {
    pub column: String,
}

impl F {
    pub fn new(column: impl Into<String>) -> F {
        F {
            column: column.into(),
        }
    }
}

/// A literal with a declared output field.
///
/// Without an output field the literal quotes by its own kind: numbers stay
/// unquoted, text is quoted. With one, the value runs through the field's
/// database coercion first.
#[derive(Debug, Clone)]
pub struct Value {
    pub literal: Literal,
    pub output_field: Option<Field>,
}

impl Value {
    pub fn new(value: impl Into<Literal>) -> Value {
        Value {
            literal: value.into(),
            output_field: None,
        }
    }

    pub fn with_output(value: impl Into<Literal>, output_field: Field) -> Value {
        Value {
            literal: value.into(),
            output_field: Some(output_field),
        }
    }

    pub fn as_sql(&self) -> Result<Vec<String>> {
        let quoted = match &self.output_field {
            Some(field) => field.to_database(&self.literal)?.quote(),
            None => self.literal.quote(),
        };
        Ok(vec![quoted])
    }
}

/// A binary (flattened n-ary) tree over expressions, `(lhs op rhs)`.
#[derive(Debug, Clone)]
pub struct CombinedExpression {
    pub op: ExprOperator,
    pub children: Vec<Expr>,
}

impl CombinedExpression {
    pub fn new(op: ExprOperator, left: impl Into<Expr>, right: impl Into<Expr>) -> Self {
        CombinedExpression {
            op,
            children: vec![left.into(), right.into()],
        }
    }

    pub fn as_sql(&self) -> Result<Vec<String>> {
        let mut fragments = Vec::with_capacity(self.children.len());
        for child in &self.children {
            fragments.push(render_fragment(child)?);
        }
        let joined = fragments.join(&format!(" {} ", self.op.as_str()));
        Ok(vec![sql::wrap_parenthesis(&joined)])
    }
}

/// One branch of a `case` expression, `when <predicate> then <value>`.
#[derive(Debug, Clone)]
pub struct When {
    pub condition: Box<Expr>,
    pub then_case: Literal,
}

impl When {
    pub fn new(condition: impl Into<Expr>, then_case: impl Into<Literal>) -> When {
        When {
            condition: Box::new(condition.into()),
            then_case: then_case.into(),
        }
    }

    /// Builds a branch from a string predicate, `When::expression("name=Kendall", "Kylie")`.
    pub fn expression(condition: &str, then_case: impl Into<Literal>) -> Result<When> {
        Ok(When::new(Q::from_expression(condition)?, then_case))
    }

    pub fn as_sql(&self) -> Result<String> {
        let condition = render_fragment(&self.condition)?;
        Ok(format!("when {} then {}", condition, self.then_case.quote()))
    }
}

/// A `case … end` expression with an alias, usable in annotations.
#[derive(Debug, Clone)]
pub struct Case {
    pub whens: Vec<When>,
    pub default: Option<Literal>,
    pub alias: Option<String>,
}

impl Case {
    pub fn new(whens: impl IntoIterator<Item = When>) -> Case {
        Case {
            whens: whens.into_iter().collect(),
            default: None,
            alias: None,
        }
    }

    pub fn default(mut self, value: impl Into<Literal>) -> Case {
        self.default = Some(value.into());
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Case {
        self.alias = Some(alias.into());
        self
    }

    pub fn as_sql(&self) -> Result<Vec<String>> {
        let alias = self.alias.as_ref().ok_or(CoreError::MissingAlias)?;

        let mut parts = Vec::with_capacity(self.whens.len() + 2);
        for when in &self.whens {
            parts.push(when.as_sql()?);
        }
        if let Some(default) = &self.default {
            parts.push(format!("else {}", default.quote()));
        }
        let body = sql::simple_join(parts, true);
        Ok(vec![format!("case {body} end {alias}")])
    }
}

// -- Conversions -------------------------------------------------------------

impl From<Q> for Expr {
    fn from(value: Q) -> Self {
        Expr::Q(value)
    }
}

impl From<F> for Expr {
    fn from(value: F) -> Self {
        Expr::F(value)
    }
}

impl From<Value> for Expr {
    fn from(value: Value) -> Self {
        Expr::Value(value)
    }
}

impl From<CombinedExpression> for Expr {
    fn from(value: CombinedExpression) -> Self {
        Expr::Combined(value)
    }
}

impl From<Case> for Expr {
    fn from(value: Case) -> Self {
        Expr::Case(value)
    }
}

impl From<Literal> for Expr {
    fn from(value: Literal) -> Self {
        Expr::Value(Value::new(value))
    }
}

macro_rules! expr_from_literal {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Expr {
            fn from(value: $ty) -> Self {
                Expr::Value(Value::new(value))
            }
        })*
    };
}

expr_from_literal!(i32, i64, f64, bool, &str, String);

// -- Operators ---------------------------------------------------------------

macro_rules! impl_expr_operators {
    ($($ty:ty),*) => {
        $(
            impl<R: Into<Expr>> BitAnd<R> for $ty {
                type Output = Expr;
                fn bitand(self, rhs: R) -> Expr {
                    Expr::from(self).combine(ExprOperator::And, rhs.into())
                }
            }

            impl<R: Into<Expr>> BitOr<R> for $ty {
                type Output = Expr;
                fn bitor(self, rhs: R) -> Expr {
                    Expr::from(self).combine(ExprOperator::Or, rhs.into())
                }
            }

            impl<R: Into<Expr>> Add<R> for $ty {
                type Output = Expr;
                fn add(self, rhs: R) -> Expr {
                    Expr::from(self).combine(ExprOperator::Add, rhs.into())
                }
            }

            impl<R: Into<Expr>> Sub<R> for $ty {
                type Output = Expr;
                fn sub(self, rhs: R) -> Expr {
                    Expr::from(self).combine(ExprOperator::Sub, rhs.into())
                }
            }

            impl<R: Into<Expr>> Mul<R> for $ty {
                type Output = Expr;
                fn mul(self, rhs: R) -> Expr {
                    Expr::from(self).combine(ExprOperator::Mul, rhs.into())
                }
            }

            impl<R: Into<Expr>> Div<R> for $ty {
                type Output = Expr;
                fn div(self, rhs: R) -> Expr {
                    Expr::from(self).combine(ExprOperator::Div, rhs.into())
                }
            }

            impl Not for $ty {
                type Output = Expr;
                fn not(self) -> Expr {
                    Expr::Negated(Box::new(Expr::from(self)))
                }
            }
        )*
    };
}

impl_expr_operators!(Q, F, Value, CombinedExpression);

impl<R: Into<Expr>> BitAnd<R> for Expr {
    type Output = Expr;
    fn bitand(self, rhs: R) -> Expr {
        self.combine(ExprOperator::And, rhs.into())
    }
}

impl<R: Into<Expr>> BitOr<R> for Expr {
    type Output = Expr;
    fn bitor(self, rhs: R) -> Expr {
        self.combine(ExprOperator::Or, rhs.into())
    }
}

impl<R: Into<Expr>> Add<R> for Expr {
    type Output = Expr;
    fn add(self, rhs: R) -> Expr {
        self.combine(ExprOperator::Add, rhs.into())
    }
}

impl<R: Into<Expr>> Sub<R> for Expr {
    type Output = Expr;
    fn sub(self, rhs: R) -> Expr {
        self.combine(ExprOperator::Sub, rhs.into())
    }
}

impl<R: Into<Expr>> Mul<R> for Expr {
    type Output = Expr;
    fn mul(self, rhs: R) -> Expr {
        self.combine(ExprOperator::Mul, rhs.into())
    }
}

impl<R: Into<Expr>> Div<R> for Expr {
    type Output = Expr;
    fn div(self, rhs: R) -> Expr {
        self.combine(ExprOperator::Div, rhs.into())
    }
}

impl Not for Expr {
    type Output = Expr;
    fn not(self) -> Expr {
        Expr::Negated(Box::new(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn q_single_filter() {
        let q = Q::filter("firstname", "Kendall");
        assert_eq!(q.as_sql().unwrap(), vec!["firstname='Kendall'"]);
    }

    #[test]
    fn q_conjunction() {
        let q = Q::filter("firstname", "Kendall").and_filter("lastname", "Jenner");
        assert_eq!(
            q.as_sql().unwrap(),
            vec!["firstname='Kendall' and lastname='Jenner'"]
        );
    }

    #[test]
    fn q_multiple_operators() {
        let q = Q::filter("firstname", "Kendall")
            .and_filter("age__gt", 20)
            .and_filter("age__lte", 50);
        assert_eq!(
            q.as_sql().unwrap(),
            vec!["firstname='Kendall' and age>20 and age<=50"]
        );
    }

    #[test]
    fn q_and() {
        let c = Q::filter("firstname", "Kendall") & Q::filter("firstname", "Kylie");
        assert_eq!(
            c.as_sql().unwrap(),
            vec!["(firstname='Kendall' and firstname='Kylie')"]
        );
    }

    #[test]
    fn q_or() {
        let c = Q::filter("firstname", "Kendall") | Q::filter("firstname", "Kylie");
        assert_eq!(
            c.as_sql().unwrap(),
            vec!["(firstname='Kendall' or firstname='Kylie')"]
        );
    }

    #[test]
    fn q_mixed_precedence() {
        // `&` binds tighter than `|`, mirroring the logical precedence.
        let c = Q::filter("firstname", "Kendall")
            | Q::filter("lastname", "Jenner")
                & Q::filter("age__gt", 25).and_filter("age__lte", 56);
        assert_eq!(
            c.as_sql().unwrap(),
            vec!["(firstname='Kendall' or (lastname='Jenner' and age>25 and age<=56))"]
        );
    }

    #[test]
    fn q_negation() {
        let n = !Q::filter("firstname", "Kendall");
        assert_eq!(n.as_sql().unwrap(), vec!["not firstname='Kendall'"]);
    }

    #[test]
    fn negated_combination() {
        let c = !Q::filter("firstname", "Kendall") & Q::filter("lastname", "Jenner");
        assert_eq!(
            c.as_sql().unwrap(),
            vec!["(not firstname='Kendall' and lastname='Jenner')"]
        );
    }

    #[test]
    fn q_from_expression() {
        let q = Q::from_expression("age__gte=1").unwrap();
        assert_eq!(q.as_sql().unwrap(), vec!["age>=1"]);

        let q = Q::from_expression("name=Kendall").unwrap();
        assert_eq!(q.as_sql().unwrap(), vec!["name='Kendall'"]);
    }

    #[test]
    fn q_from_triples() {
        let q = Q::from_triples([
            ("age", ">=", Literal::Int(1)),
            ("name", "eq", Literal::from("Kendall")),
        ])
        .unwrap();
        assert_eq!(q.as_sql().unwrap(), vec!["age>=1 and name='Kendall'"]);

        assert!(Q::from_triples([("age", "wrong", Literal::Int(1))]).is_err());
    }

    #[test]
    fn f_arithmetic() {
        assert_eq!((F::new("age") + 1).as_sql().unwrap(), vec!["(age + 1)"]);
        assert_eq!((F::new("age") - 1).as_sql().unwrap(), vec!["(age - 1)"]);
        assert_eq!((F::new("age") * 1).as_sql().unwrap(), vec!["(age * 1)"]);
        assert_eq!((F::new("age") / 1).as_sql().unwrap(), vec!["(age / 1)"]);
    }

    #[test]
    fn f_chain_flattens() {
        let expr = F::new("age") + F::new("age") + 1;
        assert_eq!(expr.as_sql().unwrap(), vec!["(age + age + 1)"]);
    }

    #[test]
    fn f_mixed_with_text_stringifies() {
        let expr = F::new("age") + "height";
        assert_eq!(expr.as_sql().unwrap(), vec!["(age + 'height')"]);
    }

    #[test]
    fn value_quoting() {
        assert_eq!(Value::new(1).as_sql().unwrap(), vec!["1"]);
        assert_eq!(Value::new("a").as_sql().unwrap(), vec!["'a'"]);
        assert_eq!(Value::new(1.2).as_sql().unwrap(), vec!["1.2"]);
    }

    #[test]
    fn value_with_output_field() {
        let value = Value::with_output("1", Field::integer("count"));
        assert_eq!(value.as_sql().unwrap(), vec!["1"]);
    }

    #[test]
    fn when_with_q() {
        let when = When::new(Q::filter("name", "Kendall"), "Kylie");
        assert_eq!(when.as_sql().unwrap(), "when name='Kendall' then 'Kylie'");
    }

    #[test]
    fn when_with_string() {
        let when = When::expression("name=Kendall", "Kylie").unwrap();
        assert_eq!(when.as_sql().unwrap(), "when name='Kendall' then 'Kylie'");
    }

    #[test]
    fn case_requires_alias() {
        let case = Case::new([When::expression("firstname=Kendall", "kendall").unwrap()]);
        assert!(matches!(
            case.as_sql().unwrap_err(),
            CoreError::MissingAlias
        ));
    }

    #[test]
    fn case_structure() {
        let case = Case::new([When::expression("firstname=Kendall", "Kylie").unwrap()])
            .default("Aurelie")
            .alias("firstname_alias");
        assert_eq!(
            case.as_sql().unwrap(),
            vec!["case when firstname='Kendall' then 'Kylie' else 'Aurelie' end firstname_alias"]
        );
    }
}

//! SQL functions: scalar, text, date, aggregate and window.
//!
//! Builtins (`lower`, `count`, `strftime`, …) are emitted directly. Hash
//! functions, `regexp` and the non-native aggregates are user-defined
//! callbacks registered on every connection open; the aggregates keep their
//! running state in `step` and produce the result in `finalize`. Every
//! aggregate also has a local fallback used when a queryset is already
//! materialised.

use rusqlite::Connection;
use rusqlite::functions::{Aggregate, Context, FunctionFlags};
use sha2::Digest;

use lorelie_core::expressions::{Case, Expr};
use lorelie_core::sql;

use crate::error::Result;

/// An SQL function over a column.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlFunction {
    // Text
    Lower(String),
    Upper(String),
    Length(String),
    Trim(String),
    LTrim(String),
    RTrim(String),
    SubStr {
        column: String,
        start: i64,
        length: i64,
    },
    Concat(Vec<String>),
    // Hashes (user-defined callbacks)
    Md5Hash(String),
    Sha1Hash(String),
    Sha224Hash(String),
    Sha256Hash(String),
    Sha384Hash(String),
    Sha512Hash(String),
    // Date parts
    ExtractYear(String),
    ExtractMonth(String),
    ExtractDay(String),
    ExtractHour(String),
    ExtractMinute(String),
    ExtractSecond(String),
    // Aggregates
    Count(String),
    Sum(String),
    Avg(String),
    Min(String),
    Max(String),
    Variance(String),
    StDev(String),
    MeanAbsoluteDifference(String),
    CoefficientOfVariation(String),
}

impl SqlFunction {
    /// The column the function operates on.
    pub fn field_name(&self) -> &str {
        match self {
            SqlFunction::Lower(c)
            | SqlFunction::Upper(c)
            | SqlFunction::Length(c)
            | SqlFunction::Trim(c)
            | SqlFunction::LTrim(c)
            | SqlFunction::RTrim(c)
            | SqlFunction::SubStr { column: c, .. }
            | SqlFunction::Md5Hash(c)
            | SqlFunction::Sha1Hash(c)
            | SqlFunction::Sha224Hash(c)
            | SqlFunction::Sha256Hash(c)
            | SqlFunction::Sha384Hash(c)
            | SqlFunction::Sha512Hash(c)
            | SqlFunction::ExtractYear(c)
            | SqlFunction::ExtractMonth(c)
            | SqlFunction::ExtractDay(c)
            | SqlFunction::ExtractHour(c)
            | SqlFunction::ExtractMinute(c)
            | SqlFunction::ExtractSecond(c)
            | SqlFunction::Count(c)
            | SqlFunction::Sum(c)
            | SqlFunction::Avg(c)
            | SqlFunction::Min(c)
            | SqlFunction::Max(c)
            | SqlFunction::Variance(c)
            | SqlFunction::StDev(c)
            | SqlFunction::MeanAbsoluteDifference(c)
            | SqlFunction::CoefficientOfVariation(c) => c,
            SqlFunction::Concat(fields) => fields.first().map(String::as_str).unwrap_or(""),
        }
    }

    /// Renders the function call.
    pub fn as_sql(&self) -> String {
        match self {
            SqlFunction::Lower(c) => format!("lower({c})"),
            SqlFunction::Upper(c) => format!("upper({c})"),
            SqlFunction::Length(c) => format!("length({c})"),
            SqlFunction::Trim(c) => format!("trim({c})"),
            SqlFunction::LTrim(c) => format!("ltrim({c})"),
            SqlFunction::RTrim(c) => format!("rtrim({c})"),
            SqlFunction::SubStr {
                column,
                start,
                length,
            } => format!("substr({column}, {start}, {length})"),
            SqlFunction::Concat(fields) => fields.join(" || "),
            SqlFunction::Md5Hash(c) => format!("hash({c})"),
            SqlFunction::Sha1Hash(c) => format!("sha1({c})"),
            SqlFunction::Sha224Hash(c) => format!("sha224({c})"),
            SqlFunction::Sha256Hash(c) => format!("sha256({c})"),
            SqlFunction::Sha384Hash(c) => format!("sha384({c})"),
            SqlFunction::Sha512Hash(c) => format!("sha512({c})"),
            SqlFunction::ExtractYear(c) => format!("strftime('%Y', {c})"),
            SqlFunction::ExtractMonth(c) => format!("strftime('%m', {c})"),
            SqlFunction::ExtractDay(c) => format!("strftime('%d', {c})"),
            SqlFunction::ExtractHour(c) => format!("strftime('%H', {c})"),
            SqlFunction::ExtractMinute(c) => format!("strftime('%M', {c})"),
            SqlFunction::ExtractSecond(c) => format!("strftime('%S', {c})"),
            SqlFunction::Count(c) => format!("count({c})"),
            SqlFunction::Sum(c) => format!("sum({c})"),
            SqlFunction::Avg(c) => format!("avg({c})"),
            SqlFunction::Min(c) => format!("min({c})"),
            SqlFunction::Max(c) => format!("max({c})"),
            SqlFunction::Variance(c) => format!("variance({c})"),
            SqlFunction::StDev(c) => format!("stdev({c})"),
            SqlFunction::MeanAbsoluteDifference(c) => format!("meanabsdifference({c})"),
            SqlFunction::CoefficientOfVariation(c) => format!("coeffofvariation({c})"),
        }
    }

    /// Returns `true` for aggregating functions.
    pub fn is_aggregate(&self) -> bool {
        matches!(
            self,
            SqlFunction::Count(_)
                | SqlFunction::Sum(_)
                | SqlFunction::Avg(_)
                | SqlFunction::Min(_)
                | SqlFunction::Max(_)
                | SqlFunction::Variance(_)
                | SqlFunction::StDev(_)
                | SqlFunction::MeanAbsoluteDifference(_)
                | SqlFunction::CoefficientOfVariation(_)
        )
    }

    fn function_name(&self) -> &'static str {
        match self {
            SqlFunction::Lower(_) => "lower",
            SqlFunction::Upper(_) => "upper",
            SqlFunction::Length(_) => "length",
            SqlFunction::Trim(_) => "trim",
            SqlFunction::LTrim(_) => "ltrim",
            SqlFunction::RTrim(_) => "rtrim",
            SqlFunction::SubStr { .. } => "substr",
            SqlFunction::Concat(_) => "concat",
            SqlFunction::Md5Hash(_) => "hash",
            SqlFunction::Sha1Hash(_) => "sha1",
            SqlFunction::Sha224Hash(_) => "sha224",
            SqlFunction::Sha256Hash(_) => "sha256",
            SqlFunction::Sha384Hash(_) => "sha384",
            SqlFunction::Sha512Hash(_) => "sha512",
            SqlFunction::ExtractYear(_) => "year",
            SqlFunction::ExtractMonth(_) => "month",
            SqlFunction::ExtractDay(_) => "day",
            SqlFunction::ExtractHour(_) => "hour",
            SqlFunction::ExtractMinute(_) => "minute",
            SqlFunction::ExtractSecond(_) => "second",
            SqlFunction::Count(_) => "count",
            SqlFunction::Sum(_) => "sum",
            SqlFunction::Avg(_) => "avg",
            SqlFunction::Min(_) => "min",
            SqlFunction::Max(_) => "max",
            SqlFunction::Variance(_) => "variance",
            SqlFunction::StDev(_) => "stdev",
            SqlFunction::MeanAbsoluteDifference(_) => "meanabsdifference",
            SqlFunction::CoefficientOfVariation(_) => "coeffofvariation",
        }
    }

    /// The automatic alias used by `aggregate`, `height__sum`.
    pub fn aggregate_name(&self) -> String {
        format!("{}__{}", self.field_name(), self.function_name())
    }

    /// Aggregates locally over materialised values. Returns `None` for
    /// non-aggregate functions or empty input.
    pub fn python_aggregation(&self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return match self {
                SqlFunction::Count(_) => Some(0.0),
                _ => None,
            };
        }
        let count = values.len() as f64;
        let total: f64 = values.iter().sum();
        let mean = total / count;
        let value = match self {
            SqlFunction::Count(_) => count,
            SqlFunction::Sum(_) => total,
            SqlFunction::Avg(_) => mean,
            SqlFunction::Min(_) => values.iter().cloned().fold(f64::INFINITY, f64::min),
            SqlFunction::Max(_) => values.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
            SqlFunction::Variance(_) => population_variance(values, mean),
            SqlFunction::StDev(_) => population_variance(values, mean).sqrt(),
            SqlFunction::MeanAbsoluteDifference(_) => mean_absolute_difference(values, mean),
            SqlFunction::CoefficientOfVariation(_) => {
                mean_absolute_difference(values, mean) / mean
            }
            _ => return None,
        };
        Some(value)
    }
}

fn population_variance(values: &[f64], mean: f64) -> f64 {
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64
}

fn mean_absolute_difference(values: &[f64], mean: f64) -> f64 {
    values.iter().map(|v| (v - mean).abs()).sum::<f64>() / values.len() as f64
}

// ---------------------------------------------------------------------------
// Window functions
// ---------------------------------------------------------------------------

/// A window function call, `rank() over (partition by … order by …)`.
#[derive(Debug, Clone, PartialEq)]
pub enum WindowFunction {
    Rank,
    PercentRank,
    DenseRank,
    CumeDist,
    RowNumber,
    FirstValue(String),
    LastValue(String),
    NthValue(String, i64),
    NTile(i64),
    Lag(String),
    Lead(String),
}

impl WindowFunction {
    fn call_sql(&self) -> String {
        match self {
            WindowFunction::Rank => "rank()".to_string(),
            WindowFunction::PercentRank => "percent_rank()".to_string(),
            WindowFunction::DenseRank => "dense_rank()".to_string(),
            WindowFunction::CumeDist => "cume_dist()".to_string(),
            WindowFunction::RowNumber => "row_number()".to_string(),
            WindowFunction::FirstValue(expr) => format!("first_value({expr})"),
            WindowFunction::LastValue(expr) => format!("last_value({expr})"),
            WindowFunction::NthValue(expr, n) => format!("nth_value({expr}, {n})"),
            WindowFunction::NTile(n) => format!("ntile({n})"),
            WindowFunction::Lag(expr) => format!("lag({expr})"),
            WindowFunction::Lead(expr) => format!("lead({expr})"),
        }
    }

    fn default_order(&self) -> Option<String> {
        match self {
            WindowFunction::FirstValue(expr)
            | WindowFunction::LastValue(expr)
            | WindowFunction::NthValue(expr, _)
            | WindowFunction::Lag(expr)
            | WindowFunction::Lead(expr) => Some(expr.clone()),
            _ => None,
        }
    }
}

/// Wraps a window function with its `over` clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    pub function: WindowFunction,
    pub partition_by: Option<String>,
    pub order_by: Vec<String>,
}

impl Window {
    pub fn new(function: WindowFunction) -> Window {
        Window {
            function,
            partition_by: None,
            order_by: Vec::new(),
        }
    }

    pub fn partition_by(mut self, column: impl Into<String>) -> Window {
        self.partition_by = Some(column.into());
        self
    }

    pub fn order_by(mut self, column: impl Into<String>) -> Window {
        self.order_by.push(column.into());
        self
    }

    pub fn as_sql(&self) -> String {
        let mut over = Vec::new();
        if let Some(partition) = &self.partition_by {
            over.push(format!("partition by {partition}"));
        }

        let ordering = if self.order_by.is_empty() {
            self.function.default_order().into_iter().collect()
        } else {
            self.order_by.clone()
        };
        if !ordering.is_empty() {
            over.push(format!("order by {}", sql::comma_join(ordering)));
        }

        format!(
            "{} over ({})",
            self.function.call_sql(),
            sql::simple_join(over, true)
        )
    }
}

// ---------------------------------------------------------------------------
// Annotations
// ---------------------------------------------------------------------------

/// A value attachable to a queryset under an alias.
#[derive(Debug, Clone)]
pub enum Annotation {
    Function(SqlFunction),
    Window(Window),
    Case(Case),
    Expression(Expr),
}

impl Annotation {
    /// Renders the aliased select fragment, `lower(name) as lowered`.
    ///
    /// `case` expressions carry the alias themselves; the annotation key is
    /// installed when none was set explicitly.
    pub fn as_sql(&self, alias: &str) -> Result<String> {
        let fragment = match self {
            Annotation::Function(func) => func.as_sql(),
            Annotation::Window(window) => window.as_sql(),
            Annotation::Case(case) => {
                let mut case = case.clone();
                if case.alias.is_none() {
                    case.alias = Some(alias.to_string());
                }
                return Ok(sql::simple_join(case.as_sql().map_err(crate::error::LorelieError::Core)?, true));
            }
            Annotation::Expression(expr) => sql::simple_join(
                expr.as_sql().map_err(crate::error::LorelieError::Core)?,
                true,
            ),
        };
        Ok(sql::build_alias(&fragment, alias))
    }
}

impl From<SqlFunction> for Annotation {
    fn from(value: SqlFunction) -> Self {
        Annotation::Function(value)
    }
}

impl From<Window> for Annotation {
    fn from(value: Window) -> Self {
        Annotation::Window(value)
    }
}

impl From<Case> for Annotation {
    fn from(value: Case) -> Self {
        Annotation::Case(value)
    }
}

impl From<Expr> for Annotation {
    fn from(value: Expr) -> Self {
        Annotation::Expression(value)
    }
}

// ---------------------------------------------------------------------------
// User-defined function registration
// ---------------------------------------------------------------------------

/// Registers every user-defined callback on a fresh connection: the hash
/// family, `regexp(pattern, text)` and the stateful aggregates.
pub fn register_udfs(conn: &Connection) -> rusqlite::Result<()> {
    let flags = FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC;

    conn.create_scalar_function("hash", 1, flags, |ctx| {
        Ok(hex_digest::<md5::Md5>(&text_argument(ctx)?))
    })?;
    conn.create_scalar_function("sha1", 1, flags, |ctx| {
        Ok(hex_digest::<sha1::Sha1>(&text_argument(ctx)?))
    })?;
    conn.create_scalar_function("sha224", 1, flags, |ctx| {
        Ok(hex_digest::<sha2::Sha224>(&text_argument(ctx)?))
    })?;
    conn.create_scalar_function("sha256", 1, flags, |ctx| {
        Ok(hex_digest::<sha2::Sha256>(&text_argument(ctx)?))
    })?;
    conn.create_scalar_function("sha384", 1, flags, |ctx| {
        Ok(hex_digest::<sha2::Sha384>(&text_argument(ctx)?))
    })?;
    conn.create_scalar_function("sha512", 1, flags, |ctx| {
        Ok(hex_digest::<sha2::Sha512>(&text_argument(ctx)?))
    })?;

    conn.create_scalar_function("regexp", 2, flags, |ctx| {
        let pattern: String = ctx.get(0)?;
        let text: String = ctx.get(1)?;
        let re = regex::Regex::new(&pattern)
            .map_err(|e| rusqlite::Error::UserFunctionError(Box::new(e)))?;
        Ok(re.is_match(&text) as i64)
    })?;

    conn.create_aggregate_function("variance", 1, flags, VarianceFn)?;
    conn.create_aggregate_function("stdev", 1, flags, StDevFn)?;
    conn.create_aggregate_function("meanabsdifference", 1, flags, MeanAbsDifferenceFn)?;
    conn.create_aggregate_function("coeffofvariation", 1, flags, CoeffOfVariationFn)?;
    Ok(())
}

fn text_argument(ctx: &Context<'_>) -> rusqlite::Result<String> {
    let value: rusqlite::types::Value = ctx.get(0)?;
    Ok(match value {
        rusqlite::types::Value::Null => String::new(),
        rusqlite::types::Value::Integer(i) => i.to_string(),
        rusqlite::types::Value::Real(f) => f.to_string(),
        rusqlite::types::Value::Text(s) => s,
        rusqlite::types::Value::Blob(b) => String::from_utf8_lossy(&b).into_owned(),
    })
}

fn hex_digest<D: Digest>(input: &str) -> String {
    hex::encode(D::digest(input.as_bytes()))
}

/// Running state shared by the spread aggregates.
#[derive(Default)]
struct SpreadState {
    values: Vec<f64>,
    total: f64,
}

impl SpreadState {
    fn step(&mut self, ctx: &mut Context<'_>) -> rusqlite::Result<()> {
        // Nulls are skipped, matching the builtin aggregates.
        if let Some(value) = ctx.get::<Option<f64>>(0)? {
            self.total += value;
            self.values.push(value);
        }
        Ok(())
    }

    fn mean(&self) -> f64 {
        self.total / self.values.len() as f64
    }

    fn variance(&self) -> f64 {
        population_variance(&self.values, self.mean())
    }

    fn mean_absolute_difference(&self) -> f64 {
        mean_absolute_difference(&self.values, self.mean())
    }
}

macro_rules! spread_aggregate {
    ($name:ident, $compute:expr) => {
        struct $name;

        impl Aggregate<SpreadState, Option<f64>> for $name {
            fn init(&self, _: &mut Context<'_>) -> rusqlite::Result<SpreadState> {
                Ok(SpreadState::default())
            }

            fn step(&self, ctx: &mut Context<'_>, state: &mut SpreadState) -> rusqlite::Result<()> {
                state.step(ctx)
            }

            fn finalize(
                &self,
                _: &mut Context<'_>,
                state: Option<SpreadState>,
            ) -> rusqlite::Result<Option<f64>> {
                let compute: fn(&SpreadState) -> f64 = $compute;
                Ok(state
                    .filter(|s| !s.values.is_empty())
                    .map(|s| compute(&s)))
            }
        }
    };
}

spread_aggregate!(VarianceFn, |s| s.variance());
spread_aggregate!(StDevFn, |s| s.variance().sqrt());
spread_aggregate!(MeanAbsDifferenceFn, |s| s.mean_absolute_difference());
spread_aggregate!(CoeffOfVariationFn, |s| s.mean_absolute_difference() / s.mean());

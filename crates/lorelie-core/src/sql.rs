//! SQL token helpers shared by every statement producer.
//!
//! The dialect is SQLite 3 with lower-case keywords, unquoted identifiers
//! and single-quoted values (embedded quotes doubled).

use crate::literal::{Literal, quote_str};

/// Joins values with `, `.
pub fn comma_join<S: AsRef<str>>(values: impl IntoIterator<Item = S>) -> String {
    values
        .into_iter()
        .map(|v| v.as_ref().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Joins conditions with a logical operator.
///
/// ```
/// # use lorelie_core::sql::operator_join;
/// let sql = operator_join(["name='Kendall'", "surname='Jenner'"], "and");
/// assert_eq!(sql, "name='Kendall' and surname='Jenner'");
/// ```
pub fn operator_join<S: AsRef<str>>(values: impl IntoIterator<Item = S>, operator: &str) -> String {
    values
        .into_iter()
        .map(|v| v.as_ref().to_string())
        .collect::<Vec<_>>()
        .join(&format!(" {operator} "))
}

/// Joins tokens with a single space, or fuses them when `spaced` is false.
pub fn simple_join<S: AsRef<str>>(values: impl IntoIterator<Item = S>, spaced: bool) -> String {
    let sep = if spaced { " " } else { "" };
    values
        .into_iter()
        .map(|v| v.as_ref().to_string())
        .collect::<Vec<_>>()
        .join(sep)
}

/// Ensures a statement ends with `;`.
pub fn finalize_sql(sql: &str) -> String {
    if sql.ends_with(';') {
        sql.to_string()
    } else {
        format!("{sql};")
    }
}

/// Returns the statement without a trailing `;`.
pub fn de_sqlize_statement(sql: &str) -> String {
    sql.strip_suffix(';').unwrap_or(sql).to_string()
}

/// Wraps a value in parentheses.
pub fn wrap_parenthesis(value: &str) -> String {
    format!("({value})")
}

/// Returns the alias form of a condition, `count(name) as top_names`.
pub fn build_alias(condition: &str, alias: &str) -> String {
    format!("{condition} as {alias}")
}

/// Joins finalized statements into a script, one per line.
pub fn build_script<S: AsRef<str>>(statements: impl IntoIterator<Item = S>) -> String {
    statements
        .into_iter()
        .map(|s| finalize_sql(s.as_ref()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Quotes a value with a trailing wildcard, `'kendall%'`.
pub fn quote_startswith(value: &Literal) -> String {
    quote_str(&format!("{}%", value.as_text()))
}

/// Quotes a value with a leading wildcard, `'%kendall'`.
pub fn quote_endswith(value: &Literal) -> String {
    quote_str(&format!("%{}", value.as_text()))
}

/// Quotes a value wrapped in wildcards, `'%kendall%'`.
pub fn quote_like(value: &Literal) -> String {
    quote_str(&format!("%{}%", value.as_text()))
}

/// Quotes multiple values at once.
pub fn quote_values(values: &[Literal]) -> Vec<String> {
    values.iter().map(Literal::quote).collect()
}

/// Transforms a column path and operator into dot notation,
/// `followers.id = 1`.
pub fn build_dot_notation(path: &[String], operator: &str, value: &Literal) -> String {
    format!("{} {} {}", path.join("."), operator, value.quote())
}

/// Generates a short random hex token used to suffix generated names
/// (constraints, indexes, migration ids).
pub fn token_hex(bytes: usize) -> String {
    use rand::Rng;
    let mut rng = rand::rng();
    (0..bytes).map(|_| format!("{:02x}", rng.random::<u8>())).collect()
}

//! Literal values exchanged with the database and their quoting rules.

use std::fmt;

/// A literal value on its way into an SQL statement.
///
/// Mirrors SQLite's storage classes plus the composite shapes the filter
/// layer accepts (`in` lists, JSON documents). Conversions from the usual
/// Rust types are provided so call sites can pass plain values.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Json(serde_json::Value),
    Blob(Vec<u8>),
    List(Vec<Literal>),
}

impl Literal {
    /// Returns the raw textual content of the literal, without quoting.
    ///
    /// Used when a value is embedded inside a wildcard pattern
    /// (`like '%value%'`) or a date format string.
    pub fn as_text(&self) -> String {
        match self {
            Literal::Null => String::new(),
            Literal::Bool(b) => if *b { "1" } else { "0" }.to_string(),
            Literal::Int(i) => i.to_string(),
            Literal::Float(f) => f.to_string(),
            Literal::Text(s) => s.clone(),
            Literal::Json(v) => v.to_string(),
            Literal::Blob(b) => String::from_utf8_lossy(b).into_owned(),
            Literal::List(values) => {
                let parts: Vec<String> = values.iter().map(Literal::as_text).collect();
                format!("[{}]", parts.join(", "))
            }
        }
    }

    /// Returns `true` when the literal reads as truthy (used by `isnull`).
    pub fn is_truthy(&self) -> bool {
        match self {
            Literal::Null => false,
            Literal::Bool(b) => *b,
            Literal::Int(i) => *i != 0,
            Literal::Float(f) => *f != 0.0,
            Literal::Text(s) => !s.is_empty(),
            Literal::Json(v) => !v.is_null(),
            Literal::Blob(b) => !b.is_empty(),
            Literal::List(values) => !values.is_empty(),
        }
    }

    /// Quotes the literal for inclusion in an SQL statement.
    ///
    /// Numbers pass through unquoted, `Null` becomes `''`, booleans become
    /// `1`/`0`. Text is single-quoted with embedded single quotes doubled;
    /// text that already carries its quotes passes through untouched.
    pub fn quote(&self) -> String {
        match self {
            Literal::Null => "''".to_string(),
            Literal::Bool(b) => if *b { "1" } else { "0" }.to_string(),
            Literal::Int(i) => i.to_string(),
            Literal::Float(f) => f.to_string(),
            Literal::Text(s) => quote_str(s),
            Literal::Json(v) => quote_str(&v.to_string()),
            Literal::Blob(b) => quote_str(&String::from_utf8_lossy(b)),
            Literal::List(_) => quote_str(&self.as_text()),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

/// Quotes a plain string, doubling any embedded single quote.
pub fn quote_str(value: &str) -> String {
    if value.starts_with('\'') && value.ends_with('\'') && value.len() >= 2 {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', "''"))
}

impl From<bool> for Literal {
    fn from(value: bool) -> Self {
        Literal::Bool(value)
    }
}

impl From<i32> for Literal {
    fn from(value: i32) -> Self {
        Literal::Int(value as i64)
    }
}

impl From<i64> for Literal {
    fn from(value: i64) -> Self {
        Literal::Int(value)
    }
}

impl From<u32> for Literal {
    fn from(value: u32) -> Self {
        Literal::Int(value as i64)
    }
}

impl From<f64> for Literal {
    fn from(value: f64) -> Self {
        Literal::Float(value)
    }
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Literal::Text(value.to_string())
    }
}

impl From<String> for Literal {
    fn from(value: String) -> Self {
        Literal::Text(value)
    }
}

impl From<serde_json::Value> for Literal {
    fn from(value: serde_json::Value) -> Self {
        Literal::Json(value)
    }
}

impl<T: Into<Literal>> From<Vec<T>> for Literal {
    fn from(values: Vec<T>) -> Self {
        Literal::List(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Literal>, const N: usize> From<[T; N]> for Literal {
    fn from(values: [T; N]) -> Self {
        Literal::List(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Literal>> From<Option<T>> for Literal {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => Literal::Null,
        }
    }
}

/// Shorthand constructor, handy at call sites building parameter lists.
pub fn lit(value: impl Into<Literal>) -> Literal {
    value.into()
}

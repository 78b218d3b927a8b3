//! Field and table level constraints, emitted into `create table`.

use crate::error::Result;
use crate::expressions::Expr;
use crate::sql;

/// A constraint attached to a field or a table.
#[derive(Debug, Clone)]
pub enum Constraint {
    Check(CheckConstraint),
    Unique(UniqueConstraint),
    MaxLength(MaxLengthConstraint),
    MinValue(MinValueConstraint),
    MaxValue(MaxValueConstraint),
}

impl Constraint {
    pub fn name(&self) -> &str {
        match self {
            Constraint::Check(c) => &c.name,
            Constraint::Unique(c) => &c.name,
            Constraint::MaxLength(c) => &c.name,
            Constraint::MinValue(c) => &c.name,
            Constraint::MaxValue(c) => &c.name,
        }
    }

    /// Emits the create-table fragment for the constraint.
    pub fn as_sql(&self) -> Result<String> {
        match self {
            Constraint::Check(c) => c.as_sql(),
            Constraint::Unique(c) => Ok(c.as_sql()),
            Constraint::MaxLength(c) => Ok(c.as_sql()),
            Constraint::MinValue(c) => Ok(c.as_sql()),
            Constraint::MaxValue(c) => Ok(c.as_sql()),
        }
    }

    /// Serialises to `(name, fragment)` for the migration file.
    pub fn deconstruct(&self) -> Result<(String, String)> {
        Ok((self.name().to_string(), self.as_sql()?))
    }
}

fn generated_name(prefix: &str, name: &str) -> String {
    format!("{prefix}_{name}_{}", sql::token_hex(5))
}

/// Enforces a boolean predicate over one or more columns,
/// `check(name!='Kendall')`.
#[derive(Debug, Clone)]
pub struct CheckConstraint {
    pub name: String,
    pub condition: Expr,
}

impl CheckConstraint {
    /// Creates a constraint with an explicit name.
    pub fn new(name: impl Into<String>, condition: impl Into<Expr>) -> Self {
        CheckConstraint {
            name: name.into(),
            condition: condition.into(),
        }
    }

    /// Creates a constraint whose name carries a random suffix.
    pub fn generated(name: &str, condition: impl Into<Expr>) -> Self {
        CheckConstraint::new(generated_name("chk", name), condition)
    }

    pub fn as_sql(&self) -> Result<String> {
        let condition = sql::simple_join(self.condition.as_sql()?, true);
        Ok(format!("check({condition})"))
    }
}

/// Enforces uniqueness over a set of columns, `unique(name, surname)`.
#[derive(Debug, Clone)]
pub struct UniqueConstraint {
    pub name: String,
    pub fields: Vec<String>,
}

impl UniqueConstraint {
    pub fn new(name: impl Into<String>, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        UniqueConstraint {
            name: name.into(),
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn generated(name: &str, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        UniqueConstraint::new(generated_name("unq", name), fields)
    }

    pub fn as_sql(&self) -> String {
        format!("unique({})", sql::comma_join(&self.fields))
    }
}

/// Caps the length of a text column, `check(length(name)<=60)`.
#[derive(Debug, Clone)]
pub struct MaxLengthConstraint {
    pub name: String,
    pub limit: usize,
    pub field_name: String,
}

impl MaxLengthConstraint {
    pub fn new(limit: usize, field_name: &str) -> Self {
        MaxLengthConstraint {
            name: generated_name("chk", field_name),
            limit,
            field_name: field_name.to_string(),
        }
    }

    pub fn as_sql(&self) -> String {
        format!("check(length({})<={})", self.field_name, self.limit)
    }
}

/// Enforces a lower bound on a numeric column, `check(height>=150)`.
#[derive(Debug, Clone)]
pub struct MinValueConstraint {
    pub name: String,
    pub limit: i64,
    pub field_name: String,
}

impl MinValueConstraint {
    pub fn new(limit: i64, field_name: &str) -> Self {
        MinValueConstraint {
            name: generated_name("chk", field_name),
            limit,
            field_name: field_name.to_string(),
        }
    }

    pub fn as_sql(&self) -> String {
        format!("check({}>={})", self.field_name, self.limit)
    }
}

/// Enforces an upper bound on a numeric column, `check(height<=220)`.
#[derive(Debug, Clone)]
pub struct MaxValueConstraint {
    pub name: String,
    pub limit: i64,
    pub field_name: String,
}

impl MaxValueConstraint {
    pub fn new(limit: i64, field_name: &str) -> Self {
        MaxValueConstraint {
            name: generated_name("chk", field_name),
            limit,
            field_name: field_name.to_string(),
        }
    }

    pub fn as_sql(&self) -> String {
        format!("check({}<={})", self.field_name, self.limit)
    }
}

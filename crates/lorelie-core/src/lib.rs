//! Core building blocks for the lorelie query layer: literal quoting, SQL
//! token helpers, the filter decomposer, the expression algebra and the
//! typed field descriptors with their value coercion.
//!
//! Nothing in this crate touches a database; everything lowers to SQL text
//! consumed by `lorelie-db`.

pub mod constraints;
pub mod error;
pub mod expressions;
pub mod fields;
pub mod filters;
pub mod literal;
pub mod sql;
pub mod validators;

pub use constraints::{
    CheckConstraint, Constraint, MaxLengthConstraint, MaxValueConstraint, MinValueConstraint,
    UniqueConstraint,
};
pub use error::{CoreError, Result};
pub use expressions::{Case, CombinedExpression, Expr, ExprOperator, F, Q, Value, When};
pub use fields::{AliasField, Field, FieldKind, NativeValue};
pub use filters::{FilterExpr, Op};
pub use literal::{Literal, lit};
pub use validators::Validator;

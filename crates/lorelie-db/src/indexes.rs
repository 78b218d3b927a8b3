//! Index declarations, with optional partial-index predicates.

use lorelie_core::expressions::Expr;
use lorelie_core::sql;

use crate::error::{LorelieError, Result};
use crate::tables::Table;

const MAX_NAME_LENGTH: usize = 30;

/// An index over one or more table fields.
///
/// The emitted name carries a random suffix (`idx_<name>_<token>`) so
/// re-declared indexes never collide with stale ones.
#[derive(Debug, Clone)]
pub struct Index {
    pub name: String,
    pub index_name: String,
    pub fields: Vec<String>,
    /// Partial-index predicate, rendered as a trailing `where` clause.
    pub condition: Option<Expr>,
}

impl Index {
    pub fn new(name: &str, fields: impl IntoIterator<Item = impl Into<String>>) -> Result<Index> {
        if name.len() > MAX_NAME_LENGTH {
            return Err(LorelieError::validation(
                "index name should be maximum 30 characters long",
            ));
        }
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        if fields.is_empty() {
            return Err(LorelieError::validation(
                "at least one field must be provided to create an index",
            ));
        }
        Ok(Index {
            name: name.to_string(),
            index_name: format!("idx_{name}_{}", sql::token_hex(5)),
            fields,
            condition: None,
        })
    }

    pub fn condition(mut self, condition: impl Into<Expr>) -> Index {
        self.condition = Some(condition.into());
        self
    }

    /// Emits the creation statement, verifying every referenced field exists
    /// on the bound table.
    pub fn as_sql(&self, table: &Table) -> Result<String> {
        for field in &self.fields {
            table.get_field(field)?;
        }

        let mut statement = format!(
            "create index {} on {} ({})",
            self.index_name,
            table.name,
            sql::comma_join(&self.fields)
        );
        if let Some(condition) = &self.condition {
            let predicate = sql::simple_join(
                condition.as_sql().map_err(LorelieError::Core)?,
                true,
            );
            statement.push_str(&format!(" where {predicate}"));
        }
        Ok(statement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lorelie_core::expressions::Q;
    use lorelie_core::fields::Field;

    fn celebrities() -> Table {
        Table::new(
            "celebrities",
            vec![Field::char("name"), Field::integer("age")],
        )
        .unwrap()
    }

    #[test]
    fn basic_index_sql() {
        let index = Index::new("names", ["name"]).unwrap();
        let sql = index.as_sql(&celebrities()).unwrap();
        assert!(sql.starts_with("create index idx_names_"));
        assert!(sql.ends_with("on celebrities (name)"));
    }

    #[test]
    fn partial_index_sql() {
        let index = Index::new("adults", ["age"])
            .unwrap()
            .condition(Q::filter("age__gte", 18));
        let sql = index.as_sql(&celebrities()).unwrap();
        assert!(sql.ends_with("on celebrities (age) where age>=18"));
    }

    #[test]
    fn unknown_field_is_rejected() {
        let index = Index::new("emails", ["email"]).unwrap();
        assert!(index.as_sql(&celebrities()).is_err());
    }

    #[test]
    fn construction_limits() {
        assert!(Index::new("a".repeat(31).as_str(), ["name"]).is_err());
        assert!(Index::new("names", Vec::<String>::new()).is_err());
    }
}

//! [`Table`] -- a declared schema with its ordered field map.

use std::sync::OnceLock;

use lorelie_core::constraints::Constraint;
use lorelie_core::fields::{Field, FieldKind};
use lorelie_core::literal::Literal;
use lorelie_core::sql;

use crate::error::{LorelieError, Result};
use crate::indexes::Index;

/// Names that cannot be used for tables or declared fields.
const RESERVED_FIELD_NAMES: &[&str] = &["rowid", "id"];

fn table_name_pattern() -> &'static regex::Regex {
    static PATTERN: OnceLock<regex::Regex> = OnceLock::new();
    PATTERN.get_or_init(|| regex::Regex::new(r"^(\w+_?)+$").expect("pattern is valid"))
}

/// A table declaration: ordered fields, the autoincrement `id` primary key,
/// table constraints and indexes.
#[derive(Debug, Clone)]
pub struct Table {
    pub name: String,
    fields: Vec<Field>,
    pub indexes: Vec<Index>,
    pub constraints: Vec<Constraint>,
    /// Default ordering applied by `all()`.
    pub ordering: Vec<String>,
    /// The display column, defaults to `id`.
    pub str_field: String,
    /// Date/datetime fields filled with the current moment on creation.
    pub auto_add_fields: Vec<String>,
    /// Date/datetime fields filled with the current moment on update.
    pub auto_update_fields: Vec<String>,
    pub is_prepared: bool,
    /// Name of the database the table is bound to.
    pub database_name: Option<String>,
}

impl Table {
    /// Declares a table. The name is validated and lower-cased; an
    /// autoincrement `id` primary key is appended automatically, so
    /// declaring `id` or `rowid` is an error.
    pub fn new(name: &str, fields: Vec<Field>) -> Result<Table> {
        let name = Self::validate_table_name(name)?;

        let mut auto_add_fields = Vec::new();
        let mut auto_update_fields = Vec::new();
        let mut prepared_fields = Vec::with_capacity(fields.len() + 1);

        for (index, mut field) in fields.into_iter().enumerate() {
            if RESERVED_FIELD_NAMES.contains(&field.name.as_str()) {
                return Err(LorelieError::validation(format!(
                    "invalid name \"{}\" for a declared field",
                    field.name
                )));
            }
            if prepared_fields.iter().any(|f: &Field| f.name == field.name) {
                return Err(LorelieError::validation(format!(
                    "field \"{}\" is declared twice",
                    field.name
                )));
            }
            if matches!(field.kind, FieldKind::Date | FieldKind::DateTime) {
                if field.auto_add {
                    auto_add_fields.push(field.name.clone());
                }
                if field.auto_update {
                    auto_update_fields.push(field.name.clone());
                }
            }
            field.index = index;
            prepared_fields.push(field);
        }

        let mut id_field = Field::auto();
        id_field.index = prepared_fields.len();
        prepared_fields.push(id_field);

        Ok(Table {
            name,
            fields: prepared_fields,
            indexes: Vec::new(),
            constraints: Vec::new(),
            ordering: Vec::new(),
            str_field: "id".to_string(),
            auto_add_fields,
            auto_update_fields,
            is_prepared: false,
            database_name: None,
        })
    }

    /// Validates and normalises a table name.
    pub fn validate_table_name(name: &str) -> Result<String> {
        if name == "objects" {
            return Err(LorelieError::validation(
                "table name uses a reserved keyword: objects",
            ));
        }
        if name.chars().any(char::is_whitespace) {
            return Err(LorelieError::validation("table name contains spaces"));
        }
        if !table_name_pattern().is_match(name) {
            return Err(LorelieError::validation(format!(
                "table name contains invalid characters: {name}"
            )));
        }
        Ok(name.to_lowercase())
    }

    // -- Builder methods -----------------------------------------------------

    pub fn with_indexes(mut self, indexes: Vec<Index>) -> Table {
        self.indexes = indexes;
        self
    }

    pub fn with_constraints(mut self, constraints: Vec<Constraint>) -> Table {
        self.constraints = constraints;
        self
    }

    pub fn with_ordering(mut self, ordering: impl IntoIterator<Item = impl Into<String>>) -> Table {
        self.ordering = ordering.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_str_field(mut self, str_field: impl Into<String>) -> Table {
        self.str_field = str_field.into();
        self
    }

    // -- Field access --------------------------------------------------------

    /// Declared field names plus `id`, in declaration order.
    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }

    /// Looks a field up, raising [`LorelieError::FieldExists`] when missing.
    pub fn get_field(&self, name: &str) -> Result<&Field> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| LorelieError::field_exists(name, &self.name, &self.field_names()))
    }

    /// Adds a field after preparation. The caller is responsible for issuing
    /// the matching `alter table` statement (the migration layer does).
    pub fn add_field(&mut self, mut field: Field) -> Result<()> {
        if self.has_field(&field.name) {
            return Err(LorelieError::validation(format!(
                "field \"{}\" is already present on the table",
                field.name
            )));
        }
        field.index = self.fields.len();
        self.fields.push(field);
        Ok(())
    }

    /// The table-scoped column views used by resolvers.
    pub fn columns(&self) -> Vec<Column> {
        self.fields
            .iter()
            .map(|field| Column {
                name: field.name.clone(),
                full_column_name: format!("{}.{}", self.name, field.name),
                index: field.index,
            })
            .collect()
    }

    // -- Value validation ----------------------------------------------------

    /// Validates values headed for an insert or update: unknown columns are
    /// an error, `id`/`rowid` are skipped, everything else runs through the
    /// owning field's database coercion.
    pub fn validate_values(
        &self,
        values: &[(String, Literal)],
    ) -> Result<Vec<(String, Literal)>> {
        let mut validated = Vec::with_capacity(values.len());
        for (name, value) in values {
            if RESERVED_FIELD_NAMES.contains(&name.as_str()) {
                continue;
            }
            let field = self.get_field(name)?;
            let clean = field.to_database(value).map_err(LorelieError::Core)?;
            validated.push((name.clone(), clean));
        }
        Ok(validated)
    }

    // -- DDL -----------------------------------------------------------------

    /// The SQL creation parameters of every field, in declaration order.
    pub fn build_all_field_parameters(&self) -> Vec<Vec<String>> {
        self.fields.iter().map(Field::field_parameters).collect()
    }

    /// Generates the `create table` statement: fields and unique constraints
    /// comma-joined, check constraints appended with spaces.
    pub fn create_table_sql(&self) -> Result<Vec<String>> {
        let field_params: Vec<String> = self
            .build_all_field_parameters()
            .iter()
            .map(|params| sql::simple_join(params, true))
            .collect();

        let mut unique_constraints = Vec::new();
        let mut check_constraints = Vec::new();
        for constraint in &self.constraints {
            let constraint_sql = constraint.as_sql().map_err(LorelieError::Core)?;
            match constraint {
                Constraint::Unique(_) => unique_constraints.push(constraint_sql),
                _ => check_constraints.push(constraint_sql),
            }
        }

        let mut comma_parts = vec![sql::comma_join(field_params)];
        comma_parts.extend(unique_constraints);
        let joined_unique = sql::comma_join(comma_parts);

        let mut all_parts = vec![joined_unique];
        all_parts.extend(check_constraints);
        let joined_all = sql::simple_join(all_parts, true);

        Ok(vec![format!(
            "create table if not exists {} ({joined_all})",
            self.name
        )])
    }

    pub fn drop_table_sql(&self) -> Vec<String> {
        vec![format!("drop table if exists {}", self.name)]
    }

    /// Generates `alter table … add column` for one field.
    pub fn add_column_sql(&self, field: &Field) -> Vec<String> {
        let params = sql::simple_join(field.field_parameters(), true);
        vec![format!("alter table {} add column {params}", self.name)]
    }

    pub(crate) fn bind(&mut self, database_name: Option<&str>) {
        self.database_name = Some(
            database_name
                .map(str::to_string)
                .unwrap_or_else(|| ":memory:".to_string()),
        );
    }

    /// Refuses operations on a table used outside of a database.
    pub fn check_bound(&self) -> Result<()> {
        if self.database_name.is_none() {
            return Err(LorelieError::ImproperlyConfigured {
                table: self.name.clone(),
                message: "the table has no backend attached; add it to a Database".to_string(),
            });
        }
        Ok(())
    }
}

impl PartialEq for Table {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.field_names() == other.field_names()
    }
}

/// A table-scoped, fully qualified view of a field.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub full_column_name: String,
    pub index: usize,
}

impl std::fmt::Display for Column {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.full_column_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lorelie_core::constraints::UniqueConstraint;
    use lorelie_core::expressions::Q;
    use lorelie_core::lit;
    use pretty_assertions::assert_eq;

    fn celebrities() -> Table {
        Table::new(
            "celebrities",
            vec![
                Field::char("name"),
                Field::integer("height").default(150).min_value(150),
            ],
        )
        .unwrap()
    }

    #[test]
    fn auto_id_is_appended() {
        let table = celebrities();
        assert_eq!(table.field_names(), vec!["name", "height", "id"]);
        let id = table.get_field("id").unwrap();
        assert!(id.primary_key);
        assert!(id.autoincrement);
    }

    #[test]
    fn declaring_id_is_rejected() {
        for reserved in ["id", "rowid"] {
            let result = Table::new("celebrities", vec![Field::integer(reserved)]);
            assert!(result.is_err(), "{reserved} should be reserved");
        }
    }

    #[test]
    fn table_name_validation() {
        assert_eq!(Table::validate_table_name("Celebrities").unwrap(), "celebrities");
        assert!(Table::validate_table_name("objects").is_err());
        assert!(Table::validate_table_name("my table").is_err());
        assert!(Table::validate_table_name("my-table").is_err());
    }

    #[test]
    fn create_table_sql_has_one_auto_primary_key() {
        let table = celebrities();
        let sql = table.create_table_sql().unwrap();
        assert_eq!(
            sql,
            vec![
                "create table if not exists celebrities (name text not null, \
                 height integer default 150 not null check(height>=150), \
                 id integer primary key autoincrement)"
            ]
        );
        assert_eq!(sql[0].matches("primary key autoincrement").count(), 1);
    }

    #[test]
    fn create_table_sql_with_constraints() {
        let table = Table::new("celebrities", vec![Field::char("name")])
            .unwrap()
            .with_constraints(vec![
                Constraint::Unique(UniqueConstraint::new("unq_name", ["name"])),
                Constraint::Check(lorelie_core::CheckConstraint::new(
                    "chk_name",
                    Q::filter("name__ne", "Kendall"),
                )),
            ]);
        let sql = table.create_table_sql().unwrap();
        assert_eq!(
            sql,
            vec![
                "create table if not exists celebrities (name text not null, \
                 id integer primary key autoincrement, unique(name) check(name!='Kendall'))"
            ]
        );
    }

    #[test]
    fn validate_values_coerces_and_rejects() {
        let table = celebrities();
        let validated = table
            .validate_values(&[
                ("name".to_string(), lit("Kendall")),
                ("height".to_string(), lit("184")),
            ])
            .unwrap();
        assert_eq!(validated[1].1, lit(184));

        let unknown = table.validate_values(&[("age".to_string(), lit(1))]);
        assert!(matches!(
            unknown.unwrap_err(),
            LorelieError::FieldExists { .. }
        ));

        let invalid = table.validate_values(&[("height".to_string(), lit(100))]);
        assert!(invalid.is_err(), "min_value validator should run");
    }

    #[test]
    fn add_column_sql() {
        let mut table = celebrities();
        let field = Field::char("alias").null();
        table.add_field(field.clone()).unwrap();
        assert_eq!(
            table.add_column_sql(&field),
            vec!["alter table celebrities add column alias text null"]
        );
        assert!(table.add_field(Field::char("alias")).is_err());
    }

    #[test]
    fn columns_are_qualified() {
        let table = celebrities();
        let columns = table.columns();
        assert_eq!(columns[0].full_column_name, "celebrities.name");
        assert_eq!(columns.last().unwrap().full_column_name, "celebrities.id");
    }

    #[test]
    fn unbound_table_is_refused() {
        let table = celebrities();
        assert!(matches!(
            table.check_bound().unwrap_err(),
            LorelieError::ImproperlyConfigured { .. }
        ));
    }

    #[test]
    fn auto_add_fields_are_collected() {
        let table = Table::new(
            "articles",
            vec![
                Field::char("title"),
                Field::datetime("created_on").auto_add(),
                Field::datetime("updated_on").auto_update(),
            ],
        )
        .unwrap();
        assert_eq!(table.auto_add_fields, vec!["created_on"]);
        assert_eq!(table.auto_update_fields, vec!["updated_on"]);
    }
}

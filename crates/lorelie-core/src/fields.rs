//! Typed field descriptors and their value coercion.
//!
//! A [`Field`] describes one column of a declared table: storage kind,
//! nullability, default, validators and attached constraints. The coercion
//! contract is `to_database` (native value in, SQL-ready literal out,
//! validators run) and `to_python` (raw column value in, native value out).

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};

use crate::constraints::{
    Constraint, MaxLengthConstraint, MaxValueConstraint, MinValueConstraint,
};
use crate::error::{CoreError, Result};
use crate::literal::Literal;
use crate::validators::Validator;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";
pub const TIME_FORMAT: &str = "%H:%M:%S";

/// Storage kind of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Text,
    Integer,
    Real,
    Blob,
    Boolean,
    Date,
    DateTime,
    Time,
    Timestamp,
    Json,
    Uuid,
    Email,
    Slug,
    Url,
}

impl FieldKind {
    /// The column type used in DDL. SQLite accepts the descriptive names
    /// (`date`, `datetime`, `json`); values are stored as ISO text.
    pub fn column_type(&self) -> &'static str {
        match self {
            FieldKind::Text | FieldKind::Uuid | FieldKind::Email | FieldKind::Slug | FieldKind::Url => {
                "text"
            }
            FieldKind::Date => "date",
            FieldKind::DateTime => "datetime",
            FieldKind::Time => "time",
            FieldKind::Json => "json",
            FieldKind::Integer | FieldKind::Boolean => "integer",
            FieldKind::Real | FieldKind::Timestamp => "real",
            FieldKind::Blob => "blob",
        }
    }
}

/// A value reconstructed from the database into its native shape.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Time(NaiveTime),
    Json(serde_json::Value),
    Uuid(uuid::Uuid),
    Bytes(Vec<u8>),
}

impl NativeValue {
    pub fn is_null(&self) -> bool {
        matches!(self, NativeValue::Null)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            NativeValue::Int(i) => Some(*i),
            NativeValue::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            NativeValue::Int(i) => Some(*i as f64),
            NativeValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            NativeValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            NativeValue::Bool(b) => Some(*b),
            NativeValue::Int(i) => Some(*i != 0),
            _ => None,
        }
    }
}

impl std::fmt::Display for NativeValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NativeValue::Null => write!(f, ""),
            NativeValue::Bool(b) => write!(f, "{b}"),
            NativeValue::Int(i) => write!(f, "{i}"),
            NativeValue::Float(v) => write!(f, "{v}"),
            NativeValue::Text(s) => write!(f, "{s}"),
            NativeValue::Date(d) => write!(f, "{}", d.format(DATE_FORMAT)),
            NativeValue::DateTime(d) => write!(f, "{}", d.format(DATETIME_FORMAT)),
            NativeValue::Time(t) => write!(f, "{}", t.format(TIME_FORMAT)),
            NativeValue::Json(v) => write!(f, "{v}"),
            NativeValue::Uuid(u) => write!(f, "{u}"),
            NativeValue::Bytes(b) => write!(f, "{}", String::from_utf8_lossy(b)),
        }
    }
}

/// A typed column descriptor.
#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub kind: FieldKind,
    pub null: bool,
    pub primary_key: bool,
    pub autoincrement: bool,
    pub unique: bool,
    pub default: Option<Literal>,
    /// Lazily materialised default, evaluated at insert time.
    pub default_fn: Option<fn() -> Literal>,
    pub max_length: Option<usize>,
    pub auto_add: bool,
    pub auto_update: bool,
    pub validators: Vec<Validator>,
    pub constraints: Vec<Constraint>,
    /// Stable declaration index, assigned when the field joins a table.
    pub index: usize,
}

impl PartialEq for Field {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Field {
    fn new(name: impl Into<String>, kind: FieldKind) -> Field {
        Field {
            name: name.into(),
            kind,
            null: false,
            primary_key: false,
            autoincrement: false,
            unique: false,
            default: None,
            default_fn: None,
            max_length: None,
            auto_add: false,
            auto_update: false,
            validators: Vec::new(),
            constraints: Vec::new(),
            index: 0,
        }
    }

    pub fn char(name: impl Into<String>) -> Field {
        Field::new(name, FieldKind::Text)
    }

    pub fn integer(name: impl Into<String>) -> Field {
        Field::new(name, FieldKind::Integer)
    }

    pub fn float(name: impl Into<String>) -> Field {
        Field::new(name, FieldKind::Real)
    }

    pub fn boolean(name: impl Into<String>) -> Field {
        Field::new(name, FieldKind::Boolean)
    }

    pub fn date(name: impl Into<String>) -> Field {
        Field::new(name, FieldKind::Date)
    }

    pub fn datetime(name: impl Into<String>) -> Field {
        Field::new(name, FieldKind::DateTime)
    }

    pub fn time(name: impl Into<String>) -> Field {
        Field::new(name, FieldKind::Time)
    }

    pub fn timestamp(name: impl Into<String>) -> Field {
        Field::new(name, FieldKind::Timestamp)
    }

    pub fn json(name: impl Into<String>) -> Field {
        Field::new(name, FieldKind::Json)
    }

    pub fn uuid(name: impl Into<String>) -> Field {
        Field::new(name, FieldKind::Uuid)
    }

    pub fn blob(name: impl Into<String>) -> Field {
        Field::new(name, FieldKind::Blob)
    }

    pub fn email(name: impl Into<String>) -> Field {
        Field::new(name, FieldKind::Email).validator(Validator::Email)
    }

    pub fn slug(name: impl Into<String>) -> Field {
        Field::new(name, FieldKind::Slug)
    }

    pub fn url(name: impl Into<String>) -> Field {
        Field::new(name, FieldKind::Url).validator(Validator::Url)
    }

    /// The reserved autoincrement primary key. Every table gets exactly one,
    /// named `id`; it cannot be declared by the user.
    pub fn auto() -> Field {
        let mut field = Field::new("id", FieldKind::Integer);
        field.primary_key = true;
        field.autoincrement = true;
        field
    }

    // -- Builder methods -----------------------------------------------------

    pub fn null(mut self) -> Field {
        self.null = true;
        self
    }

    pub fn unique(mut self) -> Field {
        self.unique = true;
        self
    }

    pub fn default(mut self, value: impl Into<Literal>) -> Field {
        self.default = Some(value.into());
        self
    }

    /// Sets a default evaluated at insert time.
    pub fn default_fn(mut self, producer: fn() -> Literal) -> Field {
        self.default_fn = Some(producer);
        self
    }

    pub fn max_length(mut self, limit: usize) -> Field {
        self.max_length = Some(limit);
        self.validators.push(Validator::MaxLength(limit));
        self.constraints
            .push(Constraint::MaxLength(MaxLengthConstraint::new(
                limit, &self.name,
            )));
        self
    }

    pub fn min_value(mut self, limit: i64) -> Field {
        self.validators.push(Validator::MinValue(limit));
        self.constraints
            .push(Constraint::MinValue(MinValueConstraint::new(
                limit, &self.name,
            )));
        self
    }

    pub fn max_value(mut self, limit: i64) -> Field {
        self.validators.push(Validator::MaxValue(limit));
        self.constraints
            .push(Constraint::MaxValue(MaxValueConstraint::new(
                limit, &self.name,
            )));
        self
    }

    /// Fills the field with the current date/time on row creation.
    pub fn auto_add(mut self) -> Field {
        self.auto_add = true;
        self.null = true;
        self
    }

    /// Fills the field with the current date/time on row update.
    pub fn auto_update(mut self) -> Field {
        self.auto_update = true;
        self.null = true;
        self
    }

    pub fn validator(mut self, validator: Validator) -> Field {
        self.validators.push(validator);
        self
    }

    // -- Coercion ------------------------------------------------------------

    /// Converts a native value into its SQL-ready representation, running
    /// validators. Type mismatches raise a validation error before any SQL
    /// is produced.
    pub fn to_database(&self, value: &Literal) -> Result<Literal> {
        if matches!(value, Literal::Null) {
            return Ok(Literal::Null);
        }

        let converted = match self.kind {
            FieldKind::Text | FieldKind::Email | FieldKind::Slug | FieldKind::Url => {
                match value {
                    Literal::Text(s) => Literal::Text(s.clone()),
                    Literal::Int(_)
                    | Literal::Float(_)
                    | Literal::Bool(_)
                    | Literal::Json(_)
                    | Literal::List(_) => Literal::Text(value.as_text()),
                    other => return Err(self.mismatch(other, "text")),
                }
            }
            FieldKind::Integer => match value {
                Literal::Int(i) => Literal::Int(*i),
                Literal::Bool(b) => Literal::Int(*b as i64),
                Literal::Float(f) if f.fract() == 0.0 => Literal::Int(*f as i64),
                Literal::Text(s) => Literal::Int(
                    s.parse::<i64>()
                        .map_err(|_| self.mismatch(value, "integer"))?,
                ),
                other => return Err(self.mismatch(other, "integer")),
            },
            FieldKind::Real => match value {
                Literal::Float(f) => Literal::Float(*f),
                Literal::Int(i) => Literal::Float(*i as f64),
                Literal::Text(s) => Literal::Float(
                    s.parse::<f64>().map_err(|_| self.mismatch(value, "real"))?,
                ),
                other => return Err(self.mismatch(other, "real")),
            },
            FieldKind::Boolean => Literal::Int(coerce_boolean(value).ok_or_else(|| {
                CoreError::validation(format!(
                    "the value for '{}' should be either one of true, false, 0, 1, '0', '1', 't' or 'f'",
                    self.name
                ))
            })?),
            FieldKind::Date => {
                let date = parse_date(&value.as_text())
                    .ok_or_else(|| self.mismatch(value, "date"))?;
                Literal::Text(date.format(DATE_FORMAT).to_string())
            }
            FieldKind::DateTime => {
                let datetime = parse_datetime(&value.as_text())
                    .ok_or_else(|| self.mismatch(value, "datetime"))?;
                Literal::Text(datetime.format(DATETIME_FORMAT).to_string())
            }
            FieldKind::Time => {
                let time = NaiveTime::parse_from_str(&value.as_text(), TIME_FORMAT)
                    .map_err(|_| self.mismatch(value, "time"))?;
                Literal::Text(time.format(TIME_FORMAT).to_string())
            }
            FieldKind::Timestamp => match value {
                Literal::Int(i) => Literal::Float(*i as f64),
                Literal::Float(f) => Literal::Float(*f),
                Literal::Text(s) => Literal::Float(
                    s.parse::<f64>()
                        .map_err(|_| self.mismatch(value, "timestamp"))?,
                ),
                other => return Err(self.mismatch(other, "timestamp")),
            },
            FieldKind::Json => {
                let document = match value {
                    Literal::Json(v) => v.clone(),
                    Literal::Text(s) => serde_json::from_str(s)
                        .map_err(|_| self.mismatch(value, "json"))?,
                    Literal::List(values) => {
                        serde_json::Value::Array(values.iter().map(literal_to_json).collect())
                    }
                    other => return Err(self.mismatch(other, "json")),
                };
                // serde_json maps are BTreeMap-backed, so serialisation is
                // canonical: sorted keys, UTF-8.
                Literal::Text(document.to_string())
            }
            FieldKind::Uuid => {
                let parsed = uuid::Uuid::parse_str(&value.as_text())
                    .map_err(|_| self.mismatch(value, "uuid"))?;
                Literal::Text(parsed.hyphenated().to_string())
            }
            FieldKind::Blob => match value {
                Literal::Blob(bytes) => Literal::Blob(bytes.clone()),
                Literal::Text(s) => Literal::Blob(s.as_bytes().to_vec()),
                other => return Err(self.mismatch(other, "blob")),
            },
        };

        for validator in &self.validators {
            validator.validate(&converted)?;
        }
        Ok(converted)
    }

    /// Reconstructs the native value from the raw column value.
    pub fn to_python(&self, raw: &Literal) -> Result<NativeValue> {
        if matches!(raw, Literal::Null) {
            return Ok(NativeValue::Null);
        }
        if let Literal::Text(s) = raw {
            if s.is_empty() && !matches!(self.kind, FieldKind::Text) {
                return Ok(NativeValue::Null);
            }
        }

        let value = match self.kind {
            FieldKind::Text | FieldKind::Email | FieldKind::Slug | FieldKind::Url => {
                NativeValue::Text(raw.as_text())
            }
            FieldKind::Integer => match raw {
                Literal::Int(i) => NativeValue::Int(*i),
                Literal::Text(s) => NativeValue::Int(s.parse::<i64>().map_err(|_| {
                    CoreError::validation(format!("the value for '{}' is not valid", self.name))
                })?),
                Literal::Float(f) => NativeValue::Int(*f as i64),
                _ => return Err(self.mismatch(raw, "integer")),
            },
            FieldKind::Real => match raw {
                Literal::Float(f) => NativeValue::Float(*f),
                Literal::Int(i) => NativeValue::Float(*i as f64),
                Literal::Text(s) => NativeValue::Float(s.parse::<f64>().map_err(|_| {
                    CoreError::validation(format!("the value for '{}' is not valid", self.name))
                })?),
                _ => return Err(self.mismatch(raw, "real")),
            },
            FieldKind::Boolean => match coerce_boolean(raw) {
                Some(bit) => NativeValue::Bool(bit == 1),
                None => NativeValue::Null,
            },
            FieldKind::Date => NativeValue::Date(
                parse_date(&raw.as_text()).ok_or_else(|| self.mismatch(raw, "date"))?,
            ),
            FieldKind::DateTime => NativeValue::DateTime(
                parse_datetime(&raw.as_text()).ok_or_else(|| self.mismatch(raw, "datetime"))?,
            ),
            FieldKind::Time => NativeValue::Time(
                NaiveTime::parse_from_str(&raw.as_text(), TIME_FORMAT)
                    .map_err(|_| self.mismatch(raw, "time"))?,
            ),
            FieldKind::Timestamp => match raw {
                Literal::Int(i) => NativeValue::Float(*i as f64),
                Literal::Float(f) => NativeValue::Float(*f),
                Literal::Text(s) => NativeValue::Float(
                    s.parse::<f64>().map_err(|_| self.mismatch(raw, "timestamp"))?,
                ),
                _ => return Err(self.mismatch(raw, "timestamp")),
            },
            FieldKind::Json => NativeValue::Json(
                serde_json::from_str(&raw.as_text()).map_err(|_| self.mismatch(raw, "json"))?,
            ),
            FieldKind::Uuid => NativeValue::Uuid(
                uuid::Uuid::parse_str(&raw.as_text()).map_err(|_| self.mismatch(raw, "uuid"))?,
            ),
            FieldKind::Blob => match raw {
                Literal::Blob(bytes) => NativeValue::Bytes(bytes.clone()),
                other => NativeValue::Bytes(other.as_text().into_bytes()),
            },
        };
        Ok(value)
    }

    /// The materialised default, if any.
    pub fn resolve_default(&self) -> Option<Literal> {
        if let Some(producer) = self.default_fn {
            return Some(producer());
        }
        self.default.clone()
    }

    // -- DDL serialisation ---------------------------------------------------

    /// Adapts the descriptor to the database field creation parameters.
    ///
    /// ```
    /// # use lorelie_core::fields::Field;
    /// let field = Field::char("visited").default("0");
    /// assert_eq!(
    ///     field.field_parameters(),
    ///     vec!["visited", "text", "default", "'0'", "not null"],
    /// );
    /// ```
    pub fn field_parameters(&self) -> Vec<String> {
        let mut params = vec![self.name.clone()];

        match self.max_length {
            Some(limit) => params.push(format!("varchar({limit})")),
            None => params.push(self.kind.column_type().to_string()),
        }

        if let Some(default) = self.resolve_default() {
            let value = self
                .to_database(&default)
                .unwrap_or(default)
                .quote();
            params.push("default".to_string());
            params.push(value);
        }

        if self.primary_key {
            params.push("primary key".to_string());
        }
        if self.autoincrement {
            params.push("autoincrement".to_string());
        } else if self.null {
            params.push("null".to_string());
        } else {
            params.push("not null".to_string());
        }
        if self.unique {
            params.push("unique".to_string());
        }

        for constraint in &self.constraints {
            if let Ok(sql) = constraint.as_sql() {
                params.push(sql);
            }
        }

        params
    }

    /// Serialises the field to `(name, parameter-list)` for migrations.
    pub fn deconstruct(&self) -> (String, Vec<String>) {
        (self.name.clone(), self.field_parameters())
    }

    fn mismatch(&self, value: &Literal, expected: &str) -> CoreError {
        CoreError::validation(format!(
            "{value:?} for column '{}' should be a {expected} value",
            self.name
        ))
    }
}

/// A field that infers its kind from the runtime value.
///
/// Used for queryset aliases created by annotations, where the declared
/// table knows nothing about the returned column.
#[derive(Debug, Clone)]
pub struct AliasField {
    pub name: String,
}

impl AliasField {
    pub fn new(name: impl Into<String>) -> AliasField {
        AliasField { name: name.into() }
    }

    /// Infers the native value for an alias column.
    pub fn infer(&self, raw: &Literal) -> NativeValue {
        match raw {
            Literal::Null => NativeValue::Null,
            Literal::Bool(b) => NativeValue::Bool(*b),
            Literal::Int(i) => NativeValue::Int(*i),
            Literal::Float(f) => NativeValue::Float(*f),
            Literal::Json(v) => NativeValue::Json(v.clone()),
            Literal::Blob(b) => NativeValue::Bytes(b.clone()),
            Literal::List(_) => NativeValue::Text(raw.as_text()),
            Literal::Text(s) => {
                if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) {
                    if let Ok(i) = s.parse::<i64>() {
                        return NativeValue::Int(i);
                    }
                }
                if let Some(datetime) = parse_datetime(s) {
                    return NativeValue::DateTime(datetime);
                }
                if let Some(date) = parse_date(s) {
                    return NativeValue::Date(date);
                }
                if s.starts_with('{') || s.starts_with('[') {
                    if let Ok(v) = serde_json::from_str(s) {
                        return NativeValue::Json(v);
                    }
                }
                NativeValue::Text(s.clone())
            }
        }
    }
}

fn coerce_boolean(value: &Literal) -> Option<i64> {
    match value {
        Literal::Bool(b) => Some(*b as i64),
        Literal::Int(0) => Some(0),
        Literal::Int(1) => Some(1),
        Literal::Text(s) => match s.as_str() {
            "true" | "t" | "1" => Some(1),
            "false" | "f" | "0" => Some(0),
            _ => None,
        },
        _ => None,
    }
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, DATE_FORMAT).ok()
}

fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(naive);
    }
    // Accept an explicit utc offset, normalised away on parse.
    DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f%:z")
        .ok()
        .map(|d| d.naive_utc())
}

fn literal_to_json(value: &Literal) -> serde_json::Value {
    match value {
        Literal::Null => serde_json::Value::Null,
        Literal::Bool(b) => serde_json::Value::Bool(*b),
        Literal::Int(i) => serde_json::Value::from(*i),
        Literal::Float(f) => serde_json::Value::from(*f),
        Literal::Text(s) => serde_json::Value::String(s.clone()),
        Literal::Json(v) => v.clone(),
        Literal::Blob(b) => serde_json::Value::String(String::from_utf8_lossy(b).into_owned()),
        Literal::List(values) => {
            serde_json::Value::Array(values.iter().map(literal_to_json).collect())
        }
    }
}

//! Field validators.
//!
//! Validators run inside `Field::to_database`, before any SQL is produced.
//! They are data (an enum) rather than closures so fields stay cloneable
//! and debuggable; custom logic goes through a plain function pointer.

use crate::error::{CoreError, Result};
use crate::literal::Literal;

/// A validation rule attached to a field.
#[derive(Debug, Clone, PartialEq)]
pub enum Validator {
    MinValue(i64),
    MaxValue(i64),
    MinLength(usize),
    MaxLength(usize),
    /// The value must match the given regular expression.
    Regex(String),
    Url,
    Email,
    /// Every comma-separated item must be made of digits.
    CommaSeparatedDigits,
    /// The value must be a comma-separated string.
    CommaSeparatedStrings,
    /// User-supplied check; returns an error message on failure.
    Custom(fn(&Literal) -> std::result::Result<(), String>),
}

impl Validator {
    /// Runs the validator against a database-bound value.
    pub fn validate(&self, value: &Literal) -> Result<()> {
        match self {
            Validator::MinValue(limit) => {
                let number = numeric(value)?;
                if number < *limit as f64 {
                    return Err(CoreError::validation(format!(
                        "value {value} is under the limit of {limit}"
                    )));
                }
            }
            Validator::MaxValue(limit) => {
                let number = numeric(value)?;
                if number > *limit as f64 {
                    return Err(CoreError::validation(format!(
                        "value {value} is over the limit of {limit}"
                    )));
                }
            }
            Validator::MinLength(limit) => {
                let text = value.as_text();
                if text.chars().count() < *limit {
                    return Err(CoreError::validation(format!(
                        "value '{text}' is shorter than {limit} characters"
                    )));
                }
            }
            Validator::MaxLength(limit) => {
                let text = value.as_text();
                if text.chars().count() > *limit {
                    return Err(CoreError::validation(format!(
                        "value '{text}' is longer than {limit} characters"
                    )));
                }
            }
            Validator::Regex(pattern) => {
                let re = regex::Regex::new(pattern).map_err(|e| {
                    CoreError::validation(format!("invalid validator pattern: {e}"))
                })?;
                if !re.is_match(&value.as_text()) {
                    return Err(CoreError::validation(format!(
                        "value '{value}' does not match pattern '{pattern}'"
                    )));
                }
            }
            Validator::Url => {
                let text = value.as_text();
                if !text.starts_with("http") {
                    return Err(CoreError::validation(format!("url is not valid: {text}")));
                }
            }
            Validator::Email => {
                let re = regex::Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$")
                    .expect("email pattern is valid");
                if !re.is_match(&value.as_text()) {
                    return Err(CoreError::validation(format!(
                        "email is not valid: {value}"
                    )));
                }
            }
            Validator::CommaSeparatedDigits => {
                let text = text_only(value)?;
                for item in text.split(',') {
                    if item.is_empty() || !item.chars().all(|c| c.is_ascii_digit()) {
                        return Err(CoreError::validation(format!(
                            "value '{item}' is not a digit"
                        )));
                    }
                }
            }
            Validator::CommaSeparatedStrings => {
                text_only(value)?;
            }
            Validator::Custom(func) => {
                func(value).map_err(CoreError::validation)?;
            }
        }
        Ok(())
    }
}

fn numeric(value: &Literal) -> Result<f64> {
    match value {
        Literal::Int(i) => Ok(*i as f64),
        Literal::Float(f) => Ok(*f),
        other => Err(CoreError::validation(format!(
            "value '{other}' is not a number"
        ))),
    }
}

fn text_only(value: &Literal) -> Result<String> {
    match value {
        Literal::Text(s) => Ok(s.clone()),
        other => Err(CoreError::validation(format!(
            "value '{other}' is not a string"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_max_value() {
        assert!(Validator::MinValue(10).validate(&Literal::Int(20)).is_ok());
        assert!(Validator::MinValue(10).validate(&Literal::Int(5)).is_err());
        assert!(Validator::MaxValue(10).validate(&Literal::Int(5)).is_ok());
        assert!(Validator::MaxValue(10).validate(&Literal::Int(20)).is_err());
    }

    #[test]
    fn length_limits() {
        assert!(Validator::MaxLength(5).validate(&Literal::from("abc")).is_ok());
        assert!(Validator::MaxLength(2).validate(&Literal::from("abc")).is_err());
        assert!(Validator::MinLength(2).validate(&Literal::from("abc")).is_ok());
    }

    #[test]
    fn comma_separated_digits() {
        let v = Validator::CommaSeparatedDigits;
        assert!(v.validate(&Literal::from("1,2,3")).is_ok());
        assert!(v.validate(&Literal::from("1,a,3")).is_err());
        assert!(v.validate(&Literal::Int(1)).is_err());
    }

    #[test]
    fn url_validator() {
        assert!(Validator::Url.validate(&Literal::from("https://example.com")).is_ok());
        assert!(Validator::Url.validate(&Literal::from("example.com")).is_err());
    }

    #[test]
    fn email_validator() {
        assert!(Validator::Email.validate(&Literal::from("a@b.co")).is_ok());
        assert!(Validator::Email.validate(&Literal::from("not-an-email")).is_err());
    }

    #[test]
    fn regex_validator() {
        let v = Validator::Regex("^K".to_string());
        assert!(v.validate(&Literal::from("Kendall")).is_ok());
        assert!(v.validate(&Literal::from("Jenner")).is_err());
    }

    #[test]
    fn custom_validator() {
        fn no_empty(value: &Literal) -> std::result::Result<(), String> {
            if value.as_text().is_empty() {
                return Err("value is empty".to_string());
            }
            Ok(())
        }
        let v = Validator::Custom(no_empty);
        assert!(v.validate(&Literal::from("x")).is_ok());
        assert!(v.validate(&Literal::from("")).is_err());
    }
}

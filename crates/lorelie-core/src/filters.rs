//! Filter decomposition.
//!
//! User-facing filters arrive in three encodings: key/value pairs
//! (`age__gte` → 1), strings (`age__gte=1`) and explicit triples
//! (`("age", ">=", 1)`). All three decompose into the same typed
//! [`FilterExpr`] AST which the statement builders consume; downstream code
//! never sees the raw key again.

use crate::error::{CoreError, Result};
use crate::literal::Literal;
use crate::sql;

/// A comparison operator recognized in filter suffixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    Contains,
    StartsWith,
    EndsWith,
    In,
    Range,
    IsNull,
    Regex,
}

impl Op {
    /// Maps a filter suffix (`eq`, `gte`, `contains`, …) to its operator.
    pub fn from_suffix(token: &str) -> Option<Op> {
        let op = match token {
            "eq" => Op::Eq,
            "ne" => Op::Ne,
            "lt" => Op::Lt,
            "lte" => Op::Lte,
            "gt" => Op::Gt,
            "gte" => Op::Gte,
            "contains" => Op::Contains,
            "startswith" => Op::StartsWith,
            "endswith" => Op::EndsWith,
            "in" => Op::In,
            "range" => Op::Range,
            "isnull" => Op::IsNull,
            "regex" => Op::Regex,
            _ => return None,
        };
        Some(op)
    }

    /// Maps an explicit operator string (`"="`, `"<="`, `"like"`, also the
    /// suffix spelling) to its operator. Used by the triple encoding.
    pub fn from_operator(token: &str) -> Option<Op> {
        let op = match token {
            "=" => Op::Eq,
            "!=" | "<>" => Op::Ne,
            "<" => Op::Lt,
            "<=" => Op::Lte,
            ">" => Op::Gt,
            ">=" => Op::Gte,
            "like" => Op::Contains,
            "between" => Op::Range,
            "in" => Op::In,
            "regexp" => Op::Regex,
            _ => return Op::from_suffix(token),
        };
        Some(op)
    }

    /// The filter suffix spelling of the operator.
    pub fn suffix(&self) -> &'static str {
        match self {
            Op::Eq => "eq",
            Op::Ne => "ne",
            Op::Lt => "lt",
            Op::Lte => "lte",
            Op::Gt => "gt",
            Op::Gte => "gte",
            Op::Contains => "contains",
            Op::StartsWith => "startswith",
            Op::EndsWith => "endswith",
            Op::In => "in",
            Op::Range => "range",
            Op::IsNull => "isnull",
            Op::Regex => "regex",
        }
    }

    /// The SQL operator text for the plain comparison forms.
    pub fn sql_operator(&self) -> &'static str {
        match self {
            Op::Eq => "=",
            Op::Ne => "!=",
            Op::Lt => "<",
            Op::Lte => "<=",
            Op::Gt => ">",
            Op::Gte => ">=",
            Op::Contains => "like",
            Op::StartsWith => "startswith",
            Op::EndsWith => "endswith",
            Op::In => "in",
            Op::Range => "between",
            Op::IsNull => "isnull",
            Op::Regex => "regexp",
        }
    }
}

/// A single decomposed filter: column path, operator and value.
///
/// A path with more than one segment denotes a foreign-key traversal and is
/// rendered in dot notation (`followers.id`).
#[derive(Debug, Clone, PartialEq)]
pub struct FilterExpr {
    pub path: Vec<String>,
    pub op: Op,
    pub value: Literal,
}

impl FilterExpr {
    /// Parses a filter key (`age`, `age__gte`, `followers__id__eq`) and its
    /// value into a [`FilterExpr`]. A missing suffix defaults to `eq`.
    pub fn parse(key: &str, value: impl Into<Literal>) -> Result<FilterExpr> {
        let tokens: Vec<&str> = key.split("__").collect();
        if tokens.iter().any(|t| t.is_empty()) {
            return Err(CoreError::invalid_filter(format!(
                "too many underscores in filter key: {key}"
            )));
        }

        let (path_tokens, op) = match tokens.last().and_then(|t| Op::from_suffix(t)) {
            Some(op) => (&tokens[..tokens.len() - 1], op),
            None => (&tokens[..], Op::Eq),
        };

        if path_tokens.is_empty() {
            return Err(CoreError::invalid_filter(format!(
                "filter key has no column: {key}"
            )));
        }

        Ok(FilterExpr {
            path: path_tokens.iter().map(|t| t.to_string()).collect(),
            op,
            value: value.into(),
        })
    }

    /// The column reference, dot-joined for foreign-key paths.
    pub fn column(&self) -> String {
        self.path.join(".")
    }

    /// Returns `true` when the filter follows a foreign key.
    pub fn expands_foreign_key(&self) -> bool {
        self.path.len() > 1
    }
}

/// Decomposes key/value pairs into filter expressions.
///
/// Decomposition is deterministic: the same input always yields the same
/// ordered list.
pub fn decompose_pairs(
    pairs: impl IntoIterator<Item = (impl AsRef<str>, Literal)>,
) -> Result<Vec<FilterExpr>> {
    pairs
        .into_iter()
        .map(|(key, value)| FilterExpr::parse(key.as_ref(), value))
        .collect()
}

/// Decomposes a string filter, `age__gte=1` or `name=Kendall`.
///
/// Values that read as integers or floats become numeric literals; anything
/// else stays text.
pub fn decompose_str(expression: &str) -> Result<Vec<FilterExpr>> {
    let (key, raw_value) = expression.split_once('=').ok_or_else(|| {
        CoreError::invalid_filter(format!(
            "could not identify the operator for: {expression}"
        ))
    })?;

    let value = parse_literal(raw_value);
    Ok(vec![FilterExpr::parse(key, value)?])
}

/// Decomposes explicit `(column, operator, value)` triples.
pub fn decompose_triples(
    triples: impl IntoIterator<Item = (impl AsRef<str>, impl AsRef<str>, Literal)>,
) -> Result<Vec<FilterExpr>> {
    triples
        .into_iter()
        .map(|(column, operator, value)| {
            let op = Op::from_operator(operator.as_ref()).ok_or_else(|| {
                CoreError::UnknownOperator {
                    token: operator.as_ref().to_string(),
                }
            })?;
            Ok(FilterExpr {
                path: column.as_ref().split("__").map(str::to_string).collect(),
                op,
                value,
            })
        })
        .collect()
}

fn parse_literal(raw: &str) -> Literal {
    if let Ok(i) = raw.parse::<i64>() {
        return Literal::Int(i);
    }
    if let Ok(f) = raw.parse::<f64>() {
        return Literal::Float(f);
    }
    Literal::Text(raw.to_string())
}

/// Builds final textual conditions from decomposed filters.
///
/// `spaced` controls whether plain comparisons keep spaces around the
/// operator (`name = 'Kendall'`) or fuse (`name='Kendall'`).
pub fn build_filters(items: &[FilterExpr], spaced: bool) -> Result<Vec<String>> {
    let mut built = Vec::with_capacity(items.len());
    for item in items {
        let column = item.column();
        let condition = match item.op {
            Op::In => {
                let Literal::List(values) = &item.value else {
                    return Err(CoreError::invalid_filter(format!(
                        "the value when using \"in\" should be a list. Got: {}",
                        item.value
                    )));
                };
                format!("{} in ({})", column, sql::comma_join(sql::quote_values(values)))
            }
            Op::Contains => format!("{} like {}", column, sql::quote_like(&item.value)),
            Op::StartsWith => {
                format!("{} like {}", column, sql::quote_startswith(&item.value))
            }
            Op::EndsWith => format!("{} like {}", column, sql::quote_endswith(&item.value)),
            Op::Range => {
                let Literal::List(values) = &item.value else {
                    return Err(CoreError::invalid_filter(format!(
                        "the value when using \"range\" should be a list. Got: {}",
                        item.value
                    )));
                };
                let [low, high] = values.as_slice() else {
                    return Err(CoreError::invalid_filter(
                        "\"range\" requires exactly two bounds",
                    ));
                };
                format!("{} between {} and {}", column, low.quote(), high.quote())
            }
            Op::IsNull => {
                if item.value.is_truthy() {
                    format!("{column} is null")
                } else {
                    format!("{column} is not null")
                }
            }
            // Infix form; SQLite rewrites `a regexp b` to regexp(b, a),
            // matching the registered regexp(pattern, text) callback.
            Op::Regex => format!("{} regexp {}", column, item.value.quote()),
            _ => sql::simple_join(
                [
                    column.as_str(),
                    item.op.sql_operator(),
                    item.value.quote().as_str(),
                ],
                spaced,
            ),
        };
        built.push(condition);
    }
    Ok(built)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::literal::lit;
    use pretty_assertions::assert_eq;

    #[test]
    fn decompose_suffixes() {
        let cases = [
            ("name__eq", Op::Eq),
            ("name__ne", Op::Ne),
            ("name__lt", Op::Lt),
            ("name__lte", Op::Lte),
            ("name__gt", Op::Gt),
            ("name__gte", Op::Gte),
            ("name__contains", Op::Contains),
            ("name__startswith", Op::StartsWith),
            ("name__endswith", Op::EndsWith),
            ("name__in", Op::In),
            ("name__range", Op::Range),
            ("name__isnull", Op::IsNull),
            ("name__regex", Op::Regex),
        ];
        for (key, expected) in cases {
            let expr = FilterExpr::parse(key, "Kendall").unwrap();
            assert_eq!(expr.op, expected, "{key}");
            assert_eq!(expr.path, vec!["name".to_string()]);
        }
    }

    #[test]
    fn missing_suffix_defaults_to_eq() {
        let expr = FilterExpr::parse("rowid", 1).unwrap();
        assert_eq!(expr.op, Op::Eq);
        assert_eq!(expr.column(), "rowid");
    }

    #[test]
    fn foreign_key_path() {
        let expr = FilterExpr::parse("followers__id__eq", 1).unwrap();
        assert_eq!(expr.path, vec!["followers".to_string(), "id".to_string()]);
        assert!(expr.expands_foreign_key());
        assert_eq!(expr.column(), "followers.id");
    }

    #[test]
    fn rejects_stray_underscores() {
        assert!(FilterExpr::parse("ages___eq", 1).is_err());
    }

    #[test]
    fn decomposition_is_deterministic() {
        let pairs = || {
            vec![
                ("name".to_string(), lit("Kendall")),
                ("age__gt".to_string(), lit(20)),
            ]
        };
        let a = decompose_pairs(pairs()).unwrap();
        let b = decompose_pairs(pairs()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn string_decomposition() {
        let result = decompose_str("rowid__eq=1").unwrap();
        assert_eq!(result[0].column(), "rowid");
        assert_eq!(result[0].op, Op::Eq);
        assert_eq!(result[0].value, Literal::Int(1));

        let result = decompose_str("name=Kendall").unwrap();
        assert_eq!(result[0].op, Op::Eq);
        assert_eq!(result[0].value, lit("Kendall"));

        assert!(decompose_str("name").is_err());
    }

    #[test]
    fn triple_decomposition() {
        let result = decompose_triples([("age", "=", lit(1))]).unwrap();
        assert_eq!(result[0].op, Op::Eq);

        let result = decompose_triples([("age", "gte", lit(1))]).unwrap();
        assert_eq!(result[0].op, Op::Gte);

        assert!(decompose_triples([("age", "wrong", lit(1))]).is_err());
    }

    #[test]
    fn build_plain_comparisons() {
        let cases = [
            (FilterExpr::parse("name", "Kendall").unwrap(), "name = 'Kendall'"),
            (FilterExpr::parse("name__ne", "Kendall").unwrap(), "name != 'Kendall'"),
            (FilterExpr::parse("age__lt", 1).unwrap(), "age < 1"),
            (FilterExpr::parse("age__gt", 1).unwrap(), "age > 1"),
            (FilterExpr::parse("age__lte", 1).unwrap(), "age <= 1"),
            (FilterExpr::parse("age__gte", 1).unwrap(), "age >= 1"),
        ];
        for (expr, expected) in cases {
            assert_eq!(build_filters(&[expr], true).unwrap(), vec![expected]);
        }
    }

    #[test]
    fn build_unspaced() {
        let expr = FilterExpr::parse("age__gte", 10).unwrap();
        assert_eq!(build_filters(&[expr], false).unwrap(), vec!["age>=10"]);
    }

    #[test]
    fn build_like_variants() {
        let contains = FilterExpr::parse("name__contains", "Kendall").unwrap();
        let starts = FilterExpr::parse("name__startswith", "Kendall").unwrap();
        let ends = FilterExpr::parse("name__endswith", "Kendall").unwrap();
        assert_eq!(
            build_filters(&[contains, starts, ends], true).unwrap(),
            vec![
                "name like '%Kendall%'",
                "name like 'Kendall%'",
                "name like '%Kendall'",
            ]
        );
    }

    #[test]
    fn build_in_and_between() {
        let within = FilterExpr::parse("name__in", vec!["Kendall", "Kylie"]).unwrap();
        assert_eq!(
            build_filters(&[within], true).unwrap(),
            vec!["name in ('Kendall', 'Kylie')"]
        );

        let range = FilterExpr::parse("age__range", vec![1, 2]).unwrap();
        assert_eq!(
            build_filters(&[range], true).unwrap(),
            vec!["age between 1 and 2"]
        );

        let bad = FilterExpr::parse("name__in", "Kendall").unwrap();
        assert!(build_filters(&[bad], true).is_err());

        let bad = FilterExpr::parse("age__range", vec![1]).unwrap();
        assert!(build_filters(&[bad], true).is_err());
    }

    #[test]
    fn build_isnull() {
        let null = FilterExpr::parse("name__isnull", true).unwrap();
        let not_null = FilterExpr::parse("name__isnull", false).unwrap();
        assert_eq!(
            build_filters(&[null, not_null], true).unwrap(),
            vec!["name is null", "name is not null"]
        );
    }

    #[test]
    fn build_regex() {
        let expr = FilterExpr::parse("name__regex", "^Ken").unwrap();
        assert_eq!(
            build_filters(&[expr], false).unwrap(),
            vec!["name regexp '^Ken'"]
        );
    }

    #[test]
    fn never_emits_bare_quote() {
        let expr = FilterExpr::parse("name", "O'Hara").unwrap();
        let built = build_filters(&[expr], true).unwrap();
        let inner = built[0].trim_start_matches("name = ");
        let body = &inner[1..inner.len() - 1];
        assert!(!body.replace("''", "").contains('\''));
    }
}

//! Relational table access.
//!
//! Rows travel as JSON objects keyed by snake_case column names. Two
//! backends implement [`RowStore`]: Postgres through `sqlx` and an
//! in-process table set used for development runs and tests.

mod memory;
mod pg;

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::DateTime;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;

pub use memory::MemoryRowStore;
pub use pg::PgRowStore;

pub type Row = Map<String, Value>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),
    #[error("duplicate value for unique column `{column}`")]
    UniqueViolation { column: String },
    #[error("unsupported query operator `{0}`")]
    UnsupportedOperator(String),
    #[error("invalid identifier `{0}`")]
    InvalidIdentifier(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    In,
    Gt,
    Lt,
}

impl FromStr for Operator {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "==" => Ok(Operator::Eq),
            "in" => Ok(Operator::In),
            ">" => Ok(Operator::Gt),
            "<" => Ok(Operator::Lt),
            other => Err(StoreError::UnsupportedOperator(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Asc => f.write_str("ASC"),
            Direction::Desc => f.write_str("DESC"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub op: Operator,
    pub value: Value,
}

/// Inclusive window of row positions. `to == None` reads to the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowRange {
    pub from: u64,
    pub to: Option<u64>,
}

impl RowRange {
    pub fn limit(&self) -> Option<u64> {
        self.to.map(|to| to.saturating_sub(self.from) + 1)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RowQuery {
    pub table: String,
    pub filters: Vec<Filter>,
    pub order: Option<(String, Direction)>,
    pub range: Option<RowRange>,
}

impl RowQuery {
    pub fn new<S: Into<String>>(table: S) -> Self {
        Self {
            table: table.into(),
            filters: Vec::new(),
            order: None,
            range: None,
        }
    }

    pub fn by_id(table: &str, id: &str) -> Self {
        let mut query = Self::new(table);
        query.filters.push(Filter {
            column: "id".to_string(),
            op: Operator::Eq,
            value: Value::String(id.to_string()),
        });
        query.range = Some(RowRange { from: 0, to: Some(0) });
        query
    }
}

#[async_trait]
pub trait RowStore: Send + Sync {
    async fn select(&self, query: &RowQuery) -> Result<Vec<Row>, StoreError>;

    /// Inserts one row and returns its `id`.
    async fn insert(&self, table: &str, row: Row) -> Result<String, StoreError>;

    /// Applies `changes` to the row with the given id; `false` when no such row.
    async fn update(&self, table: &str, id: &str, changes: Row) -> Result<bool, StoreError>;

    async fn count(&self, table: &str) -> Result<u64, StoreError>;
}

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z_][a-z0-9_]*$").unwrap());

pub fn check_identifier(name: &str) -> Result<&str, StoreError> {
    if IDENTIFIER.is_match(name) {
        Ok(name)
    } else {
        Err(StoreError::InvalidIdentifier(name.to_string()))
    }
}

/// Rank of a JSON kind in Postgres' jsonb ordering:
/// null < string < number < boolean < array < object.
fn kind_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::String(_) => 1,
        Value::Number(_) => 2,
        Value::Bool(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over JSON values that agrees with jsonb comparisons.
/// Strings that are both RFC 3339 timestamps compare as instants, since
/// chrono writes a varying number of fractional digits.
pub(crate) fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
            _ => Ordering::Equal,
        },
        (Value::String(a), Value::String(b)) => {
            match (DateTime::parse_from_rfc3339(a), DateTime::parse_from_rfc3339(b)) {
                (Ok(a), Ok(b)) => a.cmp(&b),
                _ => a.cmp(b),
            }
        }
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        _ => kind_rank(a).cmp(&kind_rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn known_operators_parse() {
        assert_eq!("==".parse::<Operator>().unwrap(), Operator::Eq);
        assert_eq!("in".parse::<Operator>().unwrap(), Operator::In);
        assert_eq!(">".parse::<Operator>().unwrap(), Operator::Gt);
        assert_eq!("<".parse::<Operator>().unwrap(), Operator::Lt);
    }

    #[test]
    fn unknown_operators_are_rejected() {
        for op in ["!=", ">=", "array-contains", ""] {
            assert!(matches!(
                op.parse::<Operator>(),
                Err(StoreError::UnsupportedOperator(_))
            ));
        }
    }

    #[test]
    fn identifiers_are_restricted() {
        assert!(check_identifier("data_inicio").is_ok());
        assert!(check_identifier("usuarios").is_ok());
        assert!(check_identifier("Usuarios").is_err());
        assert!(check_identifier("id; DROP TABLE usuarios").is_err());
        assert!(check_identifier("1col").is_err());
    }

    #[test]
    fn range_limit_is_inclusive() {
        assert_eq!(RowRange { from: 10, to: Some(19) }.limit(), Some(10));
        assert_eq!(RowRange { from: 0, to: Some(0) }.limit(), Some(1));
        assert_eq!(RowRange { from: 5, to: None }.limit(), None);
    }

    #[test]
    fn values_compare_like_jsonb() {
        assert_eq!(compare_values(&json!(2), &json!(10)), Ordering::Less);
        assert_eq!(
            compare_values(&json!("2024-02-01"), &json!("2024-01-31")),
            Ordering::Greater
        );
        assert_eq!(compare_values(&json!("1"), &json!(1)), Ordering::Less);
        assert_eq!(compare_values(&json!(null), &json!("a")), Ordering::Less);
        assert_eq!(compare_values(&json!(true), &json!(99)), Ordering::Greater);
    }

    #[test]
    fn timestamps_compare_as_instants() {
        assert_eq!(
            compare_values(
                &json!("2025-02-19T21:20:00.100500Z"),
                &json!("2025-02-19T21:20:00.100Z")
            ),
            Ordering::Greater
        );
        assert_eq!(
            compare_values(
                &json!("2025-02-19T21:20:00Z"),
                &json!("2025-02-19T18:20:00.000001-03:00")
            ),
            Ordering::Less
        );
    }
}

use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::{check_identifier, compare_values, Filter, Operator, Row, RowQuery, RowStore, StoreError};

/// Tables held in process memory. Unique columns are checked under the
/// write lock, so concurrent inserts cannot both pass the check.
#[derive(Debug, Default)]
pub struct MemoryRowStore {
    tables: RwLock<HashMap<String, Vec<Row>>>,
    unique: HashMap<String, Vec<String>>,
}

impl MemoryRowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Same unique columns as `migrations/`.
    pub fn with_default_schema() -> Self {
        Self::new().with_unique("usuarios", &["email", "ra"])
    }

    pub fn with_unique(mut self, table: &str, columns: &[&str]) -> Self {
        self.unique
            .entry(table.to_string())
            .or_default()
            .extend(columns.iter().map(|c| c.to_string()));
        self
    }

    fn check_unique(
        &self,
        table: &str,
        rows: &[Row],
        candidate: &Row,
        skip_id: Option<&str>,
    ) -> Result<(), StoreError> {
        let columns = match self.unique.get(table) {
            Some(columns) => columns,
            None => return Ok(()),
        };
        for column in columns {
            let value = match candidate.get(column) {
                Some(Value::Null) | None => continue,
                Some(value) => value,
            };
            let taken = rows.iter().any(|row| {
                let same_row = skip_id.is_some() && row.get("id").and_then(Value::as_str) == skip_id;
                !same_row && row.get(column) == Some(value)
            });
            if taken {
                return Err(StoreError::UniqueViolation {
                    column: column.clone(),
                });
            }
        }
        Ok(())
    }
}

fn matches(row: &Row, filter: &Filter) -> bool {
    let current = row.get(&filter.column).unwrap_or(&Value::Null);
    match filter.op {
        Operator::Eq => current == &filter.value,
        Operator::In => filter
            .value
            .as_array()
            .map(|options| options.contains(current))
            .unwrap_or(false),
        Operator::Gt => compare_values(current, &filter.value) == Ordering::Greater,
        Operator::Lt => compare_values(current, &filter.value) == Ordering::Less,
    }
}

#[async_trait]
impl RowStore for MemoryRowStore {
    async fn select(&self, query: &RowQuery) -> Result<Vec<Row>, StoreError> {
        check_identifier(&query.table)?;
        for filter in &query.filters {
            check_identifier(&filter.column)?;
        }
        let tables = self.tables.read().await;
        let mut rows: Vec<Row> = tables
            .get(&query.table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| query.filters.iter().all(|f| matches(row, f)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if let Some((column, direction)) = &query.order {
            check_identifier(column)?;
            rows.sort_by(|a, b| {
                let ordering = match (a.get(column), b.get(column)) {
                    (Some(a), Some(b)) => compare_values(a, b),
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                };
                match direction {
                    super::Direction::Asc => ordering,
                    super::Direction::Desc => ordering.reverse(),
                }
            });
        }

        if let Some(range) = query.range {
            let skipped = rows.into_iter().skip(range.from as usize);
            rows = match range.limit() {
                Some(limit) => skipped.take(limit as usize).collect(),
                None => skipped.collect(),
            };
        }
        Ok(rows)
    }

    async fn insert(&self, table: &str, row: Row) -> Result<String, StoreError> {
        check_identifier(table)?;
        let id = row
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| StoreError::Database("row has no `id`".to_string()))?;
        let mut tables = self.tables.write().await;
        let rows = tables.entry(table.to_string()).or_default();
        if rows
            .iter()
            .any(|existing| existing.get("id").and_then(Value::as_str) == Some(id.as_str()))
        {
            return Err(StoreError::UniqueViolation {
                column: "id".to_string(),
            });
        }
        self.check_unique(table, rows, &row, None)?;
        rows.push(row);
        Ok(id)
    }

    async fn update(&self, table: &str, id: &str, changes: Row) -> Result<bool, StoreError> {
        check_identifier(table)?;
        let mut tables = self.tables.write().await;
        let rows = match tables.get_mut(table) {
            Some(rows) => rows,
            None => return Ok(false),
        };
        self.check_unique(table, rows, &changes, Some(id))?;
        match rows
            .iter_mut()
            .find(|row| row.get("id").and_then(Value::as_str) == Some(id))
        {
            Some(row) => {
                for (column, value) in changes {
                    check_identifier(&column)?;
                    row.insert(column, value);
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn count(&self, table: &str) -> Result<u64, StoreError> {
        check_identifier(table)?;
        let tables = self.tables.read().await;
        Ok(tables.get(table).map(|rows| rows.len() as u64).unwrap_or(0))
    }
}

use async_trait::async_trait;
use sqlx::postgres::{PgDatabaseError, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder, Row as _};

use super::{check_identifier, Operator, Row, RowQuery, RowStore, StoreError};

/// Postgres-backed tables. Rows are read back as `to_jsonb(t)` and written
/// through `jsonb_populate_record`, so column types stay the database's
/// business.
#[derive(Debug, Clone)]
pub struct PgRowStore {
    pool: PgPool,
}

impl PgRowStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|err| StoreError::Database(err.to_string()))
    }
}

fn quote(identifier: &str) -> Result<String, StoreError> {
    Ok(format!("\"{}\"", check_identifier(identifier)?))
}

/// Constraint names follow Postgres' `<table>_<column>_key` convention.
fn constraint_column(table: &str, constraint: &str) -> String {
    constraint
        .strip_prefix(table)
        .and_then(|rest| rest.strip_prefix('_'))
        .and_then(|rest| rest.strip_suffix("_key"))
        .unwrap_or(constraint)
        .to_string()
}

fn map_write_error(table: &str, err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.code().as_deref() == Some("23505") {
            let column = db
                .try_downcast_ref::<PgDatabaseError>()
                .and_then(|pg| pg.constraint())
                .map(|constraint| constraint_column(table, constraint))
                .unwrap_or_else(|| "unknown".to_string());
            return StoreError::UniqueViolation { column };
        }
    }
    StoreError::from(err)
}

/// Filters compare jsonb values, so mixed kinds follow jsonb ordering.
fn select_query(query: &RowQuery) -> Result<QueryBuilder<'static, Postgres>, StoreError> {
    let mut builder = QueryBuilder::<Postgres>::new("SELECT to_jsonb(t) AS row FROM ");
    builder.push(quote(&query.table)?).push(" AS t");

    for (i, filter) in query.filters.iter().enumerate() {
        let column = check_identifier(&filter.column)?;
        builder.push(if i == 0 { " WHERE " } else { " AND " });
        match filter.op {
            Operator::Eq => {
                builder.push(format!("(to_jsonb(t) -> '{}') = ", column));
                builder.push_bind(Json(filter.value.clone()));
            }
            Operator::In => {
                builder.push_bind(Json(filter.value.clone()));
                builder.push(format!(" @> jsonb_build_array(to_jsonb(t) -> '{}')", column));
            }
            Operator::Gt => {
                builder.push(format!("(to_jsonb(t) -> '{}') > ", column));
                builder.push_bind(Json(filter.value.clone()));
            }
            Operator::Lt => {
                builder.push(format!("(to_jsonb(t) -> '{}') < ", column));
                builder.push_bind(Json(filter.value.clone()));
            }
        }
    }

    if let Some((column, direction)) = &query.order {
        builder.push(format!(" ORDER BY t.{} {}", quote(column)?, direction));
    }
    if let Some(range) = query.range {
        if let Some(limit) = range.limit() {
            builder.push(" LIMIT ").push_bind(limit as i64);
        }
        builder.push(" OFFSET ").push_bind(range.from as i64);
    }
    Ok(builder)
}

#[async_trait]
impl RowStore for PgRowStore {
    async fn select(&self, query: &RowQuery) -> Result<Vec<Row>, StoreError> {
        let mut builder = select_query(query)?;
        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| {
                row.try_get::<Json<Row>, _>("row")
                    .map(|json| json.0)
                    .map_err(StoreError::from)
            })
            .collect()
    }

    async fn insert(&self, table: &str, row: Row) -> Result<String, StoreError> {
        let columns = row
            .keys()
            .map(|column| quote(column))
            .collect::<Result<Vec<_>, _>>()?
            .join(", ");
        let table_name = quote(table)?;

        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "INSERT INTO {table} ({columns}) SELECT {columns} FROM jsonb_populate_record(NULL::{table}, ",
            table = table_name,
            columns = columns,
        ));
        builder.push_bind(Json(row)).push(") RETURNING id");

        let inserted = builder
            .build()
            .fetch_one(&self.pool)
            .await
            .map_err(|err| map_write_error(table, err))?;
        Ok(inserted.try_get::<String, _>("id")?)
    }

    async fn update(&self, table: &str, id: &str, changes: Row) -> Result<bool, StoreError> {
        if changes.is_empty() {
            return Ok(!self.select(&RowQuery::by_id(table, id)).await?.is_empty());
        }
        let table_name = quote(table)?;
        let assignments = changes
            .keys()
            .map(|column| quote(column).map(|c| format!("{c} = src.{c}", c = c)))
            .collect::<Result<Vec<_>, _>>()?
            .join(", ");

        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "UPDATE {table} SET {assignments} FROM jsonb_populate_record(NULL::{table}, ",
            table = table_name,
            assignments = assignments,
        ));
        builder
            .push_bind(Json(changes))
            .push(format!(") AS src WHERE {}.id = ", table_name))
            .push_bind(id.to_string());

        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(|err| map_write_error(table, err))?;
        Ok(result.rows_affected() >= 1)
    }

    async fn count(&self, table: &str) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", quote(table)?))
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Direction, Filter, RowRange};
    use serde_json::json;

    #[test]
    fn constraint_names_resolve_to_columns() {
        assert_eq!(constraint_column("usuarios", "usuarios_email_key"), "email");
        assert_eq!(constraint_column("usuarios", "usuarios_ra_key"), "ra");
        assert_eq!(constraint_column("usuarios", "custom_idx"), "custom_idx");
    }

    #[test]
    fn select_compares_jsonb_for_every_operator() {
        let mut query = RowQuery::new("atestados");
        for (column, op, value) in [
            ("status", Operator::Eq, json!("pendente")),
            ("id_usuario", Operator::In, json!(["a", "b"])),
            ("data_inicio", Operator::Gt, json!("2025-01-01")),
            ("data_fim", Operator::Lt, json!("2025-12-31")),
        ] {
            query.filters.push(Filter {
                column: column.to_string(),
                op,
                value,
            });
        }
        query.order = Some(("created_at".to_string(), Direction::Desc));
        query.range = Some(RowRange { from: 10, to: Some(19) });

        let builder = select_query(&query).unwrap();
        assert_eq!(
            builder.sql(),
            "SELECT to_jsonb(t) AS row FROM \"atestados\" AS t \
             WHERE (to_jsonb(t) -> 'status') = $1 \
             AND $2 @> jsonb_build_array(to_jsonb(t) -> 'id_usuario') \
             AND (to_jsonb(t) -> 'data_inicio') > $3 \
             AND (to_jsonb(t) -> 'data_fim') < $4 \
             ORDER BY t.\"created_at\" DESC LIMIT $5 OFFSET $6"
        );
    }

    #[test]
    fn select_rejects_unsafe_filter_columns() {
        let mut query = RowQuery::new("usuarios");
        query.filters.push(Filter {
            column: "email') OR true --".to_string(),
            op: Operator::Gt,
            value: json!(1),
        });
        assert!(matches!(
            select_query(&query),
            Err(StoreError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn quoting_refuses_unsafe_names() {
        assert_eq!(quote("atestados").unwrap(), "\"atestados\"");
        assert!(quote("atestados\"; --").is_err());
    }
}

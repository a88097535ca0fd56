use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{
    PgPool, Postgres, Row, TypeInfo, ValueRef,
    postgres::{PgArguments, PgPoolOptions, PgRow},
    query::Query as PgQuery,
};
use uuid::Uuid;

use crate::{
    adapters::Adapter,
    error::Error,
    schema::Field,
    statement::Dialect,
    value::{FieldKind, Value},
};

/// PostgreSQL adapter.
///
/// Serialized timestamp fields live in `TIMESTAMPTZ` columns:
/// ```sql
/// CREATE TABLE IF NOT EXISTS "users" (
///     "id" UUID PRIMARY KEY,
///     "name" TEXT NOT NULL,
///     "created_at" TIMESTAMPTZ,
///     "updated_at" TIMESTAMPTZ,
///     "deleted_at" TIMESTAMPTZ
/// );
/// ```
pub struct PostgresAdapter {
    pub(crate) pool: PgPool,
}

impl PostgresAdapter {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn bind_value<'q>(
        query: PgQuery<'q, Postgres, PgArguments>,
        value: &Value,
    ) -> Result<PgQuery<'q, Postgres, PgArguments>, Error> {
        let query = match value {
            Value::Null(kind) => match kind {
                FieldKind::Bool => query.bind(None::<bool>),
                FieldKind::Int => query.bind(None::<i64>),
                FieldKind::Float => query.bind(None::<f64>),
                FieldKind::Text => query.bind(None::<String>),
                FieldKind::Uuid => query.bind(None::<Uuid>),
                FieldKind::Bytes => query.bind(None::<Vec<u8>>),
                FieldKind::Time => query.bind(None::<DateTime<Utc>>),
                FieldKind::Timestamp => return Err(Error::InvalidSourceType(value.type_name())),
            },
            Value::Bool(b) => query.bind(*b),
            Value::Int(i) => query.bind(*i),
            Value::Float(f) => query.bind(*f),
            Value::Text(s) => query.bind(s.clone()),
            Value::Uuid(u) => query.bind(*u),
            Value::Bytes(b) => query.bind(b.clone()),
            Value::Time(t) => query.bind(*t),
            // wire timestamps must go through their serializer first
            Value::Timestamp(_) => return Err(Error::InvalidSourceType(value.type_name())),
        };
        Ok(query)
    }

    fn decode_column(row: &PgRow, idx: usize, field: &Field) -> Result<Value, Error> {
        let raw = row
            .try_get_raw(idx)
            .map_err(|e| Error::Storage(e.to_string()))?;
        if raw.is_null() {
            return Ok(Value::Null(field.column_kind()?));
        }
        let type_name = raw.type_info().name().to_string();

        let value = match type_name.as_str() {
            "BOOL" => row.try_get::<bool, _>(idx).map(Value::Bool),
            "INT2" => row.try_get::<i16, _>(idx).map(|i| Value::Int(i as i64)),
            "INT4" => row.try_get::<i32, _>(idx).map(|i| Value::Int(i as i64)),
            "INT8" => row.try_get::<i64, _>(idx).map(Value::Int),
            "FLOAT4" => row.try_get::<f32, _>(idx).map(|f| Value::Float(f as f64)),
            "FLOAT8" => row.try_get::<f64, _>(idx).map(Value::Float),
            "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => {
                row.try_get::<String, _>(idx).map(Value::Text)
            }
            "UUID" => row.try_get::<Uuid, _>(idx).map(Value::Uuid),
            "BYTEA" => row.try_get::<Vec<u8>, _>(idx).map(Value::Bytes),
            "TIMESTAMPTZ" => row.try_get::<DateTime<Utc>, _>(idx).map(Value::Time),
            "TIMESTAMP" => row
                .try_get::<NaiveDateTime, _>(idx)
                .map(|t| Value::Time(t.and_utc())),
            _ => return Err(Error::InvalidDatabaseType(type_name)),
        };

        value.map_err(|e| Error::Storage(e.to_string()))
    }
}

#[async_trait]
impl Adapter for PostgresAdapter {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn execute(&self, sql: &str, vars: &[Value]) -> Result<u64, Error> {
        let mut query = sqlx::query(sql);
        for value in vars {
            query = Self::bind_value(query, value)?;
        }

        let result = query
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;
        Ok(result.rows_affected())
    }

    async fn fetch(
        &self,
        sql: &str,
        vars: &[Value],
        columns: &[Field],
    ) -> Result<Vec<Vec<Value>>, Error> {
        let mut query = sqlx::query(sql);
        for value in vars {
            query = Self::bind_value(query, value)?;
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;

        rows.iter()
            .map(|row| {
                columns
                    .iter()
                    .enumerate()
                    .map(|(idx, field)| Self::decode_column(row, idx, field))
                    .collect()
            })
            .collect()
    }
}

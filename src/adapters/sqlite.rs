use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    Row, Sqlite, TypeInfo, ValueRef,
    query::Query as SqlxQuery,
    sqlite::{SqliteArguments, SqlitePool, SqlitePoolOptions, SqliteRow},
};
use uuid::Uuid;

use crate::{
    adapters::Adapter,
    error::Error,
    schema::Field,
    statement::Dialect,
    value::{FieldKind, Value},
};

/// SQLite adapter.
///
/// SQLite has no time type: times are stored as RFC 3339 `TEXT`, and a
/// `DATETIME` column accepts whatever is written to it. Values are decoded
/// by storage class, so a serializer sees text that is not a time as text.
pub struct SqliteAdapter {
    pub(crate) pool: SqlitePool,
}

impl SqliteAdapter {
    /// Create a new SQLite adapter with a file-based database
    pub async fn new_file(path: &str) -> Result<Self, Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&format!("sqlite:{}?mode=rwc", path))
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;

        Ok(Self { pool })
    }

    /// Create a new SQLite adapter with an in-memory database
    pub async fn new_memory() -> Result<Self, Error> {
        Self::connect("sqlite::memory:", 1).await
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, Error> {
        // every connection to sqlite::memory: opens its own database
        let max_connections = if url.contains(":memory:") {
            1
        } else {
            max_connections
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;

        Ok(Self { pool })
    }

    /// Create from an existing pool
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn bind_value<'a>(
        query: SqlxQuery<'a, Sqlite, SqliteArguments<'a>>,
        value: &Value,
    ) -> Result<SqlxQuery<'a, Sqlite, SqliteArguments<'a>>, Error> {
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

    fn decode_column(row: &SqliteRow, idx: usize, field: &Field) -> Result<Value, Error> {
        let expected = field.column_kind()?;
        let raw = row
            .try_get_raw(idx)
            .map_err(|e| Error::Storage(e.to_string()))?;
        if raw.is_null() {
            return Ok(Value::Null(expected));
        }
        let storage = raw.type_info().name().to_string();

        let storage_err = |e: sqlx::Error| Error::Storage(e.to_string());
        let value = match (expected, storage.as_str()) {
            (FieldKind::Time, "TEXT" | "INTEGER" | "REAL" | "DATETIME") => {
                match row.try_get::<DateTime<Utc>, _>(idx) {
                    Ok(time) => Value::Time(time),
                    // not a time after all, let the caller decide
                    Err(_) => Self::decode_storage(row, idx, &storage)?,
                }
            }
            (FieldKind::Bool, "INTEGER" | "BOOLEAN") => {
                Value::Bool(row.try_get::<bool, _>(idx).map_err(storage_err)?)
            }
            (FieldKind::Uuid, "BLOB") => {
                Value::Uuid(row.try_get::<Uuid, _>(idx).map_err(storage_err)?)
            }
            _ => Self::decode_storage(row, idx, &storage)?,
        };

        Ok(value)
    }

    fn decode_storage(row: &SqliteRow, idx: usize, storage: &str) -> Result<Value, Error> {
        let value = match storage {
            "INTEGER" | "BOOLEAN" => row.try_get::<i64, _>(idx).map(Value::Int),
            "REAL" | "NUMERIC" => row.try_get::<f64, _>(idx).map(Value::Float),
            "TEXT" | "DATETIME" | "DATE" | "TIME" => row.try_get::<String, _>(idx).map(Value::Text),
            "BLOB" => row.try_get::<Vec<u8>, _>(idx).map(Value::Bytes),
            other => return Err(Error::InvalidDatabaseType(other.to_string())),
        };

        value.map_err(|e| Error::Storage(e.to_string()))
    }
}

#[async_trait]
impl Adapter for SqliteAdapter {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
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

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "sqlite")]
pub mod sqlite;

use async_trait::async_trait;

use crate::{
    config::Config,
    error::Error,
    schema::{Field, Schema},
    statement::{Dialect, quote},
    value::{FieldKind, Value},
};

/// -----------------------------
/// Adapter contract
/// -----------------------------

#[async_trait]
pub trait Adapter: Send + Sync + 'static {
    fn dialect(&self) -> Dialect;

    /// Run a statement, returning the number of affected rows.
    async fn execute(&self, sql: &str, vars: &[Value]) -> Result<u64, Error>;

    /// Run a query and decode each row into one value per field in `columns`.
    ///
    /// Values are decoded from what the database actually holds; `columns`
    /// only types the NULLs.
    async fn fetch(
        &self,
        sql: &str,
        vars: &[Value],
        columns: &[Field],
    ) -> Result<Vec<Vec<Value>>, Error>;

    /// Create the table for `schema` if it does not exist.
    async fn migrate(&self, schema: &Schema) -> Result<(), Error> {
        let sql = create_table_sql(self.dialect(), schema)?;
        self.execute(&sql, &[]).await.map(|_| ())
    }
}

/// Open the adapter matching the scheme of `config.url`.
pub(crate) async fn open(config: &Config) -> Result<Box<dyn Adapter>, Error> {
    let url = config.url.as_str();
    if url.starts_with("postgres://") || url.starts_with("postgresql://") {
        open_postgres(config).await
    } else if url.starts_with("sqlite:") {
        open_sqlite(config).await
    } else {
        Err(Error::Config(format!("unsupported database url: {}", url)))
    }
}

#[cfg(feature = "postgres")]
async fn open_postgres(config: &Config) -> Result<Box<dyn Adapter>, Error> {
    let adapter = postgres::PostgresAdapter::connect(&config.url, config.max_connections).await?;
    Ok(Box::new(adapter))
}

#[cfg(not(feature = "postgres"))]
async fn open_postgres(_config: &Config) -> Result<Box<dyn Adapter>, Error> {
    Err(Error::Config("built without the `postgres` feature".to_string()))
}

#[cfg(feature = "sqlite")]
async fn open_sqlite(config: &Config) -> Result<Box<dyn Adapter>, Error> {
    let adapter = sqlite::SqliteAdapter::connect(&config.url, config.max_connections).await?;
    Ok(Box::new(adapter))
}

#[cfg(not(feature = "sqlite"))]
async fn open_sqlite(_config: &Config) -> Result<Box<dyn Adapter>, Error> {
    Err(Error::Config("built without the `sqlite` feature".to_string()))
}

pub(crate) fn column_type(dialect: Dialect, kind: FieldKind) -> &'static str {
    match (dialect, kind) {
        (Dialect::Postgres, FieldKind::Bool) => "BOOLEAN",
        (Dialect::Postgres, FieldKind::Int) => "BIGINT",
        (Dialect::Postgres, FieldKind::Float) => "DOUBLE PRECISION",
        (Dialect::Postgres, FieldKind::Text) => "TEXT",
        (Dialect::Postgres, FieldKind::Uuid) => "UUID",
        (Dialect::Postgres, FieldKind::Bytes) => "BYTEA",
        (Dialect::Postgres, FieldKind::Time | FieldKind::Timestamp) => "TIMESTAMPTZ",
        (Dialect::Sqlite, FieldKind::Bool) => "BOOLEAN",
        (Dialect::Sqlite, FieldKind::Int) => "INTEGER",
        (Dialect::Sqlite, FieldKind::Float) => "REAL",
        (Dialect::Sqlite, FieldKind::Text) => "TEXT",
        (Dialect::Sqlite, FieldKind::Uuid | FieldKind::Bytes) => "BLOB",
        (Dialect::Sqlite, FieldKind::Time | FieldKind::Timestamp) => "DATETIME",
    }
}

pub(crate) fn create_table_sql(dialect: Dialect, schema: &Schema) -> Result<String, Error> {
    let mut columns = Vec::with_capacity(schema.fields.len());
    for field in schema.fields {
        let mut column = format!(
            "{} {}",
            quote(field.column),
            column_type(dialect, field.column_kind()?)
        );
        if field.primary_key {
            column.push_str(" PRIMARY KEY");
        } else if !field.nullable {
            column.push_str(" NOT NULL");
        }
        columns.push(column);
    }

    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote(schema.table),
        columns.join(", ")
    ))
}

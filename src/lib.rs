//! # timestamppb
//!
//! Protobuf `google.protobuf.Timestamp` fields for sqlx-backed models.
//!
//! The crate provides one serializer and one plugin:
//!
//! ### The `timestamppb` serializer
//! Stores a `prost_types::Timestamp` field in a SQL time column
//! (`TIMESTAMPTZ` on Postgres, `DATETIME` on SQLite) and reads it back.
//! A `None` field is written as a NULL time; a NULL column leaves the field
//! `None`. It is registered globally and selected per field with
//! `#[model(serializer = "timestamppb")]`.
//!
//! ### The `TimestampPb` plugin
//! Hooks into the create, update, query and delete callback chains:
//! - **create** fills `created_at` and `updated_at` when they are `None`
//! - **update** fills `updated_at` when it is `None`
//! - **query** hides rows whose `deleted_at` is set
//! - **delete** sets `deleted_at` instead of removing the row
//!
//! Soft delete only applies when the model has a `deleted_at` field of the
//! wire timestamp type. [`Db::unscoped`] bypasses every hook.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use prost_types::Timestamp;
//! use timestamppb::{Config, Db, Model};
//! use uuid::Uuid;
//!
//! #[derive(Model, Debug, Clone)]
//! #[model(table = "users")]
//! struct User {
//!     #[model(primary_key)]
//!     id: Uuid,
//!     name: String,
//!     #[model(serializer = "timestamppb")]
//!     created_at: Option<Timestamp>,
//!     #[model(serializer = "timestamppb")]
//!     updated_at: Option<Timestamp>,
//!     #[model(serializer = "timestamppb")]
//!     deleted_at: Option<Timestamp>,
//! }
//!
//! let db = Db::connect(&Config::new("sqlite::memory:")).await?;
//! db.migrate::<User>().await?;
//!
//! let mut user = User { id: Uuid::now_v7(), name: "ada".into(), created_at: None, updated_at: None, deleted_at: None };
//! db.create(&mut user).await?;      // created_at / updated_at populated
//! db.delete(&mut user).await?;      // deleted_at populated, row kept
//! assert!(db.fetch::<User>(user.id).await?.is_none());
//! assert!(db.unscoped().fetch::<User>(user.id).await?.is_some());
//! ```
//!
//! ## Feature flags
//!
//! | Flag       | Default | Description                        |
//! |------------|---------|------------------------------------|
//! | `postgres` | ✓       | PostgreSQL adapter via sqlx        |
//! | `sqlite`   | ✓       | SQLite adapter (in-memory or file) |
//! | `derive`   | ✓       | `#[derive(Model)]`                 |

extern crate self as timestamppb;

pub mod adapters;
pub mod callbacks;
pub mod config;
pub mod error;
pub mod plugin;
pub mod query;
pub mod schema;
pub mod serializer;
pub mod statement;
pub mod timestamp;
pub mod value;

use std::sync::{Arc, RwLock};

pub use crate::adapters::Adapter;
pub use crate::callbacks::{Callbacks, Operation};
pub use crate::config::{Config, TimestampConfig};
pub use crate::error::Error;
pub use crate::plugin::Plugin;
pub use crate::query::Query;
pub use crate::schema::{Field, Model, Row, Schema};
pub use crate::serializer::{Serializer, get_serializer, register_serializer};
pub use crate::statement::{Comparison, Statement};
pub use crate::timestamp::TimestampPb;
pub use crate::value::{FieldKind, FieldType, FromValue, ToValue, Value};

pub use prost_types;

#[cfg(feature = "derive")]
pub use timestamppb_derive::*;

use crate::statement::Condition;

/// Entry point for persisting models. Cheap to clone.
#[derive(Clone)]
pub struct Db {
    inner: Arc<Inner>,
    unscoped: bool,
}

struct Inner {
    adapter: Box<dyn Adapter>,
    callbacks: RwLock<Callbacks>,
    plugins: RwLock<Vec<String>>,
}

impl Db {
    /// Wrap an adapter. Only the built-in callbacks are installed.
    pub fn new(adapter: Box<dyn Adapter>) -> Self {
        Self {
            inner: Arc::new(Inner {
                adapter,
                callbacks: RwLock::new(Callbacks::default()),
                plugins: RwLock::new(Vec::new()),
            }),
            unscoped: false,
        }
    }

    /// Open the database at `config.url` and install [`TimestampPb`]
    /// configured with `config.timestamps`.
    pub async fn connect(config: &Config) -> Result<Self, Error> {
        let adapter = adapters::open(config).await?;
        let db = Self::new(adapter);
        db.use_plugin(TimestampPb::with_config(config.timestamps.clone()))?;
        tracing::debug!(dialect = ?db.inner.adapter.dialect(), "database connected");
        Ok(db)
    }

    pub fn use_plugin<P: Plugin>(&self, plugin: P) -> Result<(), Error> {
        let mut plugins = self.inner.plugins.write().unwrap_or_else(|e| e.into_inner());
        if plugins.iter().any(|name| name == plugin.name()) {
            return Err(Error::PluginRegistered(plugin.name().to_string()));
        }

        let mut callbacks = self
            .inner
            .callbacks
            .write()
            .unwrap_or_else(|e| e.into_inner());
        // a failed plugin must leave the live chains untouched
        let mut staged = callbacks.clone();
        plugin.initialize(&mut staged)?;
        *callbacks = staged;
        plugins.push(plugin.name().to_string());
        Ok(())
    }

    /// Edit the callback chains directly.
    pub fn register_callbacks<F>(&self, f: F) -> Result<(), Error>
    where
        F: FnOnce(&mut Callbacks) -> Result<(), Error>,
    {
        let mut callbacks = self
            .inner
            .callbacks
            .write()
            .unwrap_or_else(|e| e.into_inner());
        f(&mut callbacks)
    }

    /// A handle whose statements skip the timestamp and soft delete hooks.
    pub fn unscoped(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            unscoped: true,
        }
    }

    pub fn adapter(&self) -> &dyn Adapter {
        self.inner.adapter.as_ref()
    }

    pub async fn migrate<T: Model>(&self) -> Result<(), Error> {
        self.inner.adapter.migrate(T::schema()).await
    }

    // ==================== Create ====================

    pub async fn create<T: Model>(&self, model: &mut T) -> Result<(), Error> {
        self.create_many(std::slice::from_mut(model)).await?;
        Ok(())
    }

    /// Insert all `models` in one statement.
    pub async fn create_many<T: Model>(&self, models: &mut [T]) -> Result<u64, Error> {
        let mut stmt = self.statement::<T>();
        stmt.dest = models.iter().map(Model::to_row).collect();

        self.run(Operation::Create, &mut stmt)?;
        let affected = self.exec(&stmt).await?;

        write_back(models, stmt.dest)?;
        Ok(affected)
    }

    // ==================== Read ====================

    /// Fetch by primary key.
    pub async fn fetch<T: Model>(&self, id: impl ToValue) -> Result<Option<T>, Error> {
        let schema = T::schema();
        let pk = schema
            .primary_key()
            .ok_or_else(|| Error::MissingPrimaryKey(schema.table.to_string()))?;
        self.query::<T>().where_eq(pk.name, id).first().await
    }

    pub fn query<T: Model>(&self) -> Query<'_, T> {
        Query::new(self)
    }

    // ==================== Update ====================

    /// Write every field of `model`, matched by primary key.
    pub async fn update<T: Model>(&self, model: &mut T) -> Result<u64, Error> {
        let mut stmt = self.model_statement(model)?;

        self.run(Operation::Update, &mut stmt)?;
        let affected = self.exec(&stmt).await?;

        write_back(std::slice::from_mut(model), stmt.dest)?;
        Ok(affected)
    }

    // ==================== Delete ====================

    /// Delete `model` by primary key. Soft deletes set `model.deleted_at`.
    pub async fn delete<T: Model>(&self, model: &mut T) -> Result<u64, Error> {
        let mut stmt = self.model_statement(model)?;

        self.run(Operation::Delete, &mut stmt)?;
        let affected = self.exec(&stmt).await?;

        write_back(std::slice::from_mut(model), stmt.dest)?;
        Ok(affected)
    }

    // ==================== Internals ====================

    pub(crate) fn statement<T: Model>(&self) -> Statement {
        let mut stmt = Statement::for_schema(T::schema(), self.inner.adapter.dialect());
        stmt.unscoped = self.unscoped;
        stmt
    }

    /// Statement targeting `model`'s row by primary key.
    fn model_statement<T: Model>(&self, model: &T) -> Result<Statement, Error> {
        let schema = T::schema();
        let pk = schema
            .primary_key()
            .ok_or_else(|| Error::MissingPrimaryKey(schema.table.to_string()))?;

        let row = model.to_row();
        let id = row
            .get(pk.name)
            .ok_or_else(|| Error::UnknownField(pk.name.to_string()))?;

        let mut stmt = self.statement::<T>();
        stmt.add_where(Condition::Compare {
            column: pk.column.to_string(),
            comparison: Comparison::Equal,
            value: pk.to_column_value(id)?,
        });
        stmt.dest.push(row);
        Ok(stmt)
    }

    pub(crate) fn run(&self, operation: Operation, stmt: &mut Statement) -> Result<(), Error> {
        let callbacks = self.inner.callbacks.read().unwrap_or_else(|e| e.into_inner());
        callbacks.processor(operation).execute(stmt)
    }

    pub(crate) async fn exec(&self, stmt: &Statement) -> Result<u64, Error> {
        tracing::debug!(sql = %stmt.sql, vars = stmt.vars.len(), "execute");
        self.inner.adapter.execute(&stmt.sql, &stmt.vars).await
    }

    pub(crate) async fn fetch_rows(
        &self,
        stmt: &Statement,
        columns: &[Field],
    ) -> Result<Vec<Vec<Value>>, Error> {
        tracing::debug!(sql = %stmt.sql, vars = stmt.vars.len(), "fetch");
        self.inner
            .adapter
            .fetch(&stmt.sql, &stmt.vars, columns)
            .await
    }
}

fn write_back<T: Model>(models: &mut [T], rows: Vec<Row>) -> Result<(), Error> {
    for (model, row) in models.iter_mut().zip(rows) {
        *model = T::from_row(row)?;
    }
    Ok(())
}


#[cfg(all(test, feature = "sqlite"))]
mod test {
    use super::*;
    use crate::{
        adapters::sqlite::SqliteAdapter,
        callbacks::{BEFORE_CREATE, BEFORE_DELETE, CREATE, DELETE, QUERY},
    };

    async fn memory_db() -> Db {
        Db::new(Box::new(SqliteAdapter::new_memory().await.unwrap()))
    }

    fn chain(db: &Db, operation: Operation) -> Vec<String> {
        let callbacks = db.inner.callbacks.read().unwrap();
        callbacks
            .processor(operation)
            .names()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    #[tokio::test]
    async fn test_failed_plugin_leaves_chains_untouched() {
        let db = memory_db().await;
        db.register_callbacks(|callbacks| {
            callbacks
                .query()
                .before(QUERY)
                .register(TimestampPb::NAME, |_: &mut Statement| Ok(()))
        })
        .unwrap();

        let err = db.use_plugin(TimestampPb::new()).unwrap_err();
        assert_eq!(err, Error::DuplicateCallback(TimestampPb::NAME.to_string()));
        assert_eq!(chain(&db, Operation::Delete), vec![BEFORE_DELETE, DELETE]);
        assert_eq!(chain(&db, Operation::Create), vec![BEFORE_CREATE, CREATE]);

        // the plugin can be installed once the conflict is gone
        db.register_callbacks(|callbacks| callbacks.query().remove(TimestampPb::NAME))
            .unwrap();
        db.use_plugin(TimestampPb::new()).unwrap();
        assert_eq!(
            chain(&db, Operation::Delete),
            vec![TimestampPb::NAME, BEFORE_DELETE, DELETE]
        );
    }

    #[tokio::test]
    async fn test_connect_rejects_unknown_scheme() {
        let err = Db::connect(&Config::new("mysql://localhost/app"))
            .await
            .err()
            .unwrap();
        assert_eq!(
            err,
            Error::Config("unsupported database url: mysql://localhost/app".to_string())
        );
    }
}

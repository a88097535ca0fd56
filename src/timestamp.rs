//! Protobuf timestamp support.
//!
//! [`TimestampPb`] is both a [`Serializer`] for `prost_types::Timestamp`
//! fields stored in SQL time columns and a [`Plugin`] that fills
//! `created_at` / `updated_at` and turns deletes of models carrying a
//! `deleted_at` timestamp into soft deletes.
//!
//! ```rust,ignore
//! #[derive(Model)]
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
//! db.use_plugin(TimestampPb::new())?;
//! ```

use chrono::{DateTime, Utc};
use metrics::counter;
use prost_types::Timestamp;

use crate::{
    callbacks::{BEFORE_CREATE, BEFORE_DELETE, Callbacks, QUERY, UPDATE},
    config::TimestampConfig,
    error::Error,
    plugin::Plugin,
    schema::Field,
    serializer::Serializer,
    statement::{Condition, Statement, StatementKind},
    value::{FieldKind, Value},
};

/// Wire timestamp for an instant.
pub fn from_datetime(time: &DateTime<Utc>) -> Timestamp {
    Timestamp {
        seconds: time.timestamp(),
        nanos: time.timestamp_subsec_nanos().min(999_999_999) as i32,
    }
}

/// Instant of a wire timestamp. Out of range nanos are carried into seconds.
pub fn to_datetime(timestamp: &Timestamp) -> Result<DateTime<Utc>, Error> {
    let mut ts = timestamp.clone();
    ts.normalize();
    DateTime::from_timestamp(ts.seconds, ts.nanos as u32).ok_or_else(|| {
        Error::InvalidTimestamp(format!("{}s {}ns out of range", ts.seconds, ts.nanos))
    })
}

pub fn now() -> Timestamp {
    from_datetime(&Utc::now())
}

#[derive(Debug, Clone, Default)]
pub struct TimestampPb {
    fields: TimestampConfig,
}

impl TimestampPb {
    pub const NAME: &'static str = "timestamppb";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(fields: TimestampConfig) -> Self {
        Self { fields }
    }

    pub fn before_create(&self, stmt: &mut Statement) -> Result<(), Error> {
        self.set_if_nil(
            stmt,
            &[self.fields.created_at.as_str(), self.fields.updated_at.as_str()],
        );
        Ok(())
    }

    pub fn before_update(&self, stmt: &mut Statement) -> Result<(), Error> {
        self.set_if_nil(stmt, &[self.fields.updated_at.as_str()]);
        Ok(())
    }

    pub fn before_query(&self, stmt: &mut Statement) -> Result<(), Error> {
        let Some(field) = self.soft_delete_field(stmt) else {
            return Ok(());
        };

        let condition = format!("{} IS NULL", stmt.column(field.column));
        stmt.add_where(Condition::Raw(condition));
        Ok(())
    }

    /// Rewrite the delete into `UPDATE ... SET deleted_at = now`.
    pub fn before_delete(&self, stmt: &mut Statement) -> Result<(), Error> {
        let Some(field) = self.soft_delete_field(stmt) else {
            return Ok(());
        };

        let time = Utc::now();
        stmt.add_set(field.column, Value::Time(time));
        stmt.set_column(field.name, Value::Timestamp(from_datetime(&time)));
        stmt.mark_update();
        stmt.build(StatementKind::Update)?;

        counter!("timestamppb.soft_delete.total", "table" => stmt.table.clone()).increment(1);
        tracing::debug!(table = %stmt.table, column = field.column, "delete rewritten to soft delete");
        Ok(())
    }

    /// Store `now` into every named wire timestamp field that is still null,
    /// across all destination rows.
    pub fn set_if_nil(&self, stmt: &mut Statement, fields: &[&str]) {
        if stmt.schema.is_none() || stmt.unscoped || fields.is_empty() {
            return;
        }

        let now = now();
        for row in stmt.dest.iter_mut() {
            for name in fields {
                if let Some(value) = row.get_mut(name) {
                    if *value == Value::Null(FieldKind::Timestamp) {
                        *value = Value::Timestamp(now.clone());
                    }
                }
            }
        }
    }

    fn soft_delete_field(&self, stmt: &Statement) -> Option<&'static Field> {
        if stmt.unscoped {
            return None;
        }
        let field = stmt.schema?.field_by_name(&self.fields.deleted_at)?;
        (field.kind == FieldKind::Timestamp).then_some(field)
    }
}

impl Serializer for TimestampPb {
    fn scan(&self, _field: &Field, dst: &mut Value, db_value: Value) -> Result<(), Error> {
        match db_value {
            Value::Time(time) => {
                *dst = Value::Timestamp(from_datetime(&time));
                Ok(())
            }
            Value::Null(_) => Ok(()),
            other => Err(Error::InvalidDatabaseType(other.type_name())),
        }
    }

    fn value(&self, _field: &Field, field_value: &Value) -> Result<Value, Error> {
        match field_value {
            Value::Timestamp(ts) => Ok(Value::Time(to_datetime(ts)?)),
            Value::Null(FieldKind::Timestamp) => Ok(Value::Null(FieldKind::Time)),
            other => Err(Error::InvalidSourceType(other.type_name())),
        }
    }

    fn column_kind(&self) -> FieldKind {
        FieldKind::Time
    }
}

impl Plugin for TimestampPb {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn initialize(&self, callbacks: &mut Callbacks) -> Result<(), Error> {
        let (delete, create, update, query) =
            (self.clone(), self.clone(), self.clone(), self.clone());

        let check = [
            callbacks
                .delete()
                .before(BEFORE_DELETE)
                .register(Self::NAME, move |stmt: &mut Statement| delete.before_delete(stmt)),
            callbacks
                .create()
                .before(BEFORE_CREATE)
                .register(Self::NAME, move |stmt: &mut Statement| create.before_create(stmt)),
            callbacks
                .update()
                .before(UPDATE)
                .register(Self::NAME, move |stmt: &mut Statement| update.before_update(stmt)),
            callbacks
                .query()
                .before(QUERY)
                .register(Self::NAME, move |stmt: &mut Statement| query.before_query(stmt)),
        ];

        check.into_iter().collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        callbacks::{CREATE, DELETE, Operation},
        schema::{Row, Schema},
        statement::Dialect,
    };

    const fn field(name: &'static str, kind: FieldKind, primary_key: bool) -> Field {
        Field {
            name,
            column: name,
            kind,
            nullable: !primary_key,
            primary_key,
            serializer: match kind {
                FieldKind::Timestamp => Some("timestamppb"),
                _ => None,
            },
        }
    }

    static ACCOUNT_FIELDS: [Field; 4] = [
        field("id", FieldKind::Int, true),
        field("created_at", FieldKind::Timestamp, false),
        field("updated_at", FieldKind::Timestamp, false),
        field("deleted_at", FieldKind::Timestamp, false),
    ];

    static ACCOUNT: Schema = Schema {
        name: "Account",
        table: "accounts",
        fields: &ACCOUNT_FIELDS,
    };

    // deleted_at is a SQL time, not a wire timestamp
    static LEGACY_FIELDS: [Field; 2] = [
        field("id", FieldKind::Int, true),
        field("deleted_at", FieldKind::Time, false),
    ];

    static LEGACY: Schema = Schema {
        name: "Legacy",
        table: "legacy",
        fields: &LEGACY_FIELDS,
    };

    fn account_row(created_at: Option<Timestamp>) -> Row {
        let null = Value::Null(FieldKind::Timestamp);
        Row::from(vec![
            ("id", Value::Int(1)),
            ("created_at", created_at.map(Value::Timestamp).unwrap_or(null.clone())),
            ("updated_at", null.clone()),
            ("deleted_at", null),
        ])
    }

    fn account_statement(dialect: Dialect) -> Statement {
        let mut stmt = Statement::for_schema(&ACCOUNT, dialect);
        stmt.dest.push(account_row(None));
        stmt.add_where(Condition::Compare {
            column: "id".into(),
            comparison: crate::statement::Comparison::Equal,
            value: Value::Int(1),
        });
        stmt
    }

    #[test]
    fn test_conversion_normalizes_nanos() {
        let time = to_datetime(&Timestamp {
            seconds: 10,
            nanos: -1,
        })
        .unwrap();
        assert_eq!(time.timestamp(), 9);
        assert_eq!(time.timestamp_subsec_nanos(), 999_999_999);

        let back = from_datetime(&time);
        assert_eq!(back, Timestamp { seconds: 9, nanos: 999_999_999 });
    }

    #[test]
    fn test_conversion_out_of_range() {
        let err = to_datetime(&Timestamp {
            seconds: i64::MAX,
            nanos: 0,
        })
        .unwrap_err();
        assert!(matches!(err, Error::InvalidTimestamp(_)));
    }

    #[test]
    fn test_scan() {
        let plugin = TimestampPb::new();
        let field = &ACCOUNT_FIELDS[1];
        let time = DateTime::from_timestamp(1_700_000_000, 5_000).unwrap();

        let mut dst = Value::Null(FieldKind::Timestamp);
        plugin.scan(field, &mut dst, Value::Time(time)).unwrap();
        assert_eq!(
            dst,
            Value::Timestamp(Timestamp {
                seconds: 1_700_000_000,
                nanos: 5_000
            })
        );

        // NULL leaves the destination alone
        plugin
            .scan(field, &mut dst, Value::Null(FieldKind::Time))
            .unwrap();
        assert!(matches!(dst, Value::Timestamp(_)));

        let err = plugin
            .scan(field, &mut dst, Value::Text("yesterday".into()))
            .unwrap_err();
        assert_eq!(err.to_string(), "invalid database type: text");
    }

    #[test]
    fn test_value() {
        let plugin = TimestampPb::new();
        let field = &ACCOUNT_FIELDS[1];
        let ts = Timestamp {
            seconds: 86_400,
            nanos: 0,
        };

        assert_eq!(
            plugin.value(field, &Value::Timestamp(ts)).unwrap(),
            Value::Time(DateTime::from_timestamp(86_400, 0).unwrap())
        );
        assert_eq!(
            plugin
                .value(field, &Value::Null(FieldKind::Timestamp))
                .unwrap(),
            Value::Null(FieldKind::Time)
        );

        let err = plugin.value(field, &Value::Int(3)).unwrap_err();
        assert_eq!(err.to_string(), "invalid source type: int");
        let err = plugin
            .value(field, &Value::Null(FieldKind::Text))
            .unwrap_err();
        assert_eq!(err, Error::InvalidSourceType("null text".to_string()));
    }

    #[test]
    fn test_set_if_nil_fills_only_null_fields() {
        let plugin = TimestampPb::new();
        let existing = Timestamp {
            seconds: 42,
            nanos: 0,
        };
        let mut stmt = Statement::for_schema(&ACCOUNT, Dialect::Sqlite);
        stmt.dest = vec![account_row(Some(existing.clone())), account_row(None)];

        plugin.before_create(&mut stmt).unwrap();

        let first = &stmt.dest[0];
        assert_eq!(first.get("created_at"), Some(&Value::Timestamp(existing)));
        assert!(matches!(first.get("updated_at"), Some(Value::Timestamp(_))));
        assert!(first.get("deleted_at").unwrap().is_null());

        let second = &stmt.dest[1];
        assert!(matches!(second.get("created_at"), Some(Value::Timestamp(_))));
        assert!(matches!(second.get("updated_at"), Some(Value::Timestamp(_))));
    }

    #[test]
    fn test_set_if_nil_skips() {
        let plugin = TimestampPb::new();

        let mut unscoped = Statement::for_schema(&ACCOUNT, Dialect::Sqlite);
        unscoped.unscoped = true;
        unscoped.dest.push(account_row(None));
        plugin.before_create(&mut unscoped).unwrap();
        assert!(unscoped.dest[0].get("created_at").unwrap().is_null());

        let mut schemaless = Statement::new(None, "accounts", Dialect::Sqlite);
        schemaless.dest.push(account_row(None));
        plugin.before_update(&mut schemaless).unwrap();
        assert!(schemaless.dest[0].get("updated_at").unwrap().is_null());

        let mut no_fields = Statement::for_schema(&ACCOUNT, Dialect::Sqlite);
        no_fields.dest.push(account_row(None));
        plugin.set_if_nil(&mut no_fields, &[]);
        assert_eq!(no_fields.dest[0], account_row(None));
    }

    #[test]
    fn test_before_update_touches_updated_at_only() {
        let plugin = TimestampPb::new();
        let mut stmt = account_statement(Dialect::Sqlite);
        plugin.before_update(&mut stmt).unwrap();
        assert!(stmt.dest[0].get("created_at").unwrap().is_null());
        assert!(matches!(
            stmt.dest[0].get("updated_at"),
            Some(Value::Timestamp(_))
        ));
    }

    #[test]
    fn test_before_query_scopes_soft_deleted() {
        let plugin = TimestampPb::new();
        let mut stmt = Statement::for_schema(&ACCOUNT, Dialect::Postgres);
        plugin.before_query(&mut stmt).unwrap();
        assert_eq!(
            stmt.clauses.wheres,
            vec![Condition::Raw(r#""accounts"."deleted_at" IS NULL"#.to_string())]
        );

        let mut unscoped = Statement::for_schema(&ACCOUNT, Dialect::Postgres);
        unscoped.unscoped = true;
        plugin.before_query(&mut unscoped).unwrap();
        assert!(unscoped.clauses.wheres.is_empty());

        let mut legacy = Statement::for_schema(&LEGACY, Dialect::Postgres);
        plugin.before_query(&mut legacy).unwrap();
        assert!(legacy.clauses.wheres.is_empty());

        let mut schemaless = Statement::new(None, "accounts", Dialect::Postgres);
        plugin.before_query(&mut schemaless).unwrap();
        assert!(schemaless.clauses.wheres.is_empty());
    }

    #[test]
    fn test_before_delete_rewrites_to_update() {
        let plugin = TimestampPb::new();
        let mut stmt = account_statement(Dialect::Postgres);
        plugin.before_delete(&mut stmt).unwrap();

        assert_eq!(
            stmt.sql,
            r#"UPDATE "accounts" SET "deleted_at" = $1 WHERE "accounts"."id" = $2"#
        );
        assert!(matches!(stmt.vars[0], Value::Time(_)));
        assert_eq!(stmt.vars[1], Value::Int(1));

        let (Some(Value::Timestamp(ts)), Value::Time(time)) =
            (stmt.dest[0].get("deleted_at"), &stmt.vars[0])
        else {
            panic!("deleted_at not populated");
        };
        assert_eq!(&to_datetime(ts).unwrap(), time);
    }

    #[test]
    fn test_before_delete_skips() {
        let plugin = TimestampPb::new();

        let mut unscoped = account_statement(Dialect::Sqlite);
        unscoped.unscoped = true;
        plugin.before_delete(&mut unscoped).unwrap();
        assert!(!unscoped.is_built());
        assert!(!unscoped.clauses.update);

        let mut legacy = Statement::for_schema(&LEGACY, Dialect::Sqlite);
        plugin.before_delete(&mut legacy).unwrap();
        assert!(!legacy.is_built());
    }

    #[test]
    fn test_custom_field_names() {
        let plugin = TimestampPb::with_config(TimestampConfig {
            deleted_at: "created_at".to_string(),
            ..TimestampConfig::default()
        });
        let mut stmt = Statement::for_schema(&ACCOUNT, Dialect::Sqlite);
        plugin.before_query(&mut stmt).unwrap();
        assert_eq!(
            stmt.clauses.wheres,
            vec![Condition::Raw(r#""accounts"."created_at" IS NULL"#.to_string())]
        );
    }

    #[test]
    fn test_initialize_registers_before_anchors() {
        let mut callbacks = Callbacks::default();
        TimestampPb::new().initialize(&mut callbacks).unwrap();

        assert_eq!(
            callbacks.create().names(),
            vec![TimestampPb::NAME, BEFORE_CREATE, CREATE]
        );
        assert_eq!(callbacks.query().names(), vec![TimestampPb::NAME, QUERY]);
        assert_eq!(
            callbacks.update().names(),
            vec![crate::callbacks::BEFORE_UPDATE, TimestampPb::NAME, UPDATE]
        );
        assert_eq!(
            callbacks.delete().names(),
            vec![TimestampPb::NAME, BEFORE_DELETE, DELETE]
        );

        let err = TimestampPb::new().initialize(&mut callbacks).unwrap_err();
        assert_eq!(err, Error::DuplicateCallback(TimestampPb::NAME.to_string()));
    }

    #[test]
    fn test_soft_delete_through_delete_chain() {
        let mut callbacks = Callbacks::default();
        TimestampPb::new().initialize(&mut callbacks).unwrap();

        let mut stmt = account_statement(Dialect::Sqlite);
        callbacks
            .processor(Operation::Delete)
            .execute(&mut stmt)
            .unwrap();
        assert!(stmt.sql.starts_with(r#"UPDATE "accounts" SET "deleted_at" = ?"#));

        let mut hard = account_statement(Dialect::Sqlite);
        hard.unscoped = true;
        callbacks
            .processor(Operation::Delete)
            .execute(&mut hard)
            .unwrap();
        assert_eq!(
            hard.sql,
            r#"DELETE FROM "accounts" WHERE "accounts"."id" = ?"#
        );
    }
}

use chrono::{DateTime, Utc};
use prost_types::Timestamp;
use timestamppb::Model;
use uuid::Uuid;

pub mod test_postgres;
pub mod test_sqlite;

/// Model with all three hooked timestamps.
#[derive(Model, Debug, Clone, PartialEq)]
#[model(table = "users")]
pub struct User {
    #[model(primary_key)]
    pub id: Uuid,
    pub name: String,
    #[model(serializer = "timestamppb")]
    pub created_at: Option<Timestamp>,
    #[model(serializer = "timestamppb")]
    pub updated_at: Option<Timestamp>,
    #[model(serializer = "timestamppb")]
    pub deleted_at: Option<Timestamp>,
}

impl User {
    pub fn new(name: &str) -> Self {
        Self {
            id: Uuid::now_v7(),
            name: name.to_string(),
            created_at: None,
            updated_at: None,
            deleted_at: None,
        }
    }
}

/// No `deleted_at`: deletes are hard deletes. Table name defaults to `notes`.
#[derive(Model, Debug, Clone, PartialEq)]
pub struct Note {
    #[model(primary_key)]
    pub id: i64,
    #[model(column = "content")]
    pub body: String,
    #[model(serializer = "timestamppb")]
    pub created_at: Option<Timestamp>,
    #[model(serializer = "timestamppb")]
    pub updated_at: Option<Timestamp>,
}

/// `deleted_at` is a plain SQL time, so soft delete does not apply.
#[derive(Model, Debug, Clone, PartialEq)]
#[model(table = "legacy_accounts")]
pub struct LegacyAccount {
    #[model(primary_key)]
    pub id: i64,
    pub name: String,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Postgres keeps microseconds.
pub fn truncate_micros(ts: &Timestamp) -> Timestamp {
    Timestamp {
        seconds: ts.seconds,
        nanos: ts.nanos / 1_000 * 1_000,
    }
}

use chrono::{DateTime, Utc};
use prost_types::Timestamp;
use uuid::Uuid;

use crate::error::Error;

/// Storage kind of a model field or a database column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Bool,
    Int,
    Float,
    Text,
    Uuid,
    Bytes,
    /// SQL-native time (`TIMESTAMPTZ`, `DATETIME`).
    Time,
    /// Protobuf wire timestamp.
    Timestamp,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Bool => "bool",
            FieldKind::Int => "int",
            FieldKind::Float => "float",
            FieldKind::Text => "text",
            FieldKind::Uuid => "uuid",
            FieldKind::Bytes => "bytes",
            FieldKind::Time => "time",
            FieldKind::Timestamp => "timestamppb",
        }
    }
}

/// A value moving between a model and the database.
///
/// Nulls are typed so a missing wire timestamp and a missing SQL time stay
/// distinguishable, and so adapters can bind a NULL of the right column type.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null(FieldKind),
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Uuid(Uuid),
    Bytes(Vec<u8>),
    Time(DateTime<Utc>),
    Timestamp(Timestamp),
}

impl Value {
    pub fn kind(&self) -> FieldKind {
        match self {
            Value::Null(kind) => *kind,
            Value::Bool(_) => FieldKind::Bool,
            Value::Int(_) => FieldKind::Int,
            Value::Float(_) => FieldKind::Float,
            Value::Text(_) => FieldKind::Text,
            Value::Uuid(_) => FieldKind::Uuid,
            Value::Bytes(_) => FieldKind::Bytes,
            Value::Time(_) => FieldKind::Time,
            Value::Timestamp(_) => FieldKind::Timestamp,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null(_))
    }

    /// Human readable type name used in error messages.
    pub fn type_name(&self) -> String {
        match self {
            Value::Null(kind) => format!("null {}", kind.as_str()),
            other => other.kind().as_str().to_string(),
        }
    }

    fn mismatch(&self, expected: FieldKind) -> Error {
        Error::TypeMismatch {
            expected: expected.as_str().to_string(),
            found: self.type_name(),
        }
    }
}

/// Compile-time storage description of a Rust field type.
pub trait FieldType {
    const KIND: FieldKind;
    const NULLABLE: bool = false;
}

pub trait ToValue {
    fn to_value(&self) -> Value;
}

pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self, Error>;
}

macro_rules! field_type {
    ($ty:ty, $kind:ident, $variant:ident, |$v:ident| $to:expr, |$w:ident| $from:expr) => {
        impl FieldType for $ty {
            const KIND: FieldKind = FieldKind::$kind;
        }

        impl ToValue for $ty {
            fn to_value(&self) -> Value {
                let $v = self;
                Value::$variant($to)
            }
        }

        impl FromValue for $ty {
            fn from_value(value: Value) -> Result<Self, Error> {
                match value {
                    Value::$variant($w) => Ok($from),
                    other => Err(other.mismatch(FieldKind::$kind)),
                }
            }
        }
    };
}

field_type!(bool, Bool, Bool, |v| *v, |w| w);
field_type!(i64, Int, Int, |v| *v, |w| w);
field_type!(String, Text, Text, |v| v.clone(), |w| w);
field_type!(f64, Float, Float, |v| *v, |w| w);
field_type!(Uuid, Uuid, Uuid, |v| *v, |w| w);
field_type!(Vec<u8>, Bytes, Bytes, |v| v.clone(), |w| w);
field_type!(DateTime<Utc>, Time, Time, |v| *v, |w| w);
field_type!(Timestamp, Timestamp, Timestamp, |v| v.clone(), |w| w);

impl FieldType for i32 {
    const KIND: FieldKind = FieldKind::Int;
}

impl ToValue for i32 {
    fn to_value(&self) -> Value {
        Value::Int(*self as i64)
    }
}

impl FromValue for i32 {
    fn from_value(value: Value) -> Result<Self, Error> {
        match value {
            Value::Int(i) => i32::try_from(i).map_err(|_| Value::Int(i).mismatch(FieldKind::Int)),
            other => Err(other.mismatch(FieldKind::Int)),
        }
    }
}

impl<T: FieldType> FieldType for Option<T> {
    const KIND: FieldKind = T::KIND;
    const NULLABLE: bool = true;
}

impl<T: FieldType + ToValue> ToValue for Option<T> {
    fn to_value(&self) -> Value {
        match self {
            Some(v) => v.to_value(),
            None => Value::Null(T::KIND),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self, Error> {
        match value {
            Value::Null(_) => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl ToValue for &str {
    fn to_value(&self) -> Value {
        Value::Text(self.to_string())
    }
}

impl ToValue for Value {
    fn to_value(&self) -> Value {
        self.clone()
    }
}

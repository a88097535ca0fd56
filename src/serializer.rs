use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use once_cell::sync::Lazy;

use crate::{
    error::Error,
    schema::Field,
    timestamp::TimestampPb,
    value::{FieldKind, Value},
};

/// Converts a field between its model representation and its column.
pub trait Serializer: Send + Sync {
    /// Read `db_value` into `dst`. Leaving `dst` untouched is a valid outcome.
    fn scan(&self, field: &Field, dst: &mut Value, db_value: Value) -> Result<(), Error>;

    /// Produce the value bound to the database for `field_value`.
    fn value(&self, field: &Field, field_value: &Value) -> Result<Value, Error>;

    /// Kind of the column backing a serialized field.
    fn column_kind(&self) -> FieldKind;
}

static SERIALIZERS: Lazy<RwLock<HashMap<String, Arc<dyn Serializer>>>> = Lazy::new(|| {
    let mut map: HashMap<String, Arc<dyn Serializer>> = HashMap::new();
    map.insert(
        TimestampPb::NAME.to_string(),
        Arc::new(TimestampPb::default()),
    );
    RwLock::new(map)
});

/// Register `serializer` under `name`, replacing any previous one.
pub fn register_serializer(name: impl Into<String>, serializer: Arc<dyn Serializer>) {
    let mut map = SERIALIZERS.write().unwrap_or_else(|e| e.into_inner());
    map.insert(name.into(), serializer);
}

pub fn get_serializer(name: &str) -> Option<Arc<dyn Serializer>> {
    let map = SERIALIZERS.read().unwrap_or_else(|e| e.into_inner());
    map.get(name).cloned()
}

use crate::{
    error::Error,
    serializer::get_serializer,
    value::{FieldKind, Value},
};

/// One persisted field of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    /// Rust field name, used by hooks and query builders.
    pub name: &'static str,
    /// Database column name.
    pub column: &'static str,
    pub kind: FieldKind,
    pub nullable: bool,
    pub primary_key: bool,
    /// Name of a registered serializer handling this field, if any.
    pub serializer: Option<&'static str>,
}

impl Field {
    /// Kind of the value as stored in the database.
    pub fn column_kind(&self) -> Result<FieldKind, Error> {
        match self.serializer {
            Some(name) => Ok(get_serializer(name)
                .ok_or_else(|| Error::UnknownSerializer(name.to_string()))?
                .column_kind()),
            None => Ok(self.kind),
        }
    }

    /// Convert a model value into the value bound to the database.
    pub fn to_column_value(&self, value: &Value) -> Result<Value, Error> {
        match self.serializer {
            Some(name) => get_serializer(name)
                .ok_or_else(|| Error::UnknownSerializer(name.to_string()))?
                .value(self, value),
            None => match value {
                Value::Timestamp(_) | Value::Null(FieldKind::Timestamp) => {
                    Err(Error::MissingSerializer(self.name.to_string()))
                }
                other => Ok(other.clone()),
            },
        }
    }

    /// Convert a value read from the database into the model value.
    pub fn from_column_value(&self, db_value: Value) -> Result<Value, Error> {
        match self.serializer {
            Some(name) => {
                let serializer = get_serializer(name)
                    .ok_or_else(|| Error::UnknownSerializer(name.to_string()))?;
                let mut dst = Value::Null(self.kind);
                serializer.scan(self, &mut dst, db_value)?;
                Ok(dst)
            }
            None => Ok(db_value),
        }
    }
}

/// Table level description of a model, generated by `#[derive(Model)]`.
#[derive(Debug, PartialEq, Eq)]
pub struct Schema {
    pub name: &'static str,
    pub table: &'static str,
    pub fields: &'static [Field],
}

impl Schema {
    pub fn field_by_name(&self, name: &str) -> Option<&'static Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_by_column(&self, column: &str) -> Option<&'static Field> {
        self.fields.iter().find(|f| f.column == column)
    }

    pub fn primary_key(&self) -> Option<&'static Field> {
        self.fields.iter().find(|f| f.primary_key)
    }

    /// Resolve a field or column name, preferring the Rust field name.
    pub fn lookup(&self, name: &str) -> Result<&'static Field, Error> {
        self.field_by_name(name)
            .or_else(|| self.field_by_column(name))
            .ok_or_else(|| Error::UnknownField(format!("{}.{}", self.name, name)))
    }
}

/// Field values of one model instance keyed by Rust field name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    values: Vec<(&'static str, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.values
            .iter_mut()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v)
    }

    pub fn set(&mut self, name: &'static str, value: Value) {
        match self.get_mut(name) {
            Some(slot) => *slot = value,
            None => self.values.push((name, value)),
        }
    }

    /// Remove a value, failing when the row never carried it.
    pub fn take(&mut self, name: &str) -> Result<Value, Error> {
        let idx = self
            .values
            .iter()
            .position(|(n, _)| *n == name)
            .ok_or_else(|| Error::UnknownField(name.to_string()))?;
        Ok(self.values.swap_remove(idx).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(&'static str, Value)> {
        self.values.iter()
    }
}

impl From<Vec<(&'static str, Value)>> for Row {
    fn from(values: Vec<(&'static str, Value)>) -> Self {
        Self { values }
    }
}

/// A struct persisted to one table.
///
/// Derive it with `#[derive(Model)]` rather than implementing by hand.
pub trait Model: Sized + Send + Sync + 'static {
    fn schema() -> &'static Schema;

    fn to_row(&self) -> Row;

    fn from_row(row: Row) -> Result<Self, Error>;
}

#[cfg(test)]
mod test {
    use super::*;

    static FIELDS: [Field; 2] = [
        Field {
            name: "id",
            column: "id",
            kind: FieldKind::Int,
            nullable: false,
            primary_key: true,
            serializer: None,
        },
        Field {
            name: "deleted_at",
            column: "removed_on",
            kind: FieldKind::Timestamp,
            nullable: true,
            primary_key: false,
            serializer: Some("timestamppb"),
        },
    ];

    static SCHEMA: Schema = Schema {
        name: "Note",
        table: "notes",
        fields: &FIELDS,
    };

    #[test]
    fn test_lookup_by_name_or_column() {
        assert_eq!(SCHEMA.lookup("deleted_at").unwrap().column, "removed_on");
        assert_eq!(SCHEMA.lookup("removed_on").unwrap().name, "deleted_at");
        assert!(matches!(SCHEMA.lookup("nope"), Err(Error::UnknownField(_))));
        assert_eq!(SCHEMA.primary_key().unwrap().name, "id");
    }

    #[test]
    fn test_serializer_column_kind() {
        assert_eq!(FIELDS[1].column_kind().unwrap(), FieldKind::Time);
        assert_eq!(FIELDS[0].column_kind().unwrap(), FieldKind::Int);
    }

    #[test]
    fn test_timestamp_without_serializer_is_rejected() {
        let field = Field {
            serializer: None,
            ..FIELDS[1]
        };
        let err = field
            .to_column_value(&Value::Null(FieldKind::Timestamp))
            .unwrap_err();
        assert_eq!(err, Error::MissingSerializer("deleted_at".to_string()));
    }

    #[test]
    fn test_row_set_and_take() {
        let mut row = Row::new();
        row.set("id", Value::Int(1));
        row.set("id", Value::Int(2));
        assert_eq!(row.iter().count(), 1);
        assert_eq!(row.take("id").unwrap(), Value::Int(2));
        assert!(row.take("id").is_err());
    }
}

use std::fmt::Display;

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// A serializer was handed a database value it cannot read.
    InvalidDatabaseType(String),
    /// A serializer was handed a field value it cannot write.
    InvalidSourceType(String),
    InvalidTimestamp(String),
    /// A wire timestamp reached the database layer on a field with no serializer.
    MissingSerializer(String),
    UnknownSerializer(String),
    UnknownField(String),
    MissingPrimaryKey(String),
    MissingWhereClause,
    EmptyDest,
    DuplicateCallback(String),
    UnknownCallback(String),
    PluginRegistered(String),
    TypeMismatch { expected: String, found: String },
    Storage(String),
    Config(String),
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidDatabaseType(kind) => write!(f, "invalid database type: {}", kind),
            Error::InvalidSourceType(kind) => write!(f, "invalid source type: {}", kind),
            Error::InvalidTimestamp(err) => write!(f, "invalid timestamp: {}", err),
            Error::MissingSerializer(field) => {
                write!(f, "field `{}` holds a timestamp but has no serializer", field)
            }
            Error::UnknownSerializer(name) => write!(f, "unknown serializer: {}", name),
            Error::UnknownField(name) => write!(f, "unknown field: {}", name),
            Error::MissingPrimaryKey(table) => write!(f, "table `{}` has no primary key", table),
            Error::MissingWhereClause => write!(f, "WHERE conditions required"),
            Error::EmptyDest => write!(f, "nothing to write"),
            Error::DuplicateCallback(name) => write!(f, "callback already registered: {}", name),
            Error::UnknownCallback(name) => write!(f, "unknown callback: {}", name),
            Error::PluginRegistered(name) => write!(f, "plugin already registered: {}", name),
            Error::TypeMismatch { expected, found } => {
                write!(f, "Type mismatch: expected {}, found {}", expected, found)
            }
            Error::Storage(err) => write!(f, "Storage error: {}", err),
            Error::Config(err) => write!(f, "Config error: {}", err),
        }
    }
}

impl std::error::Error for Error {}

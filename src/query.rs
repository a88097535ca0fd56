use std::{marker::PhantomData, time::Instant};

use metrics::histogram;

use crate::{
    Db,
    callbacks::Operation,
    error::Error,
    schema::{Model, Row},
    statement::{Comparison, Condition, Statement},
    value::{FieldKind, ToValue, Value},
};

/// Query builder over one model's table.
///
/// Conditions name Rust fields (or columns) and are checked against the
/// model schema; the first invalid condition is reported by the terminal
/// method.
pub struct Query<'a, T: Model> {
    db: &'a Db,
    stmt: Statement,
    error: Option<Error>,
    _model: PhantomData<T>,
}

impl<'a, T: Model> Query<'a, T> {
    pub(crate) fn new(db: &'a Db) -> Self {
        Self {
            db,
            stmt: db.statement::<T>(),
            error: None,
            _model: PhantomData,
        }
    }

    pub fn filter(mut self, name: &str, comparison: Comparison, value: impl ToValue) -> Self {
        if self.error.is_some() {
            return self;
        }

        let condition = T::schema().lookup(name).and_then(|field| {
            let value = match comparison {
                Comparison::IsNull | Comparison::IsNotNull => Value::Null(field.kind),
                _ => value.to_value(),
            };
            Ok(Condition::Compare {
                column: field.column.to_string(),
                comparison,
                value: field.to_column_value(&value)?,
            })
        });

        match condition {
            Ok(condition) => self.stmt.add_where(condition),
            Err(err) => self.error = Some(err),
        }
        self
    }

    pub fn where_eq(self, name: &str, value: impl ToValue) -> Self {
        self.filter(name, Comparison::Equal, value)
    }

    pub fn where_ne(self, name: &str, value: impl ToValue) -> Self {
        self.filter(name, Comparison::NotEqual, value)
    }

    pub fn where_gt(self, name: &str, value: impl ToValue) -> Self {
        self.filter(name, Comparison::GreaterThan, value)
    }

    pub fn where_gte(self, name: &str, value: impl ToValue) -> Self {
        self.filter(name, Comparison::GreaterThanOrEqual, value)
    }

    pub fn where_lt(self, name: &str, value: impl ToValue) -> Self {
        self.filter(name, Comparison::LessThan, value)
    }

    pub fn where_lte(self, name: &str, value: impl ToValue) -> Self {
        self.filter(name, Comparison::LessThanOrEqual, value)
    }

    pub fn where_null(self, name: &str) -> Self {
        self.filter(name, Comparison::IsNull, Value::Null(FieldKind::Text))
    }

    pub fn where_not_null(self, name: &str) -> Self {
        self.filter(name, Comparison::IsNotNull, Value::Null(FieldKind::Text))
    }

    pub fn order_by(mut self, name: &str, ascending: bool) -> Self {
        match T::schema().lookup(name) {
            Ok(field) => self
                .stmt
                .clauses
                .order
                .push((field.column.to_string(), ascending)),
            Err(err) => {
                self.error.get_or_insert(err);
            }
        }
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.stmt.clauses.limit = Some(limit);
        self
    }

    /// Include soft deleted rows and hard delete.
    pub fn unscoped(mut self) -> Self {
        self.stmt.unscoped = true;
        self
    }

    pub async fn all(self) -> Result<Vec<T>, Error> {
        let Query {
            db,
            mut stmt,
            error,
            ..
        } = self;
        if let Some(err) = error {
            return Err(err);
        }

        let start = Instant::now();
        db.run(Operation::Query, &mut stmt)?;
        let rows = db.fetch_rows(&stmt, T::schema().fields).await?;
        histogram!("timestamppb.query.duration_ms", "table" => T::schema().table)
            .record(start.elapsed().as_millis() as f64);

        rows.into_iter().map(decode_row::<T>).collect()
    }

    pub async fn first(self) -> Result<Option<T>, Error> {
        let mut rows = self.limit(1).all().await?;
        Ok(rows.pop())
    }

    /// Delete every matching row; soft deletes when the model supports it.
    pub async fn delete(self) -> Result<u64, Error> {
        let Query {
            db,
            mut stmt,
            error,
            ..
        } = self;
        if let Some(err) = error {
            return Err(err);
        }

        db.run(Operation::Delete, &mut stmt)?;
        db.exec(&stmt).await
    }
}

pub(crate) fn decode_row<T: Model>(values: Vec<Value>) -> Result<T, Error> {
    let mut row = Row::new();
    for (field, value) in T::schema().fields.iter().zip(values) {
        row.set(field.name, field.from_column_value(value)?);
    }
    T::from_row(row)
}

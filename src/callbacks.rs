use std::sync::Arc;

use crate::{
    error::Error,
    statement::{Statement, StatementKind},
};

pub type Handler = Arc<dyn Fn(&mut Statement) -> Result<(), Error> + Send + Sync>;

pub const BEFORE_CREATE: &str = "orm:before_create";
pub const CREATE: &str = "orm:create";
pub const QUERY: &str = "orm:query";
pub const BEFORE_UPDATE: &str = "orm:before_update";
pub const UPDATE: &str = "orm:update";
pub const BEFORE_DELETE: &str = "orm:before_delete";
pub const DELETE: &str = "orm:delete";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Query,
    Update,
    Delete,
}

#[derive(Clone)]
struct Callback {
    name: String,
    handler: Handler,
}

impl Callback {
    fn new<F>(name: &str, handler: F) -> Self
    where
        F: Fn(&mut Statement) -> Result<(), Error> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            handler: Arc::new(handler),
        }
    }
}

/// Ordered chain of named callbacks run for one operation.
#[derive(Clone, Default)]
pub struct Processor {
    chain: Vec<Callback>,
}

enum Position {
    Last,
    Before(String),
    After(String),
}

/// Positions the next registration relative to an existing callback.
pub struct Registration<'a> {
    processor: &'a mut Processor,
    position: Position,
}

impl<'a> Registration<'a> {
    pub fn register<F>(self, name: impl Into<String>, handler: F) -> Result<(), Error>
    where
        F: Fn(&mut Statement) -> Result<(), Error> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.processor.position(&name).is_some() {
            return Err(Error::DuplicateCallback(name));
        }

        let idx = match &self.position {
            Position::Last => self.processor.chain.len(),
            Position::Before(anchor) => self
                .processor
                .position(anchor)
                .ok_or_else(|| Error::UnknownCallback(anchor.clone()))?,
            Position::After(anchor) => {
                self.processor
                    .position(anchor)
                    .ok_or_else(|| Error::UnknownCallback(anchor.clone()))?
                    + 1
            }
        };

        tracing::debug!(callback = %name, index = idx, "callback registered");
        self.processor.chain.insert(
            idx,
            Callback {
                name,
                handler: Arc::new(handler),
            },
        );
        Ok(())
    }
}

impl Processor {
    fn with_chain(chain: Vec<Callback>) -> Self {
        Self { chain }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.chain.iter().position(|c| c.name == name)
    }

    pub fn before(&mut self, anchor: impl Into<String>) -> Registration<'_> {
        Registration {
            processor: self,
            position: Position::Before(anchor.into()),
        }
    }

    pub fn after(&mut self, anchor: impl Into<String>) -> Registration<'_> {
        Registration {
            processor: self,
            position: Position::After(anchor.into()),
        }
    }

    pub fn register<F>(&mut self, name: impl Into<String>, handler: F) -> Result<(), Error>
    where
        F: Fn(&mut Statement) -> Result<(), Error> + Send + Sync + 'static,
    {
        Registration {
            processor: self,
            position: Position::Last,
        }
        .register(name, handler)
    }

    pub fn remove(&mut self, name: &str) -> Result<(), Error> {
        let idx = self
            .position(name)
            .ok_or_else(|| Error::UnknownCallback(name.to_string()))?;
        self.chain.remove(idx);
        Ok(())
    }

    pub fn names(&self) -> Vec<&str> {
        self.chain.iter().map(|c| c.name.as_str()).collect()
    }

    /// Run every callback in order, stopping at the first error.
    pub fn execute(&self, stmt: &mut Statement) -> Result<(), Error> {
        for callback in self.chain.iter() {
            (callback.handler)(stmt)?;
        }
        Ok(())
    }
}

/// Callback processors for every operation.
#[derive(Clone)]
pub struct Callbacks {
    create: Processor,
    query: Processor,
    update: Processor,
    delete: Processor,
}

impl Default for Callbacks {
    fn default() -> Self {
        Self {
            create: Processor::with_chain(vec![
                Callback::new(BEFORE_CREATE, |stmt: &mut Statement| {
                    if stmt.dest.is_empty() {
                        return Err(Error::EmptyDest);
                    }
                    Ok(())
                }),
                Callback::new(CREATE, |stmt: &mut Statement| {
                    stmt.build(StatementKind::Insert)
                }),
            ]),
            query: Processor::with_chain(vec![Callback::new(QUERY, |stmt: &mut Statement| {
                stmt.build(StatementKind::Select)
            })]),
            update: Processor::with_chain(vec![
                Callback::new(BEFORE_UPDATE, require_where),
                Callback::new(UPDATE, |stmt: &mut Statement| {
                    stmt.build(StatementKind::Update)
                }),
            ]),
            delete: Processor::with_chain(vec![
                Callback::new(BEFORE_DELETE, require_where),
                Callback::new(DELETE, |stmt: &mut Statement| {
                    if stmt.is_built() {
                        return Ok(());
                    }
                    stmt.build(StatementKind::Delete)
                }),
            ]),
        }
    }
}

impl Callbacks {
    pub fn create(&mut self) -> &mut Processor {
        &mut self.create
    }

    pub fn query(&mut self) -> &mut Processor {
        &mut self.query
    }

    pub fn update(&mut self) -> &mut Processor {
        &mut self.update
    }

    pub fn delete(&mut self) -> &mut Processor {
        &mut self.delete
    }

    pub fn processor(&self, operation: Operation) -> &Processor {
        match operation {
            Operation::Create => &self.create,
            Operation::Query => &self.query,
            Operation::Update => &self.update,
            Operation::Delete => &self.delete,
        }
    }
}

fn require_where(stmt: &mut Statement) -> Result<(), Error> {
    if stmt.clauses.wheres.is_empty() {
        return Err(Error::MissingWhereClause);
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::statement::{Condition, Dialect};

    fn statement() -> Statement {
        Statement::new(None, "things", Dialect::Sqlite)
    }

    #[test]
    fn test_default_chains() {
        let mut callbacks = Callbacks::default();
        assert_eq!(callbacks.create().names(), vec![BEFORE_CREATE, CREATE]);
        assert_eq!(callbacks.query().names(), vec![QUERY]);
        assert_eq!(callbacks.update().names(), vec![BEFORE_UPDATE, UPDATE]);
        assert_eq!(callbacks.delete().names(), vec![BEFORE_DELETE, DELETE]);
    }

    #[test]
    fn test_before_and_after_positioning() {
        let mut callbacks = Callbacks::default();
        callbacks
            .delete()
            .before(BEFORE_DELETE)
            .register("first", |_: &mut Statement| Ok(()))
            .unwrap();
        callbacks
            .delete()
            .after(BEFORE_DELETE)
            .register("middle", |_: &mut Statement| Ok(()))
            .unwrap();
        assert_eq!(
            callbacks.delete().names(),
            vec!["first", BEFORE_DELETE, "middle", DELETE]
        );
    }

    #[test]
    fn test_duplicate_and_unknown_anchor() {
        let mut callbacks = Callbacks::default();
        let err = callbacks
            .query()
            .register(QUERY, |_: &mut Statement| Ok(()))
            .unwrap_err();
        assert_eq!(err, Error::DuplicateCallback(QUERY.to_string()));

        let err = callbacks
            .query()
            .before("orm:nothing")
            .register("x", |_: &mut Statement| Ok(()))
            .unwrap_err();
        assert_eq!(err, Error::UnknownCallback("orm:nothing".to_string()));
    }

    #[test]
    fn test_remove() {
        let mut callbacks = Callbacks::default();
        callbacks.update().remove(BEFORE_UPDATE).unwrap();
        assert_eq!(callbacks.update().names(), vec![UPDATE]);
        assert!(callbacks.update().remove(BEFORE_UPDATE).is_err());
    }

    #[test]
    fn test_delete_requires_where() {
        let callbacks = Callbacks::default();
        let mut stmt = statement();
        let err = callbacks
            .processor(Operation::Delete)
            .execute(&mut stmt)
            .unwrap_err();
        assert_eq!(err, Error::MissingWhereClause);

        stmt.add_where(Condition::Raw("1 = 1".into()));
        callbacks
            .processor(Operation::Delete)
            .execute(&mut stmt)
            .unwrap();
        assert_eq!(stmt.sql, r#"DELETE FROM "things" WHERE 1 = 1"#);
    }

    #[test]
    fn test_update_requires_where() {
        let callbacks = Callbacks::default();
        let mut stmt = statement();
        let err = callbacks
            .processor(Operation::Update)
            .execute(&mut stmt)
            .unwrap_err();
        assert_eq!(err, Error::MissingWhereClause);
        assert!(!stmt.is_built());
    }

    #[test]
    fn test_delete_keeps_prebuilt_sql() {
        let mut callbacks = Callbacks::default();
        callbacks
            .delete()
            .before(BEFORE_DELETE)
            .register("prebuild", |stmt: &mut Statement| {
                stmt.add_where(Condition::Raw("1 = 1".into()));
                stmt.sql = "SELECT 1".to_string();
                Ok(())
            })
            .unwrap();
        let mut stmt = statement();
        callbacks
            .processor(Operation::Delete)
            .execute(&mut stmt)
            .unwrap();
        assert_eq!(stmt.sql, "SELECT 1");
    }

    #[test]
    fn test_empty_create_rejected() {
        let callbacks = Callbacks::default();
        let mut stmt = statement();
        assert_eq!(
            callbacks.processor(Operation::Create).execute(&mut stmt),
            Err(Error::EmptyDest)
        );
    }
}

use crate::{
    error::Error,
    schema::{Row, Schema},
    value::Value,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    Sqlite,
}

impl Dialect {
    fn placeholder(&self, idx: usize) -> String {
        match self {
            Dialect::Postgres => format!("${}", idx),
            Dialect::Sqlite => "?".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Insert,
    Select,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    IsNull,
    IsNotNull,
}

impl Comparison {
    fn as_sql(&self) -> &'static str {
        match self {
            Comparison::Equal => "=",
            Comparison::NotEqual => "<>",
            Comparison::GreaterThan => ">",
            Comparison::GreaterThanOrEqual => ">=",
            Comparison::LessThan => "<",
            Comparison::LessThanOrEqual => "<=",
            Comparison::IsNull => "IS NULL",
            Comparison::IsNotNull => "IS NOT NULL",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// SQL fragment inserted verbatim.
    Raw(String),
    Compare {
        column: String,
        comparison: Comparison,
        value: Value,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub column: String,
    /// Database-side value, bound without further conversion.
    pub value: Value,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Clauses {
    pub wheres: Vec<Condition>,
    pub set: Vec<Assignment>,
    /// Statement runs as an UPDATE regardless of the operation that built it.
    pub update: bool,
    pub order: Vec<(String, bool)>,
    pub limit: Option<u64>,
}

/// The unit of work passed through a callback chain.
#[derive(Debug, Clone)]
pub struct Statement {
    pub schema: Option<&'static Schema>,
    pub table: String,
    pub unscoped: bool,
    /// Model values the operation reads from or writes back into.
    pub dest: Vec<Row>,
    pub clauses: Clauses,
    pub sql: String,
    pub vars: Vec<Value>,
    pub dialect: Dialect,
}

pub fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

impl Statement {
    pub fn new(schema: Option<&'static Schema>, table: impl Into<String>, dialect: Dialect) -> Self {
        Self {
            schema,
            table: table.into(),
            unscoped: false,
            dest: Vec::new(),
            clauses: Clauses::default(),
            sql: String::new(),
            vars: Vec::new(),
            dialect,
        }
    }

    pub fn for_schema(schema: &'static Schema, dialect: Dialect) -> Self {
        Self::new(Some(schema), schema.table, dialect)
    }

    /// Qualified, quoted column reference.
    pub fn column(&self, column: &str) -> String {
        format!("{}.{}", quote(&self.table), quote(column))
    }

    pub fn add_where(&mut self, condition: Condition) {
        self.clauses.wheres.push(condition);
    }

    pub fn add_set(&mut self, column: impl Into<String>, value: Value) {
        let column = column.into();
        match self.clauses.set.iter_mut().find(|a| a.column == column) {
            Some(existing) => existing.value = value,
            None => self.clauses.set.push(Assignment { column, value }),
        }
    }

    /// Store `value` into field `name` of every destination row.
    pub fn set_column(&mut self, name: &'static str, value: Value) {
        for row in self.dest.iter_mut() {
            row.set(name, value.clone());
        }
    }

    pub fn mark_update(&mut self) {
        self.clauses.update = true;
    }

    pub fn is_built(&self) -> bool {
        !self.sql.is_empty()
    }

    /// Render SQL and bind variables for `kind`. An UPDATE marker on the
    /// clauses takes precedence over `kind`.
    pub fn build(&mut self, kind: StatementKind) -> Result<(), Error> {
        let kind = if self.clauses.update {
            StatementKind::Update
        } else {
            kind
        };

        self.sql.clear();
        self.vars.clear();

        match kind {
            StatementKind::Insert => self.build_insert()?,
            StatementKind::Select => self.build_select()?,
            StatementKind::Update => self.build_update()?,
            StatementKind::Delete => {
                self.sql = format!("DELETE FROM {}", quote(&self.table));
                self.build_where();
            }
        }

        Ok(())
    }

    fn push_var(&mut self, value: Value) -> String {
        self.vars.push(value);
        self.dialect.placeholder(self.vars.len())
    }

    fn require_schema(&self) -> Result<&'static Schema, Error> {
        self.schema
            .ok_or_else(|| Error::UnknownField(format!("{}.*", self.table)))
    }

    fn build_insert(&mut self) -> Result<(), Error> {
        let schema = self.require_schema()?;
        if self.dest.is_empty() {
            return Err(Error::EmptyDest);
        }

        let columns = schema
            .fields
            .iter()
            .map(|f| quote(f.column))
            .collect::<Vec<_>>()
            .join(", ");

        let rows = std::mem::take(&mut self.dest);
        let mut tuples = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            let mut placeholders = Vec::with_capacity(schema.fields.len());
            for field in schema.fields {
                let value = row
                    .get(field.name)
                    .ok_or_else(|| Error::UnknownField(field.name.to_string()))?;
                let value = field.to_column_value(value)?;
                placeholders.push(self.push_var(value));
            }
            tuples.push(format!("({})", placeholders.join(", ")));
        }
        self.dest = rows;

        self.sql = format!(
            "INSERT INTO {} ({}) VALUES {}",
            quote(&self.table),
            columns,
            tuples.join(", ")
        );
        Ok(())
    }

    fn build_select(&mut self) -> Result<(), Error> {
        let schema = self.require_schema()?;
        let columns = schema
            .fields
            .iter()
            .map(|f| self.column(f.column))
            .collect::<Vec<_>>()
            .join(", ");

        self.sql = format!("SELECT {} FROM {}", columns, quote(&self.table));
        self.build_where();

        if !self.clauses.order.is_empty() {
            let order = self
                .clauses
                .order
                .iter()
                .map(|(column, asc)| {
                    format!("{} {}", self.column(column), if *asc { "ASC" } else { "DESC" })
                })
                .collect::<Vec<_>>()
                .join(", ");
            self.sql.push_str(" ORDER BY ");
            self.sql.push_str(&order);
        }

        if let Some(limit) = self.clauses.limit {
            self.sql.push_str(&format!(" LIMIT {}", limit));
        }
        Ok(())
    }

    fn build_update(&mut self) -> Result<(), Error> {
        if self.clauses.set.is_empty() {
            self.set_from_dest()?;
        }
        if self.clauses.set.is_empty() {
            return Err(Error::EmptyDest);
        }

        let set = std::mem::take(&mut self.clauses.set);
        let assignments = set
            .iter()
            .map(|a| format!("{} = {}", quote(&a.column), self.push_var(a.value.clone())))
            .collect::<Vec<_>>()
            .join(", ");
        self.clauses.set = set;

        self.sql = format!("UPDATE {} SET {}", quote(&self.table), assignments);
        self.build_where();
        Ok(())
    }

    /// Assign every non key field of the first destination row.
    fn set_from_dest(&mut self) -> Result<(), Error> {
        let schema = self.require_schema()?;
        let Some(row) = self.dest.first().cloned() else {
            return Ok(());
        };

        for field in schema.fields.iter().filter(|f| !f.primary_key) {
            if let Some(value) = row.get(field.name) {
                let value = field.to_column_value(value)?;
                self.add_set(field.column, value);
            }
        }
        Ok(())
    }

    fn build_where(&mut self) {
        if self.clauses.wheres.is_empty() {
            return;
        }

        let wheres = std::mem::take(&mut self.clauses.wheres);
        let rendered = wheres
            .iter()
            .map(|condition| match condition {
                Condition::Raw(sql) => sql.clone(),
                Condition::Compare {
                    column,
                    comparison: comparison @ (Comparison::IsNull | Comparison::IsNotNull),
                    ..
                } => format!("{} {}", self.column(column), comparison.as_sql()),
                Condition::Compare {
                    column,
                    comparison,
                    value,
                } => format!(
                    "{} {} {}",
                    self.column(column),
                    comparison.as_sql(),
                    self.push_var(value.clone())
                ),
            })
            .collect::<Vec<_>>()
            .join(" AND ");
        self.clauses.wheres = wheres;

        self.sql.push_str(" WHERE ");
        self.sql.push_str(&rendered);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        schema::Field,
        value::{FieldKind, Value},
    };

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
            name: "title",
            column: "title",
            kind: FieldKind::Text,
            nullable: false,
            primary_key: false,
            serializer: None,
        },
    ];

    static SCHEMA: Schema = Schema {
        name: "Post",
        table: "posts",
        fields: &FIELDS,
    };

    fn row(id: i64, title: &str) -> Row {
        Row::from(vec![
            ("id", Value::Int(id)),
            ("title", Value::Text(title.to_string())),
        ])
    }

    #[test]
    fn test_build_insert_many() {
        let mut stmt = Statement::for_schema(&SCHEMA, Dialect::Postgres);
        stmt.dest = vec![row(1, "a"), row(2, "b")];
        stmt.build(StatementKind::Insert).unwrap();
        assert_eq!(
            stmt.sql,
            r#"INSERT INTO "posts" ("id", "title") VALUES ($1, $2), ($3, $4)"#
        );
        assert_eq!(stmt.vars.len(), 4);
        assert_eq!(stmt.dest.len(), 2);
    }

    #[test]
    fn test_build_select_with_where_order_limit() {
        let mut stmt = Statement::for_schema(&SCHEMA, Dialect::Sqlite);
        stmt.add_where(Condition::Compare {
            column: "title".into(),
            comparison: Comparison::Equal,
            value: Value::Text("a".into()),
        });
        stmt.add_where(Condition::Compare {
            column: "id".into(),
            comparison: Comparison::IsNotNull,
            value: Value::Null(FieldKind::Int),
        });
        stmt.clauses.order.push(("id".into(), false));
        stmt.clauses.limit = Some(3);
        stmt.build(StatementKind::Select).unwrap();
        assert_eq!(
            stmt.sql,
            r#"SELECT "posts"."id", "posts"."title" FROM "posts" WHERE "posts"."title" = ? AND "posts"."id" IS NOT NULL ORDER BY "posts"."id" DESC LIMIT 3"#
        );
        assert_eq!(stmt.vars, vec![Value::Text("a".into())]);
    }

    #[test]
    fn test_update_marker_overrides_delete() {
        let mut stmt = Statement::for_schema(&SCHEMA, Dialect::Postgres);
        stmt.add_where(Condition::Compare {
            column: "id".into(),
            comparison: Comparison::Equal,
            value: Value::Int(9),
        });
        stmt.add_set("title", Value::Text("gone".into()));
        stmt.mark_update();
        stmt.build(StatementKind::Delete).unwrap();
        assert_eq!(
            stmt.sql,
            r#"UPDATE "posts" SET "title" = $1 WHERE "posts"."id" = $2"#
        );
        assert_eq!(stmt.vars, vec![Value::Text("gone".into()), Value::Int(9)]);
    }

    #[test]
    fn test_update_from_dest_skips_primary_key() {
        let mut stmt = Statement::for_schema(&SCHEMA, Dialect::Sqlite);
        stmt.dest = vec![row(4, "new")];
        stmt.build(StatementKind::Update).unwrap();
        assert_eq!(stmt.sql, r#"UPDATE "posts" SET "title" = ?"#);
    }

    #[test]
    fn test_build_delete() {
        let mut stmt = Statement::new(None, "posts", Dialect::Sqlite);
        stmt.add_where(Condition::Raw("1 = 1".into()));
        stmt.build(StatementKind::Delete).unwrap();
        assert_eq!(stmt.sql, r#"DELETE FROM "posts" WHERE 1 = 1"#);
        assert!(stmt.is_built());
    }

    #[test]
    fn test_insert_requires_rows() {
        let mut stmt = Statement::for_schema(&SCHEMA, Dialect::Sqlite);
        assert_eq!(stmt.build(StatementKind::Insert), Err(Error::EmptyDest));
    }
}

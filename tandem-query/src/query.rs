//! Query descriptors and their compilation to `(sql, params)`.
//!
//! Filters are a conjunction of column conditions. Anything richer goes through
//! [`Query::raw`].
//!
//! ```rust
//! use tandem_query::{col, impl_model, Dialect, Order, Select};
//!
//! #[derive(Debug, Clone)]
//! struct User {
//!     id: Option<i64>,
//!     username: String,
//! }
//!
//! impl_model!(User {
//!     table: "users",
//!     primary_key: id,
//!     strategy: ServerGenerated,
//!     fields: [username],
//! });
//!
//! let query = Select::<User>::new()
//!     .filter(col("username").eq("ada"))
//!     .order_by("id", Order::Desc)
//!     .limit(10)
//!     .compile(Dialect::Postgres);
//!
//! assert_eq!(
//!     query.sql,
//!     "SELECT \"id\", \"username\" FROM \"users\" WHERE \"username\" = $1 ORDER BY \"id\" DESC LIMIT 10"
//! );
//! assert_eq!(query.params.len(), 1);
//! ```

use std::fmt;
use std::marker::PhantomData;

use crate::dialect::Dialect;
use crate::error::{QueryError, QueryResult};
use crate::model::{Model, PrimaryKeyStrategy};
use crate::value::Value;

/// Compiled statement: SQL text, ordered parameters, and whether it yields rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// SQL text with dialect placeholders.
    pub sql: String,
    /// Parameters in placeholder order.
    pub params: Vec<Value>,
    /// Whether the statement produces a result set.
    pub returns_rows: bool,
}

impl Query {
    /// A statement producing rows.
    pub fn rows(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
            returns_rows: true,
        }
    }

    /// A statement producing an affected-row count.
    pub fn statement(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
            returns_rows: false,
        }
    }

    /// Raw SQL whose kind is inferred from its leading keyword or a RETURNING clause.
    pub fn raw(sql: impl Into<String>, params: Vec<Value>) -> Self {
        let sql = sql.into();
        let upper = sql.trim_start().to_ascii_uppercase();
        let returns_rows = ["SELECT", "WITH", "SHOW", "VALUES", "EXPLAIN", "PRAGMA", "DESCRIBE"]
            .iter()
            .any(|kw| upper.starts_with(kw))
            || upper.contains(" RETURNING ");
        Self {
            sql,
            params,
            returns_rows,
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    /// Ascending.
    Asc,
    /// Descending.
    Desc,
}

/// Comparison operator of a [`Condition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    /// `=`, or `IS NULL` against a null value.
    Eq,
    /// `<>`, or `IS NOT NULL` against a null value.
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `LIKE`
    Like,
    /// `IN (...)`
    In,
    /// `IS NULL`
    IsNull,
    /// `IS NOT NULL`
    IsNotNull,
}

/// One `column <op> value` predicate. Conditions in a query are AND-ed.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    column: String,
    op: Op,
    values: Vec<Value>,
}

impl Condition {
    /// Column the condition applies to.
    pub fn column(&self) -> &str {
        &self.column
    }

    /// Operator.
    pub fn op(&self) -> Op {
        self.op
    }

    fn render(&self, w: &mut SqlWriter) {
        if self.op == Op::In && self.values.is_empty() {
            w.push("1 = 0");
            return;
        }
        w.push_ident(&self.column);
        let first = self.values.first().cloned().unwrap_or_default();
        match self.op {
            Op::Eq if first.is_null() => w.push(" IS NULL"),
            Op::Ne if first.is_null() => w.push(" IS NOT NULL"),
            Op::IsNull => w.push(" IS NULL"),
            Op::IsNotNull => w.push(" IS NOT NULL"),
            Op::In => {
                w.push(" IN (");
                for (i, value) in self.values.iter().enumerate() {
                    if i > 0 {
                        w.push(", ");
                    }
                    w.push_param(value.clone());
                }
                w.push(")");
            }
            op => {
                w.push(match op {
                    Op::Eq => " = ",
                    Op::Ne => " <> ",
                    Op::Lt => " < ",
                    Op::Le => " <= ",
                    Op::Gt => " > ",
                    Op::Ge => " >= ",
                    _ => " LIKE ",
                });
                w.push_param(first);
            }
        }
    }
}

/// Column reference used to build conditions.
#[derive(Debug, Clone)]
pub struct Column(String);

/// Reference a column by name.
pub fn col(name: impl Into<String>) -> Column {
    Column(name.into())
}

impl Column {
    fn condition(self, op: Op, values: Vec<Value>) -> Condition {
        Condition {
            column: self.0,
            op,
            values,
        }
    }

    /// `column = value`
    pub fn eq(self, value: impl Into<Value>) -> Condition {
        self.condition(Op::Eq, vec![value.into()])
    }

    /// `column <> value`
    pub fn ne(self, value: impl Into<Value>) -> Condition {
        self.condition(Op::Ne, vec![value.into()])
    }

    /// `column < value`
    pub fn lt(self, value: impl Into<Value>) -> Condition {
        self.condition(Op::Lt, vec![value.into()])
    }

    /// `column <= value`
    pub fn le(self, value: impl Into<Value>) -> Condition {
        self.condition(Op::Le, vec![value.into()])
    }

    /// `column > value`
    pub fn gt(self, value: impl Into<Value>) -> Condition {
        self.condition(Op::Gt, vec![value.into()])
    }

    /// `column >= value`
    pub fn ge(self, value: impl Into<Value>) -> Condition {
        self.condition(Op::Ge, vec![value.into()])
    }

    /// `column LIKE pattern`
    pub fn like(self, pattern: impl Into<String>) -> Condition {
        self.condition(Op::Like, vec![Value::Text(pattern.into())])
    }

    /// `column IN (values...)`
    pub fn is_in<I, V>(self, values: I) -> Condition
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.condition(Op::In, values.into_iter().map(Into::into).collect())
    }

    /// `column IS NULL`
    pub fn is_null(self) -> Condition {
        self.condition(Op::IsNull, Vec::new())
    }

    /// `column IS NOT NULL`
    pub fn is_not_null(self) -> Condition {
        self.condition(Op::IsNotNull, Vec::new())
    }
}

/// Accumulates SQL text and parameters with dialect-correct placeholders.
#[derive(Debug)]
pub struct SqlWriter {
    dialect: Dialect,
    sql: String,
    params: Vec<Value>,
}

impl SqlWriter {
    /// Create an empty writer.
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            sql: String::with_capacity(128),
            params: Vec::new(),
        }
    }

    /// Append literal SQL.
    pub fn push(&mut self, sql: &str) {
        self.sql.push_str(sql);
    }

    /// Append a quoted identifier.
    pub fn push_ident(&mut self, name: &str) {
        let quoted = self.dialect.quote(name);
        self.sql.push_str(&quoted);
    }

    /// Append a placeholder and record its parameter.
    pub fn push_param(&mut self, value: Value) {
        self.params.push(value);
        let placeholder = self.dialect.placeholder(self.params.len());
        self.sql.push_str(&placeholder);
    }

    fn push_where(&mut self, conditions: &[Condition]) {
        for (i, condition) in conditions.iter().enumerate() {
            self.push(if i == 0 { " WHERE " } else { " AND " });
            condition.render(self);
        }
    }

    fn push_limit(&mut self, limit: Option<u64>, offset: Option<u64>) {
        match (limit, offset) {
            (Some(limit), _) => self.push(&format!(" LIMIT {}", limit)),
            (None, Some(_)) => match self.dialect {
                Dialect::Postgres => {}
                Dialect::Sqlite => self.push(" LIMIT -1"),
                Dialect::Mysql => self.push(" LIMIT 18446744073709551615"),
            },
            (None, None) => {}
        }
        if let Some(offset) = offset {
            self.push(&format!(" OFFSET {}", offset));
        }
    }

    fn finish(self, returns_rows: bool) -> Query {
        Query {
            sql: self.sql,
            params: self.params,
            returns_rows,
        }
    }
}

/// `SELECT` over one model.
pub struct Select<M> {
    conditions: Vec<Condition>,
    order: Vec<(String, Order)>,
    limit: Option<u64>,
    offset: Option<u64>,
    projection: Option<Vec<String>>,
    _model: PhantomData<fn() -> M>,
}

impl<M> Clone for Select<M> {
    fn clone(&self) -> Self {
        Self {
            conditions: self.conditions.clone(),
            order: self.order.clone(),
            limit: self.limit,
            offset: self.offset,
            projection: self.projection.clone(),
            _model: PhantomData,
        }
    }
}

impl<M> fmt::Debug for Select<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Select")
            .field("conditions", &self.conditions)
            .field("order", &self.order)
            .field("limit", &self.limit)
            .field("offset", &self.offset)
            .finish()
    }
}

impl<M: Model> Default for Select<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Model> Select<M> {
    /// Select every row of the model's table.
    pub fn new() -> Self {
        Self {
            conditions: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: None,
            projection: None,
            _model: PhantomData,
        }
    }

    /// Select the row with the given primary key.
    pub fn by_id(pk: impl Into<Value>) -> Self {
        Self::new().filter(col(M::PRIMARY_KEY).eq(pk))
    }

    /// Add a condition.
    pub fn filter(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Add a sort key.
    pub fn order_by(mut self, column: impl Into<String>, order: Order) -> Self {
        self.order.push((column.into(), order));
        self
    }

    /// Limit the number of rows.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skip rows.
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Replace the column list with raw SQL expressions, e.g. `MAX(id)`.
    pub fn project<I, S>(mut self, expressions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projection = Some(expressions.into_iter().map(Into::into).collect());
        self
    }

    /// Conditions of this select.
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Compile to a row-producing statement.
    pub fn compile(&self, dialect: Dialect) -> Query {
        let mut w = SqlWriter::new(dialect);
        w.push("SELECT ");
        match &self.projection {
            Some(expressions) => w.push(&expressions.join(", ")),
            None => {
                for (i, column) in M::columns().iter().enumerate() {
                    if i > 0 {
                        w.push(", ");
                    }
                    w.push_ident(column);
                }
            }
        }
        w.push(" FROM ");
        w.push_ident(M::TABLE);
        w.push_where(&self.conditions);
        for (i, (column, order)) in self.order.iter().enumerate() {
            w.push(if i == 0 { " ORDER BY " } else { ", " });
            w.push_ident(column);
            if *order == Order::Desc {
                w.push(" DESC");
            }
        }
        w.push_limit(self.limit, self.offset);
        w.finish(true)
    }

    /// Compile a `COUNT(*)` over the same rows.
    ///
    /// Limit and offset change the counted set, so they force a wrapped subquery.
    pub fn compile_count(&self, dialect: Dialect) -> Query {
        let mut w = SqlWriter::new(dialect);
        if self.limit.is_some() || self.offset.is_some() {
            w.push("SELECT COUNT(*) FROM (SELECT 1 FROM ");
            w.push_ident(M::TABLE);
            w.push_where(&self.conditions);
            w.push_limit(self.limit, self.offset);
            w.push(") AS _wrapped");
        } else {
            w.push("SELECT COUNT(*) FROM ");
            w.push_ident(M::TABLE);
            w.push_where(&self.conditions);
        }
        w.finish(true)
    }

    /// Compile an existence probe.
    pub fn compile_exists(&self, dialect: Dialect) -> Query {
        let mut w = SqlWriter::new(dialect);
        w.push("SELECT 1 FROM ");
        w.push_ident(M::TABLE);
        w.push_where(&self.conditions);
        w.push(" LIMIT 1");
        w.finish(true)
    }

    /// Same select restricted to its first row.
    pub fn first(&self) -> Self {
        let mut select = self.clone();
        select.limit = Some(1);
        select
    }
}

/// `INSERT` of one model instance.
#[derive(Debug, Clone)]
pub struct Insert<M> {
    columns: Vec<&'static str>,
    values: Vec<Value>,
    returning: bool,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> Insert<M> {
    /// Insert every column of `model`, leaving an unset server-generated key to the server.
    pub fn from_model(model: &M) -> Self {
        let generated =
            M::PK_STRATEGY == PrimaryKeyStrategy::ServerGenerated && model.primary_key().is_null();
        let mut columns = Vec::with_capacity(M::columns().len());
        let mut values = Vec::with_capacity(M::columns().len());
        for (column, value) in M::columns().iter().zip(model.values()) {
            if generated && *column == M::PRIMARY_KEY {
                continue;
            }
            columns.push(*column);
            values.push(value);
        }
        Self {
            columns,
            values,
            returning: generated,
            _model: PhantomData,
        }
    }

    /// Whether the server generates the primary key for this insert.
    pub fn generates_key(&self) -> bool {
        self.returning
    }

    /// Compile, adding `RETURNING <pk>` when the key is generated and the dialect allows it.
    pub fn compile(&self, dialect: Dialect) -> Query {
        let mut w = SqlWriter::new(dialect);
        w.push("INSERT INTO ");
        w.push_ident(M::TABLE);
        if self.columns.is_empty() {
            w.push(match dialect {
                Dialect::Mysql => " () VALUES ()",
                Dialect::Postgres | Dialect::Sqlite => " DEFAULT VALUES",
            });
        } else {
            w.push(" (");
            for (i, column) in self.columns.iter().enumerate() {
                if i > 0 {
                    w.push(", ");
                }
                w.push_ident(column);
            }
            w.push(") VALUES (");
            for (i, value) in self.values.iter().enumerate() {
                if i > 0 {
                    w.push(", ");
                }
                w.push_param(value.clone());
            }
            w.push(")");
        }
        let returning = self.returning && dialect.supports_returning();
        if returning {
            w.push(" RETURNING ");
            w.push_ident(M::PRIMARY_KEY);
        }
        w.finish(returning)
    }
}

/// Multi-row `INSERT`.
#[derive(Debug, Clone)]
pub struct InsertMany<M> {
    columns: Vec<&'static str>,
    rows: Vec<Vec<Value>>,
    mixed_keys: bool,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> InsertMany<M> {
    /// Insert all `models`. The primary key column is left out when no model has one set.
    ///
    /// A batch where only some models carry a server-generated key cannot be compiled.
    pub fn from_models(models: &[M]) -> Self {
        let generated = M::PK_STRATEGY == PrimaryKeyStrategy::ServerGenerated;
        let unset = models.iter().filter(|m| m.primary_key().is_null()).count();
        let skip_pk = generated && unset == models.len();
        let mixed_keys = generated && unset > 0 && unset < models.len();
        let keep: Vec<bool> = M::columns()
            .iter()
            .map(|c| !(skip_pk && *c == M::PRIMARY_KEY))
            .collect();
        let columns = M::columns()
            .iter()
            .zip(&keep)
            .filter(|(_, k)| **k)
            .map(|(c, _)| *c)
            .collect();
        let rows = models
            .iter()
            .map(|m| {
                m.values()
                    .into_iter()
                    .zip(&keep)
                    .filter(|(_, k)| **k)
                    .map(|(v, _)| v)
                    .collect()
            })
            .collect();
        Self {
            columns,
            rows,
            mixed_keys,
            _model: PhantomData,
        }
    }

    /// Number of rows to insert.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if there is nothing to insert.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Compile to a single statement.
    pub fn compile(&self, dialect: Dialect) -> QueryResult<Query> {
        if self.rows.is_empty() {
            return Err(QueryError::invalid_type("bulk insert needs at least one row")
                .with_model(M::TABLE));
        }
        if self.mixed_keys {
            return Err(QueryError::invalid_type(format!(
                "bulk insert mixes rows with and without a value for {}",
                M::PRIMARY_KEY
            ))
            .with_model(M::TABLE)
            .with_help("insert rows with generated keys and rows with explicit keys separately"));
        }
        let mut w = SqlWriter::new(dialect);
        w.push("INSERT INTO ");
        w.push_ident(M::TABLE);
        w.push(" (");
        for (i, column) in self.columns.iter().enumerate() {
            if i > 0 {
                w.push(", ");
            }
            w.push_ident(column);
        }
        w.push(") VALUES ");
        for (r, row) in self.rows.iter().enumerate() {
            w.push(if r == 0 { "(" } else { ", (" });
            for (i, value) in row.iter().enumerate() {
                if i > 0 {
                    w.push(", ");
                }
                w.push_param(value.clone());
            }
            w.push(")");
        }
        Ok(w.finish(false))
    }
}

/// `UPDATE` of a model's table.
#[derive(Debug, Clone)]
pub struct Update<M> {
    assignments: Vec<(String, Value)>,
    conditions: Vec<Condition>,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> Default for Update<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Model> Update<M> {
    /// Empty update; add assignments with [`set`](Update::set).
    pub fn new() -> Self {
        Self {
            assignments: Vec::new(),
            conditions: Vec::new(),
            _model: PhantomData,
        }
    }

    /// Write every non-key column of `model` to the row with its primary key.
    pub fn from_model(model: &M) -> Self {
        let mut update = Self::new().filter(col(M::PRIMARY_KEY).eq(model.primary_key()));
        for (column, value) in M::columns().iter().zip(model.values()) {
            if *column != M::PRIMARY_KEY {
                update = update.set(*column, value);
            }
        }
        update
    }

    /// Assign a column.
    pub fn set(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.assignments.push((column.into(), value.into()));
        self
    }

    /// Add a condition.
    pub fn filter(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Compile. An update without assignments is rejected.
    pub fn compile(&self, dialect: Dialect) -> QueryResult<Query> {
        if self.assignments.is_empty() {
            return Err(
                QueryError::invalid_type("update needs at least one assignment")
                    .with_model(M::TABLE),
            );
        }
        let mut w = SqlWriter::new(dialect);
        w.push("UPDATE ");
        w.push_ident(M::TABLE);
        for (i, (column, value)) in self.assignments.iter().enumerate() {
            w.push(if i == 0 { " SET " } else { ", " });
            w.push_ident(column);
            w.push(" = ");
            w.push_param(value.clone());
        }
        w.push_where(&self.conditions);
        Ok(w.finish(false))
    }
}

/// `DELETE` from a model's table.
#[derive(Debug, Clone)]
pub struct Delete<M> {
    conditions: Vec<Condition>,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> Default for Delete<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Model> Delete<M> {
    /// Delete every row.
    pub fn new() -> Self {
        Self {
            conditions: Vec::new(),
            _model: PhantomData,
        }
    }

    /// Delete the row of `model`.
    pub fn from_model(model: &M) -> Self {
        Self::new().filter(col(M::PRIMARY_KEY).eq(model.primary_key()))
    }

    /// Add a condition.
    pub fn filter(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Compile.
    pub fn compile(&self, dialect: Dialect) -> Query {
        let mut w = SqlWriter::new(dialect);
        w.push("DELETE FROM ");
        w.push_ident(M::TABLE);
        w.push_where(&self.conditions);
        w.finish(false)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::error::ErrorCode;

    #[derive(Debug, Clone)]
    struct Post {
        id: Option<i64>,
        title: String,
        views: i64,
    }

    crate::impl_model!(Post {
        table: "posts",
        primary_key: id,
        strategy: ServerGenerated,
        fields: [title, views],
    });

    #[derive(Debug, Clone)]
    struct Setting {
        key: String,
        value: String,
    }

    crate::impl_model!(Setting {
        table: "settings",
        primary_key: key,
        strategy: Supplied,
        fields: [value],
    });

    fn post() -> Post {
        Post {
            id: None,
            title: "hello".into(),
            views: 0,
        }
    }

    #[test]
    fn test_select_mysql() {
        let q = Select::<Post>::new()
            .filter(col("views").gt(10))
            .filter(col("title").like("h%"))
            .compile(Dialect::Mysql);
        assert_eq!(
            q.sql,
            "SELECT `id`, `title`, `views` FROM `posts` WHERE `views` > ? AND `title` LIKE ?"
        );
        assert_eq!(q.params, vec![Value::Int(10), Value::Text("h%".into())]);
        assert!(q.returns_rows);
    }

    #[test]
    fn test_select_null_and_in() {
        let q = Select::<Post>::new()
            .filter(col("title").eq(Value::Null))
            .filter(col("id").is_in([1, 2, 3]))
            .compile(Dialect::Postgres);
        assert_eq!(
            q.sql,
            "SELECT \"id\", \"title\", \"views\" FROM \"posts\" WHERE \"title\" IS NULL AND \"id\" IN ($1, $2, $3)"
        );
    }

    #[test]
    fn test_select_empty_in() {
        let q = Select::<Post>::new()
            .filter(col("id").is_in(Vec::<i64>::new()))
            .compile(Dialect::Sqlite);
        assert!(q.sql.ends_with("WHERE 1 = 0"));
        assert!(q.params.is_empty());
    }

    #[test]
    fn test_offset_without_limit() {
        let sqlite = Select::<Post>::new().offset(5).compile(Dialect::Sqlite);
        assert!(sqlite.sql.ends_with(" LIMIT -1 OFFSET 5"));
        let pg = Select::<Post>::new().offset(5).compile(Dialect::Postgres);
        assert!(pg.sql.ends_with("\"posts\" OFFSET 5"));
    }

    #[test]
    fn test_count_wraps_limited_query() {
        let plain = Select::<Post>::new()
            .filter(col("views").ge(1))
            .compile_count(Dialect::Postgres);
        assert_eq!(plain.sql, "SELECT COUNT(*) FROM \"posts\" WHERE \"views\" >= $1");

        let limited = Select::<Post>::new().limit(3).compile_count(Dialect::Postgres);
        assert_eq!(
            limited.sql,
            "SELECT COUNT(*) FROM (SELECT 1 FROM \"posts\" LIMIT 3) AS _wrapped"
        );
    }

    #[test]
    fn test_exists_and_projection() {
        let q = Select::<Post>::by_id(4).compile_exists(Dialect::Sqlite);
        assert_eq!(q.sql, "SELECT 1 FROM \"posts\" WHERE \"id\" = ? LIMIT 1");

        let q = Select::<Post>::new()
            .project(["MAX(views)"])
            .compile(Dialect::Sqlite);
        assert_eq!(q.sql, "SELECT MAX(views) FROM \"posts\"");
    }

    #[test]
    fn test_insert_returning() {
        let q = Insert::from_model(&post()).compile(Dialect::Postgres);
        assert_eq!(
            q.sql,
            "INSERT INTO \"posts\" (\"title\", \"views\") VALUES ($1, $2) RETURNING \"id\""
        );
        assert!(q.returns_rows);
    }

    #[test]
    fn test_insert_mysql_uses_last_insert_id() {
        let q = Insert::from_model(&post()).compile(Dialect::Mysql);
        assert_eq!(q.sql, "INSERT INTO `posts` (`title`, `views`) VALUES (?, ?)");
        assert!(!q.returns_rows);
    }

    #[test]
    fn test_insert_with_explicit_key() {
        let mut p = post();
        p.id = Some(42);
        let insert = Insert::from_model(&p);
        assert!(!insert.generates_key());
        let q = insert.compile(Dialect::Sqlite);
        assert_eq!(
            q.sql,
            "INSERT INTO \"posts\" (\"id\", \"title\", \"views\") VALUES (?, ?, ?)"
        );
    }

    #[test]
    fn test_insert_supplied_key() {
        let s = Setting {
            key: "theme".into(),
            value: "dark".into(),
        };
        let q = Insert::from_model(&s).compile(Dialect::Postgres);
        assert_eq!(
            q.sql,
            "INSERT INTO \"settings\" (\"key\", \"value\") VALUES ($1, $2)"
        );
    }

    #[test]
    fn test_insert_many() {
        let q = InsertMany::from_models(&[post(), post()])
            .compile(Dialect::Postgres)
            .unwrap();
        assert_eq!(
            q.sql,
            "INSERT INTO \"posts\" (\"title\", \"views\") VALUES ($1, $2), ($3, $4)"
        );
        assert_eq!(q.params.len(), 4);
        assert!(InsertMany::<Post>::from_models(&[]).compile(Dialect::Postgres).is_err());
    }

    #[test]
    fn test_insert_many_rejects_mixed_keys() {
        let mut keyed = post();
        keyed.id = Some(7);
        let err = InsertMany::from_models(&[keyed.clone(), post()])
            .compile(Dialect::Postgres)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidDataType);

        let q = InsertMany::from_models(&[keyed.clone(), keyed])
            .compile(Dialect::Sqlite)
            .unwrap();
        assert!(q.sql.starts_with("INSERT INTO \"posts\" (\"id\", "));
        assert_eq!(q.params.len(), 6);
    }

    #[test]
    fn test_update_from_model() {
        let mut p = post();
        p.id = Some(7);
        let q = Update::from_model(&p).compile(Dialect::Postgres).unwrap();
        assert_eq!(
            q.sql,
            "UPDATE \"posts\" SET \"title\" = $1, \"views\" = $2 WHERE \"id\" = $3"
        );
        assert_eq!(q.params[2], Value::Int(7));
    }

    #[test]
    fn test_update_requires_assignment() {
        assert!(Update::<Post>::new().compile(Dialect::Mysql).is_err());
    }

    #[test]
    fn test_delete() {
        let q = Delete::<Post>::new()
            .filter(col("views").lt(1))
            .compile(Dialect::Mysql);
        assert_eq!(q.sql, "DELETE FROM `posts` WHERE `views` < ?");
        assert!(!q.returns_rows);
    }

    #[test]
    fn test_raw_kind() {
        assert!(Query::raw("select 1", vec![]).returns_rows);
        assert!(Query::raw("  WITH x AS (SELECT 1) SELECT * FROM x", vec![]).returns_rows);
        assert!(Query::raw("DELETE FROM t RETURNING id", vec![]).returns_rows);
        assert!(!Query::raw("UPDATE t SET a = 1", vec![]).returns_rows);
    }
}

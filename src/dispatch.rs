//! Async query verbs.
//!
//! Every verb compiles its descriptor, acquires the context's connection, runs the
//! statement through the driver and materializes the result. Errors from the driver are
//! returned as they are.

use tandem_query::{
    Delete, Insert, InsertMany, Model, Query, QueryError, QueryResult, Row, Select, Update, Value,
};
use tracing::trace;

use crate::context::ConnectionContext;
use crate::database::Database;
use crate::driver::QueryOutcome;

fn materialize<M: Model>(rows: &[Row]) -> QueryResult<Vec<M>> {
    rows.iter()
        .map(|row| M::from_row(row).map_err(|e| e.with_model(M::TABLE)))
        .collect()
}

fn first_value(rows: Vec<Row>) -> Value {
    rows.into_iter()
        .next()
        .and_then(|row| row.into_values().into_iter().next())
        .unwrap_or(Value::Null)
}

impl ConnectionContext {
    /// Run a compiled statement.
    pub async fn execute(&self, query: &Query) -> QueryResult<QueryOutcome> {
        let scope = self.acquire().await?;
        scope.run(query).await
    }

    /// Run raw SQL and materialize the rows as `M`.
    pub async fn raw<M: Model>(&self, sql: impl Into<String>, params: Vec<Value>) -> QueryResult<Vec<M>> {
        let query = Query::rows(sql, params);
        let scope = self.acquire().await?;
        let rows = scope.fetch(&query).await?;
        materialize(&rows)
    }

    /// All rows matching `select`.
    pub async fn select<M: Model>(&self, select: &Select<M>) -> QueryResult<Vec<M>> {
        let query = select.compile(self.db.dialect());
        let scope = self.acquire().await?;
        let rows = scope.fetch(&query).await?;
        materialize(&rows)
    }

    /// The first row matching `select`, failing with `RecordNotFound` when there is none.
    pub async fn get<M: Model>(&self, select: &Select<M>) -> QueryResult<M> {
        let query = select.first().compile(self.db.dialect());
        let scope = self.acquire().await?;
        let rows = scope.fetch(&query).await?;
        match rows.first() {
            Some(row) => M::from_row(row).map_err(|e| e.with_model(M::TABLE)),
            None => Err(QueryError::not_found(M::TABLE).with_sql(query.sql)),
        }
    }

    /// The first row matching `select`, if any.
    pub async fn get_or_none<M: Model>(&self, select: &Select<M>) -> QueryResult<Option<M>> {
        match self.get(select).await {
            Ok(model) => Ok(Some(model)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// The row with primary key `pk`.
    pub async fn get_by_id<M: Model>(&self, pk: impl Into<Value>) -> QueryResult<M> {
        self.get(&Select::<M>::by_id(pk)).await
    }

    /// Insert `model` and return it with its generated primary key assigned.
    pub async fn create<M: Model>(&self, mut model: M) -> QueryResult<M> {
        self.insert_model(&mut model).await?;
        Ok(model)
    }

    /// Insert `model` when its primary key is unset, update it by primary key otherwise.
    ///
    /// Returns the number of rows written.
    pub async fn save<M: Model>(&self, model: &mut M) -> QueryResult<u64> {
        if model.primary_key().is_null() {
            self.insert_model(model).await?;
            Ok(1)
        } else {
            self.update(model).await
        }
    }

    async fn insert_model<M: Model>(&self, model: &mut M) -> QueryResult<()> {
        let insert = Insert::from_model(model);
        let query = insert.compile(self.db.dialect());
        let scope = self.acquire().await?;
        if insert.generates_key() {
            let key = scope.insert(&query).await?.ok_or_else(|| {
                QueryError::internal("the driver reported no generated key")
                    .with_model(M::TABLE)
                    .with_sql(query.sql.clone())
            })?;
            trace!(table = M::TABLE, key = ?key, "Assigned generated key");
            model.set_primary_key(key)?;
        } else {
            scope.execute(&query).await?;
        }
        Ok(())
    }

    /// Write every column of `model` to its row. Returns the affected row count.
    pub async fn update<M: Model>(&self, model: &M) -> QueryResult<u64> {
        self.update_where(&Update::from_model(model)).await
    }

    /// Run an update. Returns the affected row count.
    pub async fn update_where<M: Model>(&self, update: &Update<M>) -> QueryResult<u64> {
        let query = update.compile(self.db.dialect())?;
        let scope = self.acquire().await?;
        Ok(scope.execute(&query).await?.rows_affected)
    }

    /// Delete the row of `model`. Returns the affected row count.
    pub async fn delete<M: Model>(&self, model: &M) -> QueryResult<u64> {
        self.delete_where(&Delete::from_model(model)).await
    }

    /// Run a delete. Returns the affected row count.
    pub async fn delete_where<M: Model>(&self, delete: &Delete<M>) -> QueryResult<u64> {
        let query = delete.compile(self.db.dialect());
        let scope = self.acquire().await?;
        Ok(scope.execute(&query).await?.rows_affected)
    }

    /// Insert all `models` with one statement. Returns the inserted row count.
    pub async fn bulk_create<M: Model>(&self, models: &[M]) -> QueryResult<u64> {
        if models.is_empty() {
            return Ok(0);
        }
        let query = InsertMany::from_models(models).compile(self.db.dialect())?;
        let scope = self.acquire().await?;
        Ok(scope.execute(&query).await?.rows_affected)
    }

    /// Fetch the row matching `select`, creating `defaults` when there is none.
    ///
    /// The insert runs in its own transaction level. If it loses a race against a
    /// concurrent insert of the same key, the winner's row is fetched instead. Returns the
    /// model and whether it was created.
    pub async fn get_or_create<M: Model>(&self, select: &Select<M>, defaults: M) -> QueryResult<(M, bool)> {
        if let Some(found) = self.get_or_none(select).await? {
            return Ok((found, false));
        }

        let disabled = self.state.lock().transactions_disabled;
        let created = if disabled {
            self.create(defaults).await
        } else {
            self.atomic_with(|ctx: ConnectionContext| async move { ctx.create(defaults).await })
                .await
        };
        match created {
            Ok(model) => Ok((model, true)),
            Err(e) if e.is_integrity_error() => match self.get_or_none(select).await? {
                Some(found) => Ok((found, false)),
                None => Err(e),
            },
            Err(e) => Err(e),
        }
    }

    /// Number of rows matching `select`.
    pub async fn count<M: Model>(&self, select: &Select<M>) -> QueryResult<u64> {
        let query = select.compile_count(self.db.dialect());
        let scope = self.acquire().await?;
        let value = first_value(scope.fetch(&query).await?);
        value
            .as_i64()
            .and_then(|n| u64::try_from(n).ok())
            .ok_or_else(|| {
                QueryError::deserialization(format!("COUNT returned {}", value.type_name()))
                    .with_sql(query.sql)
            })
    }

    /// Whether any row matches `select`.
    pub async fn exists<M: Model>(&self, select: &Select<M>) -> QueryResult<bool> {
        let query = select.compile_exists(self.db.dialect());
        let scope = self.acquire().await?;
        Ok(!scope.fetch(&query).await?.is_empty())
    }

    /// First column of the first row of `select`, `Value::Null` when nothing matches.
    pub async fn scalar<M: Model>(&self, select: &Select<M>) -> QueryResult<Value> {
        let query = select.first().compile(self.db.dialect());
        let scope = self.acquire().await?;
        Ok(first_value(scope.fetch(&query).await?))
    }
}

/// Verbs on the context bound to the current task, or on a fresh context per call.
impl Database {
    /// See [`ConnectionContext::execute`].
    pub async fn execute(&self, query: &Query) -> QueryResult<QueryOutcome> {
        self.context().execute(query).await
    }

    /// See [`ConnectionContext::raw`].
    pub async fn raw<M: Model>(&self, sql: impl Into<String>, params: Vec<Value>) -> QueryResult<Vec<M>> {
        self.context().raw(sql, params).await
    }

    /// See [`ConnectionContext::select`].
    pub async fn select<M: Model>(&self, select: &Select<M>) -> QueryResult<Vec<M>> {
        self.context().select(select).await
    }

    /// See [`ConnectionContext::get`].
    pub async fn get<M: Model>(&self, select: &Select<M>) -> QueryResult<M> {
        self.context().get(select).await
    }

    /// See [`ConnectionContext::get_or_none`].
    pub async fn get_or_none<M: Model>(&self, select: &Select<M>) -> QueryResult<Option<M>> {
        self.context().get_or_none(select).await
    }

    /// See [`ConnectionContext::get_by_id`].
    pub async fn get_by_id<M: Model>(&self, pk: impl Into<Value>) -> QueryResult<M> {
        self.context().get_by_id(pk).await
    }

    /// See [`ConnectionContext::create`].
    pub async fn create<M: Model>(&self, model: M) -> QueryResult<M> {
        self.context().create(model).await
    }

    /// See [`ConnectionContext::save`].
    pub async fn save<M: Model>(&self, model: &mut M) -> QueryResult<u64> {
        self.context().save(model).await
    }

    /// See [`ConnectionContext::update`].
    pub async fn update<M: Model>(&self, model: &M) -> QueryResult<u64> {
        self.context().update(model).await
    }

    /// See [`ConnectionContext::update_where`].
    pub async fn update_where<M: Model>(&self, update: &Update<M>) -> QueryResult<u64> {
        self.context().update_where(update).await
    }

    /// See [`ConnectionContext::delete`].
    pub async fn delete<M: Model>(&self, model: &M) -> QueryResult<u64> {
        self.context().delete(model).await
    }

    /// See [`ConnectionContext::delete_where`].
    pub async fn delete_where<M: Model>(&self, delete: &Delete<M>) -> QueryResult<u64> {
        self.context().delete_where(delete).await
    }

    /// See [`ConnectionContext::bulk_create`].
    pub async fn bulk_create<M: Model>(&self, models: &[M]) -> QueryResult<u64> {
        self.context().bulk_create(models).await
    }

    /// See [`ConnectionContext::get_or_create`].
    pub async fn get_or_create<M: Model>(&self, select: &Select<M>, defaults: M) -> QueryResult<(M, bool)> {
        self.context().get_or_create(select, defaults).await
    }

    /// See [`ConnectionContext::count`].
    pub async fn count<M: Model>(&self, select: &Select<M>) -> QueryResult<u64> {
        self.context().count(select).await
    }

    /// See [`ConnectionContext::exists`].
    pub async fn exists<M: Model>(&self, select: &Select<M>) -> QueryResult<bool> {
        self.context().exists(select).await
    }

    /// See [`ConnectionContext::scalar`].
    pub async fn scalar<M: Model>(&self, select: &Select<M>) -> QueryResult<Value> {
        self.context().scalar(select).await
    }
}

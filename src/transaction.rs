//! Transaction scopes over a connection context.
//!
//! The first level opens a real transaction, deeper levels open savepoints. Every open
//! level holds a reference on its context, so the connection stays checked out for as long
//! as any transaction on it is open.
//!
//! ```rust,no_run
//! use tandem::{ConnectionContext, Database, DatabaseConfig, Query, QueryError};
//!
//! # async fn example() -> Result<(), QueryError> {
//! let db = Database::new(DatabaseConfig::sqlite("app.db"))?;
//! let ctx = db.context();
//! ctx.atomic_with(|ctx: ConnectionContext| async move {
//!     ctx.execute(&Query::raw("UPDATE accounts SET balance = balance - 10 WHERE id = 1", vec![])).await?;
//!     ctx.execute(&Query::raw("UPDATE accounts SET balance = balance + 10 WHERE id = 2", vec![])).await?;
//!     Ok::<_, QueryError>(())
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

use std::future::Future;

use tandem_query::{ErrorCode, QueryError, QueryResult, TransactionConfig};
use tracing::{debug, warn};

use crate::context::{ConnectionContext, ConnectionScope};

impl ConnectionContext {
    /// Open a transaction level: a transaction at depth 0, a savepoint below it.
    pub async fn atomic(&self) -> QueryResult<Atomic> {
        self.atomic_with_config(TransactionConfig::default()).await
    }

    /// Like [`atomic`](Self::atomic), applying `config` when a real transaction is opened.
    pub async fn atomic_with_config(&self, config: TransactionConfig) -> QueryResult<Atomic> {
        if self.state.lock().transactions_disabled {
            return Err(QueryError::transactions_disabled());
        }
        let scope = self.acquire().await?;
        let record = self.state.lock().stack.prepare();

        for sql in record.begin_statements(self.db.dialect(), &config) {
            scope.batch(&sql).await?;
        }

        let pushed = {
            let mut state = self.state.lock();
            let pushed = state.stack.push(record.clone());
            if pushed.is_ok() {
                // The open level keeps the connection checked out.
                state.refs += 1;
            }
            pushed
        };
        if let Err(e) = pushed {
            if let Err(rollback) = scope.batch(&record.rollback_statement()).await {
                warn!(error = %rollback, "Rollback of unregistered transaction level failed");
            }
            return Err(e);
        }

        debug!(depth = record.depth(), "Transaction level opened");
        Ok(Atomic {
            ctx: self.clone(),
            id: record.id(),
            depth: record.depth(),
            armed: true,
        })
    }

    /// Run `f` inside [`atomic`](Self::atomic), committing on `Ok` and rolling back on `Err`.
    ///
    /// `f` receives the context and runs with it bound to the current task. The error from
    /// `f` is returned unchanged; a failing rollback is only logged.
    pub async fn atomic_with<F, Fut, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(ConnectionContext) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<QueryError>,
    {
        let atomic = self.atomic().await?;
        self.run_in(atomic, f).await
    }

    /// Open a top-level transaction, failing with `NestedTransaction` if one is open.
    pub async fn transaction(&self) -> QueryResult<Atomic> {
        if self.depth() > 0 {
            return Err(QueryError::nested_transaction());
        }
        self.atomic().await
    }

    /// Run `f` in a top-level transaction, failing with `NestedTransaction` if one is open.
    pub async fn transaction_with<F, Fut, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(ConnectionContext) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<QueryError>,
    {
        let atomic = self.transaction().await?;
        self.run_in(atomic, f).await
    }

    async fn run_in<F, Fut, T, E>(&self, atomic: Atomic, f: F) -> Result<T, E>
    where
        F: FnOnce(ConnectionContext) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<QueryError>,
    {
        match self.clone().scope(f(self.clone())).await {
            Ok(value) => {
                atomic.commit().await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = atomic.rollback().await {
                    warn!(error = %rollback, "Rollback after failure failed");
                }
                Err(e)
            }
        }
    }

    /// Open a level that stays open until [`commit`](Self::commit) or
    /// [`rollback`](Self::rollback) is called on this context.
    pub async fn begin(&self) -> QueryResult<()> {
        self.atomic().await?.detach();
        Ok(())
    }

    /// Commit the innermost open level.
    pub async fn commit(&self) -> QueryResult<()> {
        let id = self.top_id()?;
        self.finish(id, true).await
    }

    /// Roll back the innermost open level.
    pub async fn rollback(&self) -> QueryResult<()> {
        let id = self.top_id()?;
        self.finish(id, false).await
    }

    /// Start a manually managed transaction on this context's connection.
    pub async fn manual(&self) -> QueryResult<ManualTransaction> {
        Ok(ManualTransaction {
            scope: self.acquire().await?,
            ids: Vec::new(),
        })
    }

    fn top_id(&self) -> QueryResult<u64> {
        self.state
            .lock()
            .stack
            .top()
            .map(|record| record.id())
            .ok_or_else(QueryError::no_active_transaction)
    }

    pub(crate) fn is_open(&self, id: u64) -> bool {
        self.state.lock().stack.contains(id)
    }

    /// Close level `id` with `COMMIT`/`RELEASE` or `ROLLBACK [TO SAVEPOINT]`.
    pub(crate) async fn finish(&self, id: u64, commit: bool) -> QueryResult<()> {
        let record = {
            let state = self.state.lock();
            let record = state
                .stack
                .get(id)
                .cloned()
                .ok_or_else(QueryError::no_active_transaction)?;
            if let Some(top) = state.stack.top() {
                if top.id() != id {
                    return Err(QueryError::transaction_order(record.depth(), top.depth()));
                }
            }
            record
        };

        let mut guard = match self.connection().await {
            Ok(guard) => guard,
            Err(e) => {
                self.discard_transactions();
                return Err(match e.code {
                    ErrorCode::PoolClosed => QueryError::no_active_transaction()
                        .with_context("the connection was closed while the transaction was open"),
                    _ => e,
                });
            }
        };

        let sql = if commit {
            record.commit_statement()
        } else {
            record.rollback_statement()
        };
        let result = guard.connection()?.batch(&sql).await;
        let result = guard.observe(result);

        if commit {
            if let Err(e) = &result {
                let result = guard.connection()?.batch(&record.rollback_statement()).await;
                if let Err(rollback) = guard.observe(result) {
                    warn!(error = %rollback, "Rollback after failed commit failed");
                    guard.lease().mark_discard();
                }
                debug!(depth = record.depth(), error = %e, "Commit failed");
            }
        }
        drop(guard);

        let popped = self.state.lock().stack.pop_through(id).len();
        debug!(depth = record.depth(), commit, "Transaction level closed");
        self.release_refs(popped);
        result
    }

    /// Drop level `id` and every level inside it, deferring their rollback to the next
    /// statement on the connection.
    pub(crate) fn abandon(&self, id: u64) {
        let popped = {
            let mut state = self.state.lock();
            let popped = state.stack.pop_through(id);
            for record in &popped {
                state.pending.push(record.rollback_statement());
            }
            popped.len()
        };
        if popped > 0 {
            debug!(levels = popped, "Transaction scope dropped, rollback deferred");
            self.release_refs(popped);
        }
    }
}

/// An open transaction level.
///
/// Close it with [`commit`](Atomic::commit) or [`rollback`](Atomic::rollback). Dropping it
/// open rolls it back before the next statement on the connection.
#[must_use = "dropping the guard rolls the transaction back"]
pub struct Atomic {
    ctx: ConnectionContext,
    id: u64,
    depth: usize,
    armed: bool,
}

impl Atomic {
    /// Nesting depth of this level, 1 for the real transaction.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// The context this level was opened on.
    pub fn context(&self) -> &ConnectionContext {
        &self.ctx
    }

    /// Commit this level.
    pub async fn commit(self) -> QueryResult<()> {
        self.ctx.finish(self.id, true).await
    }

    /// Roll back this level.
    pub async fn rollback(self) -> QueryResult<()> {
        self.ctx.finish(self.id, false).await
    }

    fn detach(mut self) {
        self.armed = false;
    }
}

impl Drop for Atomic {
    fn drop(&mut self) {
        if self.armed && self.ctx.is_open(self.id) {
            self.ctx.abandon(self.id);
        }
    }
}

impl std::fmt::Debug for Atomic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Atomic")
            .field("id", &self.id)
            .field("depth", &self.depth)
            .finish()
    }
}

/// Explicit begin/commit/rollback over one checked-out connection.
///
/// Only levels opened through this object can be closed through it. Levels still open when
/// it is dropped are rolled back.
#[must_use]
pub struct ManualTransaction {
    scope: ConnectionScope,
    ids: Vec<u64>,
}

impl ManualTransaction {
    /// Open a level.
    pub async fn begin(&mut self) -> QueryResult<()> {
        let atomic = self.scope.context().atomic().await?;
        self.ids.push(atomic.id);
        atomic.detach();
        Ok(())
    }

    /// Commit the innermost level opened here.
    pub async fn commit(&mut self) -> QueryResult<()> {
        self.close(true).await
    }

    /// Roll back the innermost level opened here.
    pub async fn rollback(&mut self) -> QueryResult<()> {
        self.close(false).await
    }

    /// Number of levels opened here and still open.
    pub fn depth(&self) -> usize {
        self.ids
            .iter()
            .filter(|id| self.scope.context().is_open(**id))
            .count()
    }

    /// The underlying connection scope.
    pub fn scope(&self) -> &ConnectionScope {
        &self.scope
    }

    async fn close(&mut self, commit: bool) -> QueryResult<()> {
        let ctx = self.scope.context().clone();
        self.ids.retain(|id| ctx.is_open(*id));
        let id = *self.ids.last().ok_or_else(QueryError::no_active_transaction)?;
        let result = ctx.finish(id, commit).await;
        self.ids.retain(|id| ctx.is_open(*id));
        result
    }
}

impl Drop for ManualTransaction {
    fn drop(&mut self) {
        let ctx = self.scope.context();
        for id in self.ids.iter().rev() {
            if ctx.is_open(*id) {
                ctx.abandon(*id);
            }
        }
    }
}

impl std::fmt::Debug for ManualTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualTransaction")
            .field("levels", &self.ids)
            .finish()
    }
}

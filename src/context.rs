//! Task-scoped connection contexts.
//!
//! A [`ConnectionContext`] is one logical unit of work. It holds at most one leased
//! connection, a reference count of the scopes using it and the transaction stack opened
//! on it. Every statement issued through the same context runs on the same physical
//! connection until the outermost scope lets go.
//!
//! Contexts are passed explicitly, or bound to the current tokio task with
//! [`ConnectionContext::scope`] so that [`Database`] verbs pick them up. Binding is
//! task-local: a task started with `tokio::spawn` inside a scope does not see the
//! parent's context and therefore runs outside the parent's transaction.

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tandem_query::{ExecOutcome, Query, QueryError, QueryResult, Row, TransactionStack, Value};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::database::Database;
use crate::driver::QueryOutcome;
use crate::pool::{Lease, LeaseGuard};

tokio::task_local! {
    static BOUND_CONTEXTS: Vec<ConnectionContext>;
}

/// One logical unit of work over a single pooled connection.
#[derive(Clone)]
pub struct ConnectionContext {
    pub(crate) db: Database,
    pub(crate) state: Arc<Mutex<ContextState>>,
}

#[derive(Default)]
pub(crate) struct ContextState {
    pub(crate) lease: Option<Arc<Lease>>,
    pub(crate) refs: usize,
    pub(crate) stack: TransactionStack,
    pub(crate) pending: Vec<String>,
    pub(crate) transactions_disabled: bool,
}

impl ContextState {
    fn is_dirty(&self) -> bool {
        !self.stack.is_empty() || !self.pending.is_empty()
    }
}

impl Drop for ContextState {
    fn drop(&mut self) {
        if let Some(lease) = &self.lease {
            if self.is_dirty() {
                lease.mark_discard();
            }
        }
    }
}

impl ConnectionContext {
    /// Create an empty context for `db`. No connection is taken until first use.
    pub fn new(db: &Database) -> Self {
        Self {
            db: db.clone(),
            state: Arc::new(Mutex::new(ContextState::default())),
        }
    }

    /// The context bound to the current task for `db`, if any.
    pub fn bound(db: &Database) -> Option<Self> {
        BOUND_CONTEXTS
            .try_with(|contexts| {
                contexts
                    .iter()
                    .rev()
                    .find(|ctx| ctx.db.id() == db.id())
                    .cloned()
            })
            .ok()
            .flatten()
    }

    /// Run `fut` with this context bound to the current task.
    pub async fn scope<F: Future>(self, fut: F) -> F::Output {
        let mut contexts = BOUND_CONTEXTS
            .try_with(|contexts| contexts.clone())
            .unwrap_or_default();
        contexts.retain(|ctx| ctx.db.id() != self.db.id());
        contexts.push(self);
        BOUND_CONTEXTS.scope(contexts, fut).await
    }

    /// The database this context belongs to.
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Check out the context's connection, reusing the one already held.
    pub async fn acquire(&self) -> QueryResult<ConnectionScope> {
        {
            let mut state = self.state.lock();
            if state.lease.is_some() {
                state.refs += 1;
                trace!(refs = state.refs, "Reusing context connection");
                return Ok(ConnectionScope { ctx: self.clone() });
            }
        }

        let lease = self.db.checkout().await?;
        let spare = {
            let mut state = self.state.lock();
            state.refs += 1;
            if state.lease.is_none() {
                debug!(connection_id = %lease.id(), "Context acquired connection");
                state.lease = Some(lease);
                None
            } else {
                Some(lease)
            }
        };
        drop(spare);
        Ok(ConnectionScope { ctx: self.clone() })
    }

    /// Identity of the held connection, if any.
    pub fn connection_id(&self) -> Option<Uuid> {
        self.state.lock().lease.as_ref().map(|lease| lease.id())
    }

    /// Number of open transaction levels.
    pub fn depth(&self) -> usize {
        self.state.lock().stack.depth()
    }

    /// Whether the context currently holds a connection.
    pub fn is_connected(&self) -> bool {
        self.state.lock().lease.is_some()
    }

    pub(crate) fn release_refs(&self, n: usize) {
        let lease = {
            let mut state = self.state.lock();
            state.refs = state.refs.saturating_sub(n);
            if state.refs > 0 {
                return;
            }
            let lease = state.lease.take();
            if let Some(lease) = &lease {
                if state.is_dirty() {
                    warn!(
                        connection_id = %lease.id(),
                        depth = state.stack.depth(),
                        "Connection released with an open transaction"
                    );
                    state.stack.clear();
                    state.pending.clear();
                    lease.mark_discard();
                }
                debug!(connection_id = %lease.id(), "Context released connection");
            }
            lease
        };
        drop(lease);
    }

    /// Forget every open level after the connection was lost.
    pub(crate) fn discard_transactions(&self) {
        let (popped, lease) = {
            let mut state = self.state.lock();
            state.pending.clear();
            (state.stack.clear().len(), state.lease.clone())
        };
        if popped > 0 {
            warn!(levels = popped, "Discarding transactions of a lost connection");
            if let Some(lease) = lease {
                lease.mark_discard();
            }
            self.release_refs(popped);
        }
    }

    /// Lock the held connection, running deferred rollbacks first.
    pub(crate) async fn connection(&self) -> QueryResult<LeaseGuard> {
        let lease = self
            .state
            .lock()
            .lease
            .clone()
            .ok_or_else(|| QueryError::internal("no connection acquired on this context"))?;
        if lease.is_revoked() {
            return Err(QueryError::pool_closed());
        }
        let mut guard = lease.lock().await?;

        let pending = std::mem::take(&mut self.state.lock().pending);
        for sql in pending {
            debug!(sql = %sql, "Running deferred rollback");
            let result = guard.connection()?.batch(&sql).await;
            if let Err(e) = guard.observe(result) {
                // The enclosing levels can no longer be trusted to commit.
                lease.mark_discard();
                self.discard_transactions();
                return Err(e);
            }
        }
        Ok(guard)
    }
}

impl std::fmt::Debug for ConnectionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ConnectionContext")
            .field("connection_id", &state.lease.as_ref().map(|l| l.id()))
            .field("refs", &state.refs)
            .field("depth", &state.stack.depth())
            .finish()
    }
}

/// A reference to a context's connection. The connection goes back to the pool when the
/// last scope of its context is dropped.
#[must_use = "the connection is released as soon as the scope is dropped"]
pub struct ConnectionScope {
    ctx: ConnectionContext,
}

impl ConnectionScope {
    /// The owning context.
    pub fn context(&self) -> &ConnectionContext {
        &self.ctx
    }

    /// Run a row-returning statement.
    pub async fn fetch(&self, query: &Query) -> QueryResult<Vec<Row>> {
        let mut guard = self.ctx.connection().await?;
        let result = guard.connection()?.fetch(query).await;
        guard.observe(result)
    }

    /// Run a statement and report affected rows.
    pub async fn execute(&self, query: &Query) -> QueryResult<ExecOutcome> {
        let mut guard = self.ctx.connection().await?;
        let result = guard.connection()?.execute(query).await;
        guard.observe(result)
    }

    /// Run an insert and return the generated key.
    pub async fn insert(&self, query: &Query) -> QueryResult<Option<Value>> {
        let mut guard = self.ctx.connection().await?;
        let result = guard.connection()?.insert(query).await;
        guard.observe(result)
    }

    /// Run a parameterless control statement.
    pub async fn batch(&self, sql: &str) -> QueryResult<()> {
        let mut guard = self.ctx.connection().await?;
        let result = guard.connection()?.batch(sql).await;
        guard.observe(result)
    }

    pub(crate) async fn run(&self, query: &Query) -> QueryResult<QueryOutcome> {
        let mut guard = self.ctx.connection().await?;
        let result = guard.connection()?.run(query).await;
        guard.observe(result)
    }
}

impl Drop for ConnectionScope {
    fn drop(&mut self) {
        self.ctx.release_refs(1);
    }
}

impl std::fmt::Debug for ConnectionScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionScope").field("ctx", &self.ctx).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use tandem_query::ErrorCode;

    async fn memory_db() -> Database {
        let db = Database::new(DatabaseConfig::sqlite(":memory:")).unwrap();
        db.connect().await.unwrap();
        db
    }

    #[tokio::test]
    async fn test_acquire_is_reentrant() {
        let db = memory_db().await;
        let ctx = ConnectionContext::new(&db);

        let outer = ctx.acquire().await.unwrap();
        let id = ctx.connection_id();
        assert!(id.is_some());
        {
            let _inner = ctx.acquire().await.unwrap();
            assert_eq!(ctx.connection_id(), id);
        }
        assert!(ctx.is_connected());
        drop(outer);
        assert!(!ctx.is_connected());
    }

    #[tokio::test]
    async fn test_scope_binds_context() {
        let db = memory_db().await;
        assert!(ConnectionContext::bound(&db).is_none());

        let ctx = ConnectionContext::new(&db);
        let _scope = ctx.acquire().await.unwrap();
        let expected = ctx.connection_id();
        let seen = ctx
            .clone()
            .scope(async { ConnectionContext::bound(&db).and_then(|c| c.connection_id()) })
            .await;
        assert_eq!(seen, expected);
    }

    #[tokio::test]
    async fn test_statements_share_connection() {
        let db = memory_db().await;
        let ctx = ConnectionContext::new(&db);
        let scope = ctx.acquire().await.unwrap();
        scope
            .batch("CREATE TEMP TABLE scratch (v INTEGER)")
            .await
            .unwrap();
        scope
            .execute(&Query::statement("INSERT INTO scratch (v) VALUES (?)", vec![Value::Int(4)]))
            .await
            .unwrap();
        let rows = scope
            .fetch(&Query::rows("SELECT v FROM scratch", vec![]))
            .await
            .unwrap();
        assert_eq!(rows[0].get("v"), Some(&Value::Int(4)));
    }

    #[tokio::test]
    async fn test_pending_rollbacks_run_first() {
        let db = memory_db().await;
        let ctx = ConnectionContext::new(&db);
        let scope = ctx.acquire().await.unwrap();
        scope.batch("BEGIN").await.unwrap();
        ctx.state.lock().pending.push("ROLLBACK".to_string());
        scope.batch("BEGIN").await.unwrap();
        scope.batch("ROLLBACK").await.unwrap();
        assert!(ctx.state.lock().pending.is_empty());
    }

    #[tokio::test]
    async fn test_failed_deferred_rollback_abandons_transaction() {
        let db = memory_db().await;
        let ctx = ConnectionContext::new(&db);
        let outer = ctx.atomic().await.unwrap();
        ctx.state
            .lock()
            .pending
            .push("ROLLBACK TO SAVEPOINT never_opened".to_string());

        let err = ctx.execute(&Query::raw("SELECT 1", vec![])).await.unwrap_err();
        assert!(!err.is_connection_error());
        assert_eq!(ctx.depth(), 0);
        assert!(!ctx.is_connected());

        let err = outer.commit().await.unwrap_err();
        assert_eq!(err.code, ErrorCode::NoActiveTransaction);
    }
}

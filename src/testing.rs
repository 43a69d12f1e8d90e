//! Helpers for tests that run against a real database.

use std::future::Future;

use tandem_query::QueryError;
use tracing::warn;

use crate::context::ConnectionContext;
use crate::database::Database;

/// Run `f` inside a transaction that is always rolled back.
///
/// The context passed to `f` is bound to the current task, so database verbs inside it
/// see the same uncommitted data. Transaction scopes opened inside `f` fail with
/// `TransactionsDisabled`; `get_or_create` inserts without its own savepoint.
///
/// ```rust,no_run
/// use tandem::testing::rollback_scope;
/// use tandem::{Database, DatabaseConfig, Query, QueryError};
///
/// # async fn example() -> Result<(), QueryError> {
/// let db = Database::new(DatabaseConfig::sqlite("test.db"))?;
/// rollback_scope(&db, |ctx| async move {
///     ctx.execute(&Query::raw("DELETE FROM users", vec![])).await?;
///     Ok::<_, QueryError>(())
/// })
/// .await?;
/// # Ok(())
/// # }
/// ```
pub async fn rollback_scope<F, Fut, T, E>(db: &Database, f: F) -> Result<T, E>
where
    F: FnOnce(ConnectionContext) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<QueryError>,
{
    let ctx = db.context();
    let atomic = ctx.atomic().await?;
    ctx.state.lock().transactions_disabled = true;

    let result = ctx.clone().scope(f(ctx.clone())).await;

    ctx.state.lock().transactions_disabled = false;
    match result {
        Ok(value) => {
            atomic.rollback().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback) = atomic.rollback().await {
                warn!(error = %rollback, "Rollback of test scope failed");
            }
            Err(e)
        }
    }
}

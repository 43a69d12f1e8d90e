//! Synchronous access gate.
//!
//! Blocking calls never touch the async pool. Each one opens its own connection on a
//! private current-thread runtime and closes it afterwards, so they are only available
//! outside a tokio runtime and only while the database's [`SyncMode`] allows them.

use serde::{Deserialize, Serialize};
use tandem_query::{Query, QueryError, QueryResult};
use tracing::{error, warn};

use crate::database::Database;
use crate::driver::{DriverManager, QueryOutcome};

/// Whether blocking calls are permitted on a database.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Blocking calls run silently.
    #[default]
    Allowed,
    /// Blocking calls fail with `SyncNotAllowed`.
    Forbidden,
    /// Blocking calls run and are logged at `WARN`.
    Warn,
    /// Blocking calls run and are logged at `ERROR`.
    Error,
}

impl Database {
    /// Current synchronous access mode.
    pub fn sync_mode(&self) -> SyncMode {
        *self.inner.sync_mode.read()
    }

    /// Change the synchronous access mode.
    pub fn set_sync_mode(&self, mode: SyncMode) {
        *self.inner.sync_mode.write() = mode;
    }

    /// Permit blocking calls until the returned guard is dropped.
    pub fn allow_sync(&self) -> AllowSyncGuard {
        let previous = std::mem::replace(&mut *self.inner.sync_mode.write(), SyncMode::Allowed);
        AllowSyncGuard {
            db: self.clone(),
            previous,
        }
    }

    /// Run `query` on a dedicated connection, blocking the current thread.
    ///
    /// Fails with `SyncNotAllowed` when the mode is [`SyncMode::Forbidden`] and with
    /// `BlockingInAsync` when called from inside a tokio runtime.
    pub fn execute_sync(&self, query: &Query) -> QueryResult<QueryOutcome> {
        match self.sync_mode() {
            SyncMode::Allowed => {}
            SyncMode::Forbidden => return Err(QueryError::sync_not_allowed()),
            SyncMode::Warn => warn!(sql = %query.sql, "Synchronous query"),
            SyncMode::Error => error!(sql = %query.sql, "Synchronous query"),
        }
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(QueryError::blocking_in_async());
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| QueryError::internal("failed to start a blocking runtime").with_source(e))?;
        let manager = DriverManager::new(self.config());
        runtime.block_on(async move {
            let mut conn = manager.connect().await?;
            let result = conn.run(query).await;
            if let Err(e) = conn.close().await {
                warn!(error = %e, "Closing synchronous connection failed");
            }
            result
        })
    }
}

/// Restores the previous [`SyncMode`] when dropped.
#[must_use = "synchronous access is revoked as soon as the guard is dropped"]
#[derive(Debug)]
pub struct AllowSyncGuard {
    db: Database,
    previous: SyncMode,
}

impl Drop for AllowSyncGuard {
    fn drop(&mut self) {
        self.db.set_sync_mode(self.previous);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use tandem_query::ErrorCode;

    #[test]
    fn test_sync_mode_serde() {
        let mode: SyncMode = serde_json::from_str("\"forbidden\"").unwrap();
        assert_eq!(mode, SyncMode::Forbidden);
        assert_eq!(serde_json::to_string(&SyncMode::Warn).unwrap(), "\"warn\"");
    }

    #[test]
    fn test_allow_sync_restores_mode() {
        let db = Database::new(DatabaseConfig::sqlite(":memory:")).unwrap();
        db.set_sync_mode(SyncMode::Forbidden);
        {
            let _guard = db.allow_sync();
            assert_eq!(db.sync_mode(), SyncMode::Allowed);
        }
        assert_eq!(db.sync_mode(), SyncMode::Forbidden);
    }

    #[test]
    fn test_forbidden_sync() {
        let db = Database::new(DatabaseConfig::sqlite(":memory:")).unwrap();
        db.set_sync_mode(SyncMode::Forbidden);
        let err = db.execute_sync(&Query::raw("SELECT 1", vec![])).unwrap_err();
        assert_eq!(err.code, ErrorCode::SyncNotAllowed);
    }

    #[test]
    fn test_execute_sync() {
        let db = Database::new(DatabaseConfig::sqlite(":memory:")).unwrap();
        db.set_sync_mode(SyncMode::Warn);
        let outcome = db.execute_sync(&Query::rows("SELECT 1 AS one", vec![])).unwrap();
        assert_eq!(outcome.rows.len(), 1);
    }

    #[tokio::test]
    async fn test_blocking_inside_runtime() {
        let db = Database::new(DatabaseConfig::sqlite(":memory:")).unwrap();
        let err = db.execute_sync(&Query::raw("SELECT 1", vec![])).unwrap_err();
        assert_eq!(err.code, ErrorCode::BlockingInAsync);
    }
}

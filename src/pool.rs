//! Bounded connection pool and connection leases.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use deadpool::Runtime;
use deadpool::managed::{self, Object, PoolError, TimeoutType};
use tandem_query::{Dialect, QueryError, QueryResult};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::driver::{DriverManager, RawConnection};

/// A connection checked out of the pool.
pub type PooledConnection = Object<DriverManager>;

/// A bounded pool of connections for one database.
///
/// Waiters are served in arrival order. Dropping a waiting `acquire` future removes the
/// waiter without consuming a slot.
#[derive(Clone)]
pub struct Pool {
    inner: managed::Pool<DriverManager>,
    dialect: Dialect,
    max_size: usize,
}

impl Pool {
    /// Create a pool for `config`. No connection is opened yet.
    pub fn new(config: &DatabaseConfig) -> QueryResult<Self> {
        let inner = managed::Pool::builder(DriverManager::new(config))
            .max_size(config.max_connections)
            .wait_timeout(Some(config.connect_timeout))
            .create_timeout(Some(config.connect_timeout))
            .recycle_timeout(Some(config.connect_timeout))
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| QueryError::configuration(format!("failed to create pool: {}", e)))?;

        info!(
            driver = ?config.driver,
            host = %config.host,
            database = %config.database,
            max_connections = config.max_connections,
            "Connection pool created"
        );

        Ok(Self {
            inner,
            dialect: config.dialect(),
            max_size: config.max_connections,
        })
    }

    /// Get a connection, waiting while all `max_connections` are checked out.
    pub async fn get(&self) -> QueryResult<PooledConnection> {
        trace!("Acquiring connection from pool");
        self.inner.get().await.map_err(|e| self.map_error(e))
    }

    /// Check out a connection wrapped in a [`Lease`].
    pub async fn lease(&self) -> QueryResult<Arc<Lease>> {
        let object = self.get().await?;
        let lease = Lease {
            id: Uuid::new_v4(),
            slot: Arc::new(Mutex::new(Some(object))),
            pool: self.clone(),
            discard: AtomicBool::new(false),
        };
        trace!(connection_id = %lease.id, "Connection leased");
        Ok(Arc::new(lease))
    }

    /// Open up to `n` connections now so connectivity problems surface early.
    pub async fn warm_up(&self, n: usize) -> QueryResult<()> {
        let n = n.min(self.max_size);
        if n == 0 {
            return Ok(());
        }
        let connections = futures::future::try_join_all((0..n).map(|_| self.get())).await?;
        debug!(count = connections.len(), "Pool warmed up");
        Ok(())
    }

    /// Get the current pool status.
    pub fn status(&self) -> PoolStatus {
        let status = self.inner.status();
        PoolStatus {
            available: status.available as usize,
            size: status.size as usize,
            max_size: status.max_size as usize,
            waiting: status.waiting,
        }
    }

    /// Close the pool.
    ///
    /// Idle connections are dropped, waiters fail, and leases still checked out are revoked.
    pub fn close(&self) {
        self.inner.close();
        info!("Connection pool closed");
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// SQL dialect of the pooled connections.
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn map_error(&self, err: PoolError<QueryError>) -> QueryError {
        match err {
            PoolError::Backend(e) => e,
            PoolError::Timeout(TimeoutType::Wait) => QueryError::pool_timeout(self.max_size),
            PoolError::Timeout(_) => QueryError::connection_timeout("timed out opening a connection"),
            PoolError::Closed => QueryError::pool_closed(),
            other => QueryError::connection(other.to_string()),
        }
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("dialect", &self.dialect)
            .field("status", &self.status())
            .finish()
    }
}

/// Pool status information.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Number of available (idle) connections.
    pub available: usize,
    /// Current total size of the pool.
    pub size: usize,
    /// Maximum size of the pool.
    pub max_size: usize,
    /// Number of tasks waiting for a connection.
    pub waiting: usize,
}

/// A connection checked out by one context.
///
/// Dropping the lease returns the connection to the pool, unless it was marked for
/// discard or the pool has been closed, in which case the connection is closed instead.
pub struct Lease {
    id: Uuid,
    slot: Arc<Mutex<Option<PooledConnection>>>,
    pool: Pool,
    discard: AtomicBool,
}

impl Lease {
    /// Identity of this checkout.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Whether the pool this lease came from has been closed.
    pub fn is_revoked(&self) -> bool {
        self.pool.is_closed()
    }

    /// Close the connection on release instead of returning it.
    pub fn mark_discard(&self) {
        if !self.discard.swap(true, Ordering::AcqRel) {
            debug!(connection_id = %self.id, "Connection marked for discard");
        }
    }

    /// Whether the connection will be closed on release.
    pub fn is_discarded(&self) -> bool {
        self.discard.load(Ordering::Acquire)
    }

    /// Lock the connection for one statement.
    pub async fn lock(self: &Arc<Self>) -> QueryResult<LeaseGuard> {
        let slot = self.slot.clone().lock_owned().await;
        if slot.is_none() {
            return Err(QueryError::internal("leased connection already released"));
        }
        Ok(LeaseGuard {
            slot,
            lease: self.clone(),
            in_flight: false,
        })
    }
}

impl std::fmt::Debug for Lease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease")
            .field("id", &self.id)
            .field("discard", &self.is_discarded())
            .finish()
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        let Ok(mut slot) = self.slot.try_lock() else {
            return;
        };
        let Some(object) = slot.take() else {
            return;
        };
        if self.is_discarded() || self.pool.is_closed() {
            warn!(connection_id = %self.id, "Discarding connection");
            drop(Object::take(object));
        } else {
            trace!(connection_id = %self.id, "Connection returned to pool");
            drop(object);
        }
    }
}

/// Exclusive access to a leased connection for the duration of one statement.
///
/// A statement started through [`connection`](Self::connection) must be finished with
/// [`observe`](Self::observe). A guard dropped in between (a cancelled statement) leaves
/// the session in an unknown state, so the connection is marked for discard.
pub struct LeaseGuard {
    slot: OwnedMutexGuard<Option<PooledConnection>>,
    lease: Arc<Lease>,
    in_flight: bool,
}

impl LeaseGuard {
    /// The physical connection.
    pub fn connection(&mut self) -> QueryResult<&mut RawConnection> {
        self.in_flight = true;
        self.slot
            .as_mut()
            .map(|object| &mut **object)
            .ok_or_else(|| QueryError::internal("leased connection already released"))
    }

    /// Finish a statement, marking the connection for discard on a connectivity error.
    pub fn observe<T>(&mut self, result: QueryResult<T>) -> QueryResult<T> {
        self.in_flight = false;
        if let Err(e) = &result {
            if e.is_connection_error() {
                self.lease.mark_discard();
            }
        }
        result
    }

    /// The lease this guard belongs to.
    pub fn lease(&self) -> &Lease {
        &self.lease
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        if self.in_flight {
            warn!(connection_id = %self.lease.id, "Statement interrupted");
            self.lease.mark_discard();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Driver;
    use std::time::Duration;

    fn memory_pool(max: usize) -> Pool {
        let config = DatabaseConfig::builder(Driver::Sqlite)
            .database(":memory:")
            .max_connections(max)
            .connect_timeout(Duration::from_millis(200))
            .build();
        Pool::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_warm_up_and_status() {
        let pool = memory_pool(3);
        pool.warm_up(5).await.unwrap();
        let status = pool.status();
        assert_eq!(status.size, 3);
        assert_eq!(status.available, 3);
        assert_eq!(status.max_size, 3);
    }

    #[tokio::test]
    async fn test_wait_timeout_is_pool_timeout() {
        let pool = memory_pool(1);
        let _held = pool.get().await.unwrap();
        let err = pool.get().await.unwrap_err();
        assert_eq!(err.code, tandem_query::ErrorCode::PoolTimeout);
    }

    #[tokio::test]
    async fn test_discarded_lease_frees_slot() {
        let pool = memory_pool(1);
        let lease = pool.lease().await.unwrap();
        lease.mark_discard();
        drop(lease);
        assert_eq!(pool.status().size, 0);

        let lease = pool.lease().await.unwrap();
        drop(lease);
        assert_eq!(pool.status().size, 1);
        assert_eq!(pool.status().available, 1);
    }

    #[tokio::test]
    async fn test_close_revokes_leases() {
        let pool = memory_pool(2);
        let lease = pool.lease().await.unwrap();
        assert!(!lease.is_revoked());
        pool.close();
        assert!(lease.is_revoked());
        let err = pool.get().await.unwrap_err();
        assert_eq!(err.code, tandem_query::ErrorCode::PoolClosed);
    }

    #[tokio::test]
    async fn test_lease_guard_runs_statements() {
        let pool = memory_pool(1);
        let lease = pool.lease().await.unwrap();
        let mut guard = lease.lock().await.unwrap();
        let result = guard.connection().unwrap().batch("SELECT 1").await;
        assert!(guard.observe(result).is_ok());
        assert!(!guard.lease().is_discarded());
    }

    #[tokio::test]
    async fn test_connection_error_discards_lease() {
        let pool = memory_pool(1);
        pool.warm_up(1).await.unwrap();
        let lease = pool.lease().await.unwrap();
        {
            let mut guard = lease.lock().await.unwrap();
            guard.connection().unwrap();
            let result: QueryResult<()> = guard.observe(Err(QueryError::database("syntax error")));
            assert!(result.is_err());
            assert!(!lease.is_discarded());

            guard.connection().unwrap();
            let result: QueryResult<()> =
                guard.observe(Err(QueryError::connection("connection reset by peer")));
            assert!(result.is_err());
        }
        assert!(lease.is_discarded());
        assert_eq!(pool.status().size, 1);

        drop(lease);
        assert_eq!(pool.status().size, 0);
    }

    #[tokio::test]
    async fn test_failed_liveness_check_replaces_connection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool.db");
        let config = DatabaseConfig::builder(Driver::Sqlite)
            .database(path.to_string_lossy())
            .max_connections(1)
            .connect_timeout(Duration::from_secs(2))
            .build();
        let pool = Pool::new(&config).unwrap();

        let conn = pool.get().await.unwrap();
        assert_eq!(Object::metrics(&conn).recycle_count, 0);
        drop(conn);
        let conn = pool.get().await.unwrap();
        assert_eq!(Object::metrics(&conn).recycle_count, 1);
        drop(conn);

        std::fs::remove_file(&path).unwrap();
        let conn = pool.get().await.unwrap();
        assert_eq!(Object::metrics(&conn).recycle_count, 0);
        assert!(Object::metrics(&conn).recycled.is_none());
        assert!(path.exists());
        drop(conn);
        assert_eq!(pool.status().size, 1);
    }

    #[tokio::test]
    async fn test_interrupted_statement_discards() {
        let pool = memory_pool(1);
        let lease = pool.lease().await.unwrap();
        {
            let mut guard = lease.lock().await.unwrap();
            guard.connection().unwrap();
        }
        assert!(lease.is_discarded());
    }
}

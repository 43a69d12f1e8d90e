//! Connection factory for pooled PostgreSQL clients.

use deadpool::managed::{self, Metrics, RecycleError, RecycleResult};
use deadpool_postgres::{ManagerConfig, RecyclingMethod};
use tandem_query::ConnectParams;
use tokio_postgres::NoTls;
use tracing::{debug, trace};

use crate::connection::PgConnection;
use crate::error::{PgError, PgResult};

/// Default PostgreSQL port.
pub const DEFAULT_PORT: u16 = 5432;

/// Creates and recycles [`PgConnection`]s.
///
/// Wraps `deadpool_postgres::Manager` with [`RecyclingMethod::Verified`], so every
/// checkout is preceded by a round-trip that proves the client still works.
pub struct PgManager {
    inner: deadpool_postgres::Manager,
    target: String,
}

impl PgManager {
    /// Create a manager for `params`.
    pub fn new(params: &ConnectParams) -> Self {
        let manager_config = ManagerConfig {
            recycling_method: RecyclingMethod::Verified,
        };
        Self {
            inner: deadpool_postgres::Manager::from_config(to_pg_config(params), NoTls, manager_config),
            target: format!(
                "{}:{}/{}",
                params.host,
                params.port_or(DEFAULT_PORT),
                params.database
            ),
        }
    }

    /// Open a new connection outside any pool.
    pub async fn connect(&self) -> PgResult<PgConnection> {
        debug!(target = %self.target, "Opening PostgreSQL connection");
        let client = managed::Manager::create(&self.inner).await?;
        Ok(PgConnection::new(client))
    }

    /// Host, port and database this manager connects to.
    pub fn target(&self) -> &str {
        &self.target
    }
}

impl std::fmt::Debug for PgManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgManager")
            .field("target", &self.target)
            .finish()
    }
}

impl managed::Manager for PgManager {
    type Type = PgConnection;
    type Error = PgError;

    async fn create(&self) -> Result<PgConnection, PgError> {
        self.connect().await
    }

    async fn recycle(&self, conn: &mut PgConnection, metrics: &Metrics) -> RecycleResult<PgError> {
        trace!(recycle_count = metrics.recycle_count, "Recycling PostgreSQL connection");
        managed::Manager::recycle(&self.inner, conn.client_mut(), metrics)
            .await
            .map_err(|e| match e {
                RecycleError::Backend(e) => RecycleError::Backend(PgError::from(e)),
                other => RecycleError::Message(other.to_string().into()),
            })
    }
}

/// Build a `tokio-postgres` config from vendor-neutral parameters.
pub fn to_pg_config(params: &ConnectParams) -> tokio_postgres::Config {
    let mut config = tokio_postgres::Config::new();
    config
        .host(&params.host)
        .port(params.port_or(DEFAULT_PORT))
        .dbname(&params.database)
        .user(params.user_or("postgres"));
    if let Some(password) = &params.password {
        config.password(password);
    }
    if let Some(timeout) = params.connect_timeout {
        config.connect_timeout(timeout);
    }
    if let Some(name) = &params.application_name {
        config.application_name(name);
    }
    config
}

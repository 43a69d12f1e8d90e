//! Closed dispatch over the driver adapters.
//!
//! [`RawConnection`] wraps one physical connection of any supported driver and
//! [`DriverManager`] creates and recycles them for the pool.

use deadpool::managed::{self, Metrics, RecycleError, RecycleResult};
use tandem_mysql::MysqlConnection;
use tandem_postgres::{PgConnection, PgManager};
use tandem_query::{ConnectParams, ExecOutcome, Query, QueryError, QueryResult, Row, Value};
use tandem_sqlx::{SqlxBackend, SqlxConnection};
use tracing::{debug, trace};

use crate::config::{DatabaseConfig, Driver};

/// One physical database connection.
#[derive(Debug)]
pub enum RawConnection {
    /// PostgreSQL through `tokio-postgres`.
    Postgres(PgConnection),
    /// PostgreSQL or SQLite through `sqlx`.
    Sqlx(SqlxConnection),
    /// MySQL through `mysql_async`.
    Mysql(MysqlConnection),
}

impl RawConnection {
    /// Run a row-returning statement.
    pub async fn fetch(&mut self, query: &Query) -> QueryResult<Vec<Row>> {
        let rows = match self {
            Self::Postgres(conn) => conn.fetch(&query.sql, &query.params).await?,
            Self::Sqlx(conn) => conn.fetch(&query.sql, &query.params).await?,
            Self::Mysql(conn) => conn.fetch(&query.sql, &query.params).await?,
        };
        Ok(rows)
    }

    /// Run a statement and report affected rows.
    pub async fn execute(&mut self, query: &Query) -> QueryResult<ExecOutcome> {
        let outcome = match self {
            Self::Postgres(conn) => conn.execute(&query.sql, &query.params).await?,
            Self::Sqlx(conn) => conn.execute(&query.sql, &query.params).await?,
            Self::Mysql(conn) => conn.execute(&query.sql, &query.params).await?,
        };
        Ok(outcome)
    }

    /// Run an insert and return the generated key.
    ///
    /// Compiled inserts that carry `RETURNING` yield the key as their single column;
    /// otherwise the driver's last-insert-id is used.
    pub async fn insert(&mut self, query: &Query) -> QueryResult<Option<Value>> {
        if query.returns_rows {
            let rows = self.fetch(query).await?;
            Ok(rows
                .into_iter()
                .next()
                .and_then(|row| row.into_values().into_iter().next()))
        } else {
            let outcome = self.execute(query).await?;
            Ok(outcome.last_insert_id.map(Value::Int))
        }
    }

    /// Run a parameterless control statement such as `BEGIN` or `SAVEPOINT`.
    pub async fn batch(&mut self, sql: &str) -> QueryResult<()> {
        match self {
            Self::Postgres(conn) => conn.batch(sql).await?,
            Self::Sqlx(conn) => conn.batch(sql).await?,
            Self::Mysql(conn) => conn.batch(sql).await?,
        }
        Ok(())
    }

    /// Check the connection is alive.
    pub async fn ping(&mut self) -> QueryResult<()> {
        match self {
            Self::Postgres(conn) => conn.ping().await?,
            Self::Sqlx(conn) => conn.ping().await?,
            Self::Mysql(conn) => conn.ping().await?,
        }
        Ok(())
    }

    /// Close the connection.
    pub async fn close(self) -> QueryResult<()> {
        match self {
            Self::Postgres(conn) => conn.close().await?,
            Self::Sqlx(conn) => conn.close().await?,
            Self::Mysql(conn) => conn.close().await?,
        }
        Ok(())
    }

    /// Run `query` with the verb its shape calls for.
    pub(crate) async fn run(&mut self, query: &Query) -> QueryResult<QueryOutcome> {
        if query.returns_rows {
            let rows = self.fetch(query).await?;
            Ok(QueryOutcome {
                rows_affected: rows.len() as u64,
                last_insert_id: None,
                rows,
            })
        } else {
            let outcome = self.execute(query).await?;
            Ok(QueryOutcome {
                rows: Vec::new(),
                rows_affected: outcome.rows_affected,
                last_insert_id: outcome.last_insert_id,
            })
        }
    }
}

/// Result of [`execute`](crate::ConnectionContext::execute).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOutcome {
    /// Fetched rows, empty for statements without a result set.
    pub rows: Vec<Row>,
    /// Rows returned or affected.
    pub rows_affected: u64,
    /// Key generated by the statement, where the driver reports one.
    pub last_insert_id: Option<i64>,
}

/// Creates and recycles [`RawConnection`]s for the configured driver.
#[derive(Debug)]
pub enum DriverManager {
    /// `tokio-postgres` through `deadpool-postgres`'s manager.
    Postgres(PgManager),
    /// `sqlx` PostgreSQL or SQLite.
    Sqlx {
        /// Which `sqlx` backend to open.
        backend: SqlxBackend,
        /// Connect parameters.
        params: ConnectParams,
    },
    /// `mysql_async`.
    Mysql(ConnectParams),
}

impl DriverManager {
    /// Create the manager for `config`.
    pub fn new(config: &DatabaseConfig) -> Self {
        let params = config.to_connect_params();
        match config.driver {
            Driver::Postgres => Self::Postgres(PgManager::new(&params)),
            Driver::PostgresSqlx => Self::Sqlx {
                backend: SqlxBackend::Postgres,
                params,
            },
            Driver::Sqlite => Self::Sqlx {
                backend: SqlxBackend::Sqlite,
                params,
            },
            Driver::Mysql => Self::Mysql(params),
        }
    }

    /// Open a connection outside any pool.
    pub async fn connect(&self) -> QueryResult<RawConnection> {
        let conn = match self {
            Self::Postgres(manager) => RawConnection::Postgres(manager.connect().await?),
            Self::Sqlx {
                backend: SqlxBackend::Postgres,
                params,
            } => RawConnection::Sqlx(SqlxConnection::connect_postgres(params).await?),
            Self::Sqlx {
                backend: SqlxBackend::Sqlite,
                params,
            } => RawConnection::Sqlx(SqlxConnection::connect_sqlite(params).await?),
            Self::Mysql(params) => RawConnection::Mysql(MysqlConnection::connect(params).await?),
        };
        debug!("Connection opened");
        Ok(conn)
    }
}

impl managed::Manager for DriverManager {
    type Type = RawConnection;
    type Error = QueryError;

    async fn create(&self) -> Result<RawConnection, QueryError> {
        self.connect().await
    }

    async fn recycle(
        &self,
        conn: &mut RawConnection,
        metrics: &Metrics,
    ) -> RecycleResult<QueryError> {
        trace!(recycle_count = metrics.recycle_count, "Checking pooled connection");
        match (self, conn) {
            (Self::Postgres(manager), RawConnection::Postgres(conn)) => {
                managed::Manager::recycle(manager, conn, metrics)
                    .await
                    .map_err(|e| match e {
                        RecycleError::Backend(e) => RecycleError::Backend(QueryError::from(e)),
                        other => RecycleError::Message(other.to_string().into()),
                    })
            }
            (_, conn) => conn.ping().await.map_err(RecycleError::Backend),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manager_per_driver() {
        let config = DatabaseConfig::sqlite(":memory:");
        assert!(matches!(
            DriverManager::new(&config),
            DriverManager::Sqlx {
                backend: SqlxBackend::Sqlite,
                ..
            }
        ));

        let config = DatabaseConfig::builder(Driver::Mysql).database("shop").build();
        assert!(matches!(DriverManager::new(&config), DriverManager::Mysql(_)));

        let config = DatabaseConfig::builder(Driver::Postgres).database("app").build();
        assert!(matches!(DriverManager::new(&config), DriverManager::Postgres(_)));
    }

    #[tokio::test]
    async fn test_insert_reports_returning_key() {
        let manager = DriverManager::new(&DatabaseConfig::sqlite(":memory:"));
        let mut conn = manager.connect().await.unwrap();
        conn.batch("CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT)").await.unwrap();

        let returning = Query::rows("INSERT INTO t (v) VALUES (?) RETURNING id", vec!["a".into()]);
        assert_eq!(conn.insert(&returning).await.unwrap(), Some(Value::Int(1)));

        let plain = Query::statement("INSERT INTO t (v) VALUES (?)", vec!["b".into()]);
        assert_eq!(conn.insert(&plain).await.unwrap(), Some(Value::Int(2)));

        let outcome = conn.run(&Query::rows("SELECT v FROM t ORDER BY id", vec![])).await.unwrap();
        assert_eq!(outcome.rows_affected, 2);
        conn.close().await.unwrap();
    }
}

//! MySQL connection wrapper.

use mysql_async::prelude::*;
use mysql_async::{Conn, OptsBuilder};
use tandem_query::{ConnectParams, ExecOutcome, Row, Value};
use tracing::debug;

use crate::error::{MysqlError, MysqlResult};
use crate::types::{decode_rows, to_params};

/// Default MySQL port.
pub const DEFAULT_PORT: u16 = 3306;

/// A wrapper around a MySQL connection.
#[derive(Debug)]
pub struct MysqlConnection {
    conn: Conn,
}

impl MysqlConnection {
    /// Create a new connection wrapper.
    pub fn new(conn: Conn) -> Self {
        Self { conn }
    }

    /// Open a connection.
    pub async fn connect(params: &ConnectParams) -> MysqlResult<Self> {
        let opts = to_opts(params);
        debug!(host = %params.host, database = %params.database, "Opening MySQL connection");
        let conn = match params.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, Conn::new(opts))
                .await
                .map_err(|_| MysqlError::ConnectTimeout(limit.as_millis() as u64))??,
            None => Conn::new(opts).await?,
        };
        Ok(Self::new(conn))
    }

    /// Execute a query with parameters and return all rows.
    pub async fn fetch(&mut self, sql: &str, params: &[Value]) -> MysqlResult<Vec<Row>> {
        debug!(sql = %sql, params = params.len(), "Executing query");
        let rows: Vec<mysql_async::Row> = self.conn.exec(sql, to_params(params)).await?;
        decode_rows(&rows)
    }

    /// Execute a statement, reporting affected rows and the generated key.
    pub async fn execute(&mut self, sql: &str, params: &[Value]) -> MysqlResult<ExecOutcome> {
        debug!(sql = %sql, params = params.len(), "Executing statement");
        self.conn.exec_drop(sql, to_params(params)).await?;
        Ok(ExecOutcome {
            rows_affected: self.conn.affected_rows(),
            last_insert_id: self
                .conn
                .last_insert_id()
                .filter(|id| *id > 0)
                .and_then(|id| i64::try_from(id).ok()),
        })
    }

    /// Execute a parameterless statement over the text protocol.
    pub async fn batch(&mut self, sql: &str) -> MysqlResult<()> {
        debug!(sql = %sql, "Executing batch");
        self.conn.query_drop(sql).await?;
        Ok(())
    }

    /// Verify the connection is usable.
    pub async fn ping(&mut self) -> MysqlResult<()> {
        self.conn.ping().await?;
        Ok(())
    }

    /// Disconnect gracefully.
    pub async fn close(self) -> MysqlResult<()> {
        debug!("Disconnecting");
        self.conn.disconnect().await?;
        Ok(())
    }

    /// Get the underlying connection.
    pub fn inner(&mut self) -> &mut Conn {
        &mut self.conn
    }
}

/// Build `mysql_async` options from vendor-neutral parameters.
pub fn to_opts(params: &ConnectParams) -> OptsBuilder {
    OptsBuilder::default()
        .ip_or_hostname(params.host.clone())
        .tcp_port(params.port_or(DEFAULT_PORT))
        .db_name(Some(params.database.clone()))
        .user(Some(params.user_or("root").to_string()))
        .pass(params.password.clone())
        .stmt_cache_size(Some(64))
}

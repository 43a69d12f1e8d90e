//! PostgreSQL connection wrapper.

use deadpool_postgres::ClientWrapper;
use tandem_query::{ExecOutcome, Row, Value};
use tracing::debug;

use crate::error::PgResult;
use crate::types::{as_refs, decode_rows, encode_params};

/// A pooled `tokio-postgres` client with statement caching.
pub struct PgConnection {
    client: ClientWrapper,
}

impl PgConnection {
    pub(crate) fn new(client: ClientWrapper) -> Self {
        Self { client }
    }

    pub(crate) fn client_mut(&mut self) -> &mut ClientWrapper {
        &mut self.client
    }

    /// Execute a query and return all rows.
    pub async fn fetch(&mut self, sql: &str, params: &[Value]) -> PgResult<Vec<Row>> {
        debug!(sql = %sql, params = params.len(), "Executing query");
        let stmt = self.client.prepare_cached(sql).await?;
        let bound = encode_params(params, stmt.params())?;
        let rows = self.client.query(&stmt, &as_refs(&bound)).await?;
        decode_rows(&rows)
    }

    /// Execute a statement and return the number of affected rows.
    ///
    /// PostgreSQL reports generated keys through `RETURNING`, never here.
    pub async fn execute(&mut self, sql: &str, params: &[Value]) -> PgResult<ExecOutcome> {
        debug!(sql = %sql, params = params.len(), "Executing statement");
        let stmt = self.client.prepare_cached(sql).await?;
        let bound = encode_params(params, stmt.params())?;
        let rows_affected = self.client.execute(&stmt, &as_refs(&bound)).await?;
        Ok(ExecOutcome {
            rows_affected,
            last_insert_id: None,
        })
    }

    /// Execute parameterless statements in a single round-trip.
    pub async fn batch(&mut self, sql: &str) -> PgResult<()> {
        debug!(sql = %sql, "Executing batch");
        self.client.batch_execute(sql).await?;
        Ok(())
    }

    /// Verify the connection is usable.
    pub async fn ping(&mut self) -> PgResult<()> {
        self.client.simple_query("").await?;
        Ok(())
    }

    /// Check whether the server side has gone away.
    pub fn is_closed(&self) -> bool {
        self.client.is_closed()
    }

    /// Close the connection.
    ///
    /// Dropping the client ends the background connection task.
    pub async fn close(self) -> PgResult<()> {
        debug!("Closing connection");
        drop(self.client);
        Ok(())
    }

    /// Get the underlying client.
    ///
    /// This is useful for advanced operations not covered by this wrapper.
    pub fn inner(&self) -> &ClientWrapper {
        &self.client
    }
}

impl std::fmt::Debug for PgConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgConnection")
            .field("closed", &self.client.is_closed())
            .finish()
    }
}

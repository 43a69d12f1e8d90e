//! Single SQLx connections for the PostgreSQL and SQLite backends.

use std::path::PathBuf;
use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::{Connection, Executor};
use tandem_query::{ConnectParams, ExecOutcome, Row, Value};
use tracing::debug;

use crate::error::{SqlxError, SqlxResult};
use crate::types::{bind_postgres, bind_sqlite, decode_postgres, decode_sqlite};

/// Default PostgreSQL port.
pub const DEFAULT_PORT: u16 = 5432;

/// How long a SQLite connection waits on a locked database before failing.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Which database a connection talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlxBackend {
    /// PostgreSQL.
    Postgres,
    /// SQLite.
    Sqlite,
}

/// One open SQLx connection.
#[derive(Debug)]
pub enum SqlxConnection {
    /// PostgreSQL connection.
    Postgres(PgConnection),
    /// SQLite connection.
    Sqlite {
        /// The connection.
        conn: SqliteConnection,
        /// Database file backing the connection, `None` for in-memory databases.
        file: Option<PathBuf>,
    },
}

impl SqlxConnection {
    /// Open a PostgreSQL connection.
    pub async fn connect_postgres(params: &ConnectParams) -> SqlxResult<Self> {
        let mut options = PgConnectOptions::new()
            .host(&params.host)
            .port(params.port_or(DEFAULT_PORT))
            .database(&params.database)
            .username(params.user_or("postgres"));
        if let Some(password) = &params.password {
            options = options.password(password);
        }
        if let Some(name) = &params.application_name {
            options = options.application_name(name);
        }
        debug!(host = %params.host, database = %params.database, "Opening SQLx PostgreSQL connection");
        let conn = with_timeout(params.connect_timeout, PgConnection::connect_with(&options)).await?;
        Ok(Self::Postgres(conn))
    }

    /// Open a SQLite connection, creating the database file if needed.
    ///
    /// `:memory:` opens a private in-memory database per connection.
    pub async fn connect_sqlite(params: &ConnectParams) -> SqlxResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(&params.database)
            .create_if_missing(true)
            .busy_timeout(params.connect_timeout.unwrap_or(DEFAULT_BUSY_TIMEOUT));
        debug!(path = %params.database, "Opening SQLite connection");
        let conn =
            with_timeout(params.connect_timeout, SqliteConnection::connect_with(&options)).await?;
        Ok(Self::Sqlite {
            conn,
            file: database_file(&params.database),
        })
    }

    /// The backend behind this connection.
    pub fn backend(&self) -> SqlxBackend {
        match self {
            Self::Postgres(_) => SqlxBackend::Postgres,
            Self::Sqlite { .. } => SqlxBackend::Sqlite,
        }
    }

    /// Execute a query and return all rows.
    pub async fn fetch(&mut self, sql: &str, params: &[Value]) -> SqlxResult<Vec<Row>> {
        debug!(sql = %sql, params = params.len(), "Executing query");
        match self {
            Self::Postgres(conn) => {
                let rows = bind_postgres(sql, params).fetch_all(&mut *conn).await?;
                decode_postgres(&rows)
            }
            Self::Sqlite { conn, .. } => {
                let rows = bind_sqlite(sql, params).fetch_all(&mut *conn).await?;
                decode_sqlite(&rows)
            }
        }
    }

    /// Execute a statement and return the affected row count.
    ///
    /// SQLite also reports the rowid of the last insert.
    pub async fn execute(&mut self, sql: &str, params: &[Value]) -> SqlxResult<ExecOutcome> {
        debug!(sql = %sql, params = params.len(), "Executing statement");
        match self {
            Self::Postgres(conn) => {
                let result = bind_postgres(sql, params).execute(&mut *conn).await?;
                Ok(ExecOutcome {
                    rows_affected: result.rows_affected(),
                    last_insert_id: None,
                })
            }
            Self::Sqlite { conn, .. } => {
                let result = bind_sqlite(sql, params).execute(&mut *conn).await?;
                Ok(ExecOutcome {
                    rows_affected: result.rows_affected(),
                    last_insert_id: Some(result.last_insert_rowid()),
                })
            }
        }
    }

    /// Execute parameterless statements without preparing them.
    pub async fn batch(&mut self, sql: &str) -> SqlxResult<()> {
        debug!(sql = %sql, "Executing batch");
        match self {
            Self::Postgres(conn) => {
                conn.execute(sql).await?;
            }
            Self::Sqlite { conn, .. } => {
                conn.execute(sql).await?;
            }
        }
        Ok(())
    }

    /// Verify the connection is usable.
    ///
    /// A SQLite connection whose database file was removed keeps working against the
    /// unlinked file, so it is reported as lost.
    pub async fn ping(&mut self) -> SqlxResult<()> {
        match self {
            Self::Postgres(conn) => conn.ping().await?,
            Self::Sqlite { conn, file } => {
                if let Some(path) = file {
                    if !tokio::fs::try_exists(&*path).await.unwrap_or(false) {
                        return Err(SqlxError::DatabaseFileMissing(path.display().to_string()));
                    }
                }
                conn.ping().await?
            }
        }
        Ok(())
    }

    /// Close the connection gracefully.
    pub async fn close(self) -> SqlxResult<()> {
        debug!(backend = ?self.backend(), "Closing connection");
        match self {
            Self::Postgres(conn) => conn.close().await?,
            Self::Sqlite { conn, .. } => conn.close().await?,
        }
        Ok(())
    }
}

fn database_file(database: &str) -> Option<PathBuf> {
    if database.is_empty() || database == ":memory:" || database.starts_with("file:") {
        None
    } else {
        Some(PathBuf::from(database))
    }
}

async fn with_timeout<T, F>(timeout: Option<Duration>, connect: F) -> SqlxResult<T>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, connect)
            .await
            .map_err(|_| SqlxError::ConnectTimeout(limit.as_millis() as u64))?
            .map_err(SqlxError::from),
        None => connect.await.map_err(SqlxError::from),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory() -> SqlxConnection {
        SqlxConnection::connect_sqlite(&ConnectParams::new("", ":memory:"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_sqlite_execute_and_fetch() {
        let mut conn = memory().await;
        assert_eq!(conn.backend(), SqlxBackend::Sqlite);

        conn.batch("CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT, score REAL, blob BLOB)")
            .await
            .unwrap();
        let outcome = conn
            .execute(
                "INSERT INTO notes (body, score, blob) VALUES (?, ?, ?)",
                &[Value::from("hello"), Value::Float(1.5), Value::Null],
            )
            .await
            .unwrap();
        assert_eq!(outcome.rows_affected, 1);
        assert_eq!(outcome.last_insert_id, Some(1));

        let rows = conn
            .fetch("SELECT id, body, score, blob FROM notes WHERE id = ?", &[Value::Int(1)])
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("id"), Some(&Value::Int(1)));
        assert_eq!(rows[0].get("body"), Some(&Value::from("hello")));
        assert_eq!(rows[0].get("score"), Some(&Value::Float(1.5)));
        assert_eq!(rows[0].get("blob"), Some(&Value::Null));

        conn.ping().await.unwrap();
        conn.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_sqlite_ping_detects_removed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.db");
        let params = ConnectParams::new("", path.to_string_lossy());
        let mut conn = SqlxConnection::connect_sqlite(&params).await.unwrap();
        conn.batch("CREATE TABLE t (v INTEGER)").await.unwrap();
        conn.ping().await.unwrap();

        std::fs::remove_file(&path).unwrap();
        let err = conn.ping().await.unwrap_err();
        assert!(err.is_connection_error());
        assert!(memory().await.ping().await.is_ok());
    }

    #[tokio::test]
    async fn test_sqlite_unique_violation() {
        let mut conn = memory().await;
        conn.batch("CREATE TABLE tags (name TEXT UNIQUE)").await.unwrap();
        conn.execute("INSERT INTO tags (name) VALUES (?)", &[Value::from("a")])
            .await
            .unwrap();
        let err = conn
            .execute("INSERT INTO tags (name) VALUES (?)", &[Value::from("a")])
            .await
            .unwrap_err();
        let err: tandem_query::QueryError = err.into();
        assert_eq!(err.code, tandem_query::ErrorCode::UniqueConstraint);
    }
}

//! # tandem-sqlx
//!
//! SQLx adapter for Tandem.
//!
//! Provides a second PostgreSQL driver next to `tandem-postgres`, plus SQLite for
//! embedded use and for exercising the coordination layer without a server.
//!
//! ## Example
//!
//! ```rust,no_run
//! use tandem_query::{ConnectParams, Value};
//! use tandem_sqlx::SqlxConnection;
//!
//! # async fn example() -> Result<(), tandem_sqlx::SqlxError> {
//! let mut conn = SqlxConnection::connect_sqlite(&ConnectParams::new("", "app.db")).await?;
//! conn.batch("CREATE TABLE IF NOT EXISTS kv (k TEXT PRIMARY KEY, v TEXT)").await?;
//! conn.execute("INSERT INTO kv (k, v) VALUES (?, ?)", &[Value::from("a"), Value::from("1")])
//!     .await?;
//! let rows = conn.fetch("SELECT v FROM kv WHERE k = ?", &[Value::from("a")]).await?;
//! assert_eq!(rows.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod error;
pub mod types;

pub use connection::{SqlxBackend, SqlxConnection};
pub use error::{SqlxError, SqlxResult};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::connection::{SqlxBackend, SqlxConnection};
    pub use crate::error::{SqlxError, SqlxResult};
}

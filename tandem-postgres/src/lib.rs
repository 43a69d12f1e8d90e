//! # tandem-postgres
//!
//! PostgreSQL adapter for Tandem built on `tokio-postgres`.
//!
//! This crate provides:
//! - [`PgManager`]: a `deadpool` manager with verified recycling
//! - [`PgConnection`]: fetch / execute / batch over [`Value`](tandem_query::Value) parameters
//!   with prepared statement caching
//! - SQLSTATE classification into the shared [`ErrorCode`](tandem_query::ErrorCode)s
//!
//! ## Example
//!
//! ```rust,ignore
//! use tandem_postgres::PgManager;
//! use tandem_query::{ConnectParams, Value};
//!
//! let manager = PgManager::new(&ConnectParams::new("localhost", "app"));
//! let mut conn = manager.connect().await?;
//! let rows = conn.fetch("SELECT id FROM users WHERE email = $1", &[Value::from("a@b.c")]).await?;
//! ```

pub mod connection;
pub mod error;
pub mod manager;
pub mod types;

pub use connection::PgConnection;
pub use error::{PgError, PgResult};
pub use manager::PgManager;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::connection::PgConnection;
    pub use crate::error::{PgError, PgResult};
    pub use crate::manager::PgManager;
}

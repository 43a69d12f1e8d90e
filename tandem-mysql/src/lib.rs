//! # tandem-mysql
//!
//! MySQL adapter for Tandem built on `mysql_async`.
//!
//! MySQL has no `RETURNING`, so [`MysqlConnection::execute`] reports the generated key of
//! an insert through [`ExecOutcome::last_insert_id`](tandem_query::ExecOutcome).
//!
//! ## Example
//!
//! ```rust,ignore
//! use tandem_mysql::MysqlConnection;
//! use tandem_query::{ConnectParams, Value};
//!
//! let mut conn = MysqlConnection::connect(&ConnectParams::new("localhost", "shop")).await?;
//! let outcome = conn
//!     .execute("INSERT INTO carts (owner) VALUES (?)", &[Value::from("ada")])
//!     .await?;
//! println!("new cart {:?}", outcome.last_insert_id);
//! ```

pub mod connection;
pub mod error;
pub mod types;

pub use connection::MysqlConnection;
pub use error::{MysqlError, MysqlResult};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::connection::MysqlConnection;
    pub use crate::error::{MysqlError, MysqlResult};
}

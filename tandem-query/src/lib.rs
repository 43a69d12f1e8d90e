//! # tandem-query
//!
//! Shared vocabulary of the Tandem workspace: the pieces every driver adapter and the
//! coordination layer agree on.
//!
//! - [`Value`] and [`Row`]: driver-neutral parameters and fetched rows
//! - [`Model`] and [`impl_model!`]: table metadata and row materialization
//! - [`Select`], [`Insert`], [`InsertMany`], [`Update`], [`Delete`]: descriptors compiled
//!   into a [`Query`] for a [`Dialect`]
//! - [`TransactionStack`]: the BEGIN / SAVEPOINT state machine
//! - [`QueryError`] and [`ErrorCode`]: the error taxonomy
//! - [`logging`]: environment-driven `tracing` bootstrap
//!
//! ## Example
//!
//! ```rust
//! use tandem_query::{col, impl_model, Dialect, Select, Update};
//!
//! #[derive(Debug, Clone)]
//! struct Account {
//!     id: Option<i64>,
//!     email: String,
//!     active: bool,
//! }
//!
//! impl_model!(Account {
//!     table: "accounts",
//!     primary_key: id,
//!     strategy: ServerGenerated,
//!     fields: [email, active],
//! });
//!
//! let select = Select::<Account>::new().filter(col("active").eq(true));
//! let query = select.compile(Dialect::Mysql);
//! assert_eq!(query.sql, "SELECT `id`, `email`, `active` FROM `accounts` WHERE `active` = ?");
//!
//! let update = Update::<Account>::new()
//!     .set("active", false)
//!     .filter(col("email").like("%@old.example"))
//!     .compile(Dialect::Postgres)
//!     .unwrap();
//! assert_eq!(update.params.len(), 2);
//! ```

pub mod config;
pub mod dialect;
pub mod error;
pub mod logging;
pub mod model;
pub mod query;
pub mod row;
pub mod transaction;
pub mod value;

pub use config::ConnectParams;
pub use dialect::Dialect;
pub use error::{ErrorCode, ErrorContext, QueryError, QueryResult};
pub use model::{Model, PrimaryKeyStrategy};
pub use query::{
    Column, Condition, Delete, Insert, InsertMany, Op, Order, Query, Select, SqlWriter, Update, col,
};
pub use row::Row;
pub use transaction::{
    AccessMode, IsolationLevel, TransactionConfig, TransactionRecord, TransactionStack,
};
pub use value::{FromValue, Value};

/// Outcome of a statement that does not return rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecOutcome {
    /// Rows inserted, updated or deleted.
    pub rows_affected: u64,
    /// Key generated by the last insert, where the driver reports one.
    pub last_insert_id: Option<i64>,
}

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::dialect::Dialect;
    pub use crate::error::{ErrorCode, QueryError, QueryResult};
    pub use crate::impl_model;
    pub use crate::model::{Model, PrimaryKeyStrategy};
    pub use crate::query::{Delete, Insert, InsertMany, Order, Query, Select, Update, col};
    pub use crate::row::Row;
    pub use crate::transaction::{IsolationLevel, TransactionConfig};
    pub use crate::value::{FromValue, Value};
    pub use crate::ExecOutcome;
}

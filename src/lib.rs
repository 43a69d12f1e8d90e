//! # Tandem
//!
//! Async connection and transaction coordination for SQL databases.
//!
//! Tandem provides:
//! - A bounded connection pool with FIFO waiters and cancellation-safe checkout
//! - Connection contexts: one logical unit of work, one physical connection, reentrant
//! - Nested transactions mapped to savepoints, with rollback on every exit path
//! - Async query verbs (`create`, `get`, `update`, `get_or_create`, ...) over simple models
//! - PostgreSQL (`tokio-postgres` or `sqlx`), MySQL (`mysql_async`) and SQLite (`sqlx`)
//! - A gate for blocking calls made outside the async runtime
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tandem::prelude::*;
//!
//! #[derive(Debug, Clone, PartialEq)]
//! struct User {
//!     id: Option<i64>,
//!     email: String,
//! }
//!
//! impl_model!(User {
//!     table: "users",
//!     primary_key: id,
//!     strategy: ServerGenerated,
//!     fields: [email],
//! });
//!
//! #[tokio::main]
//! async fn main() -> Result<(), QueryError> {
//!     tandem::logging::init();
//!     let db = Database::from_url("postgres://app@localhost/app")?;
//!     db.connect().await?;
//!
//!     let user = db
//!         .atomic_with(|ctx: ConnectionContext| async move {
//!             let user = ctx.create(User { id: None, email: "ada@example.com".into() }).await?;
//!             ctx.atomic_with(|ctx: ConnectionContext| async move {
//!                 ctx.update_where(&Update::<User>::new().set("email", "ada@example.org")).await
//!             })
//!             .await?;
//!             Ok::<_, QueryError>(user)
//!         })
//!         .await?;
//!
//!     let fetched: User = db.get_by_id(user.id).await?;
//!     println!("{:?}", fetched);
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod config;
pub mod context;
pub mod database;
pub mod dispatch;
pub mod driver;
pub mod pool;
pub mod sync;
pub mod testing;
pub mod transaction;

pub use config::{DatabaseConfig, DatabaseConfigBuilder, Driver};
pub use context::{ConnectionContext, ConnectionScope};
pub use database::Database;
pub use driver::{DriverManager, QueryOutcome, RawConnection};
pub use pool::{Lease, LeaseGuard, Pool, PoolStatus, PooledConnection};
pub use sync::{AllowSyncGuard, SyncMode};
pub use transaction::{Atomic, ManualTransaction};

pub use tandem_query::{
    AccessMode, Delete, Dialect, ErrorCode, ExecOutcome, Insert, InsertMany, IsolationLevel,
    Model, Order, PrimaryKeyStrategy, Query, QueryError, QueryResult, Row, Select,
    TransactionConfig, Update, Value, col, impl_model, logging,
};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::{
        Atomic, ConnectionContext, Database, DatabaseConfig, Driver, SyncMode, col, impl_model,
    };
    pub use tandem_query::{
        Delete, Model, Order, Query, QueryError, QueryResult, Select, TransactionConfig, Update,
        Value,
    };
}

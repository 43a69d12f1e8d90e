//! Error taxonomy shared by every Tandem crate.
//!
//! Every failure surfaced by the coordination layer is a [`QueryError`] carrying an
//! [`ErrorCode`]. Codes are grouped so callers can branch on the category instead of the
//! vendor message:
//!
//! - 1xxx: lookup errors (no matching row)
//! - 2xxx: integrity violations reported by the server
//! - 3xxx: connectivity (connect, broken socket, pool wait timeout)
//! - 4xxx: misuse of the API (nested non-nesting transaction, closed pool, ...)
//! - 5xxx: statement execution
//! - 6xxx: value conversion
//! - 7xxx: configuration
//!
//! ```rust
//! use tandem_query::{ErrorCode, QueryError};
//!
//! let err = QueryError::not_found("users");
//! assert_eq!(err.code, ErrorCode::RecordNotFound);
//! assert!(err.is_not_found());
//! assert!(err.to_string().contains("users"));
//!
//! let err = QueryError::no_active_transaction();
//! assert!(err.is_misuse());
//! ```

use std::fmt;
use thiserror::Error;

/// Result type for query operations.
pub type QueryResult<T> = Result<T, QueryError>;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Lookup errors (1xxx)
    /// No row matched where exactly one was required (T1001).
    RecordNotFound = 1001,

    // Integrity errors (2xxx)
    /// Unique constraint violation (T2001).
    UniqueConstraint = 2001,
    /// Foreign key constraint violation (T2002).
    ForeignKeyConstraint = 2002,
    /// Check constraint violation (T2003).
    CheckConstraint = 2003,
    /// Not null constraint violation (T2004).
    NotNullConstraint = 2004,

    // Connectivity errors (3xxx)
    /// Connecting or talking to the server failed (T3001).
    ConnectionFailed = 3001,
    /// Waiting for a pooled connection timed out (T3002).
    PoolTimeout = 3002,
    /// Establishing a connection timed out (T3003).
    ConnectionTimeout = 3003,
    /// Authentication failed (T3004).
    AuthenticationFailed = 3004,

    // Misuse errors (4xxx)
    /// A non-nesting transaction was opened inside another transaction (T4001).
    NestedTransaction = 4001,
    /// Commit or rollback without an open transaction (T4002).
    NoActiveTransaction = 4002,
    /// Transaction scopes were closed out of order (T4003).
    TransactionOrder = 4003,
    /// A blocking call was made while synchronous access is forbidden (T4004).
    SyncNotAllowed = 4004,
    /// A blocking call was made from inside the async runtime (T4005).
    BlockingInAsync = 4005,
    /// The pool was closed (T4006).
    PoolClosed = 4006,
    /// Transaction scopes are disabled on this context (T4007).
    TransactionsDisabled = 4007,

    // Execution errors (5xxx)
    /// General database error (T5001).
    DatabaseError = 5001,
    /// Deadlock or serialization failure (T5002).
    SerializationFailure = 5002,

    // Data errors (6xxx)
    /// Value has the wrong type for the column (T6001).
    InvalidDataType = 6001,
    /// A row could not be materialized (T6002).
    DeserializationError = 6002,

    // Configuration errors (7xxx)
    /// Invalid configuration (T7001).
    InvalidConfiguration = 7001,
    /// Invalid connection URL (T7002).
    InvalidConnectionString = 7002,

    /// Internal error (T9001).
    Internal = 9001,
}

impl ErrorCode {
    /// Get the error code string (e.g., "T1001").
    pub fn code(&self) -> String {
        format!("T{}", *self as u16)
    }

    /// Get a short description of the error code.
    pub fn description(&self) -> &'static str {
        match self {
            Self::RecordNotFound => "Record not found",
            Self::UniqueConstraint => "Unique constraint violation",
            Self::ForeignKeyConstraint => "Foreign key constraint violation",
            Self::CheckConstraint => "Check constraint violation",
            Self::NotNullConstraint => "Not null constraint violation",
            Self::ConnectionFailed => "Database connection failed",
            Self::PoolTimeout => "Timed out waiting for a pooled connection",
            Self::ConnectionTimeout => "Connection timeout",
            Self::AuthenticationFailed => "Authentication failed",
            Self::NestedTransaction => "Transaction already open",
            Self::NoActiveTransaction => "No active transaction",
            Self::TransactionOrder => "Transaction scopes closed out of order",
            Self::SyncNotAllowed => "Synchronous query not allowed",
            Self::BlockingInAsync => "Blocking call inside async runtime",
            Self::PoolClosed => "Connection pool closed",
            Self::TransactionsDisabled => "Transactions disabled",
            Self::DatabaseError => "Database error",
            Self::SerializationFailure => "Serialization failure",
            Self::InvalidDataType => "Invalid data type",
            Self::DeserializationError => "Deserialization error",
            Self::InvalidConfiguration => "Invalid configuration",
            Self::InvalidConnectionString => "Invalid connection string",
            Self::Internal => "Internal error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Additional context for an error.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// The operation that was being performed.
    pub operation: Option<String>,
    /// The table involved.
    pub model: Option<String>,
    /// The SQL statement (if available).
    pub sql: Option<String>,
    /// Help text.
    pub help: Option<String>,
}

/// Errors that can occur during query operations.
#[derive(Error, Debug)]
pub struct QueryError {
    /// The error code.
    pub code: ErrorCode,
    /// The error message.
    pub message: String,
    /// Additional context.
    pub context: ErrorContext,
    /// The source error (if any).
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.code(), self.message)
    }
}

impl QueryError {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: ErrorContext::default(),
            source: None,
        }
    }

    /// Add context about the operation.
    pub fn with_context(mut self, operation: impl Into<String>) -> Self {
        self.context.operation = Some(operation.into());
        self
    }

    /// Add help text.
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.context.help = Some(help.into());
        self
    }

    /// Set the table.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.context.model = Some(model.into());
        self
    }

    /// Set the SQL statement.
    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.context.sql = Some(sql.into());
        self
    }

    /// Set the source error.
    pub fn with_source<E: std::error::Error + Send + Sync + 'static>(mut self, source: E) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    // ============== Constructor Functions ==============

    /// Create a not found error.
    pub fn not_found(model: impl Into<String>) -> Self {
        let model = model.into();
        Self::new(
            ErrorCode::RecordNotFound,
            format!("No {} record found matching the query", model),
        )
        .with_model(model)
        .with_help("Use get_or_none() to receive None instead of an error")
    }

    /// Create an integrity error with the given constraint code.
    pub fn integrity(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(code, message)
    }

    /// Create a unique constraint violation error.
    pub fn unique_violation(message: impl Into<String>) -> Self {
        Self::integrity(ErrorCode::UniqueConstraint, message)
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConnectionFailed, message)
    }

    /// Create a connection timeout error.
    pub fn connection_timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConnectionTimeout, message)
    }

    /// Create a pool wait timeout error.
    pub fn pool_timeout(max_connections: usize) -> Self {
        Self::new(
            ErrorCode::PoolTimeout,
            format!(
                "Timed out waiting for one of {} pooled connections",
                max_connections
            ),
        )
        .with_help("Raise max_connections or connect_timeout, or release connections sooner")
    }

    /// Create a closed pool error.
    pub fn pool_closed() -> Self {
        Self::new(ErrorCode::PoolClosed, "The connection pool is closed")
            .with_help("Call Database::connect() to open a new pool")
    }

    /// Create a nested transaction error.
    pub fn nested_transaction() -> Self {
        Self::new(
            ErrorCode::NestedTransaction,
            "A transaction is already open on this connection context",
        )
        .with_help("Use atomic() for scopes that may nest")
    }

    /// Create a "no active transaction" error.
    pub fn no_active_transaction() -> Self {
        Self::new(
            ErrorCode::NoActiveTransaction,
            "There is no active transaction to commit or roll back",
        )
    }

    /// Create a transaction ordering error.
    pub fn transaction_order(expected_depth: usize, actual_depth: usize) -> Self {
        Self::new(
            ErrorCode::TransactionOrder,
            format!(
                "Transaction scope at depth {} closed while depth {} is still open",
                expected_depth, actual_depth
            ),
        )
    }

    /// Create a disabled-transactions error.
    pub fn transactions_disabled() -> Self {
        Self::new(
            ErrorCode::TransactionsDisabled,
            "Transaction scopes are disabled on this connection context",
        )
    }

    /// Create a sync-not-allowed error.
    pub fn sync_not_allowed() -> Self {
        Self::new(
            ErrorCode::SyncNotAllowed,
            "Synchronous queries are forbidden on this database",
        )
        .with_help("Use the async API, or wrap the call in Database::allow_sync()")
    }

    /// Create a blocking-inside-runtime error.
    pub fn blocking_in_async() -> Self {
        Self::new(
            ErrorCode::BlockingInAsync,
            "Synchronous queries cannot run inside an async runtime",
        )
    }

    /// Create a database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    /// Create an invalid data type error.
    pub fn invalid_type(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidDataType, message)
    }

    /// Create a deserialization error.
    pub fn deserialization(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DeserializationError, message)
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidConfiguration, message)
    }

    /// Create an invalid connection string error.
    pub fn invalid_url(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidConnectionString, message)
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }

    // ============== Error Checks ==============

    /// Check if this is a not found error.
    pub fn is_not_found(&self) -> bool {
        self.code == ErrorCode::RecordNotFound
    }

    /// Check if this is a constraint violation reported by the server.
    pub fn is_integrity_error(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::UniqueConstraint
                | ErrorCode::ForeignKeyConstraint
                | ErrorCode::CheckConstraint
                | ErrorCode::NotNullConstraint
        )
    }

    /// Check if this is a connection error.
    ///
    /// A connection that produced one of these is not returned to the pool.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::ConnectionFailed
                | ErrorCode::PoolTimeout
                | ErrorCode::ConnectionTimeout
                | ErrorCode::AuthenticationFailed
        )
    }

    /// Check if this is a timeout error.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::PoolTimeout | ErrorCode::ConnectionTimeout
        )
    }

    /// Check if this error reports a programming mistake rather than a transient condition.
    pub fn is_misuse(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::NestedTransaction
                | ErrorCode::NoActiveTransaction
                | ErrorCode::TransactionOrder
                | ErrorCode::SyncNotAllowed
                | ErrorCode::BlockingInAsync
                | ErrorCode::PoolClosed
                | ErrorCode::TransactionsDisabled
        )
    }

    // ============== Display Functions ==============

    /// Display the full error with all context.
    pub fn display_full(&self) -> String {
        let mut output = format!("Error [{}]: {}\n", self.code.code(), self.message);

        if let Some(ref op) = self.context.operation {
            output.push_str(&format!("  -> While: {}\n", op));
        }
        if let Some(ref model) = self.context.model {
            output.push_str(&format!("  -> Model: {}\n", model));
        }
        if let Some(ref sql) = self.context.sql {
            let sql_display = if sql.len() > 200 {
                let mut end = 200;
                while !sql.is_char_boundary(end) {
                    end -= 1;
                }
                format!("{}...", &sql[..end])
            } else {
                sql.clone()
            };
            output.push_str(&format!("  -> SQL: {}\n", sql_display));
        }
        if let Some(ref help) = self.context.help {
            output.push_str(&format!("\nHelp: {}\n", help));
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_format() {
        assert_eq!(ErrorCode::RecordNotFound.code(), "T1001");
        assert_eq!(ErrorCode::NoActiveTransaction.code(), "T4002");
        assert_eq!(ErrorCode::PoolClosed.to_string(), "T4006");
    }

    #[test]
    fn test_not_found() {
        let err = QueryError::not_found("users");
        assert!(err.is_not_found());
        assert!(!err.is_misuse());
        assert_eq!(err.context.model.as_deref(), Some("users"));
        assert!(err.to_string().starts_with("[T1001]"));
    }

    #[test]
    fn test_categories() {
        assert!(QueryError::unique_violation("dup").is_integrity_error());
        assert!(QueryError::connection("reset").is_connection_error());
        assert!(QueryError::pool_timeout(4).is_timeout());
        assert!(QueryError::pool_closed().is_misuse());
        assert!(QueryError::nested_transaction().is_misuse());
        assert!(QueryError::sync_not_allowed().is_misuse());
        assert!(!QueryError::database("syntax").is_misuse());
    }

    #[test]
    fn test_display_full() {
        let err = QueryError::database("boom")
            .with_context("update")
            .with_sql("UPDATE t SET a = 1");
        let full = err.display_full();
        assert!(full.contains("While: update"));
        assert!(full.contains("UPDATE t SET a = 1"));
    }

    #[test]
    fn test_display_full_truncates_long_sql() {
        let sql = "é".repeat(300);
        let full = QueryError::database("boom").with_sql(sql).display_full();
        assert!(full.contains("..."));
    }
}

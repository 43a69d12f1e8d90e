//! Error types for SQLx operations.

use sqlx::error::ErrorKind;
use tandem_query::{ErrorCode, QueryError};
use thiserror::Error;

/// Result type alias for SQLx operations.
pub type SqlxResult<T> = Result<T, SqlxError>;

/// Errors that can occur during SQLx operations.
#[derive(Error, Debug)]
pub enum SqlxError {
    /// SQLx database error
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Connection did not open within the configured timeout
    #[error("Connection timed out after {0}ms")]
    ConnectTimeout(u64),

    /// Row deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// The SQLite database file disappeared under an open connection
    #[error("Database file {0} no longer exists")]
    DatabaseFileMissing(String),
}

impl SqlxError {
    /// Create a deserialization error.
    pub fn deserialization(msg: impl Into<String>) -> Self {
        Self::Deserialization(msg.into())
    }

    /// Check if the connection that produced this error should be discarded.
    pub fn is_connection_error(&self) -> bool {
        match self {
            Self::Sqlx(e) => is_transport(e),
            Self::ConnectTimeout(_) | Self::DatabaseFileMissing(_) => true,
            Self::Deserialization(_) => false,
        }
    }
}

fn is_transport(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
    )
}

fn classify(err: &sqlx::Error) -> ErrorCode {
    match err {
        sqlx::Error::Database(db) => match db.kind() {
            ErrorKind::UniqueViolation => ErrorCode::UniqueConstraint,
            ErrorKind::ForeignKeyViolation => ErrorCode::ForeignKeyConstraint,
            ErrorKind::NotNullViolation => ErrorCode::NotNullConstraint,
            ErrorKind::CheckViolation => ErrorCode::CheckConstraint,
            _ => match db.code().as_deref() {
                Some("40001") | Some("40P01") => ErrorCode::SerializationFailure,
                Some(code) if code.starts_with("08") => ErrorCode::ConnectionFailed,
                _ => ErrorCode::DatabaseError,
            },
        },
        e if is_transport(e) => ErrorCode::ConnectionFailed,
        sqlx::Error::Configuration(_) => ErrorCode::InvalidConfiguration,
        sqlx::Error::Encode(_) => ErrorCode::InvalidDataType,
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            ErrorCode::DeserializationError
        }
        _ => ErrorCode::DatabaseError,
    }
}

impl From<SqlxError> for QueryError {
    fn from(err: SqlxError) -> Self {
        let (code, message) = match &err {
            SqlxError::Sqlx(e) => {
                let message = match e.as_database_error() {
                    Some(db) => db.message().to_string(),
                    None => e.to_string(),
                };
                (classify(e), message)
            }
            SqlxError::ConnectTimeout(_) => (ErrorCode::ConnectionTimeout, err.to_string()),
            SqlxError::Deserialization(msg) => (ErrorCode::DeserializationError, msg.clone()),
            SqlxError::DatabaseFileMissing(_) => (ErrorCode::ConnectionFailed, err.to_string()),
        };
        QueryError::new(code, message).with_source(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_to_query_error() {
        let err: QueryError = SqlxError::Sqlx(sqlx::Error::PoolTimedOut).into();
        assert_eq!(err.code, ErrorCode::ConnectionFailed);
        assert!(err.is_connection_error());

        let err: QueryError = SqlxError::ConnectTimeout(250).into();
        assert_eq!(err.code, ErrorCode::ConnectionTimeout);
        assert!(err.is_timeout());

        let err: QueryError = SqlxError::deserialization("bad column").into();
        assert_eq!(err.code, ErrorCode::DeserializationError);
        assert!(!err.is_connection_error());
    }

    #[test]
    fn test_transport_errors_discard_connection() {
        assert!(SqlxError::Sqlx(sqlx::Error::WorkerCrashed).is_connection_error());
        assert!(!SqlxError::Sqlx(sqlx::Error::RowNotFound).is_connection_error());
    }
}

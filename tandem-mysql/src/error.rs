//! Error types for MySQL operations.

use mysql_async::DriverError;
use tandem_query::{ErrorCode, QueryError};
use thiserror::Error;

/// Result type for MySQL operations.
pub type MysqlResult<T> = Result<T, MysqlError>;

/// Error type for MySQL operations.
#[derive(Error, Debug)]
pub enum MysqlError {
    /// MySQL driver error.
    #[error("MySQL error: {0}")]
    Mysql(#[from] mysql_async::Error),
    /// Connection did not open within the configured timeout.
    #[error("Connection timed out after {0}ms")]
    ConnectTimeout(u64),
    /// Deserialization error.
    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

impl MysqlError {
    /// Create a deserialization error.
    pub fn deserialization(msg: impl Into<String>) -> Self {
        Self::Deserialization(msg.into())
    }

    /// Server error number, if the server reported one.
    pub fn server_code(&self) -> Option<u16> {
        match self {
            Self::Mysql(mysql_async::Error::Server(e)) => Some(e.code),
            _ => None,
        }
    }

    /// Check if the connection that produced this error should be discarded.
    pub fn is_connection_error(&self) -> bool {
        match self {
            Self::Mysql(mysql_async::Error::Io(_)) => true,
            Self::Mysql(mysql_async::Error::Driver(DriverError::ConnectionClosed)) => true,
            Self::Mysql(mysql_async::Error::Server(e)) => {
                classify_server_code(e.code) == ErrorCode::ConnectionFailed
            }
            Self::ConnectTimeout(_) => true,
            _ => false,
        }
    }
}

/// Map a MySQL error number to the shared error code.
pub fn classify_server_code(code: u16) -> ErrorCode {
    match code {
        1062 | 1586 => ErrorCode::UniqueConstraint,
        1451 | 1452 | 1216 | 1217 => ErrorCode::ForeignKeyConstraint,
        1048 | 1364 => ErrorCode::NotNullConstraint,
        3819 => ErrorCode::CheckConstraint,
        1213 | 1205 => ErrorCode::SerializationFailure,
        1045 | 1044 => ErrorCode::AuthenticationFailed,
        2002 | 2003 | 2006 | 2013 | 1053 => ErrorCode::ConnectionFailed,
        _ => ErrorCode::DatabaseError,
    }
}

impl From<MysqlError> for QueryError {
    fn from(err: MysqlError) -> Self {
        let code = if err.is_connection_error() {
            match &err {
                MysqlError::ConnectTimeout(_) => ErrorCode::ConnectionTimeout,
                _ => ErrorCode::ConnectionFailed,
            }
        } else {
            match &err {
                MysqlError::Mysql(mysql_async::Error::Server(e)) => classify_server_code(e.code),
                MysqlError::Mysql(mysql_async::Error::Url(_)) => ErrorCode::InvalidConnectionString,
                MysqlError::Deserialization(_) => ErrorCode::DeserializationError,
                _ => ErrorCode::DatabaseError,
            }
        };
        let message = match &err {
            MysqlError::Mysql(mysql_async::Error::Server(e)) => e.message.clone(),
            other => other.to_string(),
        };
        QueryError::new(code, message).with_source(err)
    }
}

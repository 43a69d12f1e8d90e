//! Error types for PostgreSQL operations.

use tandem_query::{ErrorCode, QueryError};
use thiserror::Error;

/// Result type for PostgreSQL operations.
pub type PgResult<T> = Result<T, PgError>;

/// Errors that can occur during PostgreSQL operations.
#[derive(Error, Debug)]
pub enum PgError {
    /// PostgreSQL error.
    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// Parameter could not be converted to the type the server expects.
    #[error("type conversion error: {0}")]
    TypeConversion(String),

    /// Column value could not be decoded.
    #[error("deserialization error: {0}")]
    Deserialization(String),
}

impl PgError {
    /// Create a type conversion error.
    pub fn type_conversion(message: impl Into<String>) -> Self {
        Self::TypeConversion(message.into())
    }

    /// Create a deserialization error.
    pub fn deserialization(message: impl Into<String>) -> Self {
        Self::Deserialization(message.into())
    }

    /// SQLSTATE reported by the server, if any.
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Self::Postgres(e) => e.code().map(|state| state.code()),
            _ => None,
        }
    }

    /// Check if this is a connection error.
    ///
    /// Errors without a server SQLSTATE come from the socket or protocol layer.
    pub fn is_connection_error(&self) -> bool {
        match self {
            Self::Postgres(e) => match e.code() {
                Some(state) => state.code().starts_with("08"),
                None => e.as_db_error().is_none(),
            },
            _ => false,
        }
    }
}

/// Map a SQLSTATE to the shared error code.
pub fn classify_sqlstate(state: &str) -> ErrorCode {
    match state {
        "23505" => ErrorCode::UniqueConstraint,
        "23503" => ErrorCode::ForeignKeyConstraint,
        "23502" => ErrorCode::NotNullConstraint,
        "23514" => ErrorCode::CheckConstraint,
        "40001" | "40P01" => ErrorCode::SerializationFailure,
        "28000" | "28P01" => ErrorCode::AuthenticationFailed,
        s if s.starts_with("08") => ErrorCode::ConnectionFailed,
        _ => ErrorCode::DatabaseError,
    }
}

impl From<PgError> for QueryError {
    fn from(err: PgError) -> Self {
        let code = match &err {
            PgError::Postgres(_) if err.is_connection_error() => ErrorCode::ConnectionFailed,
            PgError::Postgres(_) => err
                .sqlstate()
                .map(classify_sqlstate)
                .unwrap_or(ErrorCode::DatabaseError),
            PgError::TypeConversion(_) => ErrorCode::InvalidDataType,
            PgError::Deserialization(_) => ErrorCode::DeserializationError,
        };
        let message = match &err {
            PgError::Postgres(e) => match e.as_db_error() {
                Some(db) => db.message().to_string(),
                None => e.to_string(),
            },
            other => other.to_string(),
        };
        QueryError::new(code, message).with_source(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_sqlstate() {
        assert_eq!(classify_sqlstate("23505"), ErrorCode::UniqueConstraint);
        assert_eq!(classify_sqlstate("23503"), ErrorCode::ForeignKeyConstraint);
        assert_eq!(classify_sqlstate("23502"), ErrorCode::NotNullConstraint);
        assert_eq!(classify_sqlstate("23514"), ErrorCode::CheckConstraint);
        assert_eq!(classify_sqlstate("40P01"), ErrorCode::SerializationFailure);
        assert_eq!(classify_sqlstate("08006"), ErrorCode::ConnectionFailed);
        assert_eq!(classify_sqlstate("42P01"), ErrorCode::DatabaseError);
    }

    #[test]
    fn test_conversion_error_mapping() {
        let err: QueryError = PgError::type_conversion("value out of range for INT2").into();
        assert_eq!(err.code, ErrorCode::InvalidDataType);
        assert!(!err.is_connection_error());

        let err: QueryError = PgError::deserialization("unsupported column type").into();
        assert_eq!(err.code, ErrorCode::DeserializationError);
    }
}

//! Error types for ControlDB
//!
//! Every public store operation returns success or exactly one of the
//! kinds below. Callers retry on `Timeout` and `Internal`, and treat
//! `RecordNotFound` as authoritative absence.

use thiserror::Error;

/// Common result type for ControlDB operations
pub type DbResult<T> = std::result::Result<T, DbError>;

/// Common error type for ControlDB
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DbError {
    #[error("record not found: {0}")]
    RecordNotFound(String),

    #[error("conditional check failed: {0}")]
    ConditionalCheckFailed(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("request timeout")]
    Timeout,
}

impl DbError {
    /// Create a record not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::RecordNotFound(msg.into())
    }

    /// Create a conditional check failed error
    pub fn conditional_check_failed(msg: impl Into<String>) -> Self {
        Self::ConditionalCheckFailed(msg.into())
    }

    /// Create an invalid request error
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Check if this is a retryable error
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::Internal(_))
    }

    /// Check if this is a not found error
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::RecordNotFound(_))
    }

    /// Check if this is a conditional check failure
    #[must_use]
    pub const fn is_conditional_check_failed(&self) -> bool {
        matches!(self, Self::ConditionalCheckFailed(_))
    }

    /// Outcomes that are part of normal operation and not worth an operator's attention.
    #[must_use]
    pub const fn is_expected(&self) -> bool {
        matches!(
            self,
            Self::RecordNotFound(_) | Self::ConditionalCheckFailed(_)
        )
    }
}

impl From<std::io::Error> for DbError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::NotFound {
            Self::RecordNotFound(e.to_string())
        } else {
            Self::Internal(format!("filesystem error: {e}"))
        }
    }
}

impl From<prost::DecodeError> for DbError {
    fn from(e: prost::DecodeError) -> Self {
        Self::Internal(format!("decode error: {e}"))
    }
}

impl From<prost::EncodeError> for DbError {
    fn from(e: prost::EncodeError) -> Self {
        Self::Internal(format!("encode error: {e}"))
    }
}

impl From<DbError> for tonic::Status {
    fn from(e: DbError) -> Self {
        match e {
            DbError::RecordNotFound(msg) => Self::not_found(msg),
            DbError::ConditionalCheckFailed(msg) => Self::failed_precondition(msg),
            DbError::InvalidRequest(msg) => Self::invalid_argument(msg),
            DbError::Internal(msg) => Self::internal(msg),
            DbError::Timeout => Self::deadline_exceeded("request timeout"),
        }
    }
}

impl From<tonic::Status> for DbError {
    fn from(status: tonic::Status) -> Self {
        let msg = status.message().to_string();
        match status.code() {
            tonic::Code::NotFound => Self::RecordNotFound(msg),
            tonic::Code::FailedPrecondition => Self::ConditionalCheckFailed(msg),
            tonic::Code::InvalidArgument => Self::InvalidRequest(msg),
            tonic::Code::DeadlineExceeded => Self::Timeout,
            _ => Self::Internal(msg),
        }
    }
}

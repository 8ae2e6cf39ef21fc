use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Authentication required")]
    Unauthenticated,

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Failed precondition: {0}")]
    FailedPrecondition(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// The failure code reported to remote callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    Unauthenticated,
    PermissionDenied,
    InvalidArgument,
    NotFound,
    FailedPrecondition,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthenticated    => "unauthenticated",
            Self::PermissionDenied   => "permission-denied",
            Self::InvalidArgument    => "invalid-argument",
            Self::NotFound           => "not-found",
            Self::FailedPrecondition => "failed-precondition",
            Self::Internal           => "internal",
        }
    }
}

impl LedgerError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Unauthenticated       => ErrorCode::Unauthenticated,
            Self::PermissionDenied(_)   => ErrorCode::PermissionDenied,
            Self::InvalidArgument(_)    => ErrorCode::InvalidArgument,
            Self::NotFound(_)           => ErrorCode::NotFound,
            Self::FailedPrecondition(_) => ErrorCode::FailedPrecondition,
            Self::Internal(_)
            | Self::Database(_)
            | Self::Serialization(_)
            | Self::Other(_)            => ErrorCode::Internal,
        }
    }

    /// True when SQLite refused the write because another connection
    /// holds the lock. The store retries these transparently.
    pub fn is_busy(&self) -> bool {
        match self {
            Self::Database(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn precondition(reason: impl Into<String>) -> Self {
        Self::FailedPrecondition(reason.into())
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidArgument(reason.into())
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

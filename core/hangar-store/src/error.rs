//! Error types for store operations.
//!
//! Store failures are the one class surfaced as real errors; engine policy
//! outcomes never travel through here. A failed append mutates nothing, so
//! callers recover by retrying the whole operation from a fresh read.

use hangar_protocol::ErrorInfo;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {context}: {source}")]
    Sqlite {
        context: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid record: {0}")]
    InvalidRecord(ErrorInfo),

    #[error("Finding not found: {0}")]
    FindingNotFound(String),
}

impl From<ErrorInfo> for StoreError {
    fn from(info: ErrorInfo) -> Self {
        StoreError::InvalidRecord(info)
    }
}

/// Convenience type alias for Results using StoreError.
pub type Result<T> = std::result::Result<T, StoreError>;

pub(crate) fn sqlite(context: &'static str) -> impl FnOnce(rusqlite::Error) -> StoreError {
    move |source| StoreError::Sqlite {
        context: context.to_string(),
        source,
    }
}

pub(crate) fn json(context: &'static str) -> impl FnOnce(serde_json::Error) -> StoreError {
    move |source| StoreError::Json {
        context: context.to_string(),
        source,
    }
}

pub(crate) fn io(context: &'static str) -> impl FnOnce(std::io::Error) -> StoreError {
    move |source| StoreError::Io {
        context: context.to_string(),
        source,
    }
}

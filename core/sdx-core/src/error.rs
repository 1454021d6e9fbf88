//! Error types for the document index.
//!
//! All public APIs return `SdxResult<T>`; library code does not panic.

use thiserror::Error;

/// Unified error type for all index operations.
#[derive(Debug, Error)]
pub enum SdxError {
    /// Malformed request: bad query term, missing required field, unsupported action
    #[error("validation error: {0}")]
    Validation(String),

    /// Schema registration error (missing type metadata, unknown factory)
    #[error("schema error: {0}")]
    Schema(String),

    /// Requested document, page or table does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Caller is not allowed to perform the request
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Operation was shed before execution (queue full, deadline passed)
    #[error("rejected: {0}")]
    Rejected(String),

    /// Host is stopping; the caller should retry elsewhere or later
    #[error("service unavailable, should retry: {0}")]
    Unavailable(String),

    /// Cached execution context of a paginated query no longer matches the schema
    #[error("stale query context: {0}")]
    StaleQueryContext(String),

    /// SQL text could not be built for a query specification
    #[error("query conversion error: {message}\nQuery: {query}")]
    Conversion { message: String, query: String },

    /// Backing store error
    #[error("storage error: {source}")]
    Storage {
        #[from]
        source: rusqlite::Error,
    },

    /// Connection pool exhausted or misconfigured
    #[error("connection pool error: {0}")]
    Pool(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("config error: {0}")]
    Config(String),

    /// Cluster membership call failed
    #[error("cluster error: {0}")]
    Cluster(String),

    /// Standard I/O error
    #[error("io error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

/// Convenience type alias.
pub type SdxResult<T> = Result<T, SdxError>;

impl From<serde_json::Error> for SdxError {
    fn from(err: serde_json::Error) -> Self {
        SdxError::Serialization(err.to_string())
    }
}

impl SdxError {
    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        SdxError::Validation(msg.into())
    }

    /// Create a conversion error carrying the offending query.
    pub fn conversion(message: impl Into<String>, query: impl Into<String>) -> Self {
        SdxError::Conversion {
            message: message.into(),
            query: query.into(),
        }
    }

    /// Whether the surrounding framework may retry the operation as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SdxError::Unavailable(_) | SdxError::StaleQueryContext(_) | SdxError::Pool(_)
        )
    }

    /// HTTP-like status code used when failing an operation.
    pub fn status_code(&self) -> u16 {
        match self {
            SdxError::Validation(_) | SdxError::Conversion { .. } => 400,
            SdxError::Forbidden(_) => 403,
            SdxError::NotFound(_) => 404,
            SdxError::StaleQueryContext(_) => 409,
            SdxError::Rejected(_) => 429,
            SdxError::Unavailable(_) => 503,
            _ => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_validation() {
        let err = SdxError::validation("term has neither value nor range");
        assert_eq!(
            err.to_string(),
            "validation error: term has neither value nor range"
        );
    }

    #[test]
    fn error_display_conversion() {
        let err = SdxError::conversion("unsupported match type", "{\"term\":{}}");
        assert!(err.to_string().contains("unsupported match type"));
        assert!(err.to_string().contains("Query: {\"term\":{}}"));
    }

    #[test]
    fn from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{bad").unwrap_err();
        let err: SdxError = json_err.into();
        assert!(matches!(err, SdxError::Serialization(_)));
    }

    #[test]
    fn from_rusqlite() {
        let err: SdxError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, SdxError::Storage { .. }));
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn retryable_classification() {
        assert!(SdxError::Unavailable("stopping".into()).is_retryable());
        assert!(SdxError::StaleQueryContext("tables".into()).is_retryable());
        assert!(!SdxError::validation("x").is_retryable());
        assert_eq!(SdxError::Rejected("queue full".into()).status_code(), 429);
        assert_eq!(SdxError::Unavailable("stopping".into()).status_code(), 503);
    }
}

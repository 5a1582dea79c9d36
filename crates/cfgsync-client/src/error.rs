//! Error types for the synchronization engine

/// Error type for all store adapter operations
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("request failed with status {status}: {message}")]
    RequestFailed { status: u16, message: String },

    #[error("service group {0} not found")]
    ServiceGroupNotFound(String),

    #[error("stack {0} not found")]
    StackNotFound(String),

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::ser::Error),

    #[error("listing {path} exceeded {max_pages} pages")]
    PageLimitExceeded { path: String, max_pages: u32 },

    #[error("call gate closed")]
    GateClosed,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl SyncError {
    /// Shorthand for an `Unsupported` error.
    pub fn unsupported(what: impl Into<String>) -> Self {
        SyncError::Unsupported(what.into())
    }

    /// True for the "does not exist" family of errors.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            SyncError::ServiceGroupNotFound(_) | SyncError::StackNotFound(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SyncError::GateClosed;
        assert_eq!(err.to_string(), "call gate closed");

        let err = SyncError::unsupported("non-recursive delete");
        assert_eq!(err.to_string(), "unsupported operation: non-recursive delete");

        let err = SyncError::RequestFailed {
            status: 503,
            message: "Service Unavailable".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "request failed with status 503: Service Unavailable"
        );

        let err = SyncError::PageLimitExceeded {
            path: "/svc".to_string(),
            max_pages: 3,
        };
        assert_eq!(err.to_string(), "listing /svc exceeded 3 pages");
    }

    #[test]
    fn test_not_found_family() {
        assert!(SyncError::ServiceGroupNotFound("redis.default".into()).is_not_found());
        assert!(SyncError::StackNotFound("prod".into()).is_not_found());
        assert!(!SyncError::Backend("boom".into()).is_not_found());
    }

    #[test]
    fn test_from_serde_json() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: SyncError = parse_err.into();
        assert!(matches!(err, SyncError::Json(_)));
    }
}

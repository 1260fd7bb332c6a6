/// Error taxonomy for client/server interactions
use thiserror::Error;

/// Failure kinds surfaced by the transport and acted on by the cache
/// layer. Each kind carries a distinct recovery policy:
///
/// - `Transport`: roll back optimistic state, notify, no auto-retry
/// - `Unauthorized`: roll back, revalidate the acting identity, notify
/// - `Validation`: surfaced verbatim; checked before any cache mutation
/// - `NotFound`: target already gone server-side; treated as a
///   successful removal, never surfaced as an error
#[derive(Error, Debug, Clone)]
pub enum ApiError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("not authorized: {0}")]
    Unauthorized(String),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Whether a manual retry of the same request could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::Transport(_))
    }

    /// Stable label for metrics and structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Transport(_) => "transport",
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::Validation(_) => "validation",
            ApiError::NotFound(_) => "not_found",
            ApiError::Internal(_) => "internal",
        }
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transport_is_retryable() {
        assert!(ApiError::Transport("timeout".into()).is_retryable());
        assert!(!ApiError::Unauthorized("revoked".into()).is_retryable());
        assert!(!ApiError::Validation("empty".into()).is_retryable());
        assert!(!ApiError::NotFound("gone".into()).is_retryable());
        assert!(!ApiError::Internal("boom".into()).is_retryable());
    }

    #[test]
    fn test_kind_labels() {
        assert_eq!(ApiError::Transport("x".into()).kind(), "transport");
        assert_eq!(ApiError::NotFound("x".into()).kind(), "not_found");
    }
}

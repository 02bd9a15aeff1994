//! Error taxonomy for batch orchestration
//!
//! Every failure that reaches the orchestrator is one of three kinds:
//! 1. `Cancelled` - the user asked to stop, never retried
//! 2. `TransientFetch` - one item failed, retried and then given up
//! 3. `BatchFatal` - list acquisition or parsing failed, the run is aborted

use thiserror::Error;

use crate::batch::config_loader::ConfigError;
use crate::batch::content_filter::ContentFilterError;
use crate::batch::fetcher::FetchError;
use crate::batch::list_source::ListSourceError;
use crate::batch::store::StoreError;

/// Error code reported when an error carries no code of its own.
pub const DEFAULT_ERROR_CODE: i32 = -1;

/// Error types for the orchestration layer
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Operation cancelled by user")]
    Cancelled,

    #[error("Fetch failed: {message}")]
    TransientFetch { message: String, code: Option<i32> },

    #[error("Batch aborted: {message}")]
    BatchFatal { message: String, code: Option<i32> },
}

/// Result type for orchestration operations
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

impl OrchestratorError {
    /// Build a per-item failure without a carried code
    pub fn transient(message: impl Into<String>) -> Self {
        OrchestratorError::TransientFetch {
            message: message.into(),
            code: None,
        }
    }

    /// Build a batch-fatal failure without a carried code
    pub fn fatal(message: impl Into<String>) -> Self {
        OrchestratorError::BatchFatal {
            message: message.into(),
            code: None,
        }
    }

    /// Whether this is an explicit user stop
    pub fn is_cancelled(&self) -> bool {
        matches!(self, OrchestratorError::Cancelled)
    }

    /// The code exposed to the caller, `-1` when the error carries none
    pub fn code(&self) -> i32 {
        match self {
            OrchestratorError::Cancelled => DEFAULT_ERROR_CODE,
            OrchestratorError::TransientFetch { code, .. }
            | OrchestratorError::BatchFatal { code, .. } => code.unwrap_or(DEFAULT_ERROR_CODE),
        }
    }
}

impl From<ListSourceError> for OrchestratorError {
    fn from(err: ListSourceError) -> Self {
        OrchestratorError::fatal(err.to_string())
    }
}

impl From<StoreError> for OrchestratorError {
    fn from(err: StoreError) -> Self {
        OrchestratorError::fatal(err.to_string())
    }
}

impl From<ConfigError> for OrchestratorError {
    fn from(err: ConfigError) -> Self {
        OrchestratorError::fatal(err.to_string())
    }
}

impl From<ContentFilterError> for OrchestratorError {
    fn from(err: ContentFilterError) -> Self {
        OrchestratorError::transient(err.to_string())
    }
}

impl From<FetchError> for OrchestratorError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Cancelled => OrchestratorError::Cancelled,
            FetchError::Status { code, message } => OrchestratorError::TransientFetch {
                message,
                code: Some(code),
            },
            other => OrchestratorError::transient(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_defaults_to_minus_one() {
        assert_eq!(OrchestratorError::fatal("boom").code(), -1);
        assert_eq!(OrchestratorError::transient("boom").code(), -1);
        assert_eq!(OrchestratorError::Cancelled.code(), -1);
    }

    #[test]
    fn test_carried_code_is_reported() {
        let err = OrchestratorError::BatchFatal {
            message: "list unreadable".to_string(),
            code: Some(1005),
        };
        assert_eq!(err.code(), 1005);
        assert!(!err.is_cancelled());
    }

    #[test]
    fn test_fetch_errors_keep_their_kind() {
        let cancelled: OrchestratorError = FetchError::Cancelled.into();
        assert!(cancelled.is_cancelled());

        let status: OrchestratorError = FetchError::Status {
            code: 404,
            message: "member gone".to_string(),
        }
        .into();
        assert!(matches!(status, OrchestratorError::TransientFetch { code: Some(404), .. }));
    }

    #[test]
    fn test_list_errors_are_batch_fatal() {
        let err: OrchestratorError = ListSourceError::NotFound("list.txt".to_string()).into();
        assert!(matches!(err, OrchestratorError::BatchFatal { .. }));
    }
}

//! Errors returned by the remote cloud APIs.

use thiserror::Error;

/// Result type for remote API calls.
pub type CloudResult<T> = Result<T, CloudError>;

/// Error code for a validity window that is not in the future.
pub const INVALID_TIME: &str = "InvalidTime";

/// Error code for a spot request id the API does not (yet) know.
pub const SPOT_REQUEST_NOT_FOUND: &str = "InvalidSpotInstanceRequestID.NotFound";

/// Error code for an instance id the API does not know.
pub const INSTANCE_NOT_FOUND: &str = "InvalidInstanceID.NotFound";

/// Error code returned when a dry run would have succeeded.
pub const DRY_RUN_OPERATION: &str = "DryRunOperation";

/// Remote API errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CloudError {
    /// The API answered with an error code.
    #[error("{code}: {message}")]
    Api { code: String, message: String },

    /// The call did not produce an API answer.
    #[error("transport error: {0}")]
    Transport(String),
}

impl CloudError {
    /// Build an API error.
    pub fn api(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            code: code.into(),
            message: message.into(),
        }
    }

    /// The API error code, if the API answered.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Api { code, .. } => Some(code),
            Self::Transport(_) => None,
        }
    }

    /// Returns true if the validity window was rejected as not in the future.
    pub fn is_invalid_time(&self) -> bool {
        self.code() == Some(INVALID_TIME)
    }

    /// Returns true if a dry run reports the call would have succeeded.
    pub fn is_dry_run(&self) -> bool {
        self.code() == Some(DRY_RUN_OPERATION)
    }

    /// Returns true if a spot request id was not found.
    pub fn is_spot_request_not_found(&self) -> bool {
        self.code() == Some(SPOT_REQUEST_NOT_FOUND)
    }
}

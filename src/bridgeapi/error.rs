//! Error types for the Crunchy Bridge API client

use thiserror::Error;

use crate::bridgeapi::credential::CredentialError;

/// Error variants follow the controller's naming: configuration problems,
/// login-state problems, transport problems and provider-reported problems.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("No API target URL set")]
    ApiUnset,

    #[error("Invalid API URL: {0}")]
    InvalidUrl(String),

    #[error("No credential provider set")]
    CredUnset,

    #[error("Temporarily failed to establish initial login")]
    FailedLogin,

    #[error("Temporarily failed to establish renewed login")]
    FailedRenew,

    #[error("Invalid credentials for API login")]
    BadCredentials,

    #[error("Credential retrieval failed: {0}")]
    Credential(#[from] CredentialError),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Non-unique name specified in request: {0}")]
    Conflict(String),

    #[error("Unable to identify personal team")]
    NoPersonalTeam,

    #[error("Resource not found on provider")]
    NotFound,

    #[error("Unexpected response status from API: {0}")]
    UnexpectedStatus(u16),

    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Failed to decode API payload: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ApiError {
    /// Check if this error can resolve without operator intervention
    pub fn is_retryable(&self) -> bool {
        match self {
            // Configuration never fixes itself
            ApiError::ApiUnset | ApiError::InvalidUrl(_) => false,
            // The session manager keeps retrying these on its own schedule,
            // including bad credentials since the secret may be corrected
            ApiError::CredUnset
            | ApiError::FailedLogin
            | ApiError::FailedRenew
            | ApiError::BadCredentials
            | ApiError::Credential(_) => true,
            ApiError::Transport(_) => true,
            ApiError::UnexpectedStatus(code) => *code >= 500 || *code == 429,
            // Domain errors need a spec or provider-side change
            ApiError::BadRequest(_)
            | ApiError::Conflict(_)
            | ApiError::NoPersonalTeam
            | ApiError::NotFound => false,
            ApiError::Decode(_) => false,
        }
    }

    /// Check if this error reflects the current login state rather than a request
    pub fn is_login_state(&self) -> bool {
        matches!(
            self,
            ApiError::CredUnset
                | ApiError::FailedLogin
                | ApiError::FailedRenew
                | ApiError::BadCredentials
        )
    }
}

pub type Result<T, E = ApiError> = std::result::Result<T, E>;

//! Error types for the BridgeCluster controller

use std::time::Duration;

use thiserror::Error;

use crate::backoff::BackoffConfig;
use crate::bridgeapi::ApiError;

/// Failures of the resource store, with not-found and optimistic-concurrency
/// conflicts kept distinct from everything else
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Resource version conflict: {0}")]
    Conflict(String),

    #[error("Kubernetes API error: {0}")]
    Kube(#[source] kube::Error),
}

impl From<kube::Error> for StoreError {
    fn from(e: kube::Error) -> Self {
        match &e {
            kube::Error::Api(resp) if resp.code == 404 => StoreError::NotFound(resp.message.clone()),
            kube::Error::Api(resp) if resp.code == 409 => StoreError::Conflict(resp.message.clone()),
            _ => StoreError::Kube(e),
        }
    }
}

/// Error variants are named with the `Error` suffix for clarity (e.g., `KubeError`, `BridgeError`).
#[allow(clippy::enum_variant_names)]
#[derive(Error, Debug)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Store error: {0}")]
    StoreError(#[from] StoreError),

    #[error("Crunchy Bridge API error: {0}")]
    BridgeError(#[from] ApiError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Unrecognized cluster phase: {0:?}")]
    UnrecognizedPhase(String),

    #[error("Invalid cluster detail: {0}")]
    InvalidDetail(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Missing object key: {0}")]
    MissingObjectKey(&'static str),
}

impl Error {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::KubeError(e) => kube_retryable(e),
            Error::StoreError(StoreError::Kube(e)) => kube_retryable(e),
            // Conflicts resolve on the next read, a missing object may reappear
            Error::StoreError(_) => true,
            Error::BridgeError(e) => e.is_retryable(),
            // Corrupt status or bad settings need a human
            Error::SerializationError(_)
            | Error::UnrecognizedPhase(_)
            | Error::InvalidConfig(_)
            | Error::MissingObjectKey(_) => false,
            Error::InvalidDetail(_) => true,
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            Error::StoreError(StoreError::NotFound(_)) => true,
            Error::KubeError(kube::Error::Api(resp)) => resp.code == 404,
            _ => false,
        }
    }

    pub fn is_conflict(&self) -> bool {
        match self {
            Error::StoreError(StoreError::Conflict(_)) => true,
            Error::KubeError(kube::Error::Api(resp)) => resp.code == 409,
            _ => false,
        }
    }

    /// Short label used for the error metric
    pub fn kind(&self) -> &'static str {
        match self {
            Error::KubeError(_) => "kube",
            Error::StoreError(_) => "store",
            Error::BridgeError(e) if e.is_login_state() => "login",
            Error::BridgeError(_) => "bridge",
            Error::SerializationError(_) => "serialization",
            Error::UnrecognizedPhase(_) => "phase",
            Error::InvalidDetail(_) => "detail",
            Error::InvalidConfig(_) => "config",
            Error::MissingObjectKey(_) => "object_key",
        }
    }
}

fn kube_retryable(e: &kube::Error) -> bool {
    match e {
        kube::Error::Api(api_err) => {
            // 4xx errors (except 409 Conflict, 429 TooManyRequests) are usually not retryable
            let code = api_err.code;
            if (400..500).contains(&code) {
                return code == 409 || code == 429;
            }
            true
        }
        // Network and other errors are retryable
        _ => true,
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Requeue delay for a failed reconcile
///
/// Non-retryable errors wait the full maximum so a fix can land first.
pub fn delay_for_error(config: &BackoffConfig, error: &Error, attempt: u32) -> Duration {
    if error.is_retryable() {
        config.delay_for_attempt(attempt)
    } else {
        config.max_delay
    }
}

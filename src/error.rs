//! Error types shared across the operator and the managed server.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("invalid PeeringServer spec: {0}")]
    ValidationError(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("file watch error: {0}")]
    FileWatchError(#[from] notify::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// True for a stale-resource-version write rejected by the API server.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::KubeError(kube::Error::Api(ae)) if ae.code == 409)
    }

    /// True when a retry can be expected to succeed without a spec edit.
    pub fn is_retriable(&self) -> bool {
        match self {
            Error::KubeError(kube::Error::Api(ae)) => {
                ae.code == 409 || ae.code == 429 || ae.code >= 500
            }
            // Transport-level failures to reach the API server.
            Error::KubeError(_) => true,
            Error::HttpError(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    fn api_error(code: u16) -> Error {
        Error::KubeError(kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "test".to_string(),
            reason: "test".to_string(),
            code,
        }))
    }

    #[test]
    fn conflict_is_detected_and_retriable() {
        let err = api_error(409);
        assert!(err.is_conflict());
        assert!(err.is_retriable());
    }

    #[test]
    fn server_errors_are_retriable() {
        assert!(api_error(500).is_retriable());
        assert!(api_error(429).is_retriable());
    }

    #[test]
    fn not_found_is_not_retriable() {
        let err = api_error(404);
        assert!(!err.is_conflict());
        assert!(!err.is_retriable());
    }

    #[test]
    fn validation_errors_are_not_retriable() {
        let err = Error::ValidationError("replicas must not be negative".to_string());
        assert!(!err.is_retriable());
    }
}

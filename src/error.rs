//! Error types for docserver

use hyper::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    /// Store root missing or unusable. Fatal at startup.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Bad upload: unusable name, not a zip, or failed integrity check.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown bundle or unknown entry inside a bundle.
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Upload exceeds limit of {0} bytes")]
    PayloadTooLarge(usize),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Transport status for this error at the HTTP boundary.
    pub fn status_code(&self) -> StatusCode {
        match self {
            StoreError::Validation(_) => StatusCode::BAD_REQUEST,
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            StoreError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            StoreError::Config(_) | StoreError::Io(_) | StoreError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Whether the caller caused this error.
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            StoreError::Validation("bad".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            StoreError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            StoreError::PayloadTooLarge(10).status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk");
        assert_eq!(
            StoreError::from(io).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_client_errors() {
        assert!(StoreError::NotFound("x".into()).is_client_error());
        assert!(!StoreError::Internal("boom".into()).is_client_error());
    }
}

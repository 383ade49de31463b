use std::fmt;
use std::path::PathBuf;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Errors loading or validating the TLS certificate/private key pair. Fatal at startup.
#[derive(Error, Debug)]
pub enum TlsError {
    #[error("certificate file not found: {0}")]
    CertificateNotFound(PathBuf),

    #[error("private key file not found: {0}")]
    PrivateKeyNotFound(PathBuf),

    #[error("failed to parse certificate: {0}")]
    CertificateParseFailed(String),

    #[error("failed to parse private key: {0}")]
    PrivateKeyParseFailed(String),

    #[error("no private keys found in file")]
    NoPrivateKeysFound,

    #[error("multiple private keys found, expected exactly one")]
    MultiplePrivateKeysFound,

    #[error("tls configuration error: {0}")]
    ConfigurationError(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;

/// The content server's HTTP-facing error type. Renders a plain-text body rather than a JSON
/// envelope, since the content endpoints return literal plain-text bodies on failure.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, self.message).into_response()
    }
}

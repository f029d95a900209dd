use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Malformed endpoint: {0}")]
    MalformedEndpoint(String),

    #[error("HTTP request error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("DiveCloud API {url} returned {status}: {body}")]
    ApiStatus {
        url: String,
        status: u16,
        body: String,
    },

    #[error("DiveCloud API {0} did not return a result")]
    EmptyResponse(String),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Registration failed: {0}")]
    RegistrationFailed(#[source] Box<AppError>),

    #[error("Triggering test plan failed: {0}")]
    TriggerFailed(#[source] Box<AppError>),

    #[error("Socket server error: {0}")]
    Socket(String),

    #[error("DiveCloud test did not return anything - empty JSON message")]
    NoResult,

    #[error("Failed to create artifact {}: {source}", .path.display())]
    ArtifactWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cancelled: {0}")]
    Cancelled(String),
}

/// Coarse classification of an [`AppError`], used by run outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    MalformedEndpoint,
    TransportError,
    EmptyResponse,
    MalformedPayload,
    RegistrationFailed,
    TriggerFailed,
    SocketError,
    NoResult,
    ArtifactWriteFailed,
    Cancelled,
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Config(_) => ErrorKind::Config,
            AppError::MalformedEndpoint(_) => ErrorKind::MalformedEndpoint,
            AppError::Transport(_) | AppError::ApiStatus { .. } => ErrorKind::TransportError,
            AppError::EmptyResponse(_) => ErrorKind::EmptyResponse,
            AppError::MalformedPayload(_) => ErrorKind::MalformedPayload,
            AppError::RegistrationFailed(_) => ErrorKind::RegistrationFailed,
            AppError::TriggerFailed(_) => ErrorKind::TriggerFailed,
            AppError::Socket(_) => ErrorKind::SocketError,
            AppError::NoResult => ErrorKind::NoResult,
            AppError::ArtifactWrite { .. } => ErrorKind::ArtifactWriteFailed,
            AppError::Cancelled(_) => ErrorKind::Cancelled,
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

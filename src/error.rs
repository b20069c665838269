//! Error types for Keepa Relay.

use std::path::PathBuf;

/// Top-level error type for a relay run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Mail query error: {0}")]
    Query(#[from] QueryError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Send error: {0}")]
    Send(#[from] SendError),

    #[error("{failed} of {total} notifications could not be delivered")]
    PartialDelivery { failed: usize, total: usize },

    #[error("Failed to write output: {0}")]
    Output(#[from] std::io::Error),
}

/// Mail provider authentication errors.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Client secret file not found: {}", .0.display())]
    ClientSecretMissing(PathBuf),

    #[error("Invalid client secret file {}: {reason}", .path.display())]
    InvalidClientSecret { path: PathBuf, reason: String },

    #[error("Unreadable token store {}: {reason}", .path.display())]
    InvalidTokenStore { path: PathBuf, reason: String },

    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("Failed to start consent callback listener: {0}")]
    CallbackServerFailed(String),

    #[error("Authorization failed: {0}")]
    AuthorizationFailed(String),

    #[error("Token exchange failed: {0}")]
    TokenExchangeFailed(String),

    #[error("Invalid OAuth configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Mail search / metadata fetch errors.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Mail provider rejected credentials ({status}): {body}")]
    Unauthorized { status: u16, body: String },

    #[error("Mail provider returned {status}: {body}")]
    BadStatus { status: u16, body: String },

    #[error("Invalid response from mail provider: {0}")]
    InvalidResponse(String),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to parse configuration {}: {reason}", .path.display())]
    ParseError { path: PathBuf, reason: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Messaging provider send errors.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Messaging provider rejected credentials: {0}")]
    AuthFailed(String),

    #[error("Rate limited by messaging provider")]
    RateLimited,

    #[error("Message rejected ({status}, code {code:?}): {message}")]
    Rejected {
        status: u16,
        code: Option<i64>,
        message: String,
    },

    #[error("Invalid response from messaging provider: {0}")]
    InvalidResponse(String),
}

/// Result type alias for a relay run.
pub type Result<T> = std::result::Result<T, Error>;

use thiserror::Error;

use crate::config::ConfigError;
use crate::http::TransportError;

/// Outcome of a failed password or refresh grant.
#[derive(Debug, Error)]
pub enum TokenError {
    /// The server rejected the username/password combination. Never retried
    /// automatically.
    #[error("invalid username or password: {0}")]
    InvalidCredentials(String),
    #[error("token exchange failed: {0}")]
    TokenExchangeFailed(String),
    #[error("could not parse token response")]
    MalformedTokenResponse,
    #[error("token endpoint unreachable: {0}")]
    Transport(#[source] TransportError),
}

/// Errors raised while reading or writing persisted tokens.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

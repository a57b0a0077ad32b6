//! Error types for credential storage and token refresh

use thiserror::Error;

/// Failure of the credential store itself.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("credential store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("credential store is not valid TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize credentials: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("could not determine a data directory for the credential store")]
    NoDataDir,
}

/// A token could not be obtained (refresh failed).
///
/// The persisted record is never modified when one of these is returned.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token endpoint unreachable: {0}")]
    Transport(String),
    #[error("token endpoint rejected the refresh: {0}")]
    Rejected(String),
    #[error("malformed token response: {0}")]
    Malformed(String),
    #[error("failed to sign request: {0}")]
    Signing(String),
    #[error("invalid token endpoint: {0}")]
    Endpoint(String),
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            AuthError::Malformed(err.to_string())
        } else {
            AuthError::Transport(err.to_string())
        }
    }
}

impl From<url::ParseError> for AuthError {
    fn from(err: url::ParseError) -> Self {
        AuthError::Signing(err.to_string())
    }
}

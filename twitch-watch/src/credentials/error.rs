//! Credential error types.

use thiserror::Error;
use twitch_helix::HelixError;

/// Errors that can occur while obtaining an app access token.
#[derive(Debug, Clone, Error)]
pub enum CredentialError {
    /// A required credential field is empty. Holds the field name.
    #[error("Missing credential: {0}")]
    MissingCredentials(&'static str),

    /// The token endpoint answered with a non-success status.
    #[error("Token exchange failed (HTTP {status}): {body}")]
    ExchangeFailed { status: u16, body: String },

    /// The token endpoint answered 2xx but without a usable token.
    #[error("Malformed token response: {0}")]
    MalformedResponse(String),

    /// The token endpoint could not be reached.
    #[error("Network error: {0}")]
    Network(String),
}

impl CredentialError {
    /// Check if this error is transient and may succeed on the next cycle.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_))
    }

    /// Check if the user has to fix the configured client id or secret.
    pub fn requires_reconfiguration(&self) -> bool {
        match self {
            Self::MissingCredentials(_) => true,
            Self::ExchangeFailed { status, .. } => matches!(status, 400 | 401 | 403),
            _ => false,
        }
    }
}

impl From<HelixError> for CredentialError {
    fn from(err: HelixError) -> Self {
        match err {
            HelixError::Unauthorized { body } => Self::ExchangeFailed { status: 401, body },
            HelixError::Status { status, body } => Self::ExchangeFailed { status, body },
            HelixError::HttpError(e) => match e.status() {
                Some(status) => Self::ExchangeFailed {
                    status: status.as_u16(),
                    body: e.to_string(),
                },
                None => Self::Network(e.to_string()),
            },
            HelixError::JsonError(e) => Self::MalformedResponse(e.to_string()),
            other @ HelixError::BatchTooLarge(_) => Self::MalformedResponse(other.to_string()),
        }
    }
}

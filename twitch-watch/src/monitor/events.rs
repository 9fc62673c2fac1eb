//! Recoverable problems reported by a poll cycle.

use std::fmt;

use twitch_helix::HelixError;

use crate::credentials::CredentialError;

/// Error taxonomy surfaced to observers. None of these stop polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MissingCredentials,
    ExchangeFailed,
    MalformedResponse,
    /// The status endpoint rejected the token (HTTP 401).
    AuthExpired,
    /// The status endpoint answered with another non-success status.
    FetchError,
    NetworkError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingCredentials => "missing_credentials",
            Self::ExchangeFailed => "exchange_failed",
            Self::MalformedResponse => "malformed_response",
            Self::AuthExpired => "auth_expired",
            Self::FetchError => "fetch_error",
            Self::NetworkError => "network_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recoverable issue, scoped to the batch it happened in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchIssue {
    pub kind: ErrorKind,
    pub detail: String,
    /// Number of logins whose status defaulted to offline because of it.
    pub affected: usize,
}

impl FetchIssue {
    pub fn new(kind: ErrorKind, detail: impl Into<String>, affected: usize) -> Self {
        Self {
            kind,
            detail: detail.into(),
            affected,
        }
    }

    pub fn from_credential(err: &CredentialError, affected: usize) -> Self {
        let kind = match err {
            CredentialError::MissingCredentials(_) => ErrorKind::MissingCredentials,
            CredentialError::ExchangeFailed { .. } => ErrorKind::ExchangeFailed,
            CredentialError::MalformedResponse(_) => ErrorKind::MalformedResponse,
            CredentialError::Network(_) => ErrorKind::NetworkError,
        };
        Self::new(kind, err.to_string(), affected)
    }

    pub fn from_helix(err: &HelixError, affected: usize) -> Self {
        let kind = match err {
            HelixError::Unauthorized { .. } => ErrorKind::AuthExpired,
            HelixError::HttpError(e) if e.status().is_none() => ErrorKind::NetworkError,
            _ => ErrorKind::FetchError,
        };
        Self::new(kind, err.to_string(), affected)
    }
}

impl fmt::Display for FetchIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_errors_keep_their_kind() {
        let issue = FetchIssue::from_credential(&CredentialError::MissingCredentials("client_id"), 3);
        assert_eq!(issue.kind, ErrorKind::MissingCredentials);
        assert_eq!(issue.affected, 3);

        let issue = FetchIssue::from_credential(&CredentialError::Network("timed out".into()), 1);
        assert_eq!(issue.kind, ErrorKind::NetworkError);
    }

    #[test]
    fn helix_status_is_fetch_error_with_snippet() {
        let err = HelixError::Status {
            status: 503,
            body: "upstream unavailable".into(),
        };
        let issue = FetchIssue::from_helix(&err, 2);
        assert_eq!(issue.kind, ErrorKind::FetchError);
        assert!(issue.detail.contains("503"));
        assert!(issue.detail.contains("upstream unavailable"));
        assert_eq!(issue.to_string(), format!("[fetch_error] {}", issue.detail));
    }
}

use thiserror::Error;

/// Maximum number of body characters kept in error values.
pub const BODY_SNIPPET_LEN: usize = 200;

#[derive(Debug, Error)]
pub enum HelixError {
    #[error("unauthorized (HTTP 401): {body}")]
    Unauthorized { body: String },
    #[error("unexpected HTTP status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("http error: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("json error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("too many logins in one request: {0} (max {max})", max = crate::MAX_LOGINS_PER_REQUEST)]
    BatchTooLarge(usize),
}

impl HelixError {
    /// HTTP status carried by the error, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized { .. } => Some(401),
            Self::Status { status, .. } => Some(*status),
            Self::HttpError(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Whether the request never produced a usable HTTP response.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::HttpError(_))
    }
}

/// Cut a response body down to [`BODY_SNIPPET_LEN`] characters.
pub(crate) fn snippet(body: &str) -> String {
    body.chars().take(BODY_SNIPPET_LEN).collect()
}

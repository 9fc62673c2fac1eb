use serde::Deserialize;

/// Response of the client-credentials token exchange.
///
/// Both fields are optional on the wire; callers decide what a usable
/// response looks like.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl TokenResponse {
    /// Returns the token and its lifetime when both are present and non-empty.
    pub fn usable(&self) -> Option<(&str, u64)> {
        let token = self.access_token.as_deref().filter(|t| !t.is_empty())?;
        let expires_in = self.expires_in.filter(|secs| *secs > 0)?;
        Some((token, expires_in))
    }
}

/// `GET /helix/streams` envelope.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamsResponse {
    #[serde(default)]
    pub data: Vec<Stream>,
}

/// A live stream entry. Only channels that are currently live are returned.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Stream {
    /// Platform-assigned stream id, unique per broadcast.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub user_login: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    /// RFC 3339 start time.
    #[serde(default)]
    pub started_at: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_response_requires_both_fields() {
        let ok: TokenResponse =
            serde_json::from_str(r#"{"access_token":"abc","expires_in":5000,"token_type":"bearer"}"#)
                .unwrap();
        assert_eq!(ok.usable(), Some(("abc", 5000)));

        let no_expiry: TokenResponse = serde_json::from_str(r#"{"access_token":"abc"}"#).unwrap();
        assert!(no_expiry.usable().is_none());

        let empty_token: TokenResponse =
            serde_json::from_str(r#"{"access_token":"","expires_in":10}"#).unwrap();
        assert!(empty_token.usable().is_none());
    }

    #[test]
    fn stream_tolerates_nulls() {
        let resp: StreamsResponse = serde_json::from_str(
            r#"{"data":[{"id":"1","user_login":"Alice","title":null,"started_at":"2024-01-01T00:00:00Z"}],"pagination":{}}"#,
        )
        .unwrap();
        assert_eq!(resp.data.len(), 1);
        assert_eq!(resp.data[0].title, None);
        assert_eq!(resp.data[0].user_login.as_deref(), Some("Alice"));
    }
}

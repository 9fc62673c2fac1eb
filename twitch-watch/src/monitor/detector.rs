//! Per-channel live status.

use serde::Serialize;
use twitch_helix::Stream;

/// Live status of one channel as observed by a single poll.
///
/// When `is_live` is false the remaining fields carry no meaning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChannelStatus {
    pub login: String,
    pub is_live: bool,
    pub title: String,
    /// RFC 3339 start time, empty if unknown.
    pub started_at: String,
    /// Platform-assigned broadcast id, empty if unknown.
    pub stream_id: String,
}

impl ChannelStatus {
    pub fn offline(login: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            ..Default::default()
        }
    }

    pub fn live_from_stream(login: impl Into<String>, stream: &Stream) -> Self {
        Self {
            login: login.into(),
            is_live: true,
            title: stream.title.clone().unwrap_or_default(),
            started_at: stream.started_at.clone().unwrap_or_default(),
            stream_id: stream.id.clone().unwrap_or_default(),
        }
    }

    /// Correlation key for "same broadcast": the stream id, else the start time.
    ///
    /// Empty when the platform supplied neither.
    pub fn session_key(&self) -> &str {
        if self.stream_id.is_empty() {
            &self.started_at
        } else {
            &self.stream_id
        }
    }
}

/// Canonical form of a channel login, or `None` if nothing is left after trimming.
pub fn normalize_login(login: &str) -> Option<String> {
    let login = login.trim();
    (!login.is_empty()).then(|| login.to_lowercase())
}

/// Normalize a list of logins, dropping empties and duplicates but keeping order.
pub fn normalize_logins<S: AsRef<str>>(logins: &[S]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    logins
        .iter()
        .filter_map(|login| normalize_login(login.as_ref()))
        .filter(|login| seen.insert(login.clone()))
        .collect()
}

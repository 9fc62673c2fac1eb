//! Persisted configuration types.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::credentials::CredentialState;
use crate::monitor::normalize_login;
use crate::{Error, Result};

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;
pub const MAX_INTERVAL_MINUTES: u64 = 9999;
pub const MAX_INTERVAL_SECONDS: u64 = 59;

/// Everything the watcher keeps between runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub client_id: String,
    /// Only written to disk when `save_client_secret` is set.
    pub client_secret: String,
    pub save_client_secret: bool,
    pub access_token: String,
    /// Unix seconds; 0 when no token was ever obtained.
    pub token_expires_at: i64,
    pub poll_interval_sec: u64,
    pub channels: Vec<String>,
    pub open_browser: bool,
    /// Overrides the Helix API root (`{base}/helix/streams`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub helix_base_url: Option<String>,
    /// Overrides the token endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_url: Option<String>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            save_client_secret: false,
            access_token: String::new(),
            token_expires_at: 0,
            poll_interval_sec: DEFAULT_POLL_INTERVAL_SECS,
            channels: Vec::new(),
            open_browser: true,
            helix_base_url: None,
            token_url: None,
        }
    }
}

impl WatchConfig {
    /// The form written to disk.
    pub fn persisted(&self) -> Self {
        let mut persisted = self.clone();
        if !persisted.save_client_secret {
            persisted.client_secret.clear();
        }
        persisted
    }

    pub fn poll_interval(&self) -> PollInterval {
        PollInterval::from_secs(self.poll_interval_sec)
    }

    pub fn watch_set(&self) -> WatchSet {
        WatchSet::from_logins(&self.channels)
    }

    pub fn token_expires_at(&self) -> Option<DateTime<Utc>> {
        if self.token_expires_at <= 0 {
            return None;
        }
        DateTime::from_timestamp(self.token_expires_at, 0)
    }

    pub fn credential_state(&self) -> CredentialState {
        CredentialState::new(&self.client_id, &self.client_secret)
            .with_cached_token(&self.access_token, self.token_expires_at())
    }
}

/// Ordered set of normalized channel logins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchSet {
    logins: Vec<String>,
}

impl WatchSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from raw logins, silently dropping empties and duplicates.
    pub fn from_logins<S: AsRef<str>>(logins: &[S]) -> Self {
        let mut set = Self::new();
        for login in logins {
            let _ = set.insert(login.as_ref());
        }
        set
    }

    /// Add a login. Returns its normalized form.
    pub fn insert(&mut self, login: &str) -> Result<String> {
        let login =
            normalize_login(login).ok_or_else(|| Error::validation("channel login is empty"))?;
        if self.contains(&login) {
            return Err(Error::validation(format!("{login} is already watched")));
        }
        self.logins.push(login.clone());
        Ok(login)
    }

    /// Remove a login. Returns whether it was present.
    pub fn remove(&mut self, login: &str) -> bool {
        let Some(login) = normalize_login(login) else {
            return false;
        };
        let before = self.logins.len();
        self.logins.retain(|l| *l != login);
        self.logins.len() != before
    }

    pub fn contains(&self, login: &str) -> bool {
        normalize_login(login).is_some_and(|login| self.logins.contains(&login))
    }

    pub fn as_slice(&self) -> &[String] {
        &self.logins
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.logins.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.logins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.logins.is_empty()
    }

    pub fn into_vec(self) -> Vec<String> {
        self.logins
    }
}

/// Poll cadence, always at least one second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PollInterval(Duration);

impl Default for PollInterval {
    fn default() -> Self {
        Self::from_secs(DEFAULT_POLL_INTERVAL_SECS)
    }
}

impl PollInterval {
    /// Build from separately entered minute and second fields.
    ///
    /// Unparseable input counts as 0; minutes clamp to 0..=9999 and seconds
    /// to 0..=59.
    pub fn from_parts(minutes: &str, seconds: &str) -> Self {
        let minutes = parse_clamped(minutes, MAX_INTERVAL_MINUTES);
        let seconds = parse_clamped(seconds, MAX_INTERVAL_SECONDS);
        Self::from_secs(minutes * 60 + seconds)
    }

    pub fn from_secs(secs: u64) -> Self {
        let max = MAX_INTERVAL_MINUTES * 60 + MAX_INTERVAL_SECONDS;
        Self(Duration::from_secs(secs.clamp(1, max)))
    }

    pub fn as_secs(&self) -> u64 {
        self.0.as_secs()
    }

    pub fn as_duration(&self) -> Duration {
        self.0
    }

    /// `(minutes, seconds)` for display.
    pub fn split(&self) -> (u64, u64) {
        (self.as_secs() / 60, self.as_secs() % 60)
    }
}

impl std::fmt::Display for PollInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (minutes, seconds) = self.split();
        if minutes > 0 {
            write!(f, "{minutes}m {seconds}s")
        } else {
            write!(f, "{seconds}s")
        }
    }
}

fn parse_clamped(input: &str, max: u64) -> u64 {
    input
        .trim()
        .parse::<i64>()
        .map(|value| value.clamp(0, max as i64) as u64)
        .unwrap_or(0)
}

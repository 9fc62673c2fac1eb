//! Credential state types.

use std::fmt;

use chrono::{DateTime, Local, TimeDelta, Utc};

/// A cached token is reused only while it has more than this many seconds left.
pub const REFRESH_BUFFER_SECS: i64 = 300;

/// A bearer token together with the client id it was issued for.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub client_id: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Time left before the token expires. Negative once expired.
    pub fn remaining(&self, now: DateTime<Utc>) -> TimeDelta {
        self.expires_at - now
    }

    /// Whether the token can still be used without a refresh.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.remaining(now) > TimeDelta::seconds(REFRESH_BUFFER_SECS)
    }

    pub fn describe_expiry(&self, now: DateTime<Utc>) -> String {
        describe_remaining(self.expires_at, now)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"<redacted>")
            .field("client_id", &self.client_id)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Client credentials plus the cached token, if any.
///
/// The token and its expiry are always replaced together.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CredentialState {
    pub client_id: String,
    pub client_secret: String,
    pub access_token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl CredentialState {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into().trim().to_string(),
            client_secret: client_secret.into().trim().to_string(),
            ..Default::default()
        }
    }

    /// Seed a previously persisted token.
    pub fn with_cached_token(
        mut self,
        access_token: impl Into<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        self.access_token = access_token.into();
        self.expires_at = expires_at;
        self
    }

    /// The cached token, when one exists and is not inside the refresh buffer.
    pub fn fresh_token(&self, now: DateTime<Utc>) -> Option<AccessToken> {
        let token = self.cached_token()?;
        token.is_fresh(now).then_some(token)
    }

    /// The cached token regardless of freshness.
    pub fn cached_token(&self) -> Option<AccessToken> {
        if self.access_token.is_empty() || self.client_id.is_empty() {
            return None;
        }
        Some(AccessToken {
            token: self.access_token.clone(),
            client_id: self.client_id.clone(),
            expires_at: self.expires_at?,
        })
    }

    pub fn store_token(&mut self, token: &AccessToken) {
        self.access_token = token.token.clone();
        self.expires_at = Some(token.expires_at);
    }

    /// Human readable token status, e.g. `expires at 2024-05-01 12:00:00 (125 min left)`.
    pub fn describe_expiry(&self, now: DateTime<Utc>) -> String {
        match (self.access_token.is_empty(), self.expires_at) {
            (false, Some(expires_at)) => describe_remaining(expires_at, now),
            _ => "not yet obtained".to_string(),
        }
    }
}

impl fmt::Debug for CredentialState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialState")
            .field("client_id", &self.client_id)
            .field("client_secret", &redact(&self.client_secret))
            .field("access_token", &redact(&self.access_token))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

fn redact(value: &str) -> &'static str {
    if value.is_empty() { "<empty>" } else { "<redacted>" }
}

fn describe_remaining(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let remaining = expires_at - now;
    if remaining <= TimeDelta::zero() {
        return "expired".to_string();
    }
    format!(
        "expires at {} ({} min left)",
        expires_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"),
        remaining.num_minutes()
    )
}

//! App access token lifecycle.
//!
//! [`CredentialManager`] owns the client credentials and the cached token.
//! Callers ask for a token with [`CredentialManager::ensure_token`]; at most
//! one exchange runs at a time and callers that queued behind it reuse its
//! result.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use super::manager::CredentialExchanger;
use super::store::{CredentialStore, NoopCredentialStore};
use super::types::{AccessToken, CredentialState};
use super::CredentialError;

pub struct CredentialManager {
    exchanger: Arc<dyn CredentialExchanger>,
    store: Arc<dyn CredentialStore>,
    state: RwLock<CredentialState>,
    /// Held for the whole exchange so only one runs at a time.
    refresh_lock: Mutex<()>,
    /// Bumped whenever the cached token is replaced or dropped.
    generation: AtomicU64,
}

impl CredentialManager {
    pub fn new(state: CredentialState, exchanger: Arc<dyn CredentialExchanger>) -> Self {
        Self {
            exchanger,
            store: Arc::new(NoopCredentialStore),
            state: RwLock::new(state),
            refresh_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    /// Persist every newly issued token through `store`.
    pub fn with_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.store = store;
        self
    }

    /// Return a usable token, exchanging credentials when needed.
    ///
    /// Without `force_refresh` a cached token with more than the refresh
    /// buffer left is returned as is. With `force_refresh` the cached token is
    /// ignored, unless another caller replaced it while this one was waiting
    /// for the refresh lock.
    #[instrument(skip(self), fields(platform = self.exchanger.platform_id()))]
    pub async fn ensure_token(&self, force_refresh: bool) -> Result<AccessToken, CredentialError> {
        let observed = self.generation.load(Ordering::Acquire);

        if !force_refresh && let Some(token) = self.state.read().fresh_token(Utc::now()) {
            return Ok(token);
        }

        let _guard = self.refresh_lock.lock().await;

        // Double-check after acquiring the lock
        let replaced = self.generation.load(Ordering::Acquire) != observed;
        if (replaced || !force_refresh)
            && let Some(token) = self.state.read().fresh_token(Utc::now())
        {
            debug!(replaced, "Reusing token refreshed by another caller");
            return Ok(token);
        }

        self.refresh_locked().await
    }

    /// Exchange credentials. Must be called with `refresh_lock` held.
    async fn refresh_locked(&self) -> Result<AccessToken, CredentialError> {
        let (client_id, client_secret) = {
            let state = self.state.read();
            (state.client_id.clone(), state.client_secret.clone())
        };
        if client_id.is_empty() {
            return Err(CredentialError::MissingCredentials("client_id"));
        }
        if client_secret.is_empty() {
            return Err(CredentialError::MissingCredentials("client_secret"));
        }

        info!("Requesting a new app access token");
        let issued = match self.exchanger.exchange(&client_id, &client_secret).await {
            Ok(issued) => issued,
            Err(e) => {
                error!(error = %e, "Token exchange failed");
                return Err(e);
            }
        };

        let lifetime = i64::try_from(issued.expires_in_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX);
        let now = Utc::now();
        let token = AccessToken {
            token: issued.access_token,
            client_id,
            expires_at: now.checked_add_signed(lifetime).unwrap_or(DateTime::<Utc>::MAX_UTC),
        };

        self.state.write().store_token(&token);
        self.generation.fetch_add(1, Ordering::AcqRel);

        info!(expiry = %token.describe_expiry(now), "App access token obtained");

        if let Err(e) = self.store.save_token(&token).await {
            warn!(error = %e, "Failed to persist access token (non-fatal)");
        }

        Ok(token)
    }

    /// Replace the client credentials. The cached token is dropped.
    pub async fn update_client(&self, client_id: &str, client_secret: &str) {
        let _guard = self.refresh_lock.lock().await;
        {
            let mut state = self.state.write();
            *state = CredentialState::new(client_id, client_secret);
        }
        self.generation.fetch_add(1, Ordering::AcqRel);
        info!("Client credentials updated, cached token cleared");
    }

    /// The cached token without touching the network. May be stale.
    pub fn cached_token(&self) -> Option<AccessToken> {
        self.state.read().cached_token()
    }

    /// Token status for display.
    pub fn describe(&self) -> String {
        self.state.read().describe_expiry(Utc::now())
    }

    pub fn snapshot(&self) -> CredentialState {
        self.state.read().clone()
    }
}

//! Configuration service implementation.
//!
//! The ConfigService owns the live [`WatchConfig`]. Every mutation goes
//! through it and is persisted before the call returns; the rest of the
//! application only ever sees snapshots.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::info;

use super::store::ConfigStore;
use super::types::{PollInterval, WatchConfig, WatchSet};
use crate::Result;
use crate::credentials::{AccessToken, CredentialStore};
use crate::monitor::normalize_login;

pub struct ConfigService<S: ConfigStore> {
    store: Arc<S>,
    /// Held across the store write so saves land in mutation order.
    config: Mutex<WatchConfig>,
}

impl<S: ConfigStore> ConfigService<S> {
    /// Load the current config from `store`.
    pub async fn load(store: Arc<S>) -> Result<Self> {
        let config = store.load().await?;
        Ok(Self {
            store,
            config: Mutex::new(config),
        })
    }

    pub async fn snapshot(&self) -> WatchConfig {
        self.config.lock().await.clone()
    }

    async fn update<T>(&self, mutate: impl FnOnce(&mut WatchConfig) -> Result<T>) -> Result<T> {
        let mut config = self.config.lock().await;
        let mut next = config.clone();
        let value = mutate(&mut next)?;
        self.store.save(&next).await?;
        *config = next;
        Ok(value)
    }

    // ========== Channels ==========

    pub async fn channels(&self) -> WatchSet {
        self.config.lock().await.watch_set()
    }

    /// Add a channel. Fails on empty input or when it is already watched.
    pub async fn add_channel(&self, login: &str) -> Result<String> {
        let login = self
            .update(|config| {
                let mut set = config.watch_set();
                let login = set.insert(login)?;
                config.channels = set.into_vec();
                Ok(login)
            })
            .await?;
        info!(%login, "Channel added");
        Ok(login)
    }

    /// Remove a channel. Returns whether it was watched.
    pub async fn remove_channel(&self, login: &str) -> Result<bool> {
        let removed = self
            .update(|config| {
                let mut set = config.watch_set();
                let removed = set.remove(login);
                config.channels = set.into_vec();
                Ok(removed)
            })
            .await?;
        if removed {
            info!(login = ?normalize_login(login), "Channel removed");
        }
        Ok(removed)
    }

    // ========== Poll Interval ==========

    pub async fn poll_interval(&self) -> PollInterval {
        self.config.lock().await.poll_interval()
    }

    pub async fn set_poll_interval(&self, interval: PollInterval) -> Result<()> {
        self.update(|config| {
            config.poll_interval_sec = interval.as_secs();
            Ok(())
        })
        .await?;
        info!(%interval, "Poll interval updated");
        Ok(())
    }

    // ========== Credentials ==========

    /// Replace the client credentials.
    ///
    /// `client_secret` of `None` keeps the current secret. When either value
    /// changes, the cached token is dropped.
    pub async fn set_credentials(
        &self,
        client_id: &str,
        client_secret: Option<&str>,
        save_client_secret: bool,
    ) -> Result<()> {
        let changed = self
            .update(|config| {
                let client_id = client_id.trim();
                let client_secret = client_secret
                    .map(|s| s.trim().to_string())
                    .unwrap_or_else(|| config.client_secret.clone());

                let changed =
                    config.client_id != client_id || config.client_secret != client_secret;
                config.client_id = client_id.to_string();
                config.client_secret = client_secret;
                config.save_client_secret = save_client_secret;
                if changed {
                    config.access_token.clear();
                    config.token_expires_at = 0;
                }
                Ok(changed)
            })
            .await?;

        if changed {
            info!("Credentials updated, cached token cleared");
        }
        Ok(())
    }

    pub async fn record_token(&self, token: &str, expires_at: DateTime<Utc>) -> Result<()> {
        self.update(|config| {
            config.access_token = token.to_string();
            config.token_expires_at = expires_at.timestamp();
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl<S: ConfigStore> CredentialStore for ConfigService<S> {
    async fn save_token(&self, token: &AccessToken) -> Result<()> {
        // The token belongs to whatever client id it was issued for.
        if self.config.lock().await.client_id != token.client_id {
            return Ok(());
        }
        self.record_token(&token.token, token.expires_at).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;
    use crate::Error;
    use crate::config::MemoryStore;

    async fn service_with(config: WatchConfig) -> (Arc<MemoryStore>, ConfigService<MemoryStore>) {
        let store = Arc::new(MemoryStore::with_config(config));
        let service = ConfigService::load(store.clone()).await.unwrap();
        (store, service)
    }

    #[tokio::test]
    async fn add_and_remove_channels_persist() {
        let (store, service) = service_with(WatchConfig::default()).await;

        assert_eq!(service.add_channel("Alice").await.unwrap(), "alice");
        assert_eq!(service.add_channel("bob").await.unwrap(), "bob");
        assert!(matches!(
            service.add_channel(" ALICE ").await,
            Err(Error::Validation(_))
        ));
        assert!(service.remove_channel("BOB").await.unwrap());
        assert!(!service.remove_channel("carol").await.unwrap());

        assert_eq!(store.saved().unwrap().channels, vec!["alice".to_string()]);
        assert_eq!(service.channels().await.as_slice(), &["alice".to_string()]);
    }

    #[tokio::test]
    async fn rejected_mutation_is_not_saved() {
        let (store, service) = service_with(WatchConfig::default()).await;

        assert!(service.add_channel("").await.is_err());
        assert_eq!(store.save_count(), 0);
    }

    #[tokio::test]
    async fn changing_credentials_clears_token() {
        let (store, service) = service_with(WatchConfig {
            client_id: "cid".into(),
            client_secret: "secret".into(),
            access_token: "tok".into(),
            token_expires_at: 4_102_444_800,
            ..Default::default()
        })
        .await;

        // Same values keep the token.
        service.set_credentials("cid", None, false).await.unwrap();
        assert_eq!(service.snapshot().await.access_token, "tok");

        service.set_credentials("cid", Some("other"), true).await.unwrap();
        let config = service.snapshot().await;
        assert_eq!(config.access_token, "");
        assert_eq!(config.token_expires_at, 0);
        assert_eq!(store.saved().unwrap().client_secret, "other");
    }

    #[tokio::test]
    async fn interval_is_persisted_in_seconds() {
        let (store, service) = service_with(WatchConfig::default()).await;

        service
            .set_poll_interval(PollInterval::from_parts("2", "30"))
            .await
            .unwrap();
        assert_eq!(service.poll_interval().await.as_secs(), 150);
        assert_eq!(store.saved().unwrap().poll_interval_sec, 150);
    }

    #[tokio::test]
    async fn issued_token_is_recorded_for_matching_client() {
        let (store, service) = service_with(WatchConfig {
            client_id: "cid".into(),
            ..Default::default()
        })
        .await;
        let expires_at = Utc::now() + TimeDelta::hours(1);

        let stale = AccessToken {
            token: "old-client".into(),
            client_id: "previous".into(),
            expires_at,
        };
        service.save_token(&stale).await.unwrap();
        assert_eq!(store.save_count(), 0);

        let token = AccessToken {
            token: "tok".into(),
            client_id: "cid".into(),
            expires_at,
        };
        service.save_token(&token).await.unwrap();
        let saved = store.saved().unwrap();
        assert_eq!(saved.access_token, "tok");
        assert_eq!(saved.token_expires_at, expires_at.timestamp());
    }
}

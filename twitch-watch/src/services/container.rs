//! Service container.
//!
//! Builds the Helix client, credential manager and status fetcher from the
//! loaded config and spawns the scheduler on top of them.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use twitch_helix::{DEFAULT_TIMEOUT, HelixClient, HelixEndpoints};

use crate::Result;
use crate::config::{ConfigService, ConfigStore, PollInterval, WatchConfig};
use crate::credentials::{CredentialError, CredentialManager, platforms::TwitchCredentialExchanger};
use crate::monitor::StatusFetcher;
use crate::notification::{EffectSink, StatusObserver};
use crate::scheduler::{PollScheduler, PollSchedulerConfig, SchedulerHandle};

/// Endpoints for `config`: `helix_base_url` moves both endpoints, `token_url`
/// then overrides the token endpoint alone.
pub fn endpoints_for(config: &WatchConfig) -> HelixEndpoints {
    let mut endpoints = config
        .helix_base_url
        .as_deref()
        .map(HelixEndpoints::with_base)
        .unwrap_or_default();
    if let Some(token_url) = &config.token_url {
        endpoints.token_url = token_url.clone();
    }
    endpoints
}

pub struct ServiceContainer<S: ConfigStore> {
    pub config_service: Arc<ConfigService<S>>,
    pub credentials: Arc<CredentialManager>,
    pub fetcher: Arc<StatusFetcher>,
    cancellation_token: CancellationToken,
}

impl<S: ConfigStore + 'static> ServiceContainer<S> {
    pub async fn new(store: Arc<S>) -> Result<Self> {
        let config_service = Arc::new(ConfigService::load(store).await?);
        let config = config_service.snapshot().await;

        let client = HelixClient::new(endpoints_for(&config), DEFAULT_TIMEOUT)?;
        let exchanger = Arc::new(TwitchCredentialExchanger::new(client.clone()));
        let credentials = Arc::new(
            CredentialManager::new(config.credential_state(), exchanger)
                .with_store(config_service.clone()),
        );
        let fetcher = Arc::new(StatusFetcher::new(client, credentials.clone()));

        Ok(Self {
            config_service,
            credentials,
            fetcher,
            cancellation_token: CancellationToken::new(),
        })
    }

    /// Use `client_id`/`client_secret` for this process without saving them.
    pub async fn override_credentials(&self, client_id: &str, client_secret: &str) {
        self.credentials.update_client(client_id, client_secret).await;
    }

    /// Save new credentials and drop the cached token.
    pub async fn update_credentials(
        &self,
        client_id: &str,
        client_secret: Option<&str>,
        save_client_secret: bool,
    ) -> Result<()> {
        self.config_service
            .set_credentials(client_id, client_secret, save_client_secret)
            .await?;
        let config = self.config_service.snapshot().await;
        self.credentials
            .update_client(&config.client_id, &config.client_secret)
            .await;
        Ok(())
    }

    /// Try to have a token ready before polling starts.
    ///
    /// Failures are logged with a hint; polling still starts and each cycle
    /// retries on its own.
    pub async fn warm_up_token(&self) {
        match self.credentials.ensure_token(false).await {
            Ok(_) => info!(token = %self.credentials.describe(), "Access token ready"),
            Err(CredentialError::MissingCredentials(field)) => warn!(
                field,
                "Credentials incomplete, set them with `twitch-watch credentials --client-id <ID> --client-secret <SECRET>`"
            ),
            Err(e) => warn!(error = %e, "Could not obtain an access token yet"),
        }
    }

    pub async fn spawn_scheduler(
        &self,
        effects: Arc<dyn EffectSink>,
        observer: Arc<dyn StatusObserver>,
    ) -> (SchedulerHandle, JoinHandle<()>) {
        let config = self.config_service.snapshot().await;
        let scheduler_config = PollSchedulerConfig {
            interval: config.poll_interval(),
            ..Default::default()
        };

        PollScheduler::spawn(
            scheduler_config,
            config.watch_set(),
            self.fetcher.clone(),
            effects,
            observer,
            self.cancellation_token.child_token(),
        )
    }

    /// Watch `login` from now on, in the config and in the running scheduler.
    pub async fn add_channel(&self, scheduler: &SchedulerHandle, login: &str) -> Result<String> {
        let login = self.config_service.add_channel(login).await?;
        scheduler
            .update_watch_set(self.config_service.channels().await)
            .await?;
        Ok(login)
    }

    /// Returns false when `login` was not watched.
    pub async fn remove_channel(&self, scheduler: &SchedulerHandle, login: &str) -> Result<bool> {
        if !self.config_service.remove_channel(login).await? {
            return Ok(false);
        }
        scheduler
            .update_watch_set(self.config_service.channels().await)
            .await?;
        Ok(true)
    }

    pub async fn set_poll_interval(
        &self,
        scheduler: &SchedulerHandle,
        interval: PollInterval,
    ) -> Result<()> {
        self.config_service.set_poll_interval(interval).await?;
        scheduler.set_interval(interval).await
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    pub fn shutdown(&self) {
        info!("Shutting down services");
        self.cancellation_token.cancel();
    }
}

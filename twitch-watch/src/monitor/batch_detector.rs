//! Batched live-status fetching.
//!
//! Helix answers up to 100 logins per request and lists only the live ones,
//! so every login missing from an answer is offline.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument, warn};
use twitch_helix::{HelixClient, HelixError, MAX_LOGINS_PER_REQUEST, Stream};

use crate::credentials::CredentialManager;

use super::detector::{ChannelStatus, normalize_login, normalize_logins};
use super::events::{ErrorKind, FetchIssue};

/// Result of one fetch over the whole watch set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchOutcome {
    /// One entry per requested login.
    pub statuses: BTreeMap<String, ChannelStatus>,
    /// Recoverable issues, in the order they happened.
    pub issues: Vec<FetchIssue>,
}

impl FetchOutcome {
    /// Outcome with every login offline and no issues.
    pub fn all_offline(logins: &[String]) -> Self {
        Self {
            statuses: logins
                .iter()
                .map(|login| (login.clone(), ChannelStatus::offline(login.clone())))
                .collect(),
            issues: Vec::new(),
        }
    }

    pub fn live_count(&self) -> usize {
        self.statuses.values().filter(|s| s.is_live).count()
    }

    pub fn get(&self, login: &str) -> Option<&ChannelStatus> {
        self.statuses.get(login)
    }

    fn apply_streams(&mut self, streams: &[Stream]) {
        for stream in streams {
            let Some(login) = stream.user_login.as_deref().and_then(normalize_login) else {
                debug!(stream_id = ?stream.id, "Ignoring stream entry without user_login");
                continue;
            };
            match self.statuses.get_mut(&login) {
                Some(slot) => *slot = ChannelStatus::live_from_stream(login, stream),
                None => debug!(%login, "Ignoring stream entry for a login that was not requested"),
            }
        }
    }
}

/// Anything that can produce a status snapshot for a list of logins.
///
/// Never fails as a whole: problems are carried in [`FetchOutcome::issues`].
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch_statuses(&self, logins: &[String]) -> FetchOutcome;
}

/// [`StatusSource`] backed by the Helix streams endpoint.
pub struct StatusFetcher {
    client: HelixClient,
    credentials: Arc<CredentialManager>,
}

impl StatusFetcher {
    pub fn new(client: HelixClient, credentials: Arc<CredentialManager>) -> Self {
        Self {
            client,
            credentials,
        }
    }

    /// Fetch one batch. A 401 forces a token refresh and retries once.
    async fn fetch_batch(
        &self,
        batch: &[String],
        issues: &mut Vec<FetchIssue>,
    ) -> Result<Vec<Stream>, FetchIssue> {
        let token = self
            .credentials
            .ensure_token(false)
            .await
            .map_err(|e| FetchIssue::from_credential(&e, batch.len()))?;

        match self
            .client
            .get_streams(&token.client_id, &token.token, batch)
            .await
        {
            Ok(streams) => return Ok(streams),
            Err(e @ HelixError::Unauthorized { .. }) => {
                warn!(batch_size = batch.len(), "Access token rejected, forcing refresh");
                issues.push(FetchIssue::new(ErrorKind::AuthExpired, e.to_string(), 0));
            }
            Err(e) => return Err(FetchIssue::from_helix(&e, batch.len())),
        }

        let token = self
            .credentials
            .ensure_token(true)
            .await
            .map_err(|e| FetchIssue::from_credential(&e, batch.len()))?;

        self.client
            .get_streams(&token.client_id, &token.token, batch)
            .await
            .map_err(|e| match e {
                HelixError::Unauthorized { .. } => FetchIssue::new(
                    ErrorKind::FetchError,
                    format!("token rejected again after refresh: {e}"),
                    batch.len(),
                ),
                e => FetchIssue::from_helix(&e, batch.len()),
            })
    }
}

#[async_trait]
impl StatusSource for StatusFetcher {
    #[instrument(skip_all, fields(requested = logins.len()))]
    async fn fetch_statuses(&self, logins: &[String]) -> FetchOutcome {
        let logins = normalize_logins(logins);
        let mut outcome = FetchOutcome::all_offline(&logins);
        if logins.is_empty() {
            return outcome;
        }

        for (index, batch) in logins.chunks(MAX_LOGINS_PER_REQUEST).enumerate() {
            match self.fetch_batch(batch, &mut outcome.issues).await {
                Ok(streams) => {
                    debug!(batch = index, live = streams.len(), "Batch fetched");
                    outcome.apply_streams(&streams);
                }
                Err(issue) => {
                    warn!(batch = index, %issue, "Batch failed, channels default to offline");
                    outcome.issues.push(issue);
                }
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::Router;
    use axum::extract::{RawQuery, State};
    use chrono::{TimeDelta, Utc};
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::{IntoResponse, Response};
    use axum::routing::{get, post};
    use tokio::net::TcpListener;
    use twitch_helix::{DEFAULT_TIMEOUT, HelixEndpoints};

    use super::*;
    use crate::credentials::{CredentialState, platforms::TwitchCredentialExchanger};

    /// Fake Helix: issues `token-N` on each exchange and answers the
    /// streams endpoint according to `mode`.
    #[derive(Clone)]
    struct FakeHelix {
        exchanges: Arc<AtomicUsize>,
        stream_calls: Arc<AtomicUsize>,
        batch_sizes: Arc<Mutex<Vec<usize>>>,
        mode: Mode,
    }

    #[derive(Clone, Copy)]
    enum Mode {
        /// `alice` live with id 100, everyone else offline.
        AliceLive,
        /// 401 for `token-1`, normal answers afterwards.
        RejectFirstToken,
        /// Always 401.
        AlwaysUnauthorized,
        /// Always 500.
        ServerError,
        /// 500 for the batch that asks for `user0`, normal answers otherwise.
        FailBatchWithUser0,
    }

    impl FakeHelix {
        fn new(mode: Mode) -> Self {
            Self {
                exchanges: Arc::default(),
                stream_calls: Arc::default(),
                batch_sizes: Arc::default(),
                mode,
            }
        }
    }

    async fn token(State(fake): State<FakeHelix>) -> impl IntoResponse {
        let n = fake.exchanges.fetch_add(1, Ordering::SeqCst) + 1;
        format!(r#"{{"access_token":"token-{n}","expires_in":3600}}"#)
    }

    async fn streams(
        State(fake): State<FakeHelix>,
        headers: HeaderMap,
        RawQuery(query): RawQuery,
    ) -> Response {
        fake.stream_calls.fetch_add(1, Ordering::SeqCst);
        let query = query.unwrap_or_default();
        fake.batch_sizes
            .lock()
            .unwrap()
            .push(query.matches("user_login=").count());

        let bearer = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        match fake.mode {
            Mode::AlwaysUnauthorized => {
                return (StatusCode::UNAUTHORIZED, "Invalid OAuth token").into_response();
            }
            Mode::ServerError => {
                return (StatusCode::INTERNAL_SERVER_ERROR, "x".repeat(500)).into_response();
            }
            Mode::RejectFirstToken if bearer == "Bearer token-1" => {
                return (StatusCode::UNAUTHORIZED, "Invalid OAuth token").into_response();
            }
            Mode::FailBatchWithUser0 if query.split('&').any(|p| p == "user_login=user0") => {
                return (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response();
            }
            _ => {}
        }

        if query.split('&').any(|p| p == "user_login=alice") {
            r#"{"data":[{"id":"100","user_login":"alice","title":"Speedrun","started_at":"2024-05-01T10:00:00Z"}]}"#
                .into_response()
        } else {
            r#"{"data":[]}"#.into_response()
        }
    }

    async fn fetcher_for(fake: FakeHelix, state: CredentialState) -> StatusFetcher {
        let router = Router::new()
            .route("/oauth2/token", post(token))
            .route("/helix/streams", get(streams))
            .with_state(fake);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let client = HelixClient::new(
            HelixEndpoints::with_base(&format!("http://{addr}")),
            DEFAULT_TIMEOUT,
        )
        .unwrap();
        let exchanger = Arc::new(TwitchCredentialExchanger::new(client.clone()));
        let credentials = Arc::new(CredentialManager::new(state, exchanger));
        StatusFetcher::new(client, credentials)
    }

    fn logins(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn maps_live_and_offline_channels() {
        let fake = FakeHelix::new(Mode::AliceLive);
        let fetcher = fetcher_for(fake.clone(), CredentialState::new("cid", "secret")).await;

        let outcome = fetcher
            .fetch_statuses(&logins(&["Alice", " bob ", "alice", ""]))
            .await;

        assert!(outcome.issues.is_empty(), "{:?}", outcome.issues);
        assert_eq!(outcome.statuses.len(), 2);

        let alice = outcome.get("alice").unwrap();
        assert!(alice.is_live);
        assert_eq!(alice.stream_id, "100");
        assert_eq!(alice.title, "Speedrun");
        assert_eq!(alice.started_at, "2024-05-01T10:00:00Z");
        assert!(!outcome.get("bob").unwrap().is_live);
        assert_eq!(outcome.live_count(), 1);

        assert_eq!(fake.exchanges.load(Ordering::SeqCst), 1);
        assert_eq!(fake.stream_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_input_makes_no_requests() {
        let fake = FakeHelix::new(Mode::AliceLive);
        let fetcher = fetcher_for(fake.clone(), CredentialState::new("cid", "secret")).await;

        let outcome = fetcher.fetch_statuses(&logins(&["", "  "])).await;
        assert!(outcome.statuses.is_empty());
        assert!(outcome.issues.is_empty());
        assert_eq!(fake.exchanges.load(Ordering::SeqCst), 0);
        assert_eq!(fake.stream_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn large_watch_sets_are_split_into_batches_of_100() {
        let fake = FakeHelix::new(Mode::AliceLive);
        let fetcher = fetcher_for(fake.clone(), CredentialState::new("cid", "secret")).await;

        let names: Vec<String> = (0..150).map(|i| format!("user{i}")).collect();
        let outcome = fetcher.fetch_statuses(&names).await;

        assert_eq!(outcome.statuses.len(), 150);
        assert_eq!(*fake.batch_sizes.lock().unwrap(), vec![100, 50]);
        // One exchange, reused by the second batch.
        assert_eq!(fake.exchanges.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_batch_does_not_stop_its_siblings() {
        let fake = FakeHelix::new(Mode::FailBatchWithUser0);
        let fetcher = fetcher_for(fake.clone(), CredentialState::new("cid", "secret")).await;

        let mut names: Vec<String> = (0..150).map(|i| format!("user{i}")).collect();
        names.push("alice".to_string());
        let outcome = fetcher.fetch_statuses(&names).await;

        assert_eq!(outcome.statuses.len(), 151);
        assert_eq!(outcome.live_count(), 1);
        assert!(outcome.get("alice").unwrap().is_live);
        assert!(!outcome.get("user0").unwrap().is_live);

        assert_eq!(outcome.issues.len(), 1);
        assert_eq!(outcome.issues[0].kind, ErrorKind::FetchError);
        assert_eq!(outcome.issues[0].affected, 100);
        assert_eq!(*fake.batch_sizes.lock().unwrap(), vec![100, 51]);
    }

    #[tokio::test]
    async fn unreachable_streams_endpoint_is_network_error() {
        // Bind then drop to get a port nothing listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = HelixClient::new(
            HelixEndpoints::with_base(&format!("http://{addr}")),
            DEFAULT_TIMEOUT,
        )
        .unwrap();
        let state = CredentialState::new("cid", "secret")
            .with_cached_token("cached", Some(Utc::now() + TimeDelta::hours(1)));
        let exchanger = Arc::new(TwitchCredentialExchanger::new(client.clone()));
        let fetcher = StatusFetcher::new(client, Arc::new(CredentialManager::new(state, exchanger)));

        let outcome = fetcher.fetch_statuses(&logins(&["alice", "bob"])).await;

        assert_eq!(outcome.live_count(), 0);
        assert_eq!(outcome.statuses.len(), 2);
        assert_eq!(outcome.issues.len(), 1);
        assert_eq!(outcome.issues[0].kind, ErrorKind::NetworkError);
        assert_eq!(outcome.issues[0].affected, 2);
    }

    #[tokio::test]
    async fn unauthorized_forces_refresh_and_retries_once() {
        let fake = FakeHelix::new(Mode::RejectFirstToken);
        let fetcher = fetcher_for(fake.clone(), CredentialState::new("cid", "secret")).await;

        let outcome = fetcher.fetch_statuses(&logins(&["alice"])).await;

        assert!(outcome.get("alice").unwrap().is_live);
        assert_eq!(outcome.issues.len(), 1);
        assert_eq!(outcome.issues[0].kind, ErrorKind::AuthExpired);
        assert_eq!(fake.exchanges.load(Ordering::SeqCst), 2);
        assert_eq!(fake.stream_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn second_unauthorized_gives_up_for_that_batch() {
        let fake = FakeHelix::new(Mode::AlwaysUnauthorized);
        let fetcher = fetcher_for(fake.clone(), CredentialState::new("cid", "secret")).await;

        let outcome = fetcher.fetch_statuses(&logins(&["alice", "bob"])).await;

        assert!(!outcome.get("alice").unwrap().is_live);
        assert_eq!(outcome.issues.len(), 2);
        assert_eq!(outcome.issues[0].kind, ErrorKind::AuthExpired);
        assert_eq!(outcome.issues[1].kind, ErrorKind::FetchError);
        assert_eq!(outcome.issues[1].affected, 2);
        assert_eq!(fake.stream_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn server_error_is_reported_with_truncated_body() {
        let fake = FakeHelix::new(Mode::ServerError);
        let fetcher = fetcher_for(fake, CredentialState::new("cid", "secret")).await;

        let outcome = fetcher.fetch_statuses(&logins(&["alice"])).await;

        assert!(!outcome.get("alice").unwrap().is_live);
        assert_eq!(outcome.issues.len(), 1);
        let issue = &outcome.issues[0];
        assert_eq!(issue.kind, ErrorKind::FetchError);
        assert!(issue.detail.contains("500"));
        assert!(!issue.detail.contains(&"x".repeat(201)));
    }

    #[tokio::test]
    async fn missing_credentials_default_everyone_offline() {
        let fake = FakeHelix::new(Mode::AliceLive);
        let fetcher = fetcher_for(fake.clone(), CredentialState::new("", "")).await;

        let outcome = fetcher.fetch_statuses(&logins(&["alice", "bob"])).await;

        assert_eq!(outcome.live_count(), 0);
        assert_eq!(outcome.statuses.len(), 2);
        assert_eq!(outcome.issues[0].kind, ErrorKind::MissingCredentials);
        assert_eq!(fake.stream_calls.load(Ordering::SeqCst), 0);
    }
}

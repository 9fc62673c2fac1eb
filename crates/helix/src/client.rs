use std::sync::OnceLock;
use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use tracing::{debug, trace};

use crate::error::{HelixError, snippet};
use crate::models::{Stream, StreamsResponse, TokenResponse};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Helix caps repeated `user_login` parameters at 100 per request.
pub const MAX_LOGINS_PER_REQUEST: usize = 100;

pub const DEFAULT_TOKEN_URL: &str = "https://id.twitch.tv/oauth2/token";
pub const DEFAULT_STREAMS_URL: &str = "https://api.twitch.tv/helix/streams";

pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            // Another crate installed one first.
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Endpoint URLs. Overridable so tests can point at a local server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelixEndpoints {
    pub token_url: String,
    pub streams_url: String,
}

impl Default for HelixEndpoints {
    fn default() -> Self {
        Self {
            token_url: DEFAULT_TOKEN_URL.to_string(),
            streams_url: DEFAULT_STREAMS_URL.to_string(),
        }
    }
}

impl HelixEndpoints {
    /// Endpoints rooted at `base`, e.g. `http://127.0.0.1:8080`.
    pub fn with_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            token_url: format!("{base}/oauth2/token"),
            streams_url: format!("{base}/helix/streams"),
        }
    }
}

/// Thin client for the two Helix endpoints the watcher needs.
#[derive(Debug, Clone)]
pub struct HelixClient {
    client: Client,
    endpoints: HelixEndpoints,
}

impl HelixClient {
    /// Build a client with its own connection pool and the given request timeout.
    pub fn new(endpoints: HelixEndpoints, timeout: Duration) -> Result<Self, HelixError> {
        install_rustls_provider();

        let mut builder = Client::builder().user_agent(concat!(
            env!("CARGO_PKG_NAME"),
            "/",
            env!("CARGO_PKG_VERSION")
        ));
        if timeout > Duration::ZERO {
            builder = builder.timeout(timeout);
        }

        Ok(Self::with_client(builder.build()?, endpoints))
    }

    pub fn with_client(client: Client, endpoints: HelixEndpoints) -> Self {
        Self { client, endpoints }
    }

    pub fn endpoints(&self) -> &HelixEndpoints {
        &self.endpoints
    }

    /// Client-credentials exchange for an app access token.
    ///
    /// Returns the raw response; a 2xx answer that lacks a token is not an
    /// error at this layer.
    pub async fn exchange_client_credentials(
        &self,
        client_id: &str,
        client_secret: &str,
    ) -> Result<TokenResponse, HelixError> {
        debug!(url = %self.endpoints.token_url, "Requesting app access token");

        let response = self
            .client
            .post(&self.endpoints.token_url)
            .form(&[
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await?;

        let body = Self::success_body(response).await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Query live streams for up to [`MAX_LOGINS_PER_REQUEST`] logins.
    ///
    /// Offline channels are simply absent from the result.
    pub async fn get_streams(
        &self,
        client_id: &str,
        access_token: &str,
        logins: &[String],
    ) -> Result<Vec<Stream>, HelixError> {
        if logins.len() > MAX_LOGINS_PER_REQUEST {
            return Err(HelixError::BatchTooLarge(logins.len()));
        }

        let params: Vec<(&str, &str)> = logins
            .iter()
            .map(|login| ("user_login", login.as_str()))
            .collect();

        let response = self
            .client
            .get(&self.endpoints.streams_url)
            .header("Client-Id", client_id)
            .bearer_auth(access_token)
            .query(&params)
            .send()
            .await?;

        let body = Self::success_body(response).await?;
        trace!(%body, "streams response");
        let parsed: StreamsResponse = serde_json::from_str(&body)?;
        Ok(parsed.data)
    }

    async fn success_body(response: Response) -> Result<String, HelixError> {
        let status = response.status();
        let body = response.text().await?;

        if status == StatusCode::UNAUTHORIZED {
            return Err(HelixError::Unauthorized {
                body: snippet(&body),
            });
        }
        if !status.is_success() {
            return Err(HelixError::Status {
                status: status.as_u16(),
                body: snippet(&body),
            });
        }
        Ok(body)
    }
}

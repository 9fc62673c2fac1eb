//! Twitch client-credentials exchange.

use async_trait::async_trait;
use tracing::{debug, warn};
use twitch_helix::HelixClient;

use crate::credentials::{CredentialError, CredentialExchanger, IssuedToken};

pub struct TwitchCredentialExchanger {
    client: HelixClient,
}

impl TwitchCredentialExchanger {
    pub fn new(client: HelixClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CredentialExchanger for TwitchCredentialExchanger {
    fn platform_id(&self) -> &'static str {
        "twitch"
    }

    async fn exchange(
        &self,
        client_id: &str,
        client_secret: &str,
    ) -> Result<IssuedToken, CredentialError> {
        let response = self
            .client
            .exchange_client_credentials(client_id, client_secret)
            .await
            .map_err(|e| {
                warn!(error = %e, "Twitch token endpoint rejected the exchange");
                CredentialError::from(e)
            })?;

        let Some((access_token, expires_in_secs)) = response.usable() else {
            return Err(CredentialError::MalformedResponse(
                "response is missing access_token or expires_in".to_string(),
            ));
        };
        debug!(expires_in_secs, "Twitch issued an app access token");

        Ok(IssuedToken {
            access_token: access_token.to_string(),
            expires_in_secs,
        })
    }
}

//! Platform-specific token exchange trait.

use async_trait::async_trait;

use super::CredentialError;

/// Result of a successful client-credentials exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub access_token: String,
    /// Lifetime in seconds as reported by the platform.
    pub expires_in_secs: u64,
}

/// Exchanges a client id and secret for an app access token.
///
/// Implementations perform exactly one network exchange per call. Caching,
/// expiry and single-flight are handled by [`super::CredentialManager`].
#[async_trait]
pub trait CredentialExchanger: Send + Sync {
    /// Platform identifier (e.g., "twitch").
    fn platform_id(&self) -> &'static str;

    /// Perform the exchange.
    ///
    /// # Returns
    /// * `Ok(IssuedToken)` - token and lifetime are both present
    /// * `Err(ExchangeFailed)` - non-success HTTP status
    /// * `Err(MalformedResponse)` - success status without a usable token
    /// * `Err(Network)` - the endpoint could not be reached
    async fn exchange(
        &self,
        client_id: &str,
        client_secret: &str,
    ) -> Result<IssuedToken, CredentialError>;
}

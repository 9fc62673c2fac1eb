//! Token persistence abstraction.
//!
//! A freshly issued token is written back so the next launch can reuse it.
//! The concrete implementation lives in the config layer.

use async_trait::async_trait;

use super::types::AccessToken;
use crate::Result;

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Persist a newly issued token and its expiry.
    async fn save_token(&self, token: &AccessToken) -> Result<()>;
}

/// Store that keeps nothing. Used by one-shot commands and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCredentialStore;

#[async_trait]
impl CredentialStore for NoopCredentialStore {
    async fn save_token(&self, _token: &AccessToken) -> Result<()> {
        Ok(())
    }
}

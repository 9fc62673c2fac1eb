//! Credential management.
//!
//! - [`CredentialState`]: client id, secret and the cached token
//! - [`CredentialExchanger`]: platform-specific token exchange
//! - [`CredentialStore`]: persistence of issued tokens
//! - [`CredentialManager`]: caching, expiry and single-flight refresh

mod error;
mod manager;
mod service;
mod store;
mod types;

pub mod platforms;

pub use error::CredentialError;
pub use manager::{CredentialExchanger, IssuedToken};
pub use service::CredentialManager;
pub use store::{CredentialStore, NoopCredentialStore};
pub use types::{AccessToken, CredentialState, REFRESH_BUFFER_SECS};

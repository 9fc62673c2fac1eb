//! Minimal Twitch Helix client.
//!
//! Covers the two endpoints a live-status watcher needs:
//! - the client-credentials token exchange (`POST /oauth2/token`)
//! - the batched stream status query (`GET /helix/streams`)

mod client;
pub mod error;
pub mod models;

pub use client::{
    DEFAULT_STREAMS_URL, DEFAULT_TIMEOUT, DEFAULT_TOKEN_URL, HelixClient, HelixEndpoints,
    MAX_LOGINS_PER_REQUEST, install_rustls_provider,
};
pub use error::HelixError;
pub use models::{Stream, StreamsResponse, TokenResponse};

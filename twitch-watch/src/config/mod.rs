//! Configuration management.
//!
//! - [`WatchConfig`]: the persisted settings
//! - [`ConfigStore`]: where they live ([`JsonFileStore`], [`MemoryStore`])
//! - [`ConfigService`]: owner of the live config

mod service;
mod store;
mod types;

pub use service::ConfigService;
pub use store::{ConfigStore, JsonFileStore, MemoryStore};
pub use types::{
    DEFAULT_POLL_INTERVAL_SECS, MAX_INTERVAL_MINUTES, MAX_INTERVAL_SECONDS, PollInterval,
    WatchConfig, WatchSet,
};

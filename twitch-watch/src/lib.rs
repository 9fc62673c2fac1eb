//! Watches a list of Twitch channels and opens each new broadcast once.
//!
//! The watcher polls the Helix streams endpoint on a fixed cadence,
//! correlates live observations into broadcast sessions and fires an effect
//! (by default, opening the channel page) only when a genuinely new session
//! starts. Short disconnects inside the reconnect grace window do not
//! re-trigger it.

pub mod config;
pub mod credentials;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod notification;
pub mod panic_hook;
pub mod scheduler;
pub mod services;

pub use error::{Error, Result};

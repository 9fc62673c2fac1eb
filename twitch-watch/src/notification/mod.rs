//! Side effects and status reporting.
//!
//! - [`EffectSink`]: called once per newly started broadcast
//! - [`StatusObserver`]: receives every snapshot and every recoverable issue
//!
//! Both are invoked from the scheduler task and must return quickly.

mod browser;
mod observer;

pub use browser::{BrowserOpener, LogOnlySink, viewer_url};
pub use observer::{StatusObserver, TracingObserver};

use crate::monitor::ChannelStatus;

/// Reacts to a new broadcast session.
pub trait EffectSink: Send + Sync {
    fn on_broadcast_start(&self, login: &str, status: &ChannelStatus);
}

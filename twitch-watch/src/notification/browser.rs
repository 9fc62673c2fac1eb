use tracing::{info, warn};

use super::EffectSink;
use crate::monitor::ChannelStatus;

const VIEWER_BASE_URL: &str = "https://www.twitch.tv";

pub fn viewer_url(login: &str) -> String {
    format!("{VIEWER_BASE_URL}/{login}")
}

/// Opens the channel page in the default browser.
///
/// The launcher runs on the blocking pool so the scheduler never waits on it.
#[derive(Debug, Default, Clone, Copy)]
pub struct BrowserOpener;

impl EffectSink for BrowserOpener {
    fn on_broadcast_start(&self, login: &str, status: &ChannelStatus) {
        let url = viewer_url(login);
        info!(%login, title = %status.title, %url, "New broadcast, opening browser");

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(%url, "No async runtime available, browser not opened");
            return;
        };
        runtime.spawn_blocking(move || {
            if let Err(e) = open::that(&url) {
                warn!(%url, error = %e, "Failed to open browser");
            }
        });
    }
}

/// Dry-run sink that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogOnlySink;

impl EffectSink for LogOnlySink {
    fn on_broadcast_start(&self, login: &str, status: &ChannelStatus) {
        info!(
            %login,
            title = %status.title,
            started_at = %status.started_at,
            url = %viewer_url(login),
            "New broadcast (browser disabled)"
        );
    }
}

use std::collections::BTreeMap;

use chrono::Local;
use tracing::{info, warn};

use crate::monitor::{ChannelStatus, ErrorKind};

/// Receives the outcome of every poll cycle.
pub trait StatusObserver: Send + Sync {
    fn on_status_snapshot(&self, snapshot: &BTreeMap<String, ChannelStatus>);

    fn on_error(&self, kind: ErrorKind, detail: &str);
}

/// Writes snapshots and issues to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl StatusObserver for TracingObserver {
    fn on_status_snapshot(&self, snapshot: &BTreeMap<String, ChannelStatus>) {
        let checked_at = Local::now().format("%H:%M:%S");
        let live = snapshot.values().filter(|s| s.is_live).count();
        info!(channels = snapshot.len(), live, "Status check at {checked_at}");

        for status in snapshot.values() {
            if status.is_live {
                info!(login = %status.login, title = %status.title, "  live");
            } else {
                info!(login = %status.login, "  offline");
            }
        }
    }

    fn on_error(&self, kind: ErrorKind, detail: &str) {
        warn!(%kind, "{detail}");
    }
}

//! Broadcast session tracking.
//!
//! Decides, poll by poll, whether a live observation belongs to a broadcast
//! that was already announced or to a new one. Brief disconnects inside the
//! reconnect grace window are folded into the running session.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::detector::ChannelStatus;
use crate::notification::EffectSink;

/// How long an offline channel keeps its session before it is forgotten.
pub const RECONNECT_GRACE: Duration = Duration::from_secs(300);

/// Derived per-channel state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No record.
    Offline,
    /// Record present and last seen live.
    Live,
    /// Record present, seen offline `offline_for` ago, still inside the grace window.
    Grace { offline_for: Duration },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub session_key: String,
    pub started_at: String,
    pub last_seen_at: Instant,
    pub offline_since: Option<Instant>,
}

impl SessionRecord {
    fn new(status: &ChannelStatus, now: Instant) -> Self {
        Self {
            session_key: status.session_key().to_string(),
            started_at: status.started_at.clone(),
            last_seen_at: now,
            offline_since: None,
        }
    }

    fn offline_for(&self, now: Instant) -> Option<Duration> {
        self.offline_since
            .map(|since| now.saturating_duration_since(since))
    }

    fn within_grace(&self, now: Instant, grace: Duration) -> bool {
        self.offline_for(now).is_some_and(|elapsed| elapsed <= grace)
    }

    fn grace_expired(&self, now: Instant, grace: Duration) -> bool {
        self.offline_for(now).is_some_and(|elapsed| elapsed > grace)
    }

    /// A key only matches when the platform actually supplied one.
    fn same_session(&self, status: &ChannelStatus) -> bool {
        let key = status.session_key();
        !key.is_empty() && key == self.session_key
    }
}

/// What a poll did to one channel's session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionChange {
    /// First live observation with no record.
    Started { login: String, session_key: String },
    /// Different key while a record existed outside the grace window.
    Restarted {
        login: String,
        previous_key: String,
        session_key: String,
    },
    /// Different key inside the grace window. No effect.
    Reconnected {
        login: String,
        previous_key: String,
        session_key: String,
    },
    /// Same key seen again after going offline.
    Resumed { login: String },
    WentOffline { login: String },
    /// Grace window ran out; record dropped.
    Expired { login: String },
}

impl SessionChange {
    /// Whether this change announces a new broadcast.
    pub fn is_new_broadcast(&self) -> bool {
        matches!(self, Self::Started { .. } | Self::Restarted { .. })
    }

    pub fn login(&self) -> &str {
        match self {
            Self::Started { login, .. }
            | Self::Restarted { login, .. }
            | Self::Reconnected { login, .. }
            | Self::Resumed { login }
            | Self::WentOffline { login }
            | Self::Expired { login } => login,
        }
    }
}

/// Owns every [`SessionRecord`]. Not shared: the scheduler task is its only user.
#[derive(Debug)]
pub struct SessionTracker {
    records: BTreeMap<String, SessionRecord>,
    grace: Duration,
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::with_grace(RECONNECT_GRACE)
    }

    pub fn with_grace(grace: Duration) -> Self {
        Self {
            records: BTreeMap::new(),
            grace,
        }
    }

    /// Apply one poll's snapshot.
    ///
    /// Expired records are swept first, then each status is judged against
    /// what is left. `sink` is called once for every new broadcast.
    pub fn apply(
        &mut self,
        snapshot: &BTreeMap<String, ChannelStatus>,
        now: Instant,
        sink: &dyn EffectSink,
    ) -> Vec<SessionChange> {
        let mut changes = self.sweep(now);

        for (login, status) in snapshot {
            let change = if status.is_live {
                self.observe_live(login, status, now)
            } else {
                self.observe_offline(login, now)
            };
            let Some(change) = change else { continue };

            if change.is_new_broadcast() {
                sink.on_broadcast_start(login, status);
            }
            log_change(&change);
            changes.push(change);
        }

        changes
    }

    fn sweep(&mut self, now: Instant) -> Vec<SessionChange> {
        let grace = self.grace;
        let mut expired = Vec::new();
        self.records.retain(|login, record| {
            if record.grace_expired(now, grace) {
                expired.push(SessionChange::Expired {
                    login: login.clone(),
                });
                false
            } else {
                true
            }
        });
        for change in &expired {
            log_change(change);
        }
        expired
    }

    fn observe_live(
        &mut self,
        login: &str,
        status: &ChannelStatus,
        now: Instant,
    ) -> Option<SessionChange> {
        let Some(record) = self.records.get_mut(login) else {
            let record = SessionRecord::new(status, now);
            let session_key = record.session_key.clone();
            self.records.insert(login.to_string(), record);
            return Some(SessionChange::Started {
                login: login.to_string(),
                session_key,
            });
        };

        if record.same_session(status) {
            record.last_seen_at = now;
            return record
                .offline_since
                .take()
                .map(|_| SessionChange::Resumed {
                    login: login.to_string(),
                });
        }

        let within_grace = record.within_grace(now, self.grace);
        let previous = std::mem::replace(record, SessionRecord::new(status, now));
        let previous_key = previous.session_key;
        let session_key = record.session_key.clone();
        let login = login.to_string();

        Some(if within_grace {
            SessionChange::Reconnected {
                login,
                previous_key,
                session_key,
            }
        } else {
            SessionChange::Restarted {
                login,
                previous_key,
                session_key,
            }
        })
    }

    fn observe_offline(&mut self, login: &str, now: Instant) -> Option<SessionChange> {
        let record = self.records.get_mut(login)?;
        if record.offline_since.is_some() {
            return None;
        }
        record.offline_since = Some(now);
        Some(SessionChange::WentOffline {
            login: login.to_string(),
        })
    }

    pub fn state(&self, login: &str, now: Instant) -> SessionState {
        match self.records.get(login) {
            None => SessionState::Offline,
            Some(record) => match record.offline_for(now) {
                None => SessionState::Live,
                Some(offline_for) if offline_for <= self.grace => {
                    SessionState::Grace { offline_for }
                }
                Some(_) => SessionState::Offline,
            },
        }
    }

    pub fn record(&self, login: &str) -> Option<&SessionRecord> {
        self.records.get(login)
    }

    /// Drop records for channels that are no longer watched.
    pub fn retain_logins(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.records.retain(|login, _| keep(login));
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn log_change(change: &SessionChange) {
    match change {
        SessionChange::Started { login, session_key } => {
            info!(%login, %session_key, "Broadcast started")
        }
        SessionChange::Restarted {
            login,
            previous_key,
            session_key,
        } => info!(%login, %previous_key, %session_key, "New broadcast replaced previous session"),
        SessionChange::Reconnected {
            login,
            previous_key,
            session_key,
        } => info!(%login, %previous_key, %session_key, "Reconnected within grace window, not reopening"),
        SessionChange::Resumed { login } => info!(%login, "Back online, same session"),
        SessionChange::WentOffline { login } => debug!(%login, "Went offline, grace window started"),
        SessionChange::Expired { login } => debug!(%login, "Grace window expired, session forgotten"),
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;

    #[derive(Default)]
    struct RecordingSink {
        opened: Mutex<Vec<String>>,
    }

    impl RecordingSink {
        fn opened(&self) -> Vec<String> {
            self.opened.lock().clone()
        }
    }

    impl EffectSink for RecordingSink {
        fn on_broadcast_start(&self, login: &str, _status: &ChannelStatus) {
            self.opened.lock().push(login.to_string());
        }
    }

    fn live(login: &str, id: &str) -> ChannelStatus {
        ChannelStatus {
            login: login.to_string(),
            is_live: true,
            title: "title".to_string(),
            started_at: "2024-05-01T10:00:00Z".to_string(),
            stream_id: id.to_string(),
        }
    }

    fn snapshot(statuses: &[ChannelStatus]) -> BTreeMap<String, ChannelStatus> {
        statuses
            .iter()
            .map(|s| (s.login.clone(), s.clone()))
            .collect()
    }

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn never_live_channels_leave_no_trace() {
        let mut tracker = SessionTracker::new();
        let sink = RecordingSink::default();
        let t0 = Instant::now();

        let changes = tracker.apply(&snapshot(&[ChannelStatus::offline("bob")]), t0, &sink);

        assert!(changes.is_empty());
        assert!(tracker.is_empty());
        assert!(sink.opened().is_empty());
        assert_eq!(tracker.state("bob", t0), SessionState::Offline);
    }

    #[test]
    fn first_live_observation_fires_once() {
        let mut tracker = SessionTracker::new();
        let sink = RecordingSink::default();
        let t0 = Instant::now();

        tracker.apply(&snapshot(&[live("alice", "100")]), t0, &sink);
        tracker.apply(&snapshot(&[live("alice", "100")]), t0 + secs(60), &sink);
        tracker.apply(&snapshot(&[live("alice", "100")]), t0 + secs(120), &sink);

        assert_eq!(sink.opened(), vec!["alice"]);
        let record = tracker.record("alice").unwrap();
        assert_eq!(record.session_key, "100");
        assert_eq!(record.last_seen_at, t0 + secs(120));
        assert_eq!(tracker.state("alice", t0 + secs(120)), SessionState::Live);
    }

    #[test]
    fn started_at_is_the_key_when_id_is_missing() {
        let mut tracker = SessionTracker::new();
        let sink = RecordingSink::default();

        tracker.apply(&snapshot(&[live("alice", "")]), Instant::now(), &sink);
        assert_eq!(
            tracker.record("alice").unwrap().session_key,
            "2024-05-01T10:00:00Z"
        );
    }

    #[test]
    fn going_offline_enters_grace_without_effect() {
        let mut tracker = SessionTracker::new();
        let sink = RecordingSink::default();
        let t0 = Instant::now();

        tracker.apply(&snapshot(&[live("alice", "100")]), t0, &sink);
        let changes = tracker.apply(
            &snapshot(&[ChannelStatus::offline("alice")]),
            t0 + secs(60),
            &sink,
        );
        assert_eq!(
            changes,
            vec![SessionChange::WentOffline {
                login: "alice".into()
            }]
        );

        // A second offline poll does not move offline_since.
        let changes = tracker.apply(
            &snapshot(&[ChannelStatus::offline("alice")]),
            t0 + secs(120),
            &sink,
        );
        assert!(changes.is_empty());
        assert_eq!(
            tracker.record("alice").unwrap().offline_since,
            Some(t0 + secs(60))
        );
        assert_eq!(
            tracker.state("alice", t0 + secs(120)),
            SessionState::Grace {
                offline_for: secs(60)
            }
        );
        assert_eq!(sink.opened().len(), 1);
    }

    #[test]
    fn reconnect_with_new_key_inside_grace_is_suppressed() {
        let mut tracker = SessionTracker::new();
        let sink = RecordingSink::default();
        let t0 = Instant::now();

        tracker.apply(&snapshot(&[live("alice", "100")]), t0, &sink);
        tracker.apply(&snapshot(&[ChannelStatus::offline("alice")]), t0 + secs(60), &sink);
        let changes = tracker.apply(&snapshot(&[live("alice", "101")]), t0 + secs(180), &sink);

        assert_eq!(
            changes,
            vec![SessionChange::Reconnected {
                login: "alice".into(),
                previous_key: "100".into(),
                session_key: "101".into(),
            }]
        );
        assert_eq!(sink.opened(), vec!["alice"]);
        let record = tracker.record("alice").unwrap();
        assert_eq!(record.session_key, "101");
        assert_eq!(record.offline_since, None);
    }

    #[test]
    fn same_key_after_brief_offline_resumes() {
        let mut tracker = SessionTracker::new();
        let sink = RecordingSink::default();
        let t0 = Instant::now();

        tracker.apply(&snapshot(&[live("alice", "100")]), t0, &sink);
        tracker.apply(&snapshot(&[ChannelStatus::offline("alice")]), t0 + secs(60), &sink);
        let changes = tracker.apply(&snapshot(&[live("alice", "100")]), t0 + secs(90), &sink);

        assert_eq!(
            changes,
            vec![SessionChange::Resumed {
                login: "alice".into()
            }]
        );
        assert_eq!(sink.opened().len(), 1);
    }

    #[test]
    fn key_change_without_going_offline_is_a_new_broadcast() {
        let mut tracker = SessionTracker::new();
        let sink = RecordingSink::default();
        let t0 = Instant::now();

        tracker.apply(&snapshot(&[live("alice", "100")]), t0, &sink);
        let changes = tracker.apply(&snapshot(&[live("alice", "200")]), t0 + secs(60), &sink);

        assert!(changes[0].is_new_broadcast());
        assert_eq!(sink.opened(), vec!["alice", "alice"]);
    }

    #[test]
    fn offline_past_grace_forgets_the_session() {
        let mut tracker = SessionTracker::new();
        let sink = RecordingSink::default();
        let t0 = Instant::now();

        tracker.apply(&snapshot(&[live("alice", "100")]), t0, &sink);
        tracker.apply(&snapshot(&[ChannelStatus::offline("alice")]), t0 + secs(60), &sink);

        // Exactly at the boundary the record is still kept.
        tracker.apply(&snapshot(&[ChannelStatus::offline("alice")]), t0 + secs(360), &sink);
        assert!(tracker.record("alice").is_some());

        let changes = tracker.apply(
            &snapshot(&[ChannelStatus::offline("alice")]),
            t0 + secs(361),
            &sink,
        );
        assert_eq!(
            changes,
            vec![SessionChange::Expired {
                login: "alice".into()
            }]
        );
        assert!(tracker.is_empty());
    }

    #[test]
    fn live_after_grace_fires_even_with_the_same_key() {
        let mut tracker = SessionTracker::new();
        let sink = RecordingSink::default();
        let t0 = Instant::now();

        tracker.apply(&snapshot(&[live("alice", "100")]), t0, &sink);
        tracker.apply(&snapshot(&[ChannelStatus::offline("alice")]), t0 + secs(60), &sink);
        let changes = tracker.apply(&snapshot(&[live("alice", "100")]), t0 + secs(400), &sink);

        assert_eq!(changes.len(), 2);
        assert!(matches!(changes[0], SessionChange::Expired { .. }));
        assert!(matches!(changes[1], SessionChange::Started { .. }));
        assert_eq!(sink.opened(), vec!["alice", "alice"]);
    }

    #[test]
    fn missing_key_treats_every_observation_as_new() {
        let mut tracker = SessionTracker::new();
        let sink = RecordingSink::default();
        let t0 = Instant::now();
        let keyless = ChannelStatus {
            started_at: String::new(),
            ..live("alice", "")
        };

        tracker.apply(&snapshot(&[keyless.clone()]), t0, &sink);
        tracker.apply(&snapshot(&[keyless]), t0 + secs(60), &sink);

        assert_eq!(sink.opened(), vec!["alice", "alice"]);
    }

    #[test]
    fn channels_are_tracked_independently() {
        let mut tracker = SessionTracker::new();
        let sink = RecordingSink::default();
        let t0 = Instant::now();

        tracker.apply(
            &snapshot(&[live("alice", "1"), ChannelStatus::offline("bob")]),
            t0,
            &sink,
        );
        tracker.apply(&snapshot(&[live("alice", "1"), live("bob", "2")]), t0 + secs(60), &sink);

        assert_eq!(sink.opened(), vec!["alice", "bob"]);
        assert_eq!(tracker.len(), 2);

        tracker.retain_logins(|login| login != "bob");
        assert!(tracker.record("bob").is_none());
        tracker.clear();
        assert!(tracker.is_empty());
    }

    #[test]
    fn custom_grace_window() {
        let mut tracker = SessionTracker::with_grace(secs(10));
        let sink = RecordingSink::default();
        let t0 = Instant::now();

        tracker.apply(&snapshot(&[live("alice", "1")]), t0, &sink);
        tracker.apply(&snapshot(&[ChannelStatus::offline("alice")]), t0 + secs(1), &sink);
        tracker.apply(&snapshot(&[live("alice", "2")]), t0 + secs(20), &sink);

        assert_eq!(sink.opened(), vec!["alice", "alice"]);
    }
}

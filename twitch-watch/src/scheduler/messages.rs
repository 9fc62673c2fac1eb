//! Message types for the scheduler and its fetch worker.

use std::fmt;

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

use crate::config::{PollInterval, WatchSet};
use crate::monitor::FetchOutcome;

/// Messages that can be sent to the [`super::PollScheduler`].
#[derive(Debug)]
pub enum SchedulerMessage {
    /// Clear sessions, run a cycle now and arm the timer.
    Start,
    /// Disarm the timer. An in-flight cycle still completes.
    Stop,
    /// Run one cycle outside the cadence.
    CheckNow,
    /// Replace the watched channels.
    UpdateWatchSet(WatchSet),
    /// Change the cadence. Re-arms the timer when running.
    SetInterval(PollInterval),
    /// Query current state (response sent via oneshot channel).
    GetState(oneshot::Sender<SchedulerState>),
    /// Request graceful shutdown.
    Shutdown,
}

/// Work item for the fetch worker.
#[derive(Debug)]
pub struct FetchRequest {
    pub cycle: u64,
    pub logins: Vec<String>,
    pub reply: oneshot::Sender<FetchOutcome>,
}

/// What caused a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleTrigger {
    Start,
    Timer,
    Manual,
    /// Follow-up for triggers that arrived while a cycle was in flight.
    Coalesced,
}

impl fmt::Display for CycleTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Start => "start",
            Self::Timer => "timer",
            Self::Manual => "manual",
            Self::Coalesced => "coalesced",
        };
        f.write_str(name)
    }
}

/// Snapshot of the scheduler for queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerState {
    pub running: bool,
    pub interval: PollInterval,
    pub watched: usize,
    pub in_flight: bool,
    pub pending: bool,
    pub cycles_completed: u64,
    pub tracked_sessions: usize,
    pub last_cycle_at: Option<DateTime<Utc>>,
}

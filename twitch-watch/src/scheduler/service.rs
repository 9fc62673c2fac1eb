//! Poll scheduler actor.
//!
//! The scheduler task owns the [`SessionTracker`] and the watch set. It
//! decides when a cycle runs, hands the network work to the fetch worker and
//! applies each result in arrival order. At most one cycle is in flight;
//! triggers that arrive meanwhile collapse into a single follow-up cycle.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::handle::{DEFAULT_MAILBOX_CAPACITY, SchedulerHandle};
use super::messages::{CycleTrigger, FetchRequest, SchedulerMessage, SchedulerState};
use super::worker::FetchWorker;
use crate::config::{PollInterval, WatchSet};
use crate::monitor::{FetchOutcome, RECONNECT_GRACE, SessionTracker, StatusSource};
use crate::notification::{EffectSink, StatusObserver};

/// Scheduler settings.
#[derive(Debug, Clone)]
pub struct PollSchedulerConfig {
    pub interval: PollInterval,
    pub reconnect_grace: Duration,
    pub mailbox_capacity: usize,
}

impl Default for PollSchedulerConfig {
    fn default() -> Self {
        Self {
            interval: PollInterval::default(),
            reconnect_grace: RECONNECT_GRACE,
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
        }
    }
}

struct InFlight {
    cycle: u64,
    trigger: CycleTrigger,
    reply: oneshot::Receiver<FetchOutcome>,
}

pub struct PollScheduler {
    mailbox: mpsc::Receiver<SchedulerMessage>,
    fetcher: mpsc::Sender<FetchRequest>,
    worker: Option<JoinHandle<()>>,
    tracker: SessionTracker,
    watch_set: WatchSet,
    interval: PollInterval,
    running: bool,
    next_tick: Option<Instant>,
    in_flight: Option<InFlight>,
    /// Origin of the follow-up queued behind the in-flight cycle.
    pending: Option<CycleTrigger>,
    next_cycle: u64,
    cycles_completed: u64,
    last_cycle_at: Option<DateTime<Utc>>,
    effects: Arc<dyn EffectSink>,
    observer: Arc<dyn StatusObserver>,
    cancellation_token: CancellationToken,
}

impl PollScheduler {
    /// Spawn the scheduler and its fetch worker.
    ///
    /// The scheduler starts idle; send [`SchedulerMessage::Start`] to begin
    /// polling.
    pub fn spawn(
        config: PollSchedulerConfig,
        watch_set: WatchSet,
        source: Arc<dyn StatusSource>,
        effects: Arc<dyn EffectSink>,
        observer: Arc<dyn StatusObserver>,
        cancellation_token: CancellationToken,
    ) -> (SchedulerHandle, JoinHandle<()>) {
        let (tx, mailbox) = mpsc::channel(config.mailbox_capacity.max(1));
        // One request at most is ever queued.
        let (fetcher, requests) = mpsc::channel(1);

        let worker = FetchWorker::new(source, requests, cancellation_token.child_token());
        let worker = tokio::spawn(worker.run());

        let scheduler = Self {
            mailbox,
            fetcher,
            worker: Some(worker),
            tracker: SessionTracker::with_grace(config.reconnect_grace),
            watch_set,
            interval: config.interval,
            running: false,
            next_tick: None,
            in_flight: None,
            pending: None,
            next_cycle: 1,
            cycles_completed: 0,
            last_cycle_at: None,
            effects,
            observer,
            cancellation_token: cancellation_token.clone(),
        };

        let join = tokio::spawn(scheduler.run());
        (SchedulerHandle::new(tx, cancellation_token), join)
    }

    async fn run(mut self) {
        info!(
            channels = self.watch_set.len(),
            interval = %self.interval,
            "Scheduler ready"
        );

        loop {
            let timer = Self::tick_timer(self.next_tick);

            tokio::select! {
                biased;

                _ = self.cancellation_token.cancelled() => {
                    info!("Scheduler cancelled");
                    break;
                }

                msg = self.mailbox.recv() => {
                    let Some(msg) = msg else {
                        debug!("All scheduler handles dropped");
                        break;
                    };
                    if self.handle_message(msg) {
                        break;
                    }
                }

                (cycle, outcome) = Self::recv_outcome(&mut self.in_flight) => {
                    self.finish_cycle(cycle, outcome);
                }

                _ = timer => {
                    self.next_tick = Some(Instant::now() + self.interval.as_duration());
                    self.trigger(CycleTrigger::Timer);
                }
            }
        }

        self.shutdown_worker().await;
        info!(cycles = self.cycles_completed, "Scheduler stopped");
    }

    /// Returns true when the scheduler should exit.
    fn handle_message(&mut self, msg: SchedulerMessage) -> bool {
        match msg {
            SchedulerMessage::Start => self.handle_start(),
            SchedulerMessage::Stop => self.handle_stop(),
            SchedulerMessage::CheckNow => {
                debug!("Manual check requested");
                self.trigger(CycleTrigger::Manual);
            }
            SchedulerMessage::UpdateWatchSet(watch_set) => self.handle_watch_set(watch_set),
            SchedulerMessage::SetInterval(interval) => self.handle_interval(interval),
            SchedulerMessage::GetState(reply) => {
                let _ = reply.send(self.state());
            }
            SchedulerMessage::Shutdown => {
                info!("Scheduler shutdown requested");
                return true;
            }
        }
        false
    }

    fn handle_start(&mut self) {
        if self.running {
            debug!("Start requested while already running");
            return;
        }
        self.running = true;
        self.tracker.clear();
        info!(interval = %self.interval, channels = self.watch_set.len(), "Polling started");

        self.trigger(CycleTrigger::Start);
        self.next_tick = Some(Instant::now() + self.interval.as_duration());
    }

    fn handle_stop(&mut self) {
        if !self.running {
            debug!("Stop requested while not running");
            return;
        }
        self.running = false;
        self.next_tick = None;
        // A queued manual check survives; only the cadence stops.
        if self.pending == Some(CycleTrigger::Timer) {
            self.pending = None;
        }
        info!(in_flight = self.in_flight.is_some(), "Polling stopped");
    }

    fn handle_watch_set(&mut self, watch_set: WatchSet) {
        self.tracker.retain_logins(|login| watch_set.contains(login));
        info!(channels = watch_set.len(), "Watch list updated");
        self.watch_set = watch_set;
    }

    fn handle_interval(&mut self, interval: PollInterval) {
        self.interval = interval;
        if self.running {
            self.next_tick = Some(Instant::now() + interval.as_duration());
        }
        info!(%interval, "Poll interval changed");
    }

    fn trigger(&mut self, trigger: CycleTrigger) {
        if self.watch_set.is_empty() {
            info!(%trigger, "Watch list is empty, nothing to check");
            return;
        }
        if self.in_flight.is_some() {
            match self.pending {
                None => debug!(%trigger, "Cycle in flight, queueing one follow-up"),
                // A tick never replaces a queued manual or start trigger.
                Some(_) if trigger == CycleTrigger::Timer => return,
                Some(_) => {}
            }
            self.pending = Some(trigger);
            return;
        }
        self.dispatch(trigger);
    }

    fn dispatch(&mut self, trigger: CycleTrigger) {
        let cycle = self.next_cycle;
        self.next_cycle += 1;

        let (reply, rx) = oneshot::channel();
        let request = FetchRequest {
            cycle,
            logins: self.watch_set.as_slice().to_vec(),
            reply,
        };

        match self.fetcher.try_send(request) {
            Ok(()) => {
                debug!(cycle, %trigger, channels = self.watch_set.len(), "Cycle dispatched");
                self.in_flight = Some(InFlight {
                    cycle,
                    trigger,
                    reply: rx,
                });
            }
            Err(e) => error!(cycle, error = %e, "Fetch worker unavailable, cycle skipped"),
        }
    }

    fn finish_cycle(&mut self, cycle: u64, outcome: Result<FetchOutcome, oneshot::error::RecvError>) {
        let trigger = self.in_flight.take().map(|f| f.trigger);

        match outcome {
            Ok(outcome) => self.apply_outcome(cycle, outcome),
            Err(_) => warn!(cycle, ?trigger, "Fetch worker dropped the cycle"),
        }

        if let Some(origin) = self.pending.take() {
            debug!(cycle, %origin, "Running queued follow-up");
            self.trigger(CycleTrigger::Coalesced);
        }
    }

    fn apply_outcome(&mut self, cycle: u64, mut outcome: FetchOutcome) {
        // The watch set may have changed while the cycle was in flight.
        let requested = outcome.statuses.len();
        outcome
            .statuses
            .retain(|login, _| self.watch_set.contains(login));
        if outcome.statuses.len() < requested {
            debug!(
                cycle,
                dropped = requested - outcome.statuses.len(),
                "Ignoring statuses for channels no longer watched"
            );
        }

        for issue in &outcome.issues {
            self.observer.on_error(issue.kind, &issue.detail);
        }
        self.observer.on_status_snapshot(&outcome.statuses);

        let now = Instant::now().into_std();
        let changes = self
            .tracker
            .apply(&outcome.statuses, now, self.effects.as_ref());

        self.cycles_completed += 1;
        self.last_cycle_at = Some(Utc::now());
        debug!(
            cycle,
            live = outcome.live_count(),
            changes = changes.len(),
            sessions = self.tracker.len(),
            "Cycle applied"
        );
    }

    fn state(&self) -> SchedulerState {
        SchedulerState {
            running: self.running,
            interval: self.interval,
            watched: self.watch_set.len(),
            in_flight: self.in_flight.is_some(),
            pending: self.pending.is_some(),
            cycles_completed: self.cycles_completed,
            tracked_sessions: self.tracker.len(),
            last_cycle_at: self.last_cycle_at,
        }
    }

    async fn shutdown_worker(&mut self) {
        // Closing the request channel lets the worker finish and exit.
        let (closed, _) = mpsc::channel(1);
        drop(std::mem::replace(&mut self.fetcher, closed));

        if let Some(worker) = self.worker.take()
            && let Err(e) = worker.await
        {
            warn!(error = %e, "Fetch worker panicked");
        }
    }

    /// Resolves with the in-flight cycle's outcome, or never when idle.
    async fn recv_outcome(
        in_flight: &mut Option<InFlight>,
    ) -> (u64, Result<FetchOutcome, oneshot::error::RecvError>) {
        match in_flight {
            Some(in_flight) => (in_flight.cycle, (&mut in_flight.reply).await),
            None => std::future::pending().await,
        }
    }

    /// Resolves at the next tick, or never when the timer is disarmed.
    async fn tick_timer(next_tick: Option<Instant>) {
        match next_tick {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    }
}

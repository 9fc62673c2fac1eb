//! Background fetch worker.
//!
//! Runs every network round trip on its own task so the scheduler never
//! blocks on I/O. Requests are handled one at a time.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::messages::FetchRequest;
use crate::monitor::StatusSource;

pub struct FetchWorker {
    source: Arc<dyn StatusSource>,
    requests: mpsc::Receiver<FetchRequest>,
    cancellation_token: CancellationToken,
}

impl FetchWorker {
    pub fn new(
        source: Arc<dyn StatusSource>,
        requests: mpsc::Receiver<FetchRequest>,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            source,
            requests,
            cancellation_token,
        }
    }

    pub async fn run(mut self) {
        debug!("Fetch worker starting");

        loop {
            tokio::select! {
                biased;

                _ = self.cancellation_token.cancelled() => break,

                request = self.requests.recv() => match request {
                    Some(request) => self.handle(request).await,
                    None => break,
                },
            }
        }

        debug!("Fetch worker stopped");
    }

    async fn handle(&self, request: FetchRequest) {
        let FetchRequest {
            cycle,
            logins,
            reply,
        } = request;
        let started = Instant::now();

        let outcome = tokio::select! {
            biased;

            _ = self.cancellation_token.cancelled() => {
                info!(cycle, "Fetch cancelled");
                return;
            }
            outcome = self.source.fetch_statuses(&logins) => outcome,
        };

        debug!(
            cycle,
            channels = outcome.statuses.len(),
            live = outcome.live_count(),
            issues = outcome.issues.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Fetch finished"
        );

        if reply.send(outcome).is_err() {
            debug!(cycle, "Scheduler dropped the reply");
        }
    }
}

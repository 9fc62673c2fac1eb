//! Handle for talking to a running scheduler.

use std::fmt;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use super::messages::{SchedulerMessage, SchedulerState};
use crate::config::{PollInterval, WatchSet};
use crate::{Error, Result};

/// Default mailbox capacity.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 32;

/// Default timeout for send operations when the mailbox is full.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_millis(100);

/// Error type for send operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    /// The scheduler has stopped and is no longer accepting messages.
    Stopped,
    /// The mailbox stayed full for the whole timeout.
    Timeout,
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::Stopped => write!(f, "Scheduler has stopped"),
            SendError::Timeout => write!(f, "Send operation timed out"),
        }
    }
}

impl std::error::Error for SendError {}

impl From<SendError> for Error {
    fn from(err: SendError) -> Self {
        match err {
            SendError::Stopped => Error::SchedulerStopped,
            SendError::Timeout => Error::Other(err.to_string()),
        }
    }
}

/// Cloneable handle to a [`super::PollScheduler`].
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    sender: mpsc::Sender<SchedulerMessage>,
    cancellation_token: CancellationToken,
}

impl SchedulerHandle {
    pub fn new(sender: mpsc::Sender<SchedulerMessage>, cancellation_token: CancellationToken) -> Self {
        Self {
            sender,
            cancellation_token,
        }
    }

    /// Send a message, waiting up to [`DEFAULT_SEND_TIMEOUT`] for mailbox space.
    pub async fn send(&self, msg: SchedulerMessage) -> std::result::Result<(), SendError> {
        // Fast path: try non-blocking send first
        match self.sender.try_send(msg) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(msg)) => {
                match tokio::time::timeout(DEFAULT_SEND_TIMEOUT, self.sender.reserve()).await {
                    Ok(Ok(permit)) => {
                        permit.send(msg);
                        Ok(())
                    }
                    Ok(Err(_)) => Err(SendError::Stopped),
                    Err(_) => Err(SendError::Timeout),
                }
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(SendError::Stopped),
        }
    }

    pub async fn start(&self) -> Result<()> {
        Ok(self.send(SchedulerMessage::Start).await?)
    }

    pub async fn stop(&self) -> Result<()> {
        Ok(self.send(SchedulerMessage::Stop).await?)
    }

    pub async fn check_now(&self) -> Result<()> {
        Ok(self.send(SchedulerMessage::CheckNow).await?)
    }

    pub async fn update_watch_set(&self, watch_set: WatchSet) -> Result<()> {
        Ok(self.send(SchedulerMessage::UpdateWatchSet(watch_set)).await?)
    }

    pub async fn set_interval(&self, interval: PollInterval) -> Result<()> {
        Ok(self.send(SchedulerMessage::SetInterval(interval)).await?)
    }

    pub async fn state(&self) -> Result<SchedulerState> {
        let (tx, rx) = oneshot::channel();
        self.send(SchedulerMessage::GetState(tx)).await?;
        rx.await.map_err(|_| Error::SchedulerStopped)
    }

    /// Ask the scheduler to exit after the current message.
    pub async fn shutdown(&self) -> Result<()> {
        Ok(self.send(SchedulerMessage::Shutdown).await?)
    }

    /// Cancel the scheduler and its worker immediately.
    pub fn cancel(&self) {
        self.cancellation_token.cancel();
    }
}

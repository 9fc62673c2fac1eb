//! Poll scheduling.
//!
//! [`PollScheduler`] is an actor: all control goes through a
//! [`SchedulerHandle`], network work runs on a separate [`FetchWorker`] task.

mod handle;
mod messages;
mod service;
mod worker;

pub use handle::{DEFAULT_MAILBOX_CAPACITY, SchedulerHandle, SendError};
pub use messages::{CycleTrigger, FetchRequest, SchedulerMessage, SchedulerState};
pub use service::{PollScheduler, PollSchedulerConfig};
pub use worker::FetchWorker;

//! Live status monitoring.
//!
//! - [`StatusFetcher`]: batched Helix queries with token recovery
//! - [`SessionTracker`]: per-channel broadcast sessions and reconnect grace
//! - [`FetchIssue`]: recoverable problems reported per cycle

mod batch_detector;
mod detector;
mod events;
mod session;

pub use batch_detector::{FetchOutcome, StatusFetcher, StatusSource};
pub use detector::{ChannelStatus, normalize_login, normalize_logins};
pub use events::{ErrorKind, FetchIssue};
pub use session::{
    RECONNECT_GRACE, SessionChange, SessionRecord, SessionState, SessionTracker,
};

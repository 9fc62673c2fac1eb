//! Platform-specific token exchangers.

mod twitch;

pub use twitch::TwitchCredentialExchanger;

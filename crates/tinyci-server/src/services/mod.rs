//! Outbound integrations.

pub mod github;
pub mod log_notifier;

pub use github::GitHubNotifier;
pub use log_notifier::LogNotifier;

//! HTTP server for tinyci.
//!
//! Accepts push webhooks, exposes build metadata and logs, and publishes
//! commit statuses.

pub mod config;
pub mod error;
pub mod routes;
pub mod services;
pub mod state;

pub use config::{Config, LogFormat};
pub use state::AppState;

#[cfg(test)]
mod test_support;

//! Uppi server agent.
//!
//! A daemon that samples host metrics and reports them to an Uppi instance,
//! and that keeps its own executable up to date.
//!
//! # Architecture
//!
//! - **Collector**: samples CPU, memory, disk and network statistics via `sysinfo`
//! - **Reporter**: posts HMAC-signed JSON snapshots to the instance
//! - **Update**: checks the release index at startup, swaps in the new binary
//!   with a rollback path, and restarts
//! - **Daemon**: runs the update check once, then reports on a fixed interval

pub mod collector;
pub mod config;
pub mod daemon;
pub mod error;
pub mod reporter;
pub mod update;

pub use config::{AgentConfig, UpdateConfig};
pub use error::{AgentError, Result, UpdateError};
pub use update::{UpdateOutcome, Updater};

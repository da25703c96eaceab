//! Startup recovery for interrupted generation jobs.
//!
//! Replays the on-disk job journal after a process restart and settles
//! every entry: ghosts are rolled back, reachable jobs are resumed, and
//! entries whose outcome cannot be determined are surfaced as unresolved
//! until an abandonment deadline escalates them to failed.

pub mod config;
pub mod manager;
pub mod metrics;

pub use config::RecoveryConfig;
pub use manager::{RecoveryManager, RecoveryReport};

//! Generation job lifecycle manager.
//!
//! Owns the state machine for one in-flight generation request:
//! submission (behind an atomic quota reservation), polling and callback
//! ingestion converging on one resolution path, success persistence, and
//! exactly-once quota rollback on failure or cancellation.

pub mod config;
pub mod error;
pub mod events;
pub mod journal;
pub mod manager;
pub mod output;
mod poll_health;
pub mod progress;

pub use config::LifecycleConfig;
pub use error::{LifecycleError, LifecycleResult};
pub use events::{EventChannel, JobEventEnvelope};
pub use journal::{JobJournal, JournalEntry, JournalError};
pub use manager::{JobLifecycleManager, QuotaStatus, SubmitReceipt};
pub use output::{FsOutputStore, MemoryOutputStore, OutputError, OutputStore};

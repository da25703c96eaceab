//! Atomic per-user usage quota ledger.
//!
//! This crate provides:
//! - A [`LedgerStore`] trait with versioned conditional updates
//! - An in-memory store for tests and local builds
//! - [`QuotaLedger`] with atomic check-and-reserve, rollback, and status
//! - A fire-and-forget usage audit trail

pub mod audit;
pub mod error;
pub mod ledger;
pub mod memory;
pub mod metrics;
pub mod store;

pub use audit::{UsageAction, UsageEvent};
pub use error::{LedgerError, LedgerResult};
pub use ledger::QuotaLedger;
pub use memory::MemoryLedgerStore;
pub use store::{LedgerStore, StoreError, VersionedRecord};

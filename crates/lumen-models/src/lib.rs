//! Shared data models for the Lumen generation core.
//!
//! This crate provides Serde-serializable types for:
//! - Generation jobs and their lifecycle phases
//! - Usage records and billing-cycle information
//! - Plan tiers and per-tier limits
//! - Job event messages delivered to the presentation layer

pub mod event;
pub mod job;
pub mod key;
pub mod plan;
pub mod usage;

// Re-export common types
pub use event::JobEvent;
pub use job::{GenerationJob, GenerationKind, JobId, JobPhase, LocalJobId};
pub use key::UserKey;
pub use plan::{PlanLimits, PlanTier};
pub use usage::{CycleInfo, LimitScope, UsageRecord, UNLIMITED_USAGE};

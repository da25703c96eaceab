//! Client for the external AI generation provider.
//!
//! The provider accepts a submission and completes it minutes later; the
//! result arrives either through polling or a pushed callback. Both carry
//! the same status shape, so the lifecycle manager resolves them through
//! one path.

pub mod client;
pub mod error;
pub mod types;

pub use client::{GenerationProvider, HttpGenerationClient, HttpProviderConfig};
pub use error::{ProviderError, ProviderResult};
pub use types::{ProviderCallback, ProviderJobState, ProviderStatus};

//! Generation job definitions and lifecycle phases.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::key::UserKey;

/// Prefix for locally generated placeholder ids that the provider has not
/// yet replaced with a real job id. A persisted record still carrying this
/// prefix is a ghost: submission never completed, but quota was reserved.
const PLACEHOLDER_PREFIX: &str = "pending-";

/// Identifier assigned by the external generation provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a local placeholder id, used until the provider accepts
    /// the submission and assigns the real id.
    pub fn placeholder() -> Self {
        Self(format!("{}{}", PLACEHOLDER_PREFIX, Uuid::new_v4()))
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Whether this is a local placeholder never accepted by the provider.
    pub fn is_placeholder(&self) -> bool {
        self.0.starts_with(PLACEHOLDER_PREFIX)
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Local-only identifier keying the persisted recovery record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct LocalJobId(pub String);

impl LocalJobId {
    /// Generate a new random local id.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for LocalJobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LocalJobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of media being generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum GenerationKind {
    Photo,
    Video,
}

impl GenerationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationKind::Photo => "photo",
            GenerationKind::Video => "video",
        }
    }
}

impl fmt::Display for GenerationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle phase of a generation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    /// No submission in progress.
    #[default]
    Idle,
    /// Quota reservation in flight; no side effects yet.
    Reserving,
    /// Provider accepted the submission; recovery record persisted.
    Submitted,
    /// Awaiting completion via poll/callback.
    Polling,
    /// Provider succeeded and the output was persisted (terminal).
    Succeeded,
    /// Provider failed, timed out, or the network dropped (terminal).
    Failed,
    /// User canceled while in flight (terminal).
    Canceled,
    /// Quota reservation denied; no provider call was made (terminal).
    ReservationDenied,
    /// Provider succeeded but the output could not be stored durably.
    /// Requires a manual persistence retry; not a silent loss.
    PersistencePending,
    /// Recovery could not determine the true outcome (terminal, no rollback).
    Unresolved,
}

impl JobPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobPhase::Idle => "idle",
            JobPhase::Reserving => "reserving",
            JobPhase::Submitted => "submitted",
            JobPhase::Polling => "polling",
            JobPhase::Succeeded => "succeeded",
            JobPhase::Failed => "failed",
            JobPhase::Canceled => "canceled",
            JobPhase::ReservationDenied => "reservation_denied",
            JobPhase::PersistencePending => "persistence_pending",
            JobPhase::Unresolved => "unresolved",
        }
    }

    /// Check if this is a terminal phase (no further transitions allowed).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobPhase::Succeeded
                | JobPhase::Failed
                | JobPhase::Canceled
                | JobPhase::ReservationDenied
                | JobPhase::Unresolved
        )
    }
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One submitted generation request.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GenerationJob {
    /// Local-only id keying the recovery record.
    pub local_id: LocalJobId,

    /// Provider-assigned id (placeholder until the provider accepts).
    pub job_id: JobId,

    /// Kind of media being generated.
    pub kind: GenerationKind,

    /// Usage record key this job reserved quota against.
    pub owner_key: UserKey,

    /// Submission timestamp. Timeouts are wall-clock from here, including
    /// any time the process spent suspended.
    pub submitted_at: DateTime<Utc>,

    /// Current lifecycle phase.
    pub phase: JobPhase,

    /// Opaque reference to the source media.
    pub input_ref: String,

    /// Opaque reference to the result media (terminal success only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_ref: Option<String>,

    /// Last error message, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,

    /// Whether a rollback has already been attempted for this job.
    /// Guards the exactly-once rollback on the failure/cancel paths.
    #[serde(default)]
    pub rollback_attempted: bool,

    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl GenerationJob {
    /// Create a job entering the Reserving phase. No side effects have
    /// happened yet; the provider id is a local placeholder.
    pub fn new(kind: GenerationKind, owner_key: UserKey, input_ref: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            local_id: LocalJobId::new(),
            job_id: JobId::placeholder(),
            kind,
            owner_key,
            submitted_at: now,
            phase: JobPhase::Reserving,
            input_ref: input_ref.into(),
            output_ref: None,
            last_error: None,
            rollback_attempted: false,
            updated_at: now,
        }
    }

    /// Check if the job is in a terminal phase.
    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Mark the reservation as denied. No provider call was made.
    pub fn deny_reservation(&mut self, reason: impl Into<String>) {
        if self.is_terminal() {
            return;
        }
        self.phase = JobPhase::ReservationDenied;
        self.last_error = Some(reason.into());
        self.updated_at = Utc::now();
    }

    /// Record provider acceptance: adopt the real id and the submission time.
    pub fn mark_submitted(&mut self, provider_id: JobId) {
        if self.is_terminal() {
            return;
        }
        self.job_id = provider_id;
        self.phase = JobPhase::Submitted;
        self.submitted_at = Utc::now();
        self.updated_at = self.submitted_at;
    }

    /// Enter the polling phase.
    pub fn mark_polling(&mut self) {
        if self.is_terminal() {
            return;
        }
        self.phase = JobPhase::Polling;
        self.updated_at = Utc::now();
    }

    /// Mark terminal success with the persisted output reference.
    pub fn succeed(&mut self, output_ref: impl Into<String>) {
        if self.is_terminal() {
            return;
        }
        self.phase = JobPhase::Succeeded;
        self.output_ref = Some(output_ref.into());
        self.last_error = None;
        self.updated_at = Utc::now();
    }

    /// Mark terminal failure.
    pub fn fail(&mut self, error: impl Into<String>) {
        if self.is_terminal() {
            return;
        }
        self.phase = JobPhase::Failed;
        self.last_error = Some(error.into());
        self.updated_at = Utc::now();
    }

    /// Mark terminal cancellation.
    pub fn cancel(&mut self) {
        if self.is_terminal() {
            return;
        }
        self.phase = JobPhase::Canceled;
        self.updated_at = Utc::now();
    }

    /// Provider succeeded but the output write failed; awaits manual retry.
    pub fn mark_persistence_pending(&mut self, output_ref: impl Into<String>, error: impl Into<String>) {
        if self.is_terminal() {
            return;
        }
        self.phase = JobPhase::PersistencePending;
        self.output_ref = Some(output_ref.into());
        self.last_error = Some(error.into());
        self.updated_at = Utc::now();
    }

    /// Mark the outcome as undeterminable (recovery only).
    pub fn mark_unresolved(&mut self) {
        if self.is_terminal() {
            return;
        }
        self.phase = JobPhase::Unresolved;
        self.updated_at = Utc::now();
    }

    /// Note that a rollback was attempted. Returns `false` if one was
    /// already attempted, so callers roll back at most once per job.
    pub fn claim_rollback(&mut self) -> bool {
        if self.rollback_attempted {
            return false;
        }
        self.rollback_attempted = true;
        true
    }
}

//! In-process job event channel.
//!
//! Subscribers (the presentation layer) receive per-job progress and a
//! single terminal event. Publishing is best-effort: with no subscribers
//! attached the event is dropped, never an error.

use lumen_models::{JobEvent, LocalJobId};
use tokio::sync::broadcast;
use tracing::debug;

/// Event together with the job it belongs to.
#[derive(Debug, Clone)]
pub struct JobEventEnvelope {
    /// Local job id the event refers to.
    pub local_id: LocalJobId,
    /// The event payload.
    pub event: JobEvent,
}

/// Channel for publishing/subscribing to job events.
#[derive(Clone)]
pub struct EventChannel {
    tx: broadcast::Sender<JobEventEnvelope>,
}

impl EventChannel {
    /// Create a new event channel with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all job events.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEventEnvelope> {
        self.tx.subscribe()
    }

    /// Publish an event.
    pub fn publish(&self, local_id: &LocalJobId, event: JobEvent) {
        debug!(local_id = %local_id, event = ?event, "Publishing job event");
        let _ = self.tx.send(JobEventEnvelope {
            local_id: local_id.clone(),
            event,
        });
    }

    /// Publish a progress update.
    pub fn progress(&self, local_id: &LocalJobId, percent: u8) {
        self.publish(local_id, JobEvent::progress(percent));
    }

    /// Publish terminal success.
    pub fn succeeded(&self, local_id: &LocalJobId, output_ref: impl Into<String>) {
        self.publish(local_id, JobEvent::succeeded(output_ref));
    }

    /// Publish terminal failure.
    pub fn failed(&self, local_id: &LocalJobId, reason: impl Into<String>) {
        self.publish(local_id, JobEvent::failed(reason));
    }

    /// Publish terminal cancellation.
    pub fn canceled(&self, local_id: &LocalJobId) {
        self.publish(local_id, JobEvent::Canceled);
    }

    /// Publish the distinguishable unknown-outcome state (recovery only).
    pub fn unresolved(&self, local_id: &LocalJobId) {
        self.publish(local_id, JobEvent::Unresolved);
    }
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::new(256)
    }
}

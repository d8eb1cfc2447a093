//! Event types for the Bovin event system
//!
//! Provides shared event definitions and the EventBus used by the capture
//! service to publish workflow progress.

mod workflow_types;

pub use workflow_types::{CameraRole, SourceKind, Step};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Bovin event types
///
/// Events are broadcast via EventBus and can be serialized for SSE
/// transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BovinEvent {
    /// A capture workflow was opened
    WorkflowOpened {
        workflow_id: Uuid,
        /// Number of cameras offered to the workflow
        camera_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// An image was committed to a step's capture slot
    CaptureCommitted {
        workflow_id: Uuid,
        step: Step,
        source: SourceKind,
        size_bytes: usize,
        timestamp: DateTime<Utc>,
    },

    /// The preferred camera was unavailable and the upload was used instead
    CaptureFallback {
        workflow_id: Uuid,
        step: Step,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// The workflow moved to an adjacent step
    StepChanged {
        workflow_id: Uuid,
        old_step: Step,
        new_step: Step,
        timestamp: DateTime<Utc>,
    },

    /// A capture, stage or submission failed and was attached to a step
    StageFailed {
        workflow_id: Uuid,
        step: Step,
        /// Machine-readable error code (e.g. "TIMEOUT")
        code: String,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// The record was persisted and the workflow ended
    WorkflowSubmitted {
        workflow_id: Uuid,
        record_id: Uuid,
        cow_id: String,
        timestamp: DateTime<Utc>,
    },

    /// The workflow was cancelled; nothing was persisted
    WorkflowCancelled {
        workflow_id: Uuid,
        step: Step,
        timestamp: DateTime<Utc>,
    },

    /// Morphology records changed; record lists should refresh
    MorphologyRecordsChanged {
        record_id: Uuid,
        timestamp: DateTime<Utc>,
    },
}

impl BovinEvent {
    /// Event type name, used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            BovinEvent::WorkflowOpened { .. } => "WorkflowOpened",
            BovinEvent::CaptureCommitted { .. } => "CaptureCommitted",
            BovinEvent::CaptureFallback { .. } => "CaptureFallback",
            BovinEvent::StepChanged { .. } => "StepChanged",
            BovinEvent::StageFailed { .. } => "StageFailed",
            BovinEvent::WorkflowSubmitted { .. } => "WorkflowSubmitted",
            BovinEvent::WorkflowCancelled { .. } => "WorkflowCancelled",
            BovinEvent::MorphologyRecordsChanged { .. } => "MorphologyRecordsChanged",
        }
    }

    /// Workflow this event belongs to, if any
    pub fn workflow_id(&self) -> Option<Uuid> {
        match self {
            BovinEvent::WorkflowOpened { workflow_id, .. }
            | BovinEvent::CaptureCommitted { workflow_id, .. }
            | BovinEvent::CaptureFallback { workflow_id, .. }
            | BovinEvent::StepChanged { workflow_id, .. }
            | BovinEvent::StageFailed { workflow_id, .. }
            | BovinEvent::WorkflowSubmitted { workflow_id, .. }
            | BovinEvent::WorkflowCancelled { workflow_id, .. } => Some(*workflow_id),
            BovinEvent::MorphologyRecordsChanged { .. } => None,
        }
    }
}

/// Central event distribution bus
///
/// Thin wrapper over `tokio::sync::broadcast`. Cloning the bus shares the
/// same channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BovinEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Examples
    ///
    /// ```
    /// use bovin_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(100);
    /// assert_eq!(event_bus.capacity(), 100);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<BovinEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: BovinEvent,
    ) -> Result<usize, broadcast::error::SendError<BovinEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: BovinEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriber_receives_emitted_event() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();
        let workflow_id = Uuid::new_v4();

        bus.emit(BovinEvent::StepChanged {
            workflow_id,
            old_step: Step::Identification,
            new_step: Step::Morphology,
            timestamp: Utc::now(),
        })
        .unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), "StepChanged");
        assert_eq!(event.workflow_id(), Some(workflow_id));
    }

    #[test]
    fn test_emit_without_subscribers_errors() {
        let bus = EventBus::new(10);
        let result = bus.emit(BovinEvent::MorphologyRecordsChanged {
            record_id: Uuid::new_v4(),
            timestamp: Utc::now(),
        });
        assert!(result.is_err());
        // lossy variant never panics
        bus.emit_lossy(BovinEvent::MorphologyRecordsChanged {
            record_id: Uuid::new_v4(),
            timestamp: Utc::now(),
        });
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = BovinEvent::WorkflowCancelled {
            workflow_id: Uuid::nil(),
            step: Step::Results,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "WorkflowCancelled");
        assert_eq!(json["step"], "results");
    }
}

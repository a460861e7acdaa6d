//! Event types for the SonicScribe event system
//!
//! Provides shared event definitions and the EventBus used to fan session
//! and model state changes out to SSE clients and log observers.

mod session_types;

pub use session_types::{FailureKind, ModelReadiness, ProducerKind, SessionPhase};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// SonicScribe event types
///
/// Events are broadcast via EventBus and serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ScribeEvent {
    /// Transcription model readiness changed
    ///
    /// Emitted once per process, when initialization settles.
    ModelStateChanged {
        /// Engine name
        engine: String,
        old_state: ModelReadiness,
        new_state: ModelReadiness,
        timestamp: DateTime<Utc>,
    },

    /// A session was created and mounted
    SessionCreated {
        session_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// Session moved between workflow phases
    SessionPhaseChanged {
        session_id: Uuid,
        old_phase: SessionPhase,
        new_phase: SessionPhase,
        /// File-selection generation the session is on
        generation: u64,
        timestamp: DateTime<Utc>,
    },

    /// A producer delivered a note sequence for the current file
    NoteSequenceReady {
        session_id: Uuid,
        generation: u64,
        producer: ProducerKind,
        note_count: usize,
        /// Sequence length in seconds
        total_time: f64,
        timestamp: DateTime<Utc>,
    },

    /// A producer failed for the current file
    TranscriptionFailed {
        session_id: Uuid,
        generation: u64,
        producer: ProducerKind,
        kind: FailureKind,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// A producer finished for a file that is no longer selected
    StaleResultDiscarded {
        session_id: Uuid,
        stale_generation: u64,
        current_generation: u64,
        timestamp: DateTime<Utc>,
    },

    /// Session removed
    SessionClosed {
        session_id: Uuid,
        timestamp: DateTime<Utc>,
    },
}

impl ScribeEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &str {
        match self {
            ScribeEvent::ModelStateChanged { .. } => "ModelStateChanged",
            ScribeEvent::SessionCreated { .. } => "SessionCreated",
            ScribeEvent::SessionPhaseChanged { .. } => "SessionPhaseChanged",
            ScribeEvent::NoteSequenceReady { .. } => "NoteSequenceReady",
            ScribeEvent::TranscriptionFailed { .. } => "TranscriptionFailed",
            ScribeEvent::StaleResultDiscarded { .. } => "StaleResultDiscarded",
            ScribeEvent::SessionClosed { .. } => "SessionClosed",
        }
    }

    /// Session the event belongs to; `None` for process-wide events
    pub fn session_id(&self) -> Option<Uuid> {
        match self {
            ScribeEvent::ModelStateChanged { .. } => None,
            ScribeEvent::SessionCreated { session_id, .. }
            | ScribeEvent::SessionPhaseChanged { session_id, .. }
            | ScribeEvent::NoteSequenceReady { session_id, .. }
            | ScribeEvent::TranscriptionFailed { session_id, .. }
            | ScribeEvent::StaleResultDiscarded { session_id, .. }
            | ScribeEvent::SessionClosed { session_id, .. } => Some(*session_id),
        }
    }
}

/// Central event distribution bus
///
/// Uses tokio::broadcast internally:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use sonic_common::events::{EventBus, ScribeEvent};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(ScribeEvent::SessionCreated {
///     session_id: uuid::Uuid::new_v4(),
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ScribeEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// * `capacity` - Number of events to buffer before lagging subscribers drop old events
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<ScribeEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists,
    /// `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: ScribeEvent,
    ) -> Result<usize, broadcast::error::SendError<ScribeEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: ScribeEvent) {
        let _ = self.tx.send(event);
    }

    /// Current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_subscribers_fails() {
        let bus = EventBus::new(10);
        let result = bus.emit(ScribeEvent::SessionClosed {
            session_id: Uuid::new_v4(),
            timestamp: Utc::now(),
        });
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_subscriber_receives_event() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();
        let session_id = Uuid::new_v4();

        bus.emit(ScribeEvent::SessionPhaseChanged {
            session_id,
            old_phase: SessionPhase::Idle,
            new_phase: SessionPhase::Classifying,
            generation: 1,
            timestamp: Utc::now(),
        })
        .unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), "SessionPhaseChanged");
        assert_eq!(event.session_id(), Some(session_id));
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = ScribeEvent::ModelStateChanged {
            engine: "stub".to_string(),
            old_state: ModelReadiness::Uninitialized,
            new_state: ModelReadiness::Ready,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "ModelStateChanged");
        assert_eq!(json["new_state"], "READY");
        assert!(event.session_id().is_none());
    }

    #[test]
    fn test_phase_serialization_and_predicates() {
        assert_eq!(
            serde_json::to_string(&SessionPhase::AwaitingModel).unwrap(),
            "\"AWAITING_MODEL\""
        );
        assert!(SessionPhase::Decoding.is_working());
        assert!(!SessionPhase::Idle.is_working());
        assert!(SessionPhase::Error.is_terminal());
        assert!(ModelReadiness::Failed.is_settled());
        assert!(!ModelReadiness::Failed.is_ready());
    }
}

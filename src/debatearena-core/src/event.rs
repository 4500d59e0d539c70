//! Events fanned out to a debate's connected listeners.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

use crate::rules::{HealthScore, Score};

/// Events emitted during a debate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DebateEvent {
    /// Informational notice (debate started, resumed, ...).
    System { message: String },
    /// A participant has spoken and been scored.
    Message {
        speaker: String,
        text: String,
        score: Option<Score>,
    },
    /// Synthesized audio for the preceding message.
    Audio { artifact_ref: String, speaker: String },
    /// Health after a turn, both clamped for display and raw.
    ScoreUpdate {
        normalized: HealthScore,
        raw: HealthScore,
    },
    /// The debate has concluded with a winner.
    GameOver { winner: String, message: String },
    /// The debate ran out of time or stalled.
    Timeout { message: String },
    /// The debate was forced to end by a fault.
    Error { message: String },
}

impl DebateEvent {
    /// Whether no further events follow this one.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DebateEvent::GameOver { .. } | DebateEvent::Timeout { .. } | DebateEvent::Error { .. }
        )
    }

    pub fn system(message: impl Into<String>) -> Self {
        DebateEvent::System {
            message: message.into(),
        }
    }
}

/// Identifier of a connected listener.
pub type ListenerId = Uuid;

/// Outcome of delivering one event to one listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// Buffer full; this listener misses the event.
    Dropped,
    /// Receiver gone; the handle can be removed.
    Closed,
}

/// Sending half of a listener connection.
///
/// The transport layer owns the receiver; a session only keeps handles
/// so it can fan events out.
#[derive(Debug, Clone)]
pub struct ListenerHandle {
    id: ListenerId,
    tx: mpsc::Sender<DebateEvent>,
}

impl ListenerHandle {
    /// Create a handle and the receiver the transport reads from.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<DebateEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                id: Uuid::new_v4(),
                tx,
            },
            rx,
        )
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Non-blocking delivery; never waits on a slow receiver.
    pub fn deliver(&self, event: DebateEvent) -> Delivery {
        match self.tx.try_send(event) {
            Ok(()) => Delivery::Delivered,
            Err(TrySendError::Full(_)) => Delivery::Dropped,
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = DebateEvent::GameOver {
            winner: "Ada".to_string(),
            message: "Ada wins".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "game_over");
        assert_eq!(json["winner"], "Ada");

        let update = DebateEvent::ScoreUpdate {
            normalized: HealthScore { first: 100, second: 0 },
            raw: HealthScore { first: 100, second: -12 },
        };
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["type"], "score_update");
        assert_eq!(json["raw"]["second"], -12);
        assert_eq!(json["normalized"]["second"], 0);
    }

    #[test]
    fn test_terminal_events() {
        assert!(DebateEvent::Timeout { message: String::new() }.is_terminal());
        assert!(DebateEvent::Error { message: String::new() }.is_terminal());
        assert!(!DebateEvent::system("hi").is_terminal());
    }

    #[tokio::test]
    async fn test_deliver_full_and_closed() {
        let (handle, mut rx) = ListenerHandle::channel(1);
        assert_eq!(handle.deliver(DebateEvent::system("one")), Delivery::Delivered);
        assert_eq!(handle.deliver(DebateEvent::system("two")), Delivery::Dropped);
        assert_eq!(rx.recv().await, Some(DebateEvent::system("one")));

        drop(rx);
        assert_eq!(handle.deliver(DebateEvent::system("three")), Delivery::Closed);
    }
}

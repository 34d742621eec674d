//! Turn event stream.
//!
//! Observers (the CLI, tests) subscribe to a broadcast channel and receive
//! lifecycle events as chains stream and settle. Publishing never blocks and
//! never fails: with no subscribers the event is simply dropped.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::registry::SpecialistId;

const CHANNEL_CAPACITY: usize = 256;

/// Lifecycle events emitted over one turn.
#[derive(Debug, Clone)]
pub enum TurnEvent {
    ChainCreated {
        decision_id: Uuid,
        specialist: SpecialistId,
        weight: f32,
        timestamp: DateTime<Utc>,
    },
    ChainDelta {
        decision_id: Uuid,
        specialist: SpecialistId,
        delta: String,
        timestamp: DateTime<Utc>,
    },
    ChainSettled {
        decision_id: Uuid,
        specialist: SpecialistId,
        /// None for a completed chain, the error message otherwise.
        error: Option<String>,
        timestamp: DateTime<Utc>,
    },
    SynthesisStarted {
        decision_id: Uuid,
        timestamp: DateTime<Utc>,
    },
    SynthesisReady {
        decision_id: Uuid,
        timestamp: DateTime<Utc>,
    },
    TurnFailed {
        decision_id: Uuid,
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

impl TurnEvent {
    pub fn decision_id(&self) -> Uuid {
        match self {
            Self::ChainCreated { decision_id, .. }
            | Self::ChainDelta { decision_id, .. }
            | Self::ChainSettled { decision_id, .. }
            | Self::SynthesisStarted { decision_id, .. }
            | Self::SynthesisReady { decision_id, .. }
            | Self::TurnFailed { decision_id, .. } => *decision_id,
        }
    }
}

/// Broadcast fan-out for turn events.
#[derive(Debug)]
pub struct EventBus {
    sender: broadcast::Sender<TurnEvent>,
}

pub type SharedEventBus = Arc<EventBus>;

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn shared() -> SharedEventBus {
        Arc::new(Self::new())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TurnEvent> {
        self.sender.subscribe()
    }

    /// Fire-and-forget publish; a missing audience is not an error.
    pub fn publish(&self, event: TurnEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_events_in_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let decision_id = Uuid::new_v4();

        bus.publish(TurnEvent::ChainCreated {
            decision_id,
            specialist: SpecialistId::AnalyticTechnical,
            weight: 0.7,
            timestamp: Utc::now(),
        });
        bus.publish(TurnEvent::ChainSettled {
            decision_id,
            specialist: SpecialistId::AnalyticTechnical,
            error: None,
            timestamp: Utc::now(),
        });

        assert!(matches!(rx.recv().await.unwrap(), TurnEvent::ChainCreated { .. }));
        match rx.recv().await.unwrap() {
            TurnEvent::ChainSettled { error, .. } => assert!(error.is_none()),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let bus = EventBus::new();
        bus.publish(TurnEvent::SynthesisStarted {
            decision_id: Uuid::new_v4(),
            timestamp: Utc::now(),
        });
    }
}

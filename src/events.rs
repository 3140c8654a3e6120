use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Domain events emitted after a successful graph mutation. Consumed by the
/// external notification pipeline; delivery is at-least-once on that side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationEvent {
    UserFollowed { follower_id: Uuid, followed_id: Uuid },
    UserUnfollowed { follower_id: Uuid, followed_id: Uuid },
    UserBlocked { blocker_id: Uuid, blocked_id: Uuid },
}

impl RelationEvent {
    pub fn name(&self) -> &'static str {
        match self {
            RelationEvent::UserFollowed { .. } => "user_followed",
            RelationEvent::UserUnfollowed { .. } => "user_unfollowed",
            RelationEvent::UserBlocked { .. } => "user_blocked",
        }
    }

    pub fn payload(&self) -> Value {
        match self {
            RelationEvent::UserFollowed {
                follower_id,
                followed_id,
            }
            | RelationEvent::UserUnfollowed {
                follower_id,
                followed_id,
            } => json!({
                "event_type": self.name(),
                "follower_id": follower_id,
                "followed_id": followed_id,
            }),
            RelationEvent::UserBlocked {
                blocker_id,
                blocked_id,
            } => json!({
                "event_type": self.name(),
                "blocker_id": blocker_id,
                "blocked_id": blocked_id,
            }),
        }
    }
}

#[derive(Debug, Error)]
#[error("event publish failed: {0}")]
pub struct PublishError(pub String);

/// Sink for relation events. The service treats publish failures like
/// counter failures: logged, never surfaced to the caller.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &RelationEvent) -> Result<(), PublishError>;
}

/// Default publisher: writes each event to the log. Stands in until a real
/// broker transport is wired by the embedding application.
#[derive(Debug, Default)]
pub struct TracingEventPublisher;

#[async_trait]
impl EventPublisher for TracingEventPublisher {
    async fn publish(&self, event: &RelationEvent) -> Result<(), PublishError> {
        tracing::info!(event = event.name(), payload = %event.payload(), "relation event");
        Ok(())
    }
}

/// Publisher that records everything it receives; used in tests and by
/// embedders that drain events themselves.
#[derive(Debug, Default)]
pub struct RecordingEventPublisher {
    events: Mutex<Vec<RelationEvent>>,
}

impl RecordingEventPublisher {
    pub async fn events(&self) -> Vec<RelationEvent> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl EventPublisher for RecordingEventPublisher {
    async fn publish(&self, event: &RelationEvent) -> Result<(), PublishError> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_carries_both_sides_of_the_edge() {
        let follower_id = Uuid::new_v4();
        let followed_id = Uuid::new_v4();
        let event = RelationEvent::UserFollowed {
            follower_id,
            followed_id,
        };

        assert_eq!(event.name(), "user_followed");
        let payload = event.payload();
        assert_eq!(
            payload.get("follower_id").and_then(Value::as_str),
            Some(follower_id.to_string().as_str())
        );
        assert_eq!(
            payload.get("followed_id").and_then(Value::as_str),
            Some(followed_id.to_string().as_str())
        );
    }
}

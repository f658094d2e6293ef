//! Domain event publishing. Publishing is best-effort: failures are logged and
//! never surface to the request that raised the event.

use crate::domain::events::DomainEvent;
use async_trait::async_trait;
use tokio::sync::RwLock;

pub const SUBJECT_PREFIX: &str = "thali";

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: DomainEvent);

    async fn publish_all(&self, events: Vec<DomainEvent>) {
        for event in events {
            self.publish(event).await;
        }
    }
}

pub struct NatsPublisher { client: async_nats::Client }

impl NatsPublisher {
    pub fn new(client: async_nats::Client) -> Self { Self { client } }
}

#[async_trait]
impl EventPublisher for NatsPublisher {
    async fn publish(&self, event: DomainEvent) {
        let subject = format!("{}.{}", SUBJECT_PREFIX, event.subject());
        let payload = match serde_json::to_vec(&event) {
            Ok(p) => p,
            Err(e) => { tracing::error!(%subject, error = %e, "failed to encode event"); return; }
        };
        if let Err(e) = self.client.publish(subject.clone(), payload.into()).await {
            tracing::warn!(%subject, error = %e, "failed to publish event");
        }
    }
}

/// Used when no broker is configured.
pub struct NoopPublisher;

#[async_trait]
impl EventPublisher for NoopPublisher {
    async fn publish(&self, event: DomainEvent) {
        tracing::debug!(subject = %event.subject(), "event dropped, no broker configured");
    }
}

/// Keeps published events in memory.
#[derive(Default)]
pub struct RecordingPublisher { published: RwLock<Vec<DomainEvent>> }

impl RecordingPublisher {
    pub fn new() -> Self { Self::default() }

    pub async fn take_published(&self) -> Vec<DomainEvent> {
        std::mem::take(&mut *self.published.write().await)
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, event: DomainEvent) {
        self.published.write().await.push(event);
    }
}

//! Domain event fan-out.
//!
//! Events go to NATS when a client is configured. Publication is best effort:
//! failures are logged and never surface to the operation that raised them.

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::domain::events::DomainEvent;

#[derive(Clone, Default)]
pub struct EventPublisher {
    nats: Option<async_nats::Client>,
    recorded: Option<Arc<Mutex<Vec<DomainEvent>>>>,
}

impl EventPublisher {
    pub fn new(nats: Option<async_nats::Client>) -> Self { Self { nats, recorded: None } }

    /// Publisher that keeps every event in memory instead of sending it.
    pub fn recording() -> Self { Self { nats: None, recorded: Some(Arc::default()) } }

    pub async fn recorded(&self) -> Vec<DomainEvent> {
        match &self.recorded {
            Some(events) => events.lock().await.clone(),
            None => vec![],
        }
    }

    pub async fn publish(&self, events: impl IntoIterator<Item = DomainEvent>) {
        for event in events {
            let subject = event.subject();
            debug!(%subject, "domain event");
            if let Some(recorded) = &self.recorded {
                recorded.lock().await.push(event.clone());
            }
            let Some(client) = &self.nats else { continue };
            let payload = match serde_json::to_vec(&event) {
                Ok(p) => p,
                Err(e) => {
                    warn!(%subject, error = %e, "failed to encode event");
                    continue;
                }
            };
            if let Err(e) = client.publish(subject.clone(), payload.into()).await {
                warn!(%subject, error = %e, "failed to publish event");
            }
        }
    }
}

//! Subscriber session events
//!
//! The device reports PPPoE sessions coming up and going down. Each report
//! updates the directory and is published to the events stream.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::directory::{Directory, DirectoryError, SessionRecord, Subscriber, SubscriberStatus};

use super::{StreamBus, StreamId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Connected,
    Disconnected,
}

/// Event published when a subscriber session changes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "pppoe_event")]
pub struct SessionEvent {
    pub status: SessionStatus,
    pub customer_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
}

/// What happened to a session report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// Recorded and published
    Published(StreamId),
    /// Recorded, but the publish failed
    Recorded,
    /// No subscriber uses this username
    Ignored,
}

/// Records session changes and publishes them
pub struct SessionEvents {
    directory: Arc<dyn Directory>,
    bus: Arc<dyn StreamBus>,
    stream: String,
}

impl SessionEvents {
    /// Create a reporter publishing to `stream`
    pub fn new(directory: Arc<dyn Directory>, bus: Arc<dyn StreamBus>, stream: impl Into<String>) -> Self {
        Self {
            directory,
            bus,
            stream: stream.into(),
        }
    }

    /// A PPPoE session came up
    pub async fn connected(
        &self,
        username: &str,
        ip: Option<&str>,
        interface: Option<&str>,
        mac: Option<&str>,
    ) -> Result<EventOutcome, DirectoryError> {
        let Some(subscriber) = self.lookup(username).await? else {
            return Ok(EventOutcome::Ignored);
        };

        let record = SessionRecord {
            status: SubscriberStatus::Active,
            assigned_ip: ip.map(str::to_string),
            mac_address: mac.map(str::to_string),
        };
        self.directory.record_session(&subscriber.id, record).await?;
        tracing::info!(resource = %subscriber.id, username, ip = ?ip, "Session connected");

        let event = SessionEvent {
            status: SessionStatus::Connected,
            customer_id: subscriber.id,
            name: subscriber.name,
            ip: ip.map(str::to_string),
            interface: interface.map(str::to_string),
        };
        Ok(self.publish(&event).await)
    }

    /// A PPPoE session went down
    pub async fn disconnected(&self, username: &str) -> Result<EventOutcome, DirectoryError> {
        let Some(subscriber) = self.lookup(username).await? else {
            return Ok(EventOutcome::Ignored);
        };

        let record = SessionRecord {
            status: SubscriberStatus::Inactive,
            assigned_ip: None,
            mac_address: None,
        };
        self.directory.record_session(&subscriber.id, record).await?;
        tracing::info!(resource = %subscriber.id, username, "Session disconnected");

        let event = SessionEvent {
            status: SessionStatus::Disconnected,
            customer_id: subscriber.id,
            name: subscriber.name,
            ip: None,
            interface: None,
        };
        Ok(self.publish(&event).await)
    }

    async fn lookup(&self, username: &str) -> Result<Option<Subscriber>, DirectoryError> {
        match self.directory.find_by_username(username).await {
            Ok(subscriber) => Ok(Some(subscriber)),
            Err(DirectoryError::NotFound(_)) => {
                tracing::debug!(username, "Ignoring session event for unknown user");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn publish(&self, event: &SessionEvent) -> EventOutcome {
        let published = match serde_json::to_string(event) {
            Ok(payload) => self.bus.publish(&self.stream, &payload).await,
            Err(e) => Err(e.into()),
        };

        match published {
            Ok(id) => EventOutcome::Published(id),
            Err(e) => {
                tracing::warn!(
                    resource = %event.customer_id,
                    stream = %self.stream,
                    error = %e,
                    "Failed to publish session event"
                );
                EventOutcome::Recorded
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{MemoryBus, ReadFrom};
    use crate::directory::MemoryDirectory;
    use std::time::Duration;

    const EVENTS: &str = "mikrotik:events";

    async fn setup() -> (Arc<MemoryDirectory>, Arc<MemoryBus>, SessionEvents) {
        let directory = Arc::new(MemoryDirectory::with_subscribers([Subscriber::pppoe(
            "c1", "Alice", "alice",
        )]));
        let bus = Arc::new(MemoryBus::default());
        bus.ensure_group(EVENTS, "g").await.unwrap();
        let events = SessionEvents::new(directory.clone(), bus.clone(), EVENTS);
        (directory, bus, events)
    }

    async fn published(bus: &MemoryBus) -> Vec<serde_json::Value> {
        bus.read_group(EVENTS, "g", "c", ReadFrom::New, 10, Duration::ZERO)
            .await
            .unwrap()
            .into_iter()
            .map(|e| serde_json::from_str(&e.payload).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_connected_records_and_publishes() {
        let (directory, bus, events) = setup().await;

        let outcome = events
            .connected("alice", Some("10.0.0.5"), Some("<pppoe-alice>"), Some("AA:BB"))
            .await
            .unwrap();
        assert!(matches!(outcome, EventOutcome::Published(_)));

        let subscriber = directory.get_subscriber("c1").await.unwrap();
        assert_eq!(subscriber.status, SubscriberStatus::Active);
        assert_eq!(subscriber.assigned_ip.as_deref(), Some("10.0.0.5"));
        assert_eq!(subscriber.mac_address.as_deref(), Some("AA:BB"));

        let messages = published(&bus).await;
        assert_eq!(
            messages,
            vec![serde_json::json!({
                "type": "pppoe_event",
                "status": "connected",
                "customer_id": "c1",
                "name": "Alice",
                "ip": "10.0.0.5",
                "interface": "<pppoe-alice>",
            })]
        );
    }

    #[tokio::test]
    async fn test_disconnected_marks_inactive() {
        let (directory, bus, events) = setup().await;
        events
            .connected("alice", Some("10.0.0.5"), None, None)
            .await
            .unwrap();

        let outcome = events.disconnected("alice").await.unwrap();
        assert!(matches!(outcome, EventOutcome::Published(_)));

        let subscriber = directory.get_subscriber("c1").await.unwrap();
        assert_eq!(subscriber.status, SubscriberStatus::Inactive);
        assert_eq!(subscriber.assigned_ip.as_deref(), Some("10.0.0.5"));

        let messages = published(&bus).await;
        assert_eq!(messages.len(), 2);
        assert_eq!(
            messages[1],
            serde_json::json!({
                "type": "pppoe_event",
                "status": "disconnected",
                "customer_id": "c1",
                "name": "Alice",
            })
        );
    }

    #[tokio::test]
    async fn test_unknown_user_ignored() {
        let (_, bus, events) = setup().await;

        assert_eq!(events.disconnected("mallory").await.unwrap(), EventOutcome::Ignored);
        assert!(published(&bus).await.is_empty());
    }
}

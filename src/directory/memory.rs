//! In-memory subscriber directory

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{Directory, DirectoryError, SessionRecord, Subscriber, SubscriberStatus};

/// Subscriber directory held in memory
#[derive(Default)]
pub struct MemoryDirectory {
    subscribers: RwLock<HashMap<String, Subscriber>>,
}

impl MemoryDirectory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a directory from a fixed set of subscribers
    pub fn with_subscribers(subscribers: impl IntoIterator<Item = Subscriber>) -> Self {
        Self {
            subscribers: RwLock::new(
                subscribers
                    .into_iter()
                    .map(|s| (s.id.clone(), s))
                    .collect(),
            ),
        }
    }

    /// Insert or replace a subscriber
    pub async fn upsert(&self, subscriber: Subscriber) {
        self.subscribers
            .write()
            .await
            .insert(subscriber.id.clone(), subscriber);
    }

    /// Remove a subscriber, returning it if present
    pub async fn remove(&self, id: &str) -> Option<Subscriber> {
        self.subscribers.write().await.remove(id)
    }

    /// Number of subscribers
    pub async fn len(&self) -> usize {
        self.subscribers.read().await.len()
    }

    /// Whether the directory has no subscribers
    pub async fn is_empty(&self) -> bool {
        self.subscribers.read().await.is_empty()
    }
}

#[async_trait]
impl Directory for MemoryDirectory {
    async fn get_subscriber(&self, id: &str) -> Result<Subscriber, DirectoryError> {
        self.subscribers
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| DirectoryError::NotFound(id.to_string()))
    }

    async fn find_by_username(&self, pppoe_username: &str) -> Result<Subscriber, DirectoryError> {
        let wanted = pppoe_username.trim();
        self.subscribers
            .read()
            .await
            .values()
            .find(|s| s.pppoe_username() == Some(wanted))
            .cloned()
            .ok_or_else(|| DirectoryError::NotFound(pppoe_username.to_string()))
    }

    async fn record_session(&self, id: &str, record: SessionRecord) -> Result<(), DirectoryError> {
        let mut subscribers = self.subscribers.write().await;
        let subscriber = subscribers
            .get_mut(id)
            .ok_or_else(|| DirectoryError::NotFound(id.to_string()))?;

        subscriber.status = record.status;
        if record.assigned_ip.is_some() {
            subscriber.assigned_ip = record.assigned_ip;
        }
        if record.mac_address.is_some() {
            subscriber.mac_address = record.mac_address;
        }
        if record.status == SubscriberStatus::Active {
            subscriber.last_online = Some(Utc::now());
        }

        Ok(())
    }
}

//! Subscription record storage.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::Result;

use super::record::SubscriptionRecord;

/// Persistence for subscription records.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Insert or overwrite a record by id.
    async fn save(&self, record: &SubscriptionRecord) -> Result<()>;

    async fn get(&self, id: Uuid) -> Result<Option<SubscriptionRecord>>;

    /// All records for an owner, newest first.
    async fn list_for_owner(&self, owner_id: &str) -> Result<Vec<SubscriptionRecord>>;

    async fn find_by_provider_id(
        &self,
        provider_subscription_id: &str,
    ) -> Result<Option<SubscriptionRecord>>;
}

/// The record that should drive access decisions for an owner.
///
/// Prefers the newest non-terminal record; falls back to the newest record
/// overall so a recently canceled subscription is still visible.
#[must_use]
pub fn authoritative(records: &[SubscriptionRecord]) -> Option<&SubscriptionRecord> {
    records
        .iter()
        .filter(|r| !r.status.is_terminal())
        .max_by_key(|r| r.created_at)
        .or_else(|| records.iter().max_by_key(|r| r.created_at))
}

/// In-memory store. Useful in tests and single-process deployments that
/// rebuild state from the provider on startup.
#[derive(Debug, Clone, Default)]
pub struct InMemorySubscriptionStore {
    records: Arc<RwLock<HashMap<Uuid, SubscriptionRecord>>>,
}

impl InMemorySubscriptionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubscriptionStore for InMemorySubscriptionStore {
    async fn save(&self, record: &SubscriptionRecord) -> Result<()> {
        self.records
            .write()
            .await
            .insert(record.id, record.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<SubscriptionRecord>> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn list_for_owner(&self, owner_id: &str) -> Result<Vec<SubscriptionRecord>> {
        let mut records: Vec<SubscriptionRecord> = self
            .records
            .read()
            .await
            .values()
            .filter(|r| r.owner_id == owner_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    async fn find_by_provider_id(
        &self,
        provider_subscription_id: &str,
    ) -> Result<Option<SubscriptionRecord>> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .find(|r| r.provider_subscription_id.as_deref() == Some(provider_subscription_id))
            .cloned())
    }
}

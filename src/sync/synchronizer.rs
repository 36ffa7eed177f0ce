//! Merging provider state into local records.
//!
//! The provider is the source of truth for subscription state; the local
//! store is a cache that answers access checks without a network call.
//! [`sync_from_provider`] is the pure merge, [`Synchronizer`] drives it
//! against a store and client, and [`SyncEventHandler`] applies webhook
//! events through the same merge.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveTime, Utc};
use tracing::{debug, warn};

use crate::error::SubkitError;
use crate::subscriptions::{ProviderClient, ProviderSubscription};
use crate::webhooks::{WebhookEvent, WebhookEventHandler};

use super::record::{SubscriptionRecord, SubscriptionStatus};
use super::store::{authoritative, SubscriptionStore};

/// How close to `next_billing_at` a record is considered stale.
const REFRESH_WINDOW_DAYS: i64 = 3;

/// Merge a provider-reported subscription into a local record.
///
/// Pure last-write-wins merge with two guards: records without a provider
/// link are returned unchanged, and terminal local state is never
/// overwritten. Provider timestamps replace local ones where present;
/// absent provider fields keep the local value.
#[must_use]
pub fn sync_from_provider(
    record: &SubscriptionRecord,
    provider: &ProviderSubscription,
) -> SubscriptionRecord {
    let mut merged = record.clone();
    if record.provider_subscription_id.is_none() {
        return merged;
    }

    let next_status = SubscriptionStatus::from_provider(&provider.status);
    if record.status.can_transition_to(next_status) {
        merged.status = next_status;
    } else {
        debug!(
            record = %record.id,
            from = %record.status,
            to = %next_status,
            "ignoring illegal status transition from provider"
        );
    }

    if let Some(start) = provider.start_date {
        merged.started_at = Some(start.and_time(NaiveTime::MIN).and_utc());
    }
    merged.next_billing_at = provider.charged_through_at.or(record.next_billing_at);
    merged.canceled_at = provider.canceled_at.or(record.canceled_at);
    merged.updated_at = Utc::now();
    merged
}

/// Whether a record is due for a provider refresh at `now`.
///
/// One-time purchases never refresh. A record with no known
/// `next_billing_at` always does; otherwise refresh inside the three-day
/// window before (or any time after) the billing date.
#[must_use]
pub fn needs_refresh(record: &SubscriptionRecord, now: DateTime<Utc>) -> bool {
    if record.is_one_time() {
        return false;
    }
    match record.next_billing_at {
        None => true,
        Some(next) => next - now <= Duration::days(REFRESH_WINDOW_DAYS),
    }
}

/// Keeps local records in step with the provider.
pub struct Synchronizer<S, C>
where
    S: SubscriptionStore,
    C: ProviderClient,
{
    store: S,
    client: C,
}

impl<S, C> Synchronizer<S, C>
where
    S: SubscriptionStore,
    C: ProviderClient,
{
    #[must_use]
    pub fn new(store: S, client: C) -> Self {
        Self { store, client }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// The owner's authoritative record, refreshed from the provider when
    /// stale. Provider failures are logged and the cached record served;
    /// an access check must not go down with the provider.
    pub async fn refresh_owner(
        &self,
        owner_id: &str,
    ) -> crate::Result<Option<SubscriptionRecord>> {
        let records = self.store.list_for_owner(owner_id).await?;
        let Some(record) = authoritative(&records).cloned() else {
            return Ok(None);
        };

        if !needs_refresh(&record, Utc::now()) {
            return Ok(Some(record));
        }
        let Some(provider_id) = record.provider_subscription_id.clone() else {
            return Ok(Some(record));
        };

        match self.client.retrieve_subscription(&provider_id).await {
            Ok(provider_sub) => {
                let merged = sync_from_provider(&record, &provider_sub);
                self.store.save(&merged).await?;
                Ok(Some(merged))
            }
            Err(e) => {
                warn!(
                    owner = owner_id,
                    subscription = %provider_id,
                    error = %e,
                    "provider refresh failed, serving cached record"
                );
                Ok(Some(record))
            }
        }
    }

    /// Does the owner currently have paid access?
    pub async fn has_premium(&self, owner_id: &str) -> crate::Result<bool> {
        let record = self.refresh_owner(owner_id).await?;
        Ok(super::record::has_premium(record.as_ref(), Utc::now()))
    }

    /// Merge one provider subscription into the matching local record.
    /// Returns the merged record, or `None` when nothing local matches.
    pub async fn apply_provider_subscription(
        &self,
        provider_sub: &ProviderSubscription,
    ) -> crate::Result<Option<SubscriptionRecord>> {
        let Some(record) = self.store.find_by_provider_id(&provider_sub.id).await? else {
            return Ok(None);
        };
        let merged = sync_from_provider(&record, provider_sub);
        self.store.save(&merged).await?;
        Ok(Some(merged))
    }
}

/// Webhook handler that feeds subscription events into the store.
///
/// Non-subscription events are ignored. Events referencing a subscription
/// with no local record are logged and acknowledged; the record will
/// appear on the next full refresh.
pub struct SyncEventHandler<S: SubscriptionStore> {
    store: S,
}

impl<S: SubscriptionStore> SyncEventHandler<S> {
    #[must_use]
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S: SubscriptionStore> WebhookEventHandler for SyncEventHandler<S> {
    async fn handle(&self, event: &WebhookEvent) -> crate::Result<()> {
        if !event.event_type.contains("subscription") {
            debug!(event_type = %event.event_type, "ignoring non-subscription event");
            return Ok(());
        }

        let provider_sub = extract_subscription(event).ok_or_else(|| {
            SubkitError::bad_request(format!(
                "subscription event '{}' carries no subscription object",
                event.event_type
            ))
        })?;

        match self.store.find_by_provider_id(&provider_sub.id).await? {
            Some(record) => {
                let merged = sync_from_provider(&record, &provider_sub);
                self.store.save(&merged).await?;
                debug!(
                    subscription = %provider_sub.id,
                    status = %merged.status,
                    "applied subscription event"
                );
            }
            None => {
                debug!(
                    subscription = %provider_sub.id,
                    "subscription event for unknown local record"
                );
            }
        }
        Ok(())
    }
}

/// Pull the subscription object out of an event payload.
///
/// Providers nest it differently across event families, so this tries the
/// common shapes: `data.object.subscription`, `data.subscription`, then
/// `data.object` itself.
fn extract_subscription(event: &WebhookEvent) -> Option<ProviderSubscription> {
    let candidates = [
        event.data.pointer("/object/subscription"),
        event.data.get("subscription"),
        event.data.get("object"),
    ];
    candidates
        .into_iter()
        .flatten()
        .find_map(|value| serde_json::from_value(value.clone()).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscriptions::{BillingError, CreateSubscriptionRequest, MockProviderClient};
    use crate::sync::store::InMemorySubscriptionStore;
    use uuid::Uuid;

    fn local_record(provider_id: Option<&str>) -> SubscriptionRecord {
        let now = Utc::now();
        SubscriptionRecord {
            id: Uuid::new_v4(),
            owner_id: "owner_1".to_string(),
            plan_variation_key: "premium_monthly".to_string(),
            status: SubscriptionStatus::Active,
            provider_subscription_id: provider_id.map(String::from),
            provider_payment_id: None,
            started_at: Some(now - Duration::days(10)),
            next_billing_at: Some(now + Duration::days(20)),
            canceled_at: None,
            created_at: now - Duration::days(10),
            updated_at: now - Duration::days(1),
        }
    }

    fn provider_sub(id: &str, status: &str) -> ProviderSubscription {
        ProviderSubscription {
            id: id.to_string(),
            customer_id: "owner_1".to_string(),
            plan_variation_id: "sv_monthly".to_string(),
            status: status.to_string(),
            start_date: None,
            charged_through_at: Some(Utc::now() + Duration::days(30)),
            canceled_at: None,
        }
    }

    #[test]
    fn test_merge_takes_provider_status_and_billing_date() {
        let record = local_record(Some("sub_1"));
        let provider = provider_sub("sub_1", "DELINQUENT");

        let merged = sync_from_provider(&record, &provider);
        assert_eq!(merged.status, SubscriptionStatus::Delinquent);
        assert_eq!(merged.next_billing_at, provider.charged_through_at);
        assert!(merged.updated_at > record.updated_at);
    }

    #[test]
    fn test_merge_keeps_local_fields_when_provider_silent() {
        let record = local_record(Some("sub_1"));
        let mut provider = provider_sub("sub_1", "ACTIVE");
        provider.charged_through_at = None;

        let merged = sync_from_provider(&record, &provider);
        assert_eq!(merged.next_billing_at, record.next_billing_at);
        assert_eq!(merged.started_at, record.started_at);
    }

    #[test]
    fn test_merge_never_leaves_terminal_state() {
        let mut record = local_record(Some("sub_1"));
        record.status = SubscriptionStatus::Canceled;

        let merged = sync_from_provider(&record, &provider_sub("sub_1", "ACTIVE"));
        assert_eq!(merged.status, SubscriptionStatus::Canceled);
    }

    #[test]
    fn test_merge_skips_unlinked_records() {
        let record = local_record(None);
        let merged = sync_from_provider(&record, &provider_sub("sub_1", "CANCELED"));
        assert_eq!(merged.status, SubscriptionStatus::Active);
    }

    #[test]
    fn test_needs_refresh_window() {
        let now = Utc::now();
        let mut record = local_record(Some("sub_1"));

        record.next_billing_at = Some(now + Duration::days(20));
        assert!(!needs_refresh(&record, now));

        record.next_billing_at = Some(now + Duration::days(2));
        assert!(needs_refresh(&record, now));

        record.next_billing_at = Some(now - Duration::days(1));
        assert!(needs_refresh(&record, now));

        record.next_billing_at = None;
        assert!(needs_refresh(&record, now));

        // One-time purchases have nothing to refresh.
        record.provider_subscription_id = None;
        assert!(!needs_refresh(&record, now));
    }

    #[tokio::test]
    async fn test_refresh_owner_serves_cache_on_provider_failure() {
        struct FailingClient;
        impl ProviderClient for FailingClient {
            async fn create_subscription(
                &self,
                _request: &CreateSubscriptionRequest,
            ) -> Result<ProviderSubscription, BillingError> {
                unimplemented!()
            }
            async fn cancel_subscription(
                &self,
                _subscription_id: &str,
            ) -> Result<ProviderSubscription, BillingError> {
                unimplemented!()
            }
            async fn retrieve_subscription(
                &self,
                _subscription_id: &str,
            ) -> Result<ProviderSubscription, BillingError> {
                Err(BillingError::ProviderUnavailable {
                    message: "down".to_string(),
                })
            }
            async fn save_card(
                &self,
                _customer_id: &str,
                _card_nonce: &str,
                _idempotency_key: &str,
            ) -> Result<String, BillingError> {
                unimplemented!()
            }
            async fn refund_payment(
                &self,
                _payment_id: &str,
                _amount_cents: i64,
                _currency: &str,
                _idempotency_key: &str,
            ) -> Result<(), BillingError> {
                unimplemented!()
            }
        }

        let store = InMemorySubscriptionStore::new();
        let mut record = local_record(Some("sub_1"));
        record.next_billing_at = Some(Utc::now() + Duration::days(1)); // stale
        store.save(&record).await.unwrap();

        let sync = Synchronizer::new(store, FailingClient);
        let served = sync.refresh_owner("owner_1").await.unwrap().unwrap();
        assert_eq!(served.id, record.id);
        assert!(sync.has_premium("owner_1").await.unwrap());
    }

    #[tokio::test]
    async fn test_refresh_owner_merges_when_stale() {
        let client = MockProviderClient::new();
        let request = CreateSubscriptionRequest::new("owner_1", "sv_monthly", "card_1");
        let provider_sub = client.create_subscription(&request).await.unwrap();

        let store = InMemorySubscriptionStore::new();
        let mut record = local_record(Some(&provider_sub.id));
        record.next_billing_at = None; // forces refresh
        store.save(&record).await.unwrap();

        let sync = Synchronizer::new(store, client);
        let refreshed = sync.refresh_owner("owner_1").await.unwrap().unwrap();
        assert_eq!(refreshed.next_billing_at, provider_sub.charged_through_at);
    }

    #[tokio::test]
    async fn test_event_handler_applies_subscription_events() {
        let store = InMemorySubscriptionStore::new();
        let record = local_record(Some("sub_1"));
        store.save(&record).await.unwrap();

        let handler = SyncEventHandler::new(store.clone());
        let payload = serde_json::json!({
            "object": {
                "subscription": {
                    "id": "sub_1",
                    "customer_id": "owner_1",
                    "plan_variation_id": "sv_monthly",
                    "status": "DELINQUENT",
                    "start_date": null,
                    "charged_through_at": null,
                    "canceled_at": null
                }
            }
        });
        let event = WebhookEvent {
            event_type: "subscription.updated".to_string(),
            data: payload,
            event_id: Some("evt_1".to_string()),
            created_at: None,
            merchant_id: None,
        };

        handler.handle(&event).await.unwrap();
        let updated = store.get(record.id).await.unwrap().unwrap();
        assert_eq!(updated.status, SubscriptionStatus::Delinquent);
    }

    #[tokio::test]
    async fn test_event_handler_ignores_other_events() {
        let handler = SyncEventHandler::new(InMemorySubscriptionStore::new());
        let event = WebhookEvent {
            event_type: "payment.created".to_string(),
            data: serde_json::json!({}),
            event_id: None,
            created_at: None,
            merchant_id: None,
        };
        handler.handle(&event).await.unwrap();
    }

    #[tokio::test]
    async fn test_event_handler_unknown_subscription_is_acknowledged() {
        let handler = SyncEventHandler::new(InMemorySubscriptionStore::new());
        let event = WebhookEvent {
            event_type: "subscription.created".to_string(),
            data: serde_json::json!({
                "object": {
                    "subscription": {
                        "id": "sub_unknown",
                        "customer_id": "owner_9",
                        "plan_variation_id": "sv_x",
                        "status": "ACTIVE",
                        "start_date": null,
                        "charged_through_at": null,
                        "canceled_at": null
                    }
                }
            }),
            event_id: None,
            created_at: None,
            merchant_id: None,
        };
        handler.handle(&event).await.unwrap();
    }
}

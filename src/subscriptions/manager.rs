//! Subscription lifecycle orchestration.
//!
//! [`LifecycleManager`] ties the catalog, the provider client, and the
//! local store together: it resolves plan keys to provider identifiers,
//! creates subscriptions (optionally deferred to preserve paid time),
//! cancels them, and issues prorated refunds.

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::catalog::{CatalogResolver, CatalogSource};
use crate::config::BillingConfig;
use crate::sync::{sync_from_provider, SubscriptionRecord, SubscriptionStatus, SubscriptionStore};

use super::client::{with_retry, CreateSubscriptionRequest, ProviderClient};
use super::error::BillingError;
use super::proration::{deferred_start_date, prorated_refund_cents, remaining_whole_days};

/// A plan key paired with one of its variation keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanVariationKey {
    pub plan: String,
    pub variation: String,
}

impl PlanVariationKey {
    /// The combined `plan_variation` label stored on records.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{}_{}", self.plan, self.variation)
    }
}

/// Split a combined key like `premium_monthly` into plan and variation.
///
/// The first underscore separates the two; a key with no underscore (or
/// nothing after it) gets the `default` variation.
#[must_use]
pub fn parse_plan_variation_key(key: &str) -> PlanVariationKey {
    match key.split_once('_') {
        Some((plan, variation)) if !variation.is_empty() => PlanVariationKey {
            plan: plan.to_string(),
            variation: variation.to_string(),
        },
        Some((plan, _)) => PlanVariationKey {
            plan: plan.to_string(),
            variation: "default".to_string(),
        },
        None => PlanVariationKey {
            plan: key.to_string(),
            variation: "default".to_string(),
        },
    }
}

/// How the customer pays.
#[derive(Debug, Clone)]
pub enum PaymentMethod {
    /// A card already stored on file with the provider.
    CardOnFile(String),
    /// A one-time tokenized card from the payment form; saved on file
    /// before subscribing.
    CardNonce(String),
}

/// Options for subscription creation.
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    /// Defer billing to this date instead of starting immediately.
    pub start_date: Option<NaiveDate>,
}

/// Options for an upgrade.
#[derive(Debug, Clone, Default)]
pub struct UpgradeOptions {
    /// Existing provider subscription to cancel, if any.
    pub subscription_to_cancel: Option<String>,
    /// When the owner's current paid access ends; the new subscription
    /// starts the day after so no paid time is lost.
    pub current_access_ends_at: Option<DateTime<Utc>>,
}

/// Result of a proration calculation and optional refund.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundOutcome {
    /// Amount owed for unused time, in cents. May be zero.
    pub amount_cents: i64,
    /// Whether a refund was actually issued through the provider. False
    /// when the amount is zero or no captured payment is on record.
    pub issued: bool,
}

/// Orchestrates subscription lifecycle operations.
pub struct LifecycleManager<S, C, K>
where
    S: SubscriptionStore,
    C: ProviderClient,
    K: CatalogSource,
{
    store: S,
    client: C,
    resolver: CatalogResolver<K>,
    config: BillingConfig,
}

impl<S, C, K> LifecycleManager<S, C, K>
where
    S: SubscriptionStore,
    C: ProviderClient,
    K: CatalogSource,
{
    #[must_use]
    pub fn new(store: S, client: C, resolver: CatalogResolver<K>, config: BillingConfig) -> Self {
        Self {
            store,
            client,
            resolver,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Resolve a plan/variation pair to the provider variation identifier
    /// for the configured environment.
    pub fn resolve_variation_id(&self, key: &PlanVariationKey) -> Result<String, BillingError> {
        let env = self.config.environment();
        let catalog = self
            .resolver
            .load()
            .map_err(|e| BillingError::CatalogUnavailable {
                message: e.to_string(),
            })?;
        let plan = catalog
            .plan(&key.plan)
            .ok_or_else(|| BillingError::PlanNotFound {
                plan_key: key.plan.clone(),
            })?;
        plan.variations
            .get(&key.variation)
            .and_then(|v| v.variation_id(env))
            .map(String::from)
            .ok_or_else(|| BillingError::PlanNotConfigured {
                plan_key: key.plan.clone(),
                variation_key: key.variation.clone(),
                environment: env,
            })
    }

    /// Create a subscription for a combined plan key like `premium_monthly`.
    pub async fn create(
        &self,
        owner_id: &str,
        plan_variation_key: &str,
        payment: PaymentMethod,
        options: CreateOptions,
    ) -> Result<SubscriptionRecord, BillingError> {
        let key = parse_plan_variation_key(plan_variation_key);
        let variation_id = self.resolve_variation_id(&key)?;
        self.create_with_variation_id(owner_id, &key.label(), &variation_id, payment, options)
            .await
    }

    /// Create a subscription against an already-resolved provider variation
    /// identifier. `key_label` is recorded locally for display and access
    /// decisions.
    pub async fn create_with_variation_id(
        &self,
        owner_id: &str,
        key_label: &str,
        variation_id: &str,
        payment: PaymentMethod,
        options: CreateOptions,
    ) -> Result<SubscriptionRecord, BillingError> {
        let card_id = self.ensure_card_on_file(owner_id, payment).await?;

        let mut request = CreateSubscriptionRequest::new(owner_id, variation_id, card_id);
        request.start_date = options.start_date;

        let provider_sub = with_retry(&self.config.retry, "create_subscription", || {
            self.client.create_subscription(&request)
        })
        .await?;

        let now = Utc::now();
        let record = SubscriptionRecord {
            id: Uuid::new_v4(),
            owner_id: owner_id.to_string(),
            plan_variation_key: key_label.to_string(),
            status: SubscriptionStatus::from_provider(&provider_sub.status),
            provider_subscription_id: Some(provider_sub.id.clone()),
            provider_payment_id: None,
            started_at: provider_sub
                .start_date
                .map(|d| d.and_time(chrono::NaiveTime::MIN).and_utc()),
            next_billing_at: provider_sub.charged_through_at,
            canceled_at: provider_sub.canceled_at,
            created_at: now,
            updated_at: now,
        };
        self.store
            .save(&record)
            .await
            .map_err(|e| BillingError::internal(e.to_string()))?;

        info!(
            owner = owner_id,
            plan = key_label,
            subscription = %provider_sub.id,
            status = %record.status,
            deferred = options.start_date.is_some(),
            "subscription created"
        );
        Ok(record)
    }

    /// Switch an owner onto a new plan without losing paid time.
    ///
    /// The old subscription (if any) is canceled best-effort; a cancel
    /// failure is logged and does not block the new subscription. The new
    /// subscription starts the day after current access ends.
    pub async fn upgrade(
        &self,
        owner_id: &str,
        plan_variation_key: &str,
        payment: PaymentMethod,
        options: UpgradeOptions,
    ) -> Result<SubscriptionRecord, BillingError> {
        if let Some(old_id) = &options.subscription_to_cancel {
            if let Err(e) = self.cancel(old_id).await {
                warn!(
                    owner = owner_id,
                    subscription = %old_id,
                    error = %e,
                    "failed to cancel previous subscription during upgrade"
                );
            }
        }

        let start_date = deferred_start_date(options.current_access_ends_at, Utc::now());
        self.create(
            owner_id,
            plan_variation_key,
            payment,
            CreateOptions { start_date },
        )
        .await
    }

    /// Cancel a subscription by its provider identifier and merge the
    /// provider's post-cancel state into the local record if one exists.
    pub async fn cancel(&self, subscription_id: &str) -> Result<SubscriptionRecord, BillingError> {
        let provider_sub = with_retry(&self.config.retry, "cancel_subscription", || {
            self.client.cancel_subscription(subscription_id)
        })
        .await?;

        let local = self
            .store
            .find_by_provider_id(subscription_id)
            .await
            .map_err(|e| BillingError::internal(e.to_string()))?;
        let record = match local {
            Some(record) => {
                let merged = sync_from_provider(&record, &provider_sub);
                self.store
                    .save(&merged)
                    .await
                    .map_err(|e| BillingError::internal(e.to_string()))?;
                merged
            }
            None => {
                return Err(BillingError::SubscriptionNotFound {
                    subscription_id: subscription_id.to_string(),
                })
            }
        };

        info!(
            subscription = subscription_id,
            status = %record.status,
            canceled_at = ?record.canceled_at,
            "subscription canceled"
        );
        Ok(record)
    }

    /// Compute and, where possible, issue a prorated refund for the unused
    /// part of the current period.
    ///
    /// Remaining time is measured in whole days to `next_billing_at`. The
    /// refund is issued through the provider only when a captured payment
    /// is on record; otherwise the amount is reported for manual handling.
    pub async fn refund_unused_time(
        &self,
        record: &SubscriptionRecord,
        price_cents: i64,
        currency: &str,
        total_period_days: i64,
    ) -> Result<RefundOutcome, BillingError> {
        let now = Utc::now();
        let remaining_days = record
            .next_billing_at
            .map(|expires| remaining_whole_days(expires, now))
            .unwrap_or(0);
        let amount_cents = prorated_refund_cents(price_cents, remaining_days, total_period_days);

        if amount_cents == 0 {
            return Ok(RefundOutcome {
                amount_cents: 0,
                issued: false,
            });
        }

        let Some(payment_id) = &record.provider_payment_id else {
            info!(
                subscription = %record.id,
                amount_cents,
                currency,
                "refund owed but no captured payment on record, handle manually"
            );
            return Ok(RefundOutcome {
                amount_cents,
                issued: false,
            });
        };

        let idempotency_key = Uuid::new_v4().to_string();
        with_retry(&self.config.retry, "refund_payment", || {
            self.client
                .refund_payment(payment_id, amount_cents, currency, &idempotency_key)
        })
        .await?;

        info!(
            subscription = %record.id,
            payment = %payment_id,
            amount_cents,
            currency,
            "prorated refund issued"
        );
        Ok(RefundOutcome {
            amount_cents,
            issued: true,
        })
    }

    async fn ensure_card_on_file(
        &self,
        owner_id: &str,
        payment: PaymentMethod,
    ) -> Result<String, BillingError> {
        match payment {
            PaymentMethod::CardOnFile(card_id) => Ok(card_id),
            PaymentMethod::CardNonce(nonce) => {
                let idempotency_key = Uuid::new_v4().to_string();
                with_retry(&self.config.retry, "save_card", || {
                    self.client.save_card(owner_id, &nonce, &idempotency_key)
                })
                .await
            }
        }
    }
}

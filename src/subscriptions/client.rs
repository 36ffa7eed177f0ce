//! Provider client trait and retry wrapper.
//!
//! [`ProviderClient`] is the seam between lifecycle logic and the billing
//! provider's API. Every mutating call carries an idempotency key so the
//! retry wrapper can safely re-send after transport failures.

use chrono::{DateTime, NaiveDate, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

use crate::config::RetryConfig;

use super::error::BillingError;

/// A subscription as the provider reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSubscription {
    pub id: String,
    pub customer_id: String,
    pub plan_variation_id: String,
    /// Provider status string, e.g. "ACTIVE", "CANCELED", "PENDING".
    pub status: String,
    /// First billable date, for deferred starts.
    pub start_date: Option<NaiveDate>,
    /// End of the period already paid for.
    pub charged_through_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
}

/// Request to create a subscription on the provider.
#[derive(Debug, Clone, Serialize)]
pub struct CreateSubscriptionRequest {
    pub customer_id: String,
    pub plan_variation_id: String,
    /// Card on file to charge.
    pub card_id: String,
    /// Billing starts on this date instead of immediately, when set.
    pub start_date: Option<NaiveDate>,
    pub idempotency_key: String,
}

impl CreateSubscriptionRequest {
    #[must_use]
    pub fn new(
        customer_id: impl Into<String>,
        plan_variation_id: impl Into<String>,
        card_id: impl Into<String>,
    ) -> Self {
        Self {
            customer_id: customer_id.into(),
            plan_variation_id: plan_variation_id.into(),
            card_id: card_id.into(),
            start_date: None,
            idempotency_key: Uuid::new_v4().to_string(),
        }
    }
}

/// Outbound calls to the billing provider.
pub trait ProviderClient: Send + Sync {
    async fn create_subscription(
        &self,
        request: &CreateSubscriptionRequest,
    ) -> Result<ProviderSubscription, BillingError>;

    /// Cancel a subscription. For active subscriptions the provider
    /// schedules cancellation at the end of the paid period; pending ones
    /// cancel immediately.
    async fn cancel_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<ProviderSubscription, BillingError>;

    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<ProviderSubscription, BillingError>;

    /// Store a card on file for the customer; returns the new card id.
    async fn save_card(
        &self,
        customer_id: &str,
        card_nonce: &str,
        idempotency_key: &str,
    ) -> Result<String, BillingError>;

    /// Refund part of a captured payment.
    async fn refund_payment(
        &self,
        payment_id: &str,
        amount_cents: i64,
        currency: &str,
        idempotency_key: &str,
    ) -> Result<(), BillingError>;
}

/// Run a provider call with exponential backoff on retryable errors.
///
/// Non-retryable errors return immediately. When attempts run out the last
/// error is wrapped in [`BillingError::RetryLimitExceeded`] context via a
/// warn log and the final error is returned as-is.
pub async fn with_retry<T, F, Fut>(
    retry: &RetryConfig,
    operation: &str,
    mut call: F,
) -> Result<T, BillingError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BillingError>>,
{
    let max_attempts = if retry.enabled {
        retry.max_attempts.max(1)
    } else {
        1
    };

    let mut attempt = 1;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < max_attempts => {
                let delay = backoff_delay(retry, attempt);
                warn!(
                    operation,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying provider call"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                if err.is_retryable() {
                    warn!(operation, attempts = attempt, "retry limit exceeded");
                }
                return Err(err);
            }
        }
    }
}

/// Exponential backoff with jitter, capped at `max_delay_ms`.
fn backoff_delay(retry: &RetryConfig, attempt: u32) -> Duration {
    let exp = retry
        .base_delay_ms
        .saturating_mul(1u64 << attempt.min(16).saturating_sub(1));
    let capped = exp.min(retry.max_delay_ms);
    let jitter = rand::thread_rng().gen_range(0..=capped / 4 + 1);
    Duration::from_millis(capped.saturating_add(jitter))
}

#[cfg(any(test, feature = "test-support"))]
pub mod test {
    //! Mock provider client for tests.

    use super::*;
    use chrono::Duration as ChronoDuration;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// In-memory stand-in for the billing provider.
    ///
    /// Subscriptions start ACTIVE unless the request has a future
    /// `start_date`, in which case they are PENDING. `fail_transport_times`
    /// makes the next N calls fail with a retryable error before
    /// succeeding, for exercising the retry path.
    #[derive(Default)]
    pub struct MockProviderClient {
        subscriptions: Mutex<HashMap<String, ProviderSubscription>>,
        pub decline_cards: bool,
        pub fail_card_save: bool,
        fail_transport_times: AtomicU32,
        refunds: Mutex<Vec<(String, i64, String)>>,
    }

    impl MockProviderClient {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Fail the next `times` calls with a retryable transport error.
        pub fn fail_transport(&self, times: u32) {
            self.fail_transport_times.store(times, Ordering::SeqCst);
        }

        fn check_transport(&self) -> Result<(), BillingError> {
            let remaining = self.fail_transport_times.load(Ordering::SeqCst);
            if remaining > 0 {
                self.fail_transport_times
                    .store(remaining - 1, Ordering::SeqCst);
                return Err(BillingError::ProviderUnavailable {
                    message: "connection reset".to_string(),
                });
            }
            Ok(())
        }

        /// Refunds issued so far, as `(payment_id, amount_cents, currency)`.
        pub fn refunds(&self) -> Vec<(String, i64, String)> {
            self.refunds.lock().map(|r| r.clone()).unwrap_or_default()
        }

        pub fn subscription(&self, id: &str) -> Option<ProviderSubscription> {
            self.subscriptions
                .lock()
                .ok()
                .and_then(|subs| subs.get(id).cloned())
        }
    }

    impl ProviderClient for MockProviderClient {
        async fn create_subscription(
            &self,
            request: &CreateSubscriptionRequest,
        ) -> Result<ProviderSubscription, BillingError> {
            self.check_transport()?;
            if self.decline_cards {
                return Err(BillingError::CardDeclined {
                    message: "card declined".to_string(),
                });
            }

            let now = Utc::now();
            let deferred = request
                .start_date
                .is_some_and(|d| d > now.date_naive());
            let sub = ProviderSubscription {
                id: format!("sub_{}", Uuid::new_v4().simple()),
                customer_id: request.customer_id.clone(),
                plan_variation_id: request.plan_variation_id.clone(),
                status: if deferred { "PENDING" } else { "ACTIVE" }.to_string(),
                start_date: request.start_date,
                charged_through_at: if deferred {
                    None
                } else {
                    Some(now + ChronoDuration::days(30))
                },
                canceled_at: None,
            };
            if let Ok(mut subs) = self.subscriptions.lock() {
                subs.insert(sub.id.clone(), sub.clone());
            }
            Ok(sub)
        }

        async fn cancel_subscription(
            &self,
            subscription_id: &str,
        ) -> Result<ProviderSubscription, BillingError> {
            self.check_transport()?;
            let mut subs = self.subscriptions.lock().map_err(|_| {
                BillingError::internal("mock lock poisoned")
            })?;
            let sub = subs.get_mut(subscription_id).ok_or_else(|| {
                BillingError::SubscriptionNotFound {
                    subscription_id: subscription_id.to_string(),
                }
            })?;
            if sub.status == "PENDING" {
                sub.status = "CANCELED".to_string();
                sub.canceled_at = Some(Utc::now());
            } else {
                // Active subscriptions run out the paid period.
                sub.canceled_at = sub.charged_through_at.or_else(|| Some(Utc::now()));
            }
            Ok(sub.clone())
        }

        async fn retrieve_subscription(
            &self,
            subscription_id: &str,
        ) -> Result<ProviderSubscription, BillingError> {
            self.check_transport()?;
            self.subscription(subscription_id).ok_or_else(|| {
                BillingError::SubscriptionNotFound {
                    subscription_id: subscription_id.to_string(),
                }
            })
        }

        async fn save_card(
            &self,
            _customer_id: &str,
            _card_nonce: &str,
            _idempotency_key: &str,
        ) -> Result<String, BillingError> {
            self.check_transport()?;
            if self.fail_card_save {
                return Err(BillingError::CardSaveFailed {
                    message: "invalid card nonce".to_string(),
                });
            }
            Ok(format!("card_{}", Uuid::new_v4().simple()))
        }

        async fn refund_payment(
            &self,
            payment_id: &str,
            amount_cents: i64,
            currency: &str,
            _idempotency_key: &str,
        ) -> Result<(), BillingError> {
            self.check_transport()?;
            if let Ok(mut refunds) = self.refunds.lock() {
                refunds.push((payment_id.to_string(), amount_cents, currency.to_string()));
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test::MockProviderClient;
    use super::*;

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            enabled: true,
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 5,
        }
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_failure() {
        let client = MockProviderClient::new();
        client.fail_transport(2);

        let request = CreateSubscriptionRequest::new("cust_1", "var_1", "card_1");
        let sub = with_retry(&fast_retry(), "create_subscription", || {
            client.create_subscription(&request)
        })
        .await
        .unwrap();
        assert_eq!(sub.status, "ACTIVE");
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max_attempts() {
        let client = MockProviderClient::new();
        client.fail_transport(10);

        let request = CreateSubscriptionRequest::new("cust_1", "var_1", "card_1");
        let err = with_retry(&fast_retry(), "create_subscription", || {
            client.create_subscription(&request)
        })
        .await
        .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_non_retryable_error_fails_fast() {
        let mut client = MockProviderClient::new();
        client.decline_cards = true;

        let request = CreateSubscriptionRequest::new("cust_1", "var_1", "card_1");
        let err = with_retry(&fast_retry(), "create_subscription", || {
            client.create_subscription(&request)
        })
        .await
        .unwrap_err();
        assert!(matches!(err, BillingError::CardDeclined { .. }));
    }

    #[tokio::test]
    async fn test_retry_disabled_means_single_attempt() {
        let client = MockProviderClient::new();
        client.fail_transport(1);

        let request = CreateSubscriptionRequest::new("cust_1", "var_1", "card_1");
        let result = with_retry(&RetryConfig::disabled(), "create_subscription", || {
            client.create_subscription(&request)
        })
        .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_backoff_is_capped() {
        let retry = RetryConfig {
            enabled: true,
            max_attempts: 10,
            base_delay_ms: 100,
            max_delay_ms: 1_000,
        };
        for attempt in 1..10 {
            let delay = backoff_delay(&retry, attempt);
            assert!(delay.as_millis() <= 1_251, "attempt {}: {:?}", attempt, delay);
        }
    }

    #[tokio::test]
    async fn test_mock_pending_cancel_is_immediate() {
        let client = MockProviderClient::new();
        let mut request = CreateSubscriptionRequest::new("cust_1", "var_1", "card_1");
        request.start_date = Some(Utc::now().date_naive() + chrono::Duration::days(5));

        let sub = client.create_subscription(&request).await.unwrap();
        assert_eq!(sub.status, "PENDING");

        let canceled = client.cancel_subscription(&sub.id).await.unwrap();
        assert_eq!(canceled.status, "CANCELED");
        assert!(canceled.canceled_at.is_some());
    }
}

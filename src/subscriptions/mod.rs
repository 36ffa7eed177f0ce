//! Subscription lifecycle: create, upgrade, cancel, refund.
//!
//! The heavy lifting lives in [`LifecycleManager`]; the provider seam is
//! [`ProviderClient`] with a mock available behind the `test-support`
//! feature.

mod client;
mod error;
mod manager;
mod proration;

pub use client::{with_retry, CreateSubscriptionRequest, ProviderClient, ProviderSubscription};
pub use error::BillingError;
pub use manager::{
    parse_plan_variation_key, CreateOptions, LifecycleManager, PaymentMethod, PlanVariationKey,
    RefundOutcome, UpgradeOptions,
};
pub use proration::{deferred_start_date, prorated_refund_cents, remaining_whole_days};

#[cfg(any(test, feature = "test-support"))]
pub use client::test::MockProviderClient;

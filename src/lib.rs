//! Subkit - catalog-driven subscription billing
//!
//! Subkit keeps a human-editable JSON plan catalog, a remote billing
//! provider, and local subscription records in agreement. It covers four
//! concerns:
//!
//! - **Catalog**: load the plan catalog, project environment-specific
//!   provider identifiers, and detect drift in fields the provider treats
//!   as immutable
//! - **Subscriptions**: create, upgrade, and cancel subscriptions with
//!   paid-time preservation and prorated refunds
//! - **Webhooks**: authenticate, parse, and dispatch inbound provider
//!   events
//! - **Sync**: merge provider-reported state into local records and answer
//!   "does this owner currently have paid access"
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use subkit::{BillingConfig, CatalogResolver, Environment, FileCatalogSource};
//!
//! subkit::init_tracing();
//!
//! let config = BillingConfig::builder()
//!     .environment(Environment::Sandbox)
//!     .webhook_secret("whsec_...")
//!     .build();
//!
//! let resolver = CatalogResolver::new(FileCatalogSource::new("config/plans.json"));
//! let resolved = resolver.resolved(config.environment()).unwrap();
//! for plan in &resolved.plans {
//!     println!("{}: {:?}", plan.key, plan.id);
//! }
//! ```

#![allow(async_fn_in_trait)] // provider client traits are used generically, not as trait objects

pub mod catalog;
mod config;
pub mod error;
pub mod subscriptions;
pub mod sync;
pub mod webhooks;

pub use catalog::{
    BillingCadence, CatalogResolver, CatalogSource, DriftCheck, DriftWarning, FileCatalogSource,
    GitSnapshotProvider, InMemoryCatalogSource, PlanCatalog, PlanDefinition, PlanKind,
    PlanVariation, ResolvedCatalog, ResolvedPlan, ResolvedVariation, SnapshotProvider,
    UnconfiguredItems,
};
pub use config::{BillingConfig, ConfigBuilder, Environment, RetryConfig};
pub use error::{Result, SubkitError};
pub use subscriptions::{
    deferred_start_date, parse_plan_variation_key, prorated_refund_cents, BillingError,
    CreateOptions, CreateSubscriptionRequest, LifecycleManager, PaymentMethod, PlanVariationKey,
    ProviderClient, ProviderSubscription, RefundOutcome, UpgradeOptions,
};
pub use sync::{
    has_premium, needs_refresh, sync_from_provider, InMemorySubscriptionStore, SubscriptionRecord,
    SubscriptionStatus, SubscriptionStore, SyncEventHandler, Synchronizer,
};
pub use webhooks::{
    verify_signature, HandlerOutcome, IdempotencyStore, MemoryIdempotencyStore, WebhookEvent,
    WebhookEventHandler, WebhookPipeline, WebhookResponse,
};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing/logging with sensible defaults.
///
/// Call this once, early, before constructing any subkit components.
///
/// # Environment Variables
///
/// - `RUST_LOG`: set log level (e.g. "info", "debug", "subkit=debug")
/// - `SUBKIT_LOG_JSON`: set to "true" for JSON formatted logs
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json_logs = std::env::var("SUBKIT_LOG_JSON")
        .map(|v| v.parse::<bool>().unwrap_or(false))
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

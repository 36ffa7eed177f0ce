//! Billing domain errors.

use crate::config::Environment;
use crate::error::SubkitError;

/// Errors from subscription lifecycle operations and provider calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingError {
    /// The plan key does not exist in the catalog.
    PlanNotFound { plan_key: String },
    /// The plan exists but has no provider identifier for this environment.
    PlanNotConfigured {
        plan_key: String,
        variation_key: String,
        environment: Environment,
    },
    /// The card was declined by the provider.
    CardDeclined { message: String },
    /// Storing the card on file failed.
    CardSaveFailed { message: String },
    /// The provider rejected the subscription request.
    SubscriptionFailed { message: String },
    /// No subscription with this identifier exists on the provider.
    SubscriptionNotFound { subscription_id: String },
    /// The refund could not be issued.
    RefundFailed { message: String },
    /// Transport-level failure reaching the provider. Retryable.
    ProviderUnavailable { message: String },
    /// All retry attempts were exhausted.
    RetryLimitExceeded { operation: String },
    /// The plan catalog could not be loaded.
    CatalogUnavailable { message: String },
    /// Local bookkeeping failure (store errors and the like).
    Internal { message: String },
}

impl std::fmt::Display for BillingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PlanNotFound { plan_key } => {
                write!(f, "plan '{}' not found in catalog", plan_key)
            }
            Self::PlanNotConfigured {
                plan_key,
                variation_key,
                environment,
            } => write!(
                f,
                "plan '{}' variation '{}' has no provider id for {}",
                plan_key, variation_key, environment
            ),
            Self::CardDeclined { message } => write!(f, "card declined: {}", message),
            Self::CardSaveFailed { message } => write!(f, "failed to save card: {}", message),
            Self::SubscriptionFailed { message } => {
                write!(f, "subscription request failed: {}", message)
            }
            Self::SubscriptionNotFound { subscription_id } => {
                write!(f, "subscription '{}' not found", subscription_id)
            }
            Self::RefundFailed { message } => write!(f, "refund failed: {}", message),
            Self::ProviderUnavailable { message } => {
                write!(f, "billing provider unavailable: {}", message)
            }
            Self::RetryLimitExceeded { operation } => {
                write!(f, "retry limit exceeded for {}", operation)
            }
            Self::CatalogUnavailable { message } => {
                write!(f, "plan catalog unavailable: {}", message)
            }
            Self::Internal { message } => write!(f, "internal billing error: {}", message),
        }
    }
}

impl std::error::Error for BillingError {}

impl BillingError {
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Caused by the caller's input rather than the system.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::PlanNotFound { .. }
                | Self::PlanNotConfigured { .. }
                | Self::CardDeclined { .. }
                | Self::SubscriptionNotFound { .. }
        )
    }

    /// The customer's payment instrument is at fault; surface to the user.
    #[must_use]
    pub fn is_payment_error(&self) -> bool {
        matches!(
            self,
            Self::CardDeclined { .. } | Self::CardSaveFailed { .. }
        )
    }

    /// Transient; a retry with the same idempotency key is safe.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ProviderUnavailable { .. })
    }
}

impl From<BillingError> for SubkitError {
    fn from(err: BillingError) -> Self {
        match &err {
            BillingError::PlanNotFound { .. } | BillingError::SubscriptionNotFound { .. } => {
                SubkitError::not_found(err.to_string())
            }
            BillingError::PlanNotConfigured { .. }
            | BillingError::CardDeclined { .. }
            | BillingError::CardSaveFailed { .. } => SubkitError::bad_request(err.to_string()),
            BillingError::ProviderUnavailable { .. } | BillingError::RetryLimitExceeded { .. } => {
                SubkitError::service_unavailable(err.to_string())
            }
            _ => SubkitError::internal(err.to_string()),
        }
    }
}

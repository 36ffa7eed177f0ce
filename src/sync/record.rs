//! Local subscription records and access decisions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Local subscription state, derived from provider status strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Created but not yet billable (deferred start).
    Pending,
    /// Billing normally; grants access.
    Active,
    /// Terminal. Nothing transitions out of canceled.
    Canceled,
    /// Payment failed; access suspended until the provider recovers it.
    Delinquent,
    /// Paused by the provider or the customer.
    Paused,
}

impl SubscriptionStatus {
    /// Map a provider status string onto local state. Unknown strings map
    /// to canceled so an unrecognized status can never grant access.
    #[must_use]
    pub fn from_provider(status: &str) -> Self {
        match status.trim().to_ascii_lowercase().as_str() {
            "pending" => Self::Pending,
            "active" => Self::Active,
            "canceled" | "cancelled" | "deactivated" => Self::Canceled,
            "delinquent" | "past_due" => Self::Delinquent,
            "paused" => Self::Paused,
            _ => Self::Canceled,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Canceled => "canceled",
            Self::Delinquent => "delinquent",
            Self::Paused => "paused",
        }
    }

    /// Canceled is final; no transition leaves it.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Canceled)
    }

    /// Whether moving to `next` is a legal transition. Staying put is
    /// always legal; leaving a terminal state never is.
    #[must_use]
    pub fn can_transition_to(&self, next: SubscriptionStatus) -> bool {
        if *self == next {
            return true;
        }
        match self {
            Self::Canceled => false,
            Self::Pending => true,
            Self::Active => matches!(
                next,
                Self::Canceled | Self::Delinquent | Self::Paused
            ),
            Self::Delinquent => matches!(next, Self::Active | Self::Canceled),
            Self::Paused => matches!(next, Self::Active | Self::Canceled),
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A subscription or one-time purchase as stored locally.
///
/// One-time purchases have no `provider_subscription_id`; for them
/// `next_billing_at` is the access expiry rather than a renewal date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    pub id: Uuid,
    pub owner_id: String,
    /// Combined plan key, e.g. `premium_monthly`.
    pub plan_variation_key: String,
    pub status: SubscriptionStatus,
    pub provider_subscription_id: Option<String>,
    /// Captured payment backing the current period, when known. Needed for
    /// prorated refunds.
    pub provider_payment_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    /// For subscriptions: end of the period already paid for. For one-time
    /// purchases: when access expires.
    pub next_billing_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SubscriptionRecord {
    /// One-time purchases are never linked to a provider subscription.
    #[must_use]
    pub fn is_one_time(&self) -> bool {
        self.provider_subscription_id.is_none()
    }

    /// Whether this record grants paid access at `now`.
    ///
    /// Only active records grant access. One-time purchases additionally
    /// require `next_billing_at` to be strictly in the future; an expiry
    /// exactly at `now` means access has ended. Provider-managed
    /// subscriptions are trusted while active, since the provider flips
    /// them out of active when billing stops.
    #[must_use]
    pub fn grants_access(&self, now: DateTime<Utc>) -> bool {
        if self.status != SubscriptionStatus::Active {
            return false;
        }
        if self.is_one_time() {
            return match self.next_billing_at {
                Some(expires) => now < expires,
                None => false,
            };
        }
        true
    }
}

/// Whether the owner's most relevant record grants paid access at `now`.
#[must_use]
pub fn has_premium(record: Option<&SubscriptionRecord>, now: DateTime<Utc>) -> bool {
    record.is_some_and(|r| r.grants_access(now))
}

//! Date and money arithmetic for upgrades and refunds.

use chrono::{DateTime, Duration, NaiveDate, Utc};

/// The date a new subscription should start so the owner keeps time they
/// already paid for.
///
/// Returns the day after access ends when `access_ends_at` is strictly in
/// the future; `None` (start immediately) when access has already ended or
/// was never set. Access ending exactly at `now` counts as ended.
#[must_use]
pub fn deferred_start_date(
    access_ends_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<NaiveDate> {
    let ends_at = access_ends_at?;
    if ends_at > now {
        Some((ends_at + Duration::days(1)).date_naive())
    } else {
        None
    }
}

/// Prorated refund for the unused part of a billing period, in cents.
///
/// `remaining_days / total_period_days` of the price, rounded to the
/// nearest cent. Remaining days are clamped into `[0, total_period_days]`
/// so the refund never exceeds the price or goes negative. A zero or
/// negative period length refunds nothing.
#[must_use]
pub fn prorated_refund_cents(price_cents: i64, remaining_days: i64, total_period_days: i64) -> i64 {
    if total_period_days <= 0 || price_cents <= 0 {
        return 0;
    }
    let remaining = remaining_days.clamp(0, total_period_days);
    let fraction = remaining as f64 / total_period_days as f64;
    (price_cents as f64 * fraction).round() as i64
}

/// Whole days of access remaining, never negative.
#[must_use]
pub fn remaining_whole_days(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (expires_at - now).num_days().max(0)
}

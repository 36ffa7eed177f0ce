//! Local subscription state: records, storage, and provider sync.

mod record;
mod store;
mod synchronizer;

pub use record::{has_premium, SubscriptionRecord, SubscriptionStatus};
pub use store::{authoritative, InMemorySubscriptionStore, SubscriptionStore};
pub use synchronizer::{needs_refresh, sync_from_provider, SyncEventHandler, Synchronizer};

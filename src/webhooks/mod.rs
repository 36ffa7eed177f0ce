//! Inbound provider webhooks: verification, parsing, dispatch, HTTP ingress.

mod event;
mod pipeline;
mod router;
mod verification;

pub use event::{normalize_event_type, EventParseError, WebhookEvent};
pub use pipeline::{
    HandlerOutcome, IdempotencyStore, MemoryIdempotencyStore, WebhookEventHandler,
    WebhookPipeline, WebhookResponse,
};
pub use router::{webhook_router, SIGNATURE_HEADER};
pub use verification::{sign_payload, verify_signature};

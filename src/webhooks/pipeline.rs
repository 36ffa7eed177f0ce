//! Webhook ingest pipeline: verify, parse, dedupe, dispatch.
//!
//! The pipeline acknowledges every authenticated, well-formed event even
//! when the handler fails; providers retry on non-2xx and a poison event
//! must not wedge the queue. Handler failures are logged with enough
//! context to replay by hand.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::config::BillingConfig;

use super::event::WebhookEvent;
use super::verification::verify_signature;

/// Processes authenticated events.
#[async_trait]
pub trait WebhookEventHandler: Send + Sync {
    async fn handle(&self, event: &WebhookEvent) -> crate::Result<()>;
}

/// Duplicate-delivery tracking keyed by provider event id.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Record the key; returns false when it was already present.
    async fn insert(&self, key: &str) -> crate::Result<bool>;
}

/// In-memory idempotency store with bounded retention; the oldest keys are
/// evicted first. Single-process only.
pub struct MemoryIdempotencyStore {
    inner: Mutex<MemoryIdempotencyInner>,
    capacity: usize,
}

struct MemoryIdempotencyInner {
    seen: HashSet<String>,
    order: VecDeque<String>,
}

impl MemoryIdempotencyStore {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(MemoryIdempotencyInner {
                seen: HashSet::with_capacity(capacity),
                order: VecDeque::with_capacity(capacity),
            }),
            capacity,
        }
    }
}

impl Default for MemoryIdempotencyStore {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl IdempotencyStore for MemoryIdempotencyStore {
    async fn insert(&self, key: &str) -> crate::Result<bool> {
        let mut inner = self.inner.lock().await;
        if inner.seen.contains(key) {
            return Ok(false);
        }
        if inner.order.len() >= self.capacity {
            if let Some(evicted) = inner.order.pop_front() {
                inner.seen.remove(&evicted);
            }
        }
        inner.seen.insert(key.to_string());
        inner.order.push_back(key.to_string());
        Ok(true)
    }
}

/// What happened to a successfully ingested event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerOutcome {
    Handled,
    /// The handler returned an error; logged, event acknowledged anyway.
    Failed,
    /// Duplicate delivery, skipped.
    AlreadyProcessed,
    /// No handler is registered.
    NoHandler,
}

/// Result of pushing a request through the pipeline.
#[derive(Debug)]
pub enum WebhookResponse {
    /// Authenticated and parsed; acknowledge with 2xx.
    Received {
        event: WebhookEvent,
        outcome: HandlerOutcome,
    },
    /// No signature header was supplied.
    MissingSignature,
    /// The signature did not match the body.
    InvalidSignature,
    /// No webhook secret is configured; nothing can be verified.
    SecretNotConfigured,
    /// Authenticated but the body is not a parseable event.
    InvalidPayload { message: String },
}

/// Verifies, parses, and dispatches inbound webhook requests.
pub struct WebhookPipeline {
    secret: Option<SecretString>,
    handler: Option<Arc<dyn WebhookEventHandler>>,
    idempotency: Option<Arc<dyn IdempotencyStore>>,
}

impl WebhookPipeline {
    #[must_use]
    pub fn new(secret: SecretString) -> Self {
        Self {
            secret: Some(secret),
            handler: None,
            idempotency: None,
        }
    }

    /// Build from config; a missing webhook secret produces a pipeline
    /// that rejects everything with [`WebhookResponse::SecretNotConfigured`].
    #[must_use]
    pub fn from_config(config: &BillingConfig) -> Self {
        Self {
            secret: config.webhook_secret.clone(),
            handler: None,
            idempotency: None,
        }
    }

    #[must_use]
    pub fn with_handler(mut self, handler: Arc<dyn WebhookEventHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Enable duplicate-delivery suppression. Off by default; most
    /// handlers are idempotent merges and redelivery is harmless.
    #[must_use]
    pub fn with_idempotency(mut self, store: Arc<dyn IdempotencyStore>) -> Self {
        self.idempotency = Some(store);
        self
    }

    /// Run one request through the pipeline.
    pub async fn ingest(&self, body: &[u8], signature: Option<&str>) -> WebhookResponse {
        let Some(secret) = &self.secret else {
            warn!("webhook received but no webhook secret is configured");
            return WebhookResponse::SecretNotConfigured;
        };
        let Some(signature) = signature else {
            return WebhookResponse::MissingSignature;
        };
        if !verify_signature(body, signature, secret.expose_secret()) {
            warn!("webhook signature verification failed");
            return WebhookResponse::InvalidSignature;
        }

        let body = match std::str::from_utf8(body) {
            Ok(body) => body,
            Err(_) => {
                return WebhookResponse::InvalidPayload {
                    message: "body is not valid UTF-8".to_string(),
                }
            }
        };
        let event = match WebhookEvent::parse(body) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "authenticated webhook with unparseable payload");
                return WebhookResponse::InvalidPayload {
                    message: e.to_string(),
                };
            }
        };

        let outcome = self.dispatch(&event).await;
        WebhookResponse::Received { event, outcome }
    }

    async fn dispatch(&self, event: &WebhookEvent) -> HandlerOutcome {
        if let (Some(store), Some(event_id)) = (&self.idempotency, &event.event_id) {
            match store.insert(event_id).await {
                Ok(true) => {}
                Ok(false) => {
                    info!(event_id = %event_id, event_type = %event.event_type, "duplicate webhook delivery");
                    return HandlerOutcome::AlreadyProcessed;
                }
                Err(e) => {
                    // Fail open: better to process twice than drop an event.
                    warn!(error = %e, "idempotency store unavailable, processing anyway");
                }
            }
        }

        let Some(handler) = &self.handler else {
            info!(event_type = %event.event_type, "no webhook handler registered");
            return HandlerOutcome::NoHandler;
        };
        match handler.handle(event).await {
            Ok(()) => HandlerOutcome::Handled,
            Err(e) => {
                error!(
                    event_type = %event.event_type,
                    event_id = ?event.event_id,
                    error = %e,
                    "webhook handler failed, acknowledging anyway"
                );
                HandlerOutcome::Failed
            }
        }
    }
}

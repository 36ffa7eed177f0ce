//! Billing configuration.
//!
//! All components take an explicit [`BillingConfig`] at construction time
//! rather than reading ambient process state, so tests can run multiple
//! simulated tenants side by side. The only ambient inputs are the
//! environment resolution fallbacks described on [`Environment::resolve`].

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::RwLock;

/// Environment variable consulted when no explicit environment is configured.
pub const ENVIRONMENT_VAR: &str = "SUBKIT_ENVIRONMENT";

/// Deployment environment against the billing provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    /// Provider sandbox; the safe default.
    Sandbox,
    /// Live provider environment.
    Production,
}

static GLOBAL_ENVIRONMENT: RwLock<Option<Environment>> = RwLock::new(None);

impl Environment {
    /// Parse an environment name. Unrecognized values fall back to sandbox
    /// so a typo can never point at production.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "production" => Self::Production,
            _ => Self::Sandbox,
        }
    }

    /// Resolve the effective environment.
    ///
    /// Resolution order: the explicit value (per-config), then the
    /// library-wide override set via [`set_global_environment`], then the
    /// `SUBKIT_ENVIRONMENT` environment variable, defaulting to sandbox.
    #[must_use]
    pub fn resolve(explicit: Option<Environment>) -> Self {
        if let Some(env) = explicit {
            return env;
        }
        if let Ok(guard) = GLOBAL_ENVIRONMENT.read() {
            if let Some(env) = *guard {
                return env;
            }
        }
        match std::env::var(ENVIRONMENT_VAR) {
            Ok(value) => Self::parse(&value),
            Err(_) => Self::Sandbox,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sandbox => "sandbox",
            Self::Production => "production",
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Set the library-wide environment override.
///
/// Applies to every [`BillingConfig`] that does not carry its own explicit
/// environment. Intended for application startup, not per-request use.
pub fn set_global_environment(env: Environment) {
    if let Ok(mut guard) = GLOBAL_ENVIRONMENT.write() {
        *guard = Some(env);
    }
}

/// Retry behavior for outbound provider calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Whether transient failures are retried at all. Disable in tests and
    /// local development for fast feedback.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Maximum number of attempts, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base delay for exponential backoff, in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Cap on the backoff delay, in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryConfig {
    /// Retries disabled entirely; every call gets exactly one attempt.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    250
}

fn default_max_delay_ms() -> u64 {
    5_000
}

/// Configuration for the billing components.
///
/// Secrets are held as [`SecretString`] so they never show up in debug
/// output or logs.
#[derive(Clone)]
pub struct BillingConfig {
    environment: Option<Environment>,
    /// Provider API credential for outbound calls.
    pub access_token: Option<SecretString>,
    /// Shared secret for webhook signature verification.
    pub webhook_secret: Option<SecretString>,
    /// Path to the JSON plan catalog, when file-backed.
    pub catalog_path: Option<PathBuf>,
    /// Outbound retry policy.
    pub retry: RetryConfig,
}

impl BillingConfig {
    /// Create a builder for constructing a config.
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    /// The effective environment, following the resolution order documented
    /// on [`Environment::resolve`].
    #[must_use]
    pub fn environment(&self) -> Environment {
        Environment::resolve(self.environment)
    }
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            environment: None,
            access_token: None,
            webhook_secret: None,
            catalog_path: None,
            retry: RetryConfig::default(),
        }
    }
}

impl std::fmt::Debug for BillingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BillingConfig")
            .field("environment", &self.environment)
            .field("access_token", &self.access_token.as_ref().map(|_| "[redacted]"))
            .field("webhook_secret", &self.webhook_secret.as_ref().map(|_| "[redacted]"))
            .field("catalog_path", &self.catalog_path)
            .field("retry", &self.retry)
            .finish()
    }
}

/// Builder for [`BillingConfig`].
#[must_use = "builder does nothing until you call build()"]
pub struct ConfigBuilder {
    config: BillingConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: BillingConfig::default(),
        }
    }

    /// Pin the environment explicitly, bypassing global and env-var fallbacks.
    pub fn environment(mut self, env: Environment) -> Self {
        self.config.environment = Some(env);
        self
    }

    pub fn access_token(mut self, token: impl Into<String>) -> Self {
        self.config.access_token = Some(SecretString::new(token.into()));
        self
    }

    pub fn webhook_secret(mut self, secret: impl Into<String>) -> Self {
        self.config.webhook_secret = Some(SecretString::new(secret.into()));
        self
    }

    pub fn catalog_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.catalog_path = Some(path.into());
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    pub fn build(self) -> BillingConfig {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_falls_back_to_sandbox() {
        assert_eq!(Environment::parse("production"), Environment::Production);
        assert_eq!(Environment::parse("PRODUCTION"), Environment::Production);
        assert_eq!(Environment::parse("sandbox"), Environment::Sandbox);
        assert_eq!(Environment::parse("staging"), Environment::Sandbox);
        assert_eq!(Environment::parse(""), Environment::Sandbox);
    }

    #[test]
    fn test_explicit_environment_wins() {
        let config = BillingConfig::builder()
            .environment(Environment::Production)
            .build();
        assert_eq!(config.environment(), Environment::Production);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = BillingConfig::builder()
            .access_token("sk_live_abc")
            .webhook_secret("whsec_xyz")
            .build();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("sk_live_abc"));
        assert!(!debug.contains("whsec_xyz"));
        assert!(debug.contains("[redacted]"));
    }

    #[test]
    fn test_retry_disabled() {
        let retry = RetryConfig::disabled();
        assert!(!retry.enabled);
        assert_eq!(retry.max_attempts, 3);
    }
}

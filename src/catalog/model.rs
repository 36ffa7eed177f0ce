//! Plan catalog data model.
//!
//! The catalog is an environment-agnostic description of everything the
//! application sells. Each plan and variation carries two candidate
//! provider identifiers, one per deployment environment; the resolved view
//! ([`ResolvedPlan`], [`ResolvedVariation`]) collapses those into a single
//! `id` selected at read time and is never persisted.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::Environment;

/// What kind of product a plan represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanKind {
    /// No billing at all; never requires provider identifiers.
    Free,
    /// Recurring subscription.
    Subscription,
    /// Time-boxed one-time purchase with no recurring billing.
    OneTime,
}

/// Billing frequency for a recurring variation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BillingCadence {
    Monthly,
    Annual,
    Weekly,
}

impl BillingCadence {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Monthly => "MONTHLY",
            Self::Annual => "ANNUAL",
            Self::Weekly => "WEEKLY",
        }
    }
}

impl std::fmt::Display for BillingCadence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A priced, cadenced offering under a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanVariation {
    /// Provider variation identifier for the sandbox environment.
    #[serde(default)]
    pub sandbox_variation_id: Option<String>,
    /// Provider variation identifier for the production environment.
    #[serde(default)]
    pub production_variation_id: Option<String>,
    /// Price in minor currency units (e.g. cents).
    #[serde(default)]
    pub amount: i64,
    /// ISO currency code (e.g. "USD").
    #[serde(default)]
    pub currency: String,
    /// Billing cadence; absent for one-time purchases.
    #[serde(default)]
    pub cadence: Option<BillingCadence>,
    /// Inactive variations are kept for history but not offered for sale.
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub features: Vec<String>,
    /// Human-readable price string (e.g. "$4.99 / month").
    #[serde(default)]
    pub price_label: Option<String>,
    /// Human-readable billing notice shown at purchase time.
    #[serde(default)]
    pub billing_notice: Option<String>,
}

fn default_active() -> bool {
    true
}

impl PlanVariation {
    /// The provider identifier candidate for the given environment.
    #[must_use]
    pub fn variation_id(&self, env: Environment) -> Option<&str> {
        match env {
            Environment::Sandbox => self.sandbox_variation_id.as_deref(),
            Environment::Production => self.production_variation_id.as_deref(),
        }
    }

    /// A new variation node with both candidate identifiers unset.
    ///
    /// Used when an identifier update targets a variation that does not yet
    /// exist in the catalog; maintainers fill in pricing afterwards.
    #[must_use]
    pub fn placeholder() -> Self {
        Self {
            sandbox_variation_id: None,
            production_variation_id: None,
            amount: 0,
            currency: String::new(),
            cadence: None,
            active: true,
            features: Vec::new(),
            price_label: None,
            billing_notice: None,
        }
    }
}

/// A sellable product family, independent of price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanDefinition {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub kind: PlanKind,
    /// Provider base plan identifier for the sandbox environment.
    #[serde(default)]
    pub sandbox_base_plan_id: Option<String>,
    /// Provider base plan identifier for the production environment.
    #[serde(default)]
    pub production_base_plan_id: Option<String>,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub variations: BTreeMap<String, PlanVariation>,
}

impl PlanDefinition {
    /// The base plan identifier candidate for the given environment.
    #[must_use]
    pub fn base_plan_id(&self, env: Environment) -> Option<&str> {
        match env {
            Environment::Sandbox => self.sandbox_base_plan_id.as_deref(),
            Environment::Production => self.production_base_plan_id.as_deref(),
        }
    }

    /// A new plan node with both candidate identifiers unset.
    #[must_use]
    pub fn placeholder(key: &str, kind: PlanKind) -> Self {
        Self {
            name: key.to_string(),
            description: None,
            kind,
            sandbox_base_plan_id: None,
            production_base_plan_id: None,
            features: Vec::new(),
            variations: BTreeMap::new(),
        }
    }

    /// Project this plan into its environment-specific view.
    #[must_use]
    pub fn resolve(&self, key: &str, env: Environment) -> ResolvedPlan {
        ResolvedPlan {
            key: key.to_string(),
            name: self.name.clone(),
            description: self.description.clone(),
            kind: self.kind,
            id: self.base_plan_id(env).map(String::from),
            features: self.features.clone(),
            variations: self
                .variations
                .iter()
                .map(|(vkey, v)| ResolvedVariation {
                    key: vkey.clone(),
                    id: v.variation_id(env).map(String::from),
                    amount: v.amount,
                    currency: v.currency.clone(),
                    cadence: v.cadence,
                    active: v.active,
                    features: v.features.clone(),
                    price_label: v.price_label.clone(),
                    billing_notice: v.billing_notice.clone(),
                })
                .collect(),
        }
    }
}

/// The full catalog: subscription plans plus one-time purchases.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanCatalog {
    #[serde(default)]
    pub plans: BTreeMap<String, PlanDefinition>,
    #[serde(default)]
    pub one_time_purchases: BTreeMap<String, PlanDefinition>,
}

impl PlanCatalog {
    /// Look up a plan by key across both maps.
    #[must_use]
    pub fn plan(&self, key: &str) -> Option<&PlanDefinition> {
        self.plans
            .get(key)
            .or_else(|| self.one_time_purchases.get(key))
    }

    /// Mutable lookup across both maps.
    pub fn plan_mut(&mut self, key: &str) -> Option<&mut PlanDefinition> {
        if self.plans.contains_key(key) {
            self.plans.get_mut(key)
        } else {
            self.one_time_purchases.get_mut(key)
        }
    }

    /// Iterate over every plan in both maps, key first.
    pub fn iter_all(&self) -> impl Iterator<Item = (&str, &PlanDefinition)> {
        self.plans
            .iter()
            .chain(self.one_time_purchases.iter())
            .map(|(k, v)| (k.as_str(), v))
    }
}

/// Environment-projected variation. Computed at read time, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedVariation {
    pub key: String,
    /// The single provider identifier selected for the environment.
    pub id: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub cadence: Option<BillingCadence>,
    pub active: bool,
    pub features: Vec<String>,
    pub price_label: Option<String>,
    pub billing_notice: Option<String>,
}

/// Environment-projected plan. Computed at read time, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedPlan {
    pub key: String,
    pub name: String,
    pub description: Option<String>,
    pub kind: PlanKind,
    /// The single provider identifier selected for the environment.
    pub id: Option<String>,
    pub features: Vec<String>,
    pub variations: Vec<ResolvedVariation>,
}

impl ResolvedPlan {
    /// Find a variation by key.
    #[must_use]
    pub fn variation(&self, key: &str) -> Option<&ResolvedVariation> {
        self.variations.iter().find(|v| v.key == key)
    }
}

/// The fully resolved catalog for one environment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedCatalog {
    pub plans: Vec<ResolvedPlan>,
    pub one_time_purchases: Vec<ResolvedPlan>,
}

impl ResolvedCatalog {
    /// Find a plan by key across both lists.
    #[must_use]
    pub fn plan(&self, key: &str) -> Option<&ResolvedPlan> {
        self.plans
            .iter()
            .chain(self.one_time_purchases.iter())
            .find(|p| p.key == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_variation() -> PlanVariation {
        PlanVariation {
            sandbox_variation_id: Some("sv_1".to_string()),
            production_variation_id: Some("pv_1".to_string()),
            amount: 499,
            currency: "USD".to_string(),
            cadence: Some(BillingCadence::Monthly),
            active: true,
            features: vec!["premium".to_string()],
            price_label: Some("$4.99 / month".to_string()),
            billing_notice: None,
        }
    }

    #[test]
    fn test_variation_id_per_environment() {
        let v = sample_variation();
        assert_eq!(v.variation_id(Environment::Sandbox), Some("sv_1"));
        assert_eq!(v.variation_id(Environment::Production), Some("pv_1"));
    }

    #[test]
    fn test_resolve_collapses_candidates() {
        let mut plan = PlanDefinition::placeholder("premium", PlanKind::Subscription);
        plan.sandbox_base_plan_id = Some("sb_base".to_string());
        plan.variations.insert("monthly".to_string(), sample_variation());

        let resolved = plan.resolve("premium", Environment::Sandbox);
        assert_eq!(resolved.id.as_deref(), Some("sb_base"));
        assert_eq!(resolved.variations.len(), 1);
        assert_eq!(resolved.variations[0].id.as_deref(), Some("sv_1"));

        let resolved = plan.resolve("premium", Environment::Production);
        assert_eq!(resolved.id, None);
        assert_eq!(resolved.variations[0].id.as_deref(), Some("pv_1"));
    }

    #[test]
    fn test_catalog_json_round_trip() {
        let json = r#"{
            "plans": {
                "premium": {
                    "name": "Premium",
                    "kind": "subscription",
                    "sandbox_base_plan_id": "sb_1",
                    "production_base_plan_id": null,
                    "variations": {
                        "monthly": {
                            "sandbox_variation_id": "sv_1",
                            "amount": 499,
                            "currency": "USD",
                            "cadence": "MONTHLY",
                            "active": true
                        }
                    }
                }
            },
            "one_time_purchases": {
                "week_pass": {
                    "name": "Week Pass",
                    "kind": "one_time",
                    "variations": {
                        "default": {
                            "amount": 499,
                            "currency": "USD"
                        }
                    }
                }
            }
        }"#;

        let catalog: PlanCatalog = serde_json::from_str(json).unwrap();
        let premium = catalog.plan("premium").unwrap();
        assert_eq!(premium.kind, PlanKind::Subscription);
        let monthly = premium.variations.get("monthly").unwrap();
        assert_eq!(monthly.cadence, Some(BillingCadence::Monthly));
        assert!(monthly.active);

        let pass = catalog.plan("week_pass").unwrap();
        assert_eq!(pass.kind, PlanKind::OneTime);
        assert_eq!(pass.variations.get("default").unwrap().cadence, None);

        // Survives a serialize/deserialize cycle unchanged.
        let rewritten = serde_json::to_string(&catalog).unwrap();
        let reparsed: PlanCatalog = serde_json::from_str(&rewritten).unwrap();
        assert_eq!(catalog, reparsed);
    }

    #[test]
    fn test_plan_lookup_spans_both_maps() {
        let mut catalog = PlanCatalog::default();
        catalog.plans.insert(
            "premium".to_string(),
            PlanDefinition::placeholder("premium", PlanKind::Subscription),
        );
        catalog.one_time_purchases.insert(
            "week_pass".to_string(),
            PlanDefinition::placeholder("week_pass", PlanKind::OneTime),
        );

        assert!(catalog.plan("premium").is_some());
        assert!(catalog.plan("week_pass").is_some());
        assert!(catalog.plan("missing").is_none());
        assert_eq!(catalog.iter_all().count(), 2);
    }
}

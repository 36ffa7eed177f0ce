//! Environment-aware catalog resolution and identifier maintenance.
//!
//! The resolver owns a [`CatalogSource`] and answers two questions: "what
//! does the catalog look like in this environment" and "which provider
//! identifiers are still missing". It also performs the identifier upserts
//! used by provisioning tooling after objects are created on the provider
//! side.

use tracing::info;

use crate::config::Environment;
use crate::error::Result;

use super::model::{PlanCatalog, PlanDefinition, PlanKind, PlanVariation, ResolvedCatalog};
use super::source::CatalogSource;

/// Catalog entries that still need provider identifiers for an environment.
///
/// Free plans are excluded: they never require provider objects.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnconfiguredItems {
    /// Plan keys missing a base plan identifier.
    pub base_plans: Vec<String>,
    /// `(plan_key, variation_key)` pairs missing a variation identifier.
    pub variations: Vec<(String, String)>,
}

impl UnconfiguredItems {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.base_plans.is_empty() && self.variations.is_empty()
    }
}

/// Loads the catalog and projects it per environment.
#[derive(Debug)]
pub struct CatalogResolver<S: CatalogSource> {
    source: S,
}

impl<S: CatalogSource> CatalogResolver<S> {
    #[must_use]
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// Load the raw, environment-agnostic catalog.
    pub fn load(&self) -> Result<PlanCatalog> {
        self.source.load()
    }

    /// Load and resolve the catalog for one environment.
    pub fn resolved(&self, env: Environment) -> Result<ResolvedCatalog> {
        Ok(resolve(&self.load()?, env))
    }

    /// Record the provider base plan identifier for a plan in one
    /// environment, leaving the other environment's identifier untouched.
    ///
    /// If the plan does not exist yet a placeholder node is created so the
    /// identifier is not lost; maintainers fill in the rest afterwards.
    /// Re-applying the same identifier is a no-op apart from the rewrite.
    pub fn update_base_plan_id(
        &self,
        env: Environment,
        plan_key: &str,
        new_id: &str,
    ) -> Result<()> {
        let mut catalog = self.load()?;
        let plan = ensure_plan(&mut catalog, plan_key);
        match env {
            Environment::Sandbox => plan.sandbox_base_plan_id = Some(new_id.to_string()),
            Environment::Production => plan.production_base_plan_id = Some(new_id.to_string()),
        }
        self.source.save(&catalog)?;
        info!(plan = plan_key, environment = %env, "updated base plan id");
        Ok(())
    }

    /// Record the provider variation identifier for a plan variation in one
    /// environment. Missing plan or variation nodes are created as
    /// placeholders.
    pub fn update_variation_id(
        &self,
        env: Environment,
        plan_key: &str,
        variation_key: &str,
        new_id: &str,
    ) -> Result<()> {
        let mut catalog = self.load()?;
        let plan = ensure_plan(&mut catalog, plan_key);
        let variation = plan
            .variations
            .entry(variation_key.to_string())
            .or_insert_with(PlanVariation::placeholder);
        match env {
            Environment::Sandbox => variation.sandbox_variation_id = Some(new_id.to_string()),
            Environment::Production => variation.production_variation_id = Some(new_id.to_string()),
        }
        self.source.save(&catalog)?;
        info!(
            plan = plan_key,
            variation = variation_key,
            environment = %env,
            "updated variation id"
        );
        Ok(())
    }

    /// Enumerate catalog entries missing provider identifiers for `env`.
    pub fn unconfigured_items(&self, env: Environment) -> Result<UnconfiguredItems> {
        let catalog = self.load()?;
        let mut items = UnconfiguredItems::default();
        for (key, plan) in catalog.iter_all() {
            if plan.kind == PlanKind::Free {
                continue;
            }
            if plan.base_plan_id(env).is_none() {
                items.base_plans.push(key.to_string());
            }
            for (vkey, variation) in &plan.variations {
                if variation.variation_id(env).is_none() {
                    items.variations.push((key.to_string(), vkey.clone()));
                }
            }
        }
        Ok(items)
    }
}

/// Project a catalog into its environment-specific view.
///
/// Pure: the same catalog and environment always produce the same result.
#[must_use]
pub fn resolve(catalog: &PlanCatalog, env: Environment) -> ResolvedCatalog {
    ResolvedCatalog {
        plans: catalog
            .plans
            .iter()
            .map(|(key, plan)| plan.resolve(key, env))
            .collect(),
        one_time_purchases: catalog
            .one_time_purchases
            .iter()
            .map(|(key, plan)| plan.resolve(key, env))
            .collect(),
    }
}

/// Find or create the plan node for an identifier update. New nodes go into
/// `plans`; an existing node keeps its map, so one-time purchases stay where
/// they are.
fn ensure_plan<'a>(catalog: &'a mut PlanCatalog, plan_key: &str) -> &'a mut PlanDefinition {
    let map = if catalog.one_time_purchases.contains_key(plan_key) {
        &mut catalog.one_time_purchases
    } else {
        &mut catalog.plans
    };
    map.entry(plan_key.to_string())
        .or_insert_with(|| PlanDefinition::placeholder(plan_key, PlanKind::Subscription))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::model::{BillingCadence, PlanVariation};
    use crate::catalog::source::InMemoryCatalogSource;
    use std::collections::BTreeMap;

    fn seeded_resolver() -> CatalogResolver<InMemoryCatalogSource> {
        let mut catalog = PlanCatalog::default();
        let mut plan = PlanDefinition::placeholder("premium", PlanKind::Subscription);
        plan.sandbox_base_plan_id = Some("sb_base".to_string());
        plan.variations.insert(
            "monthly".to_string(),
            PlanVariation {
                sandbox_variation_id: Some("sv_monthly".to_string()),
                production_variation_id: None,
                amount: 499,
                currency: "USD".to_string(),
                cadence: Some(BillingCadence::Monthly),
                active: true,
                features: Vec::new(),
                price_label: None,
                billing_notice: None,
            },
        );
        catalog.plans.insert("premium".to_string(), plan);
        catalog.one_time_purchases.insert(
            "week_pass".to_string(),
            PlanDefinition {
                variations: BTreeMap::from([(
                    "default".to_string(),
                    PlanVariation::placeholder(),
                )]),
                ..PlanDefinition::placeholder("week_pass", PlanKind::OneTime)
            },
        );
        CatalogResolver::new(InMemoryCatalogSource::new(catalog))
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let resolver = seeded_resolver();
        let a = resolver.resolved(Environment::Sandbox).unwrap();
        let b = resolver.resolved(Environment::Sandbox).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_update_then_resolve_reflects_new_id() {
        let resolver = seeded_resolver();
        resolver
            .update_variation_id(Environment::Production, "premium", "monthly", "pv_new")
            .unwrap();

        let prod = resolver.resolved(Environment::Production).unwrap();
        let variation = prod.plan("premium").unwrap().variation("monthly").unwrap();
        assert_eq!(variation.id.as_deref(), Some("pv_new"));

        // The other environment's identifier is untouched.
        let sandbox = resolver.resolved(Environment::Sandbox).unwrap();
        let variation = sandbox.plan("premium").unwrap().variation("monthly").unwrap();
        assert_eq!(variation.id.as_deref(), Some("sv_monthly"));
    }

    #[test]
    fn test_update_creates_placeholder_nodes() {
        let resolver = seeded_resolver();
        resolver
            .update_variation_id(Environment::Sandbox, "brand_new", "annual", "sv_a")
            .unwrap();

        let catalog = resolver.load().unwrap();
        let plan = catalog.plan("brand_new").unwrap();
        assert_eq!(plan.base_plan_id(Environment::Sandbox), None);
        let variation = plan.variations.get("annual").unwrap();
        assert_eq!(variation.variation_id(Environment::Sandbox), Some("sv_a"));
        assert_eq!(variation.amount, 0);
    }

    #[test]
    fn test_update_targets_one_time_purchase_in_place() {
        let resolver = seeded_resolver();
        resolver
            .update_variation_id(Environment::Sandbox, "week_pass", "default", "sv_pass")
            .unwrap();

        let catalog = resolver.load().unwrap();
        // Still a one-time purchase, not duplicated into plans.
        assert!(catalog.one_time_purchases.contains_key("week_pass"));
        assert!(!catalog.plans.contains_key("week_pass"));
    }

    #[test]
    fn test_update_is_idempotent() {
        let resolver = seeded_resolver();
        resolver
            .update_base_plan_id(Environment::Sandbox, "premium", "sb_base")
            .unwrap();
        let first = resolver.load().unwrap();
        resolver
            .update_base_plan_id(Environment::Sandbox, "premium", "sb_base")
            .unwrap();
        assert_eq!(resolver.load().unwrap(), first);
    }

    #[test]
    fn test_unconfigured_items() {
        let resolver = seeded_resolver();

        let sandbox = resolver.unconfigured_items(Environment::Sandbox).unwrap();
        // premium is fully configured for sandbox; week_pass is not.
        assert_eq!(sandbox.base_plans, vec!["week_pass".to_string()]);
        assert_eq!(
            sandbox.variations,
            vec![("week_pass".to_string(), "default".to_string())]
        );

        let prod = resolver.unconfigured_items(Environment::Production).unwrap();
        assert!(prod.base_plans.contains(&"premium".to_string()));
        assert!(prod
            .variations
            .contains(&("premium".to_string(), "monthly".to_string())));
    }

    #[test]
    fn test_free_plans_never_unconfigured() {
        let mut catalog = PlanCatalog::default();
        catalog.plans.insert(
            "basic".to_string(),
            PlanDefinition::placeholder("basic", PlanKind::Free),
        );
        let resolver = CatalogResolver::new(InMemoryCatalogSource::new(catalog));
        assert!(resolver
            .unconfigured_items(Environment::Sandbox)
            .unwrap()
            .is_empty());
    }
}

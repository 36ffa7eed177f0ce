//! Catalog drift detection.
//!
//! The billing provider treats price, cadence, and currency as immutable
//! once a variation object exists. Editing those fields in the catalog does
//! not change what customers are charged, so the checker compares the
//! working catalog against the last committed snapshot and flags edits to
//! configured variations. Warnings are advisory; nothing here blocks a
//! save.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::warn;

use crate::config::Environment;
use crate::error::Result;

use super::model::{BillingCadence, PlanCatalog};

/// Supplies the previously committed catalog for comparison.
pub trait SnapshotProvider {
    /// The prior catalog, or `None` when no snapshot exists (fresh checkout,
    /// file not yet committed).
    fn previous_catalog(&self) -> Result<Option<PlanCatalog>>;
}

/// Reads the committed catalog out of git via `git show HEAD:<path>`.
///
/// Any git failure (not a repository, file untracked, git missing) is
/// reported as "no snapshot" rather than an error, since drift checking is
/// advisory.
#[derive(Debug, Clone)]
pub struct GitSnapshotProvider {
    repo_root: PathBuf,
    catalog_path: PathBuf,
}

impl GitSnapshotProvider {
    /// `catalog_path` is relative to `repo_root`.
    #[must_use]
    pub fn new(repo_root: impl Into<PathBuf>, catalog_path: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
            catalog_path: catalog_path.into(),
        }
    }
}

impl SnapshotProvider for GitSnapshotProvider {
    fn previous_catalog(&self) -> Result<Option<PlanCatalog>> {
        let spec = format!("HEAD:{}", self.catalog_path.display());
        let output = match Command::new("git")
            .arg("-C")
            .arg(&self.repo_root)
            .args(["show", &spec])
            .output()
        {
            Ok(output) => output,
            Err(e) => {
                warn!(error = %e, "git unavailable, skipping drift check");
                return Ok(None);
            }
        };
        if !output.status.success() {
            warn!(
                path = %self.catalog_path.display(),
                "no committed catalog snapshot, skipping drift check"
            );
            return Ok(None);
        }
        match serde_json::from_slice(&output.stdout) {
            Ok(catalog) => Ok(Some(catalog)),
            Err(e) => {
                warn!(error = %e, "committed catalog snapshot is not valid JSON");
                Ok(None)
            }
        }
    }
}

/// Snapshot loaded from an arbitrary file path. Handy for tooling that
/// keeps its own copy of the last deployed catalog.
#[derive(Debug, Clone)]
pub struct FileSnapshotProvider {
    path: PathBuf,
}

impl FileSnapshotProvider {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotProvider for FileSnapshotProvider {
    fn previous_catalog(&self) -> Result<Option<PlanCatalog>> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(_) => return Ok(None),
        };
        match serde_json::from_str(&contents) {
            Ok(catalog) => Ok(Some(catalog)),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "snapshot is not valid JSON");
                Ok(None)
            }
        }
    }
}

/// A single detected edit to a provider-immutable field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriftWarning {
    AmountChanged {
        plan: String,
        variation: String,
        variation_id: String,
        previous: i64,
        current: i64,
    },
    CadenceChanged {
        plan: String,
        variation: String,
        variation_id: String,
        previous: Option<BillingCadence>,
        current: Option<BillingCadence>,
    },
    CurrencyChanged {
        plan: String,
        variation: String,
        variation_id: String,
        previous: String,
        current: String,
    },
    /// A configured variation disappeared from the catalog entirely. The
    /// provider object still exists and may still be charging customers.
    VariationRemoved {
        plan: String,
        variation: String,
        variation_id: String,
    },
}

impl std::fmt::Display for DriftWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AmountChanged {
                plan,
                variation,
                variation_id,
                previous,
                current,
            } => write!(
                f,
                "{}/{} ({}): amount changed {} -> {}; the provider will keep charging the original price",
                plan, variation, variation_id, previous, current
            ),
            Self::CadenceChanged {
                plan,
                variation,
                variation_id,
                previous,
                current,
            } => write!(
                f,
                "{}/{} ({}): cadence changed {:?} -> {:?}; the provider will keep the original cadence",
                plan, variation, variation_id, previous, current
            ),
            Self::CurrencyChanged {
                plan,
                variation,
                variation_id,
                previous,
                current,
            } => write!(
                f,
                "{}/{} ({}): currency changed {} -> {}; the provider will keep the original currency",
                plan, variation, variation_id, previous, current
            ),
            Self::VariationRemoved {
                plan,
                variation,
                variation_id,
            } => write!(
                f,
                "{}/{} ({}): removed from catalog but still exists on the provider",
                plan, variation, variation_id
            ),
        }
    }
}

/// Outcome of a drift check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriftCheck {
    /// No edits to configured immutable fields.
    Clean,
    /// No previous snapshot was available to compare against.
    SnapshotUnavailable,
    /// One warning per detected edit.
    Drift(Vec<DriftWarning>),
}

/// Compare the current catalog against the snapshot for one environment.
///
/// Only variations that were already configured in the snapshot (i.e. had a
/// provider identifier for `env`) are checked; editing an unconfigured
/// variation is always safe.
pub fn check_drift<P: SnapshotProvider>(
    provider: &P,
    current: &PlanCatalog,
    env: Environment,
) -> Result<DriftCheck> {
    let Some(previous) = provider.previous_catalog()? else {
        return Ok(DriftCheck::SnapshotUnavailable);
    };
    Ok(diff_catalogs(&previous, current, env))
}

/// Pure comparison between two catalogs.
#[must_use]
pub fn diff_catalogs(
    previous: &PlanCatalog,
    current: &PlanCatalog,
    env: Environment,
) -> DriftCheck {
    let mut warnings = Vec::new();

    for (plan_key, prev_plan) in previous.iter_all() {
        for (variation_key, prev_variation) in &prev_plan.variations {
            let Some(variation_id) = prev_variation.variation_id(env) else {
                continue;
            };

            let current_variation = current
                .plan(plan_key)
                .and_then(|p| p.variations.get(variation_key));
            let Some(cur) = current_variation else {
                warnings.push(DriftWarning::VariationRemoved {
                    plan: plan_key.to_string(),
                    variation: variation_key.clone(),
                    variation_id: variation_id.to_string(),
                });
                continue;
            };

            if cur.amount != prev_variation.amount {
                warnings.push(DriftWarning::AmountChanged {
                    plan: plan_key.to_string(),
                    variation: variation_key.clone(),
                    variation_id: variation_id.to_string(),
                    previous: prev_variation.amount,
                    current: cur.amount,
                });
            }
            if cur.cadence != prev_variation.cadence {
                warnings.push(DriftWarning::CadenceChanged {
                    plan: plan_key.to_string(),
                    variation: variation_key.clone(),
                    variation_id: variation_id.to_string(),
                    previous: prev_variation.cadence,
                    current: cur.cadence,
                });
            }
            if cur.currency != prev_variation.currency {
                warnings.push(DriftWarning::CurrencyChanged {
                    plan: plan_key.to_string(),
                    variation: variation_key.clone(),
                    variation_id: variation_id.to_string(),
                    previous: prev_variation.currency.clone(),
                    current: cur.currency.clone(),
                });
            }
        }
    }

    if warnings.is_empty() {
        DriftCheck::Clean
    } else {
        DriftCheck::Drift(warnings)
    }
}

//! Plan catalog: model, persistence, environment resolution, drift checks.
//!
//! The catalog is a JSON document describing every sellable plan, with
//! separate provider identifier slots per environment. See
//! [`CatalogResolver`] for the read path and [`check_drift`] for the
//! pre-commit safety check.

mod drift;
mod model;
mod resolver;
mod source;

pub use drift::{
    check_drift, diff_catalogs, DriftCheck, DriftWarning, FileSnapshotProvider,
    GitSnapshotProvider, SnapshotProvider,
};
pub use model::{
    BillingCadence, PlanCatalog, PlanDefinition, PlanKind, PlanVariation, ResolvedCatalog,
    ResolvedPlan, ResolvedVariation,
};
pub use resolver::{resolve, CatalogResolver, UnconfiguredItems};
pub use source::{CatalogSource, FileCatalogSource, InMemoryCatalogSource};

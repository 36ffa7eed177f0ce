//! Catalog persistence.
//!
//! [`CatalogSource`] abstracts where the catalog JSON lives. The file-backed
//! implementation re-reads on every load so edits land without a restart,
//! and rewrites the whole document on save to keep it diffable under
//! version control.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::error::{Result, SubkitError};

use super::model::PlanCatalog;

/// Where the plan catalog is stored.
pub trait CatalogSource: Send + Sync {
    /// Load the current catalog.
    fn load(&self) -> Result<PlanCatalog>;

    /// Persist the catalog, replacing the previous contents.
    fn save(&self, catalog: &PlanCatalog) -> Result<()>;
}

/// Catalog stored as a pretty-printed JSON file.
#[derive(Debug, Clone)]
pub struct FileCatalogSource {
    path: PathBuf,
}

impl FileCatalogSource {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CatalogSource for FileCatalogSource {
    fn load(&self) -> Result<PlanCatalog> {
        let contents = fs::read_to_string(&self.path).map_err(|e| {
            SubkitError::internal(format!(
                "failed to read catalog {}: {}",
                self.path.display(),
                e
            ))
        })?;
        let catalog = serde_json::from_str(&contents).map_err(|e| {
            SubkitError::bad_request(format!(
                "invalid catalog {}: {}",
                self.path.display(),
                e
            ))
        })?;
        Ok(catalog)
    }

    fn save(&self, catalog: &PlanCatalog) -> Result<()> {
        let json = serde_json::to_string_pretty(catalog)?;
        fs::write(&self.path, json).map_err(|e| {
            SubkitError::internal(format!(
                "failed to write catalog {}: {}",
                self.path.display(),
                e
            ))
        })?;
        Ok(())
    }
}

/// Catalog held in memory. Useful in tests and for embedding a static
/// catalog compiled into the binary.
#[derive(Debug, Default)]
pub struct InMemoryCatalogSource {
    catalog: RwLock<PlanCatalog>,
}

impl InMemoryCatalogSource {
    #[must_use]
    pub fn new(catalog: PlanCatalog) -> Self {
        Self {
            catalog: RwLock::new(catalog),
        }
    }
}

impl CatalogSource for InMemoryCatalogSource {
    fn load(&self) -> Result<PlanCatalog> {
        self.catalog
            .read()
            .map(|c| c.clone())
            .map_err(|_| SubkitError::internal("catalog lock poisoned"))
    }

    fn save(&self, catalog: &PlanCatalog) -> Result<()> {
        let mut guard = self
            .catalog
            .write()
            .map_err(|_| SubkitError::internal("catalog lock poisoned"))?;
        *guard = catalog.clone();
        Ok(())
    }
}

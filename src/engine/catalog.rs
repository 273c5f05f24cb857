//! Metrics view lookup.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::model::MetricsViewSpec;

/// Errors raised by a catalog.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CatalogError {
    #[error("metrics view not found: {0}")]
    NotFound(String),

    #[error("catalog unavailable: {0}")]
    Unavailable(String),

    #[error("failed to load views: {0}")]
    Load(String),
}

impl CatalogError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Source of resolved metrics views.
#[async_trait]
pub trait CatalogProvider: Send + Sync {
    /// Look up a view by name, ignoring case.
    async fn metrics_view(&self, name: &str) -> Result<Arc<MetricsViewSpec>, CatalogError>;
}

/// Catalog held in memory.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    views: RwLock<HashMap<String, Arc<MetricsViewSpec>>>,
}

#[derive(Deserialize)]
struct ViewsFile {
    #[serde(default)]
    views: Vec<MetricsViewSpec>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_view(self, view: MetricsViewSpec) -> Self {
        self.insert(view);
        self
    }

    /// Add or replace a view.
    pub fn insert(&self, view: MetricsViewSpec) {
        let mut views = match self.views.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        views.insert(view.name.to_lowercase(), Arc::new(view));
    }

    /// Parse a TOML document with a `[[views]]` array.
    pub fn from_toml_str(content: &str) -> Result<Self, CatalogError> {
        let file: ViewsFile =
            toml::from_str(content).map_err(|e| CatalogError::Load(e.to_string()))?;
        let catalog = Self::new();
        for view in file.views {
            catalog.insert(view);
        }
        Ok(catalog)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| CatalogError::Load(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    pub fn names(&self) -> Vec<String> {
        let views = match self.views.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut names: Vec<String> = views.values().map(|v| v.name.clone()).collect();
        names.sort();
        names
    }
}

#[async_trait]
impl CatalogProvider for InMemoryCatalog {
    async fn metrics_view(&self, name: &str) -> Result<Arc<MetricsViewSpec>, CatalogError> {
        let views = self
            .views
            .read()
            .map_err(|_| CatalogError::Unavailable("catalog lock poisoned".into()))?;
        views
            .get(&name.to_lowercase())
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(name.into()))
    }
}

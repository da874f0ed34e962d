//! Catalog configuration.

use polystore_core::DataModel;
use serde::Deserialize;

/// Configuration for a [`Catalog`](crate::Catalog).
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Data models namespaces may be declared with.
    pub supported_models: Vec<DataModel>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            supported_models: DataModel::ALL.to_vec(),
        }
    }
}

impl CatalogConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts the data models namespaces may use.
    pub fn with_supported_models(mut self, models: impl IntoIterator<Item = DataModel>) -> Self {
        self.supported_models = models.into_iter().collect();
        self
    }

    /// Returns true if namespaces of `model` may be created.
    pub fn supports(&self, model: DataModel) -> bool {
        self.supported_models.contains(&model)
    }
}

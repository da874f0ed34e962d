//! Adapter registry entries.
//!
//! The catalog does not talk to stores. It only records, per adapter instance, which convention the
//! adapter executes and which data models it can hold.

use polystore_core::ids::AdapterId;
use polystore_core::traits::Convention;
use polystore_core::DataModel;
use serde::{Deserialize, Serialize};

/// A registered adapter instance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterInfo {
    id: AdapterId,
    name: String,
    convention: Convention,
    models: Vec<DataModel>,
}

impl AdapterInfo {
    pub(crate) fn new(
        id: AdapterId,
        name: String,
        convention: Convention,
        models: Vec<DataModel>,
    ) -> Self {
        Self {
            id,
            name,
            convention,
            models,
        }
    }

    /// Returns the adapter id.
    #[inline]
    pub fn id(&self) -> AdapterId {
        self.id
    }

    /// Returns the unique adapter name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the convention physical operators on this adapter carry.
    #[inline]
    pub fn convention(&self) -> Convention {
        self.convention
    }

    /// Returns the data models this adapter can hold.
    pub fn models(&self) -> &[DataModel] {
        &self.models
    }

    /// Returns true if entities of `model` can be placed on this adapter.
    pub fn supports(&self, model: DataModel) -> bool {
        self.models.contains(&model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supports() {
        let adapter = AdapterInfo::new(
            AdapterId::new(1),
            "pg".into(),
            Convention::RowStore,
            vec![DataModel::Relational, DataModel::Document],
        );
        assert!(adapter.supports(DataModel::Document));
        assert!(!adapter.supports(DataModel::Graph));
        assert_eq!(adapter.convention(), Convention::RowStore);
    }
}

//! Data model definitions.

use crate::error::Error;
use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Serialize};

/// The data model a namespace is declared with.
///
/// Every logical entity inherits the model of its namespace, and every algebra node carries
/// exactly one data model trait.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DataModel {
    /// Tables of flat rows.
    Relational,
    /// Collections of nested documents.
    Document,
    /// Labeled property graphs.
    Graph,
}

impl DataModel {
    /// All known data models, in declaration order.
    pub const ALL: [DataModel; 3] = [DataModel::Relational, DataModel::Document, DataModel::Graph];

    /// Returns the lowercase name of this model.
    pub fn name(&self) -> &'static str {
        match self {
            DataModel::Relational => "relational",
            DataModel::Document => "document",
            DataModel::Graph => "graph",
        }
    }
}

impl fmt::Display for DataModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DataModel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "relational" | "sql" => Ok(DataModel::Relational),
            "document" | "doc" => Ok(DataModel::Document),
            "graph" | "lpg" => Ok(DataModel::Graph),
            _ => Err(Error::unsupported_model(s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_models() {
        assert_eq!("RELATIONAL".parse::<DataModel>().unwrap(), DataModel::Relational);
        assert_eq!("doc".parse::<DataModel>().unwrap(), DataModel::Document);
        assert_eq!("lpg".parse::<DataModel>().unwrap(), DataModel::Graph);
    }

    #[test]
    fn test_parse_unknown_model() {
        let err = "columnar".parse::<DataModel>().unwrap_err();
        assert!(matches!(err, Error::UnsupportedModel { .. }));
    }
}

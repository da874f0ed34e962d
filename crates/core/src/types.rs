//! Data type definitions.
//!
//! This module defines the types fields of a row type can have across all data models.

use serde::{Deserialize, Serialize};

/// Supported data types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// Boolean type (true/false)
    Boolean,
    /// 64-bit signed integer
    Int64,
    /// 64-bit floating point number
    Float64,
    /// UTF-8 string
    String,
    /// Ordered list of values (document arrays)
    Array,
    /// Nested document
    Document,
    /// Graph node
    Node,
    /// Graph edge
    Edge,
    /// Unknown or heterogeneous type (e.g. elements of an unwound array)
    Any,
}

impl DataType {
    /// Returns whether this type is nullable by default.
    pub fn is_nullable_by_default(&self) -> bool {
        matches!(self, DataType::Array | DataType::Document | DataType::Any)
    }

    /// Returns whether values of this type are flat scalars.
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            DataType::Boolean | DataType::Int64 | DataType::Float64 | DataType::String
        )
    }

    /// Returns whether this type is numeric.
    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Int64 | DataType::Float64)
    }

    /// Returns whether a value of type `other` may flow into a slot declared as `self`.
    pub fn accepts(&self, other: DataType) -> bool {
        *self == other || *self == DataType::Any || other == DataType::Any
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nullable_by_default() {
        assert!(!DataType::Boolean.is_nullable_by_default());
        assert!(!DataType::Int64.is_nullable_by_default());
        assert!(DataType::Array.is_nullable_by_default());
        assert!(DataType::Document.is_nullable_by_default());
    }

    #[test]
    fn test_scalar() {
        assert!(DataType::String.is_scalar());
        assert!(!DataType::Document.is_scalar());
        assert!(!DataType::Node.is_scalar());
    }

    #[test]
    fn test_accepts_any() {
        assert!(DataType::Any.accepts(DataType::Int64));
        assert!(DataType::String.accepts(DataType::Any));
        assert!(!DataType::String.accepts(DataType::Int64));
    }
}

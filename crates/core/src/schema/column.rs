//! Logical column definition.

use crate::ids::ColumnId;
use crate::types::DataType;
use serde::{Deserialize, Serialize};

/// A column of a relational entity, a top-level field of a document collection, or a property of
/// a graph.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogicalColumn {
    /// Catalog-wide id. Unassigned (zero) until the entity is registered with a catalog.
    id: ColumnId,
    /// Column name.
    name: String,
    /// Data type of the column.
    data_type: DataType,
    /// Whether this column allows null values.
    nullable: bool,
    /// Position in the entity (0-based).
    position: usize,
}

impl LogicalColumn {
    /// Creates a new column definition.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            id: ColumnId::new(0),
            name: name.into(),
            data_type,
            nullable: data_type.is_nullable_by_default(),
            position: 0,
        }
    }

    /// Sets whether this column is nullable.
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub(crate) fn with_position(mut self, position: usize) -> Self {
        self.position = position;
        self
    }

    /// Returns a copy with the catalog id set.
    pub fn with_id(mut self, id: ColumnId) -> Self {
        self.id = id;
        self
    }

    /// Returns a copy with a new name.
    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Returns the catalog id.
    #[inline]
    pub fn id(&self) -> ColumnId {
        self.id
    }

    /// Returns the column name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the data type.
    #[inline]
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Returns whether this column is nullable.
    #[inline]
    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    /// Returns the position.
    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }
}

impl PartialEq for LogicalColumn {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.data_type == other.data_type
    }
}

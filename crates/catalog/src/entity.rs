//! The three-layer entity model.
//!
//! A [`LogicalEntity`] is what users declare. Each [`AllocationEntity`] places some of its columns
//! and some of its partitions on one adapter, and each [`PhysicalEntity`] is an adapter's
//! materialization of an allocation.

use polystore_core::ids::{
    AdapterId, AllocationId, ColumnId, LogicalEntityId, NamespaceId, PhysicalEntityId,
};
use polystore_core::schema::{EntitySchema, LogicalColumn};
use polystore_core::traits::Convention;
use polystore_core::DataModel;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A namespace (schema, database or graph) with a fixed data model.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
    pub id: NamespaceId,
    pub name: String,
    pub model: DataModel,
}

/// A user-visible table, collection or graph.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogicalEntity {
    pub id: LogicalEntityId,
    pub namespace: NamespaceId,
    pub namespace_name: String,
    pub name: String,
    /// Inherited from the namespace.
    pub model: DataModel,
    pub schema: EntitySchema,
}

impl LogicalEntity {
    /// Returns `namespace.entity`, used in error messages.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.namespace_name, self.name)
    }

    /// Gets a column by name.
    pub fn column(&self, name: &str) -> Option<&LogicalColumn> {
        self.schema.column(name)
    }

    /// Returns the name of a column id, or its display form if unknown.
    pub fn column_name(&self, id: ColumnId) -> String {
        self.schema
            .column_by_id(id)
            .map(|c| c.name().to_string())
            .unwrap_or_else(|| id.to_string())
    }

    /// Maps column ids to names, in the given order.
    pub fn column_names(&self, ids: impl IntoIterator<Item = ColumnId>) -> Vec<String> {
        ids.into_iter().map(|id| self.column_name(id)).collect()
    }
}

/// Replication role of an allocation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PlacementRole {
    /// Authoritative copy; preferred for reads, receives new columns.
    #[default]
    Primary,
    /// Additional copy.
    Secondary,
}

/// How an allocation came to exist.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlacementType {
    /// Requested explicitly by DDL.
    #[default]
    Manual,
    /// Chosen by automatic placement.
    Automatic,
}

/// Horizontal partitioning function.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PartitionScheme {
    #[default]
    None,
    List,
    Range,
    Hash,
    RoundRobin,
}

/// Partitioning descriptor shared by all allocations of an entity.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Partitioning {
    pub scheme: PartitionScheme,
    pub partition_count: u32,
    /// Partition key; `None` for unpartitioned and round-robin entities.
    pub column: Option<String>,
}

impl Default for Partitioning {
    fn default() -> Self {
        Self::none()
    }
}

impl Partitioning {
    /// A single implicit partition.
    pub fn none() -> Self {
        Self {
            scheme: PartitionScheme::None,
            partition_count: 1,
            column: None,
        }
    }

    pub fn hash(column: impl Into<String>, partition_count: u32) -> Self {
        Self::keyed(PartitionScheme::Hash, column, partition_count)
    }

    pub fn range(column: impl Into<String>, partition_count: u32) -> Self {
        Self::keyed(PartitionScheme::Range, column, partition_count)
    }

    pub fn list(column: impl Into<String>, partition_count: u32) -> Self {
        Self::keyed(PartitionScheme::List, column, partition_count)
    }

    pub fn round_robin(partition_count: u32) -> Self {
        Self {
            scheme: PartitionScheme::RoundRobin,
            partition_count,
            column: None,
        }
    }

    fn keyed(scheme: PartitionScheme, column: impl Into<String>, partition_count: u32) -> Self {
        Self {
            scheme,
            partition_count,
            column: Some(column.into()),
        }
    }

    /// Returns true if rows are split over more than one partition.
    pub fn is_partitioned(&self) -> bool {
        self.partition_count > 1
    }

    /// Returns all partition numbers.
    pub fn all_partitions(&self) -> BTreeSet<u32> {
        (0..self.partition_count.max(1)).collect()
    }
}

/// A placement of a logical entity (or part of it) on one adapter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationEntity {
    pub id: AllocationId,
    pub logical: LogicalEntityId,
    pub namespace: NamespaceId,
    pub adapter: AdapterId,
    /// Convention of the adapter at placement time.
    pub convention: Convention,
    pub columns: BTreeSet<ColumnId>,
    pub partitioning: Partitioning,
    /// Partitions held by this allocation.
    pub partitions: BTreeSet<u32>,
    pub role: PlacementRole,
    pub placement_type: PlacementType,
}

impl AllocationEntity {
    /// Returns true if this allocation holds `column`.
    #[inline]
    pub fn holds_column(&self, column: ColumnId) -> bool {
        self.columns.contains(&column)
    }

    /// Returns true if this allocation holds every column in `columns`.
    pub fn holds_columns(&self, columns: &[ColumnId]) -> bool {
        columns.iter().all(|c| self.columns.contains(c))
    }

    /// Returns true if this allocation holds every row of the entity.
    pub fn holds_all_partitions(&self) -> bool {
        self.partitions.len() as u32 >= self.partitioning.partition_count.max(1)
    }

    #[inline]
    pub fn is_primary(&self) -> bool {
        self.role == PlacementRole::Primary
    }
}

/// An adapter's materialization of an allocation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysicalEntity {
    pub id: PhysicalEntityId,
    pub allocation: AllocationId,
    /// Adapter-specific object name.
    pub handle: String,
    /// Logical column to physical column name.
    pub column_mapping: BTreeMap<ColumnId, String>,
}

/// Placement request for [`Catalog::add_allocation`](crate::Catalog::add_allocation).
#[derive(Clone, Debug)]
pub struct AllocationSpec {
    pub adapter: AdapterId,
    /// Columns to place, by name; `None` places every column.
    pub columns: Option<Vec<String>>,
    pub partitioning: Partitioning,
    /// Partitions to hold; `None` holds every partition.
    pub partitions: Option<Vec<u32>>,
    pub role: PlacementRole,
    pub placement_type: PlacementType,
}

impl AllocationSpec {
    /// A full, unpartitioned, primary placement on `adapter`.
    pub fn new(adapter: AdapterId) -> Self {
        Self {
            adapter,
            columns: None,
            partitioning: Partitioning::none(),
            partitions: None,
            role: PlacementRole::Primary,
            placement_type: PlacementType::Manual,
        }
    }

    /// Places only the named columns.
    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.columns = Some(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn partitioning(mut self, partitioning: Partitioning) -> Self {
        self.partitioning = partitioning;
        self
    }

    /// Holds only the given partitions.
    pub fn partitions(mut self, partitions: &[u32]) -> Self {
        self.partitions = Some(partitions.to_vec());
        self
    }

    pub fn role(mut self, role: PlacementRole) -> Self {
        self.role = role;
        self
    }

    pub fn secondary(self) -> Self {
        self.role(PlacementRole::Secondary)
    }

    pub fn placement_type(mut self, placement_type: PlacementType) -> Self {
        self.placement_type = placement_type;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partitioning() {
        let p = Partitioning::hash("id", 4);
        assert!(p.is_partitioned());
        assert_eq!(p.all_partitions().len(), 4);
        assert!(!Partitioning::none().is_partitioned());
        assert_eq!(Partitioning::none().all_partitions().len(), 1);
    }

    #[test]
    fn test_allocation_spec_builder() {
        let spec = AllocationSpec::new(AdapterId::new(3))
            .columns(&["id"])
            .secondary()
            .placement_type(PlacementType::Automatic);
        assert_eq!(spec.columns, Some(vec!["id".to_string()]));
        assert_eq!(spec.role, PlacementRole::Secondary);
        assert_eq!(spec.placement_type, PlacementType::Automatic);
    }

    #[test]
    fn test_allocation_holds() {
        let alloc = AllocationEntity {
            id: AllocationId::new(1),
            logical: LogicalEntityId::new(2),
            namespace: NamespaceId::new(3),
            adapter: AdapterId::new(4),
            convention: Convention::RowStore,
            columns: [ColumnId::new(5), ColumnId::new(6)].into_iter().collect(),
            partitioning: Partitioning::round_robin(2),
            partitions: [0].into_iter().collect(),
            role: PlacementRole::Primary,
            placement_type: PlacementType::Manual,
        };
        assert!(alloc.holds_columns(&[ColumnId::new(5)]));
        assert!(!alloc.holds_columns(&[ColumnId::new(5), ColumnId::new(7)]));
        assert!(!alloc.holds_all_partitions());
        assert!(alloc.is_primary());
    }
}

//! Column and partition coverage of an entity's allocations.

use crate::entity::AllocationEntity;
use polystore_core::ids::ColumnId;
use polystore_core::schema::EntitySchema;
use std::collections::BTreeSet;

/// Returns the columns of `schema` that are not held, for every partition, by some allocation.
///
/// Columns are returned in schema order. An empty allocation list leaves every column uncovered.
pub fn uncovered_columns<'a>(
    schema: &EntitySchema,
    partition_count: u32,
    allocations: impl IntoIterator<Item = &'a AllocationEntity> + Clone,
) -> Vec<ColumnId> {
    let all_partitions: BTreeSet<u32> = (0..partition_count.max(1)).collect();
    schema
        .columns()
        .iter()
        .map(|c| c.id())
        .filter(|&column| {
            let held: BTreeSet<u32> = allocations
                .clone()
                .into_iter()
                .filter(|a| a.holds_column(column))
                .flat_map(|a| a.partitions.iter().copied())
                .collect();
            !all_partitions.is_subset(&held)
        })
        .collect()
}

/// Returns the columns of `required` held by no allocation in any partition.
pub fn unplaced_columns<'a>(
    required: &[ColumnId],
    allocations: impl IntoIterator<Item = &'a AllocationEntity> + Clone,
) -> Vec<ColumnId> {
    required
        .iter()
        .copied()
        .filter(|&c| !allocations.clone().into_iter().any(|a| a.holds_column(c)))
        .collect()
}

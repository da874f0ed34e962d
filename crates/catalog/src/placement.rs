//! Placement resolution.
//!
//! The resolver answers which allocations can serve a scan or must receive a write. Candidates
//! are ranked: primary replicas before secondary ones, then allocations on the session's
//! preferred adapter. Lower rank is better, and allocation id breaks ties.

use crate::catalog::{Catalog, EntitySnapshot};
use crate::coverage::{uncovered_columns, unplaced_columns};
use crate::entity::{AllocationEntity, PlacementRole};
use polystore_core::ids::{AdapterId, AllocationId, ColumnId, LogicalEntityId};
use polystore_core::traits::Convention;
use polystore_core::{DataModel, Error, Result};
use std::cmp::Reverse;
use std::collections::BTreeSet;

/// An allocation eligible for an operation, with its preference rank.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Placement {
    pub allocation: AllocationEntity,
    pub rank: u32,
}

impl Placement {
    #[inline]
    pub fn id(&self) -> AllocationId {
        self.allocation.id
    }

    #[inline]
    pub fn adapter(&self) -> AdapterId {
        self.allocation.adapter
    }

    #[inline]
    pub fn convention(&self) -> Convention {
        self.allocation.convention
    }
}

/// One way of reading every row of an entity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScanRoute {
    /// A single allocation holds every required column for every partition.
    Single(Placement),
    /// Disjoint allocations that together hold every partition, to be read as a union.
    Union(Vec<Placement>),
    /// Allocations that each hold some required columns for every partition, joined on the
    /// primary key.
    Join {
        key: Vec<ColumnId>,
        parts: Vec<VerticalPart>,
    },
}

/// One input of a vertical join. `columns` starts with the key, followed by the required
/// columns read from this allocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerticalPart {
    pub placement: Placement,
    pub columns: Vec<ColumnId>,
}

/// Resolves logical entities to the allocations serving them.
#[derive(Clone, Copy)]
pub struct PlacementResolver<'a> {
    catalog: &'a Catalog,
    preferred_adapter: Option<AdapterId>,
}

impl<'a> PlacementResolver<'a> {
    /// Creates a resolver without an adapter preference.
    pub fn new(catalog: &'a Catalog) -> Self {
        Self {
            catalog,
            preferred_adapter: None,
        }
    }

    /// Prefers allocations on `adapter` among otherwise equal candidates.
    pub fn with_preferred_adapter(mut self, adapter: Option<AdapterId>) -> Self {
        self.preferred_adapter = adapter;
        self
    }

    /// Returns the catalog consulted by this resolver.
    pub fn catalog(&self) -> &'a Catalog {
        self.catalog
    }

    fn rank(&self, alloc: &AllocationEntity) -> u32 {
        let role = match alloc.role {
            PlacementRole::Primary => 0,
            PlacementRole::Secondary => 2,
        };
        let remote = match self.preferred_adapter {
            Some(preferred) if preferred != alloc.adapter => 1,
            _ => 0,
        };
        role + remote
    }

    fn ranked<'s>(&self, allocations: impl Iterator<Item = &'s AllocationEntity>) -> Vec<Placement> {
        let mut placements: Vec<Placement> = allocations
            .map(|a| Placement {
                allocation: a.clone(),
                rank: self.rank(a),
            })
            .collect();
        placements.sort_by_key(|p| (p.rank, p.allocation.id));
        placements
    }

    /// Returns every allocation holding all of `required` for every row, best first.
    pub fn eligible_for_scan(
        &self,
        logical: LogicalEntityId,
        required: &[ColumnId],
    ) -> Result<Vec<Placement>> {
        let snapshot = self.catalog.entity_snapshot(logical)?;
        check_columns(&snapshot, required)?;
        let placements = self.full_row_placements(&snapshot, required);
        if placements.is_empty() {
            return Err(no_eligible_allocation(&snapshot, required));
        }
        Ok(placements)
    }

    /// Returns every way of scanning `required`: single allocations first, then a partition
    /// union. A join across column subsets is offered only when no single allocation fits.
    pub fn scan_routes(
        &self,
        logical: LogicalEntityId,
        required: &[ColumnId],
    ) -> Result<Vec<ScanRoute>> {
        let snapshot = self.catalog.entity_snapshot(logical)?;
        check_columns(&snapshot, required)?;
        let mut routes: Vec<ScanRoute> = self
            .full_row_placements(&snapshot, required)
            .into_iter()
            .map(ScanRoute::Single)
            .collect();
        if let Some(union) = self.union_placements(&snapshot, required) {
            routes.push(ScanRoute::Union(union));
        }
        if routes.is_empty() {
            if let Some(join) = self.join_placements(&snapshot, required) {
                routes.push(join);
            }
        }
        if routes.is_empty() {
            return Err(no_eligible_allocation(&snapshot, required));
        }
        Ok(routes)
    }

    /// Returns every allocation that must be updated when `touched` columns change.
    ///
    /// An empty `touched` list means whole rows are inserted or deleted, which touches every
    /// allocation.
    pub fn eligible_for_write(
        &self,
        logical: LogicalEntityId,
        touched: &[ColumnId],
    ) -> Result<Vec<Placement>> {
        let snapshot = self.catalog.entity_snapshot(logical)?;
        check_columns(&snapshot, touched)?;
        let placements = self.ranked(
            snapshot
                .allocations
                .iter()
                .filter(|a| touched.is_empty() || touched.iter().any(|c| a.holds_column(*c))),
        );
        let unplaced = unplaced_columns(touched, snapshot.allocations.iter());
        if placements.is_empty() || !unplaced.is_empty() {
            let columns = if unplaced.is_empty() {
                snapshot.entity.schema.column_ids()
            } else {
                unplaced
            };
            return Err(Error::NoEligibleAllocation {
                entity: snapshot.entity.qualified_name(),
                columns: snapshot.entity.column_names(columns),
            });
        }
        Ok(placements)
    }

    fn full_row_placements(&self, snapshot: &EntitySnapshot, required: &[ColumnId]) -> Vec<Placement> {
        self.ranked(
            snapshot
                .allocations
                .iter()
                .filter(|a| a.holds_columns(required) && a.holds_all_partitions()),
        )
    }

    /// Picks disjoint allocations that hold every partition exactly once, preferring better
    /// ranks. Only used for partitioned entities.
    fn union_placements(
        &self,
        snapshot: &EntitySnapshot,
        required: &[ColumnId],
    ) -> Option<Vec<Placement>> {
        let partitioning = &snapshot.allocations.first()?.partitioning;
        if !partitioning.is_partitioned() {
            return None;
        }
        let candidates = self.ranked(
            snapshot
                .allocations
                .iter()
                .filter(|a| a.holds_columns(required) && !a.holds_all_partitions()),
        );
        let mut picked = Vec::new();
        let mut held = BTreeSet::new();
        if !exact_cover(&candidates, &partitioning.all_partitions(), &mut held, &mut picked) {
            return None;
        }
        let mut chosen: Vec<Placement> = picked.into_iter().map(|i| candidates[i].clone()).collect();
        chosen.sort_by_key(|p| p.allocation.partitions.first().copied());
        Some(chosen)
    }

    /// Assembles `required` from allocations holding every partition and the primary key,
    /// taking the allocation with the most missing columns first.
    fn join_placements(&self, snapshot: &EntitySnapshot, required: &[ColumnId]) -> Option<ScanRoute> {
        if snapshot.entity.model != DataModel::Relational {
            return None;
        }
        let key = primary_key_columns(snapshot)?;
        let candidates = self.ranked(
            snapshot
                .allocations
                .iter()
                .filter(|a| a.holds_all_partitions() && a.holds_columns(&key)),
        );
        let mut missing: Vec<ColumnId> = required
            .iter()
            .copied()
            .filter(|c| !key.contains(c))
            .collect();
        let mut parts = Vec::new();
        while !missing.is_empty() {
            let (best, _) = candidates
                .iter()
                .map(|p| (p, missing.iter().filter(|c| p.allocation.holds_column(**c)).count()))
                .filter(|(_, held)| *held > 0)
                .min_by_key(|(_, held)| Reverse(*held))?;
            let (read, rest): (Vec<ColumnId>, Vec<ColumnId>) = std::mem::take(&mut missing)
                .into_iter()
                .partition(|c| best.allocation.holds_column(*c));
            missing = rest;
            parts.push(VerticalPart {
                placement: best.clone(),
                columns: key.iter().copied().chain(read).collect(),
            });
        }
        if parts.len() < 2 {
            return None;
        }
        Some(ScanRoute::Join { key, parts })
    }
}

/// Depth-first search for disjoint candidates covering `all`. The lowest partition not yet
/// held is taken from each candidate holding it, in rank order, undoing dead ends.
fn exact_cover(
    candidates: &[Placement],
    all: &BTreeSet<u32>,
    held: &mut BTreeSet<u32>,
    picked: &mut Vec<usize>,
) -> bool {
    let Some(next) = all.iter().find(|p| !held.contains(*p)) else {
        return true;
    };
    for (i, candidate) in candidates.iter().enumerate() {
        let partitions = &candidate.allocation.partitions;
        if !partitions.contains(next) || !partitions.is_disjoint(held) {
            continue;
        }
        held.extend(partitions.iter().copied());
        picked.push(i);
        if exact_cover(candidates, all, held, picked) {
            return true;
        }
        picked.pop();
        for p in partitions {
            held.remove(p);
        }
    }
    false
}

/// Returns the primary key as column ids, if the entity declares one.
fn primary_key_columns(snapshot: &EntitySnapshot) -> Option<Vec<ColumnId>> {
    let schema = &snapshot.entity.schema;
    schema
        .primary_key()?
        .columns
        .iter()
        .map(|name| schema.column(name).map(|c| c.id()))
        .collect()
}

fn check_columns(snapshot: &EntitySnapshot, columns: &[ColumnId]) -> Result<()> {
    match columns
        .iter()
        .find(|c| snapshot.entity.schema.column_by_id(**c).is_none())
    {
        Some(missing) => Err(Error::column_not_found(
            snapshot.entity.qualified_name(),
            missing.to_string(),
        )),
        None => Ok(()),
    }
}

/// Names the columns that prevent a scan: those held nowhere, else those missing a partition,
/// else those a vertical join cannot reach.
fn no_eligible_allocation(snapshot: &EntitySnapshot, required: &[ColumnId]) -> Error {
    let mut missing = unplaced_columns(required, snapshot.allocations.iter());
    if missing.is_empty() {
        let count = snapshot
            .allocations
            .first()
            .map(|a| a.partitioning.partition_count)
            .unwrap_or(1);
        missing = uncovered_columns(&snapshot.entity.schema, count, snapshot.allocations.iter())
            .into_iter()
            .filter(|c| required.contains(c))
            .collect();
    }
    if missing.is_empty() {
        missing = unjoinable_columns(snapshot, required);
    }
    Error::NoEligibleAllocation {
        entity: snapshot.entity.qualified_name(),
        columns: snapshot.entity.column_names(missing),
    }
}

/// Key columns absent from an allocation holding required columns. Without a usable key, the
/// required columns lacking from the allocation that holds the most of them.
fn unjoinable_columns(snapshot: &EntitySnapshot, required: &[ColumnId]) -> Vec<ColumnId> {
    let holders = snapshot
        .allocations
        .iter()
        .filter(|a| required.iter().any(|c| a.holds_column(*c)));
    if let Some(key) = primary_key_columns(snapshot) {
        let absent: Vec<ColumnId> = key
            .into_iter()
            .filter(|k| holders.clone().any(|a| !a.holds_column(*k)))
            .collect();
        if !absent.is_empty() {
            return absent;
        }
    }
    let best = holders.min_by_key(|a| {
        (
            Reverse(required.iter().filter(|c| a.holds_column(**c)).count()),
            a.id,
        )
    });
    match best {
        Some(alloc) => required
            .iter()
            .copied()
            .filter(|c| !alloc.holds_column(*c))
            .collect(),
        None => required.to_vec(),
    }
}

//! Statistics collaborator.
//!
//! The planner asks for row counts through [`StatisticsProvider`]. Missing answers never fail an
//! optimization; the planner falls back to
//! [`PlannerConfig::default_row_count`](super::PlannerConfig::default_row_count) and the cost
//! model's selectivity factors.

use crate::ast::Expr;
use polystore_core::ids::LogicalEntityId;
use std::collections::BTreeMap;

/// Read-only source of cardinality estimates.
pub trait StatisticsProvider {
    /// Estimates the rows of `entity` satisfying `predicate` (all rows when None).
    ///
    /// The predicate's field references are positions in the scanned row type.
    fn estimate_row_count(&self, entity: LogicalEntityId, predicate: Option<&Expr>) -> Option<f64>;
}

/// A provider that knows nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoStatistics;

impl StatisticsProvider for NoStatistics {
    fn estimate_row_count(&self, _entity: LogicalEntityId, _predicate: Option<&Expr>) -> Option<f64> {
        None
    }
}

/// Statistics about one entity.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TableStats {
    /// Number of rows in the entity.
    pub row_count: f64,
    /// Fraction of rows a predicate keeps, if known.
    pub selectivity: Option<f64>,
}

impl TableStats {
    pub fn new(row_count: f64) -> Self {
        Self {
            row_count,
            selectivity: None,
        }
    }

    pub fn with_selectivity(mut self, selectivity: f64) -> Self {
        self.selectivity = Some(selectivity.clamp(0.0, 1.0));
        self
    }
}

/// Fixed per-entity statistics, registered up front.
#[derive(Clone, Debug, Default)]
pub struct FixedStatistics {
    tables: BTreeMap<LogicalEntityId, TableStats>,
}

impl FixedStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers statistics for an entity.
    pub fn register(&mut self, entity: LogicalEntityId, stats: TableStats) {
        self.tables.insert(entity, stats);
    }

    pub fn with_table(mut self, entity: LogicalEntityId, stats: TableStats) -> Self {
        self.register(entity, stats);
        self
    }

    pub fn get(&self, entity: LogicalEntityId) -> Option<&TableStats> {
        self.tables.get(&entity)
    }
}

impl StatisticsProvider for FixedStatistics {
    fn estimate_row_count(&self, entity: LogicalEntityId, predicate: Option<&Expr>) -> Option<f64> {
        let stats = self.tables.get(&entity)?;
        match predicate {
            None => Some(stats.row_count),
            Some(_) => stats.selectivity.map(|s| stats.row_count * s),
        }
    }
}

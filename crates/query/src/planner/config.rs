//! Planner configuration.

use crate::algebra::KindTag;
use polystore_core::ids::AdapterId;
use serde::Deserialize;

/// Per-operator unit costs and estimation factors.
///
/// A physical expression costs its estimated input rows times its unit cost; joins are charged
/// separately for the probe (left) and build (right) side.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct CostModel {
    pub scan: f64,
    pub values: f64,
    pub filter: f64,
    pub project: f64,
    pub join_probe: f64,
    pub join_build: f64,
    pub aggregate: f64,
    pub sort: f64,
    pub set_op: f64,
    pub unwind: f64,
    pub elem_match: f64,
    pub pattern_match: f64,
    pub context_switch: f64,
    pub transfer: f64,
    pub modify: f64,
    /// Extra scan cost per rank step of a less preferred placement.
    pub rank_penalty: f64,
    /// Fraction of rows a filter keeps when no statistics are available.
    pub filter_selectivity: f64,
    /// Fraction of the cross product a join keeps.
    pub join_selectivity: f64,
    /// Groups per input row of a grouped aggregate.
    pub aggregate_factor: f64,
    /// Elements per unwound array.
    pub unwind_fanout: f64,
}

impl Default for CostModel {
    fn default() -> Self {
        Self {
            scan: 1.0,
            values: 0.1,
            filter: 0.5,
            project: 0.2,
            join_probe: 1.0,
            join_build: 1.5,
            aggregate: 1.0,
            sort: 2.0,
            set_op: 0.2,
            unwind: 0.5,
            elem_match: 0.8,
            pattern_match: 1.0,
            context_switch: 0.5,
            transfer: 2.0,
            modify: 3.0,
            rank_penalty: 0.25,
            filter_selectivity: 0.25,
            join_selectivity: 0.1,
            aggregate_factor: 0.1,
            unwind_fanout: 3.0,
        }
    }
}

impl CostModel {
    /// Returns the unit cost of an operator kind. Joins use the probe cost.
    pub fn unit(&self, tag: KindTag) -> f64 {
        match tag {
            KindTag::Scan | KindTag::PhysicalScan => self.scan,
            KindTag::Values => self.values,
            KindTag::Filter => self.filter,
            KindTag::Project => self.project,
            KindTag::Join => self.join_probe,
            KindTag::Aggregate => self.aggregate,
            KindTag::Sort => self.sort,
            KindTag::SetOp | KindTag::ModifyFanOut => self.set_op,
            KindTag::Unwind => self.unwind,
            KindTag::ElemMatch => self.elem_match,
            KindTag::PatternMatch => self.pattern_match,
            KindTag::ContextSwitch => self.context_switch,
            KindTag::Transfer => self.transfer,
            KindTag::Modify | KindTag::PhysicalModify => self.modify,
            KindTag::Subset => 0.0,
        }
    }
}

/// Configuration of a [`Planner`](crate::planner::Planner) run.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Maximum rule firings per run (default: 4096).
    pub firing_budget: usize,
    /// Stop once a root plan exists and this many firings have not improved it (default: off).
    pub patience: Option<usize>,
    /// Row estimate for entities without statistics (default: 100).
    pub default_row_count: f64,
    /// Adapter whose placements win ties.
    pub preferred_adapter: Option<AdapterId>,
    pub cost: CostModel,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            firing_budget: 4096,
            patience: None,
            default_row_count: 100.0,
            preferred_adapter: None,
            cost: CostModel::default(),
        }
    }
}

impl PlannerConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_firing_budget(mut self, budget: usize) -> Self {
        self.firing_budget = budget;
        self
    }

    pub fn with_patience(mut self, patience: Option<usize>) -> Self {
        self.patience = patience;
        self
    }

    pub fn with_default_row_count(mut self, rows: f64) -> Self {
        self.default_row_count = rows;
        self
    }

    pub fn with_preferred_adapter(mut self, adapter: Option<AdapterId>) -> Self {
        self.preferred_adapter = adapter;
        self
    }

    pub fn with_cost_model(mut self, cost: CostModel) -> Self {
        self.cost = cost;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_partial() {
        let config: PlannerConfig =
            serde_json::from_str(r#"{"firing_budget": 64, "cost": {"transfer": 9.0}}"#).unwrap();
        assert_eq!(config.firing_budget, 64);
        assert_eq!(config.cost.transfer, 9.0);
        assert_eq!(config.cost.scan, CostModel::default().scan);
        assert_eq!(config.default_row_count, 100.0);

        let config: PlannerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, PlannerConfig::default());
    }

    #[test]
    fn test_builder() {
        let config = PlannerConfig::new()
            .with_patience(Some(10))
            .with_preferred_adapter(Some(AdapterId::new(3)));
        assert_eq!(config.patience, Some(10));
        assert_eq!(config.preferred_adapter, Some(AdapterId::new(3)));
        assert_eq!(config.firing_budget, 4096);
    }
}

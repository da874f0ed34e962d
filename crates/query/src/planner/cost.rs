//! Plan costs.

use super::config::CostModel;
use crate::algebra::AlgKind;
use core::cmp::Ordering;
use core::fmt;
use core::ops::Add;

/// Fixed charge per physical operator, so that every plan costs more than its inputs.
const OPERATOR_OVERHEAD: f64 = 1e-3;

/// A totally ordered, non-negative plan cost.
#[derive(Clone, Copy, Debug, Default)]
pub struct Cost(f64);

impl Cost {
    pub const ZERO: Cost = Cost(0.0);

    #[inline]
    pub fn new(value: f64) -> Self {
        Cost(value.max(0.0))
    }

    #[inline]
    pub fn value(self) -> f64 {
        self.0
    }
}

impl PartialEq for Cost {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Cost {}

impl PartialOrd for Cost {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Cost {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Add for Cost {
    type Output = Cost;

    fn add(self, rhs: Cost) -> Cost {
        Cost(self.0 + rhs.0)
    }
}

impl fmt::Display for Cost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}", self.0)
    }
}

/// Cost of running one physical operator, excluding its inputs.
///
/// `rows` is the operator's own output estimate and `inputs` the estimates of its input classes.
pub(crate) fn local_cost(model: &CostModel, kind: &AlgKind, rows: f64, inputs: &[f64]) -> Cost {
    let work = match kind {
        AlgKind::PhysicalScan { rank, .. } => {
            rows * model.scan * (1.0 + f64::from(*rank) * model.rank_penalty)
        }
        AlgKind::Values { .. } | AlgKind::Scan { .. } => rows * model.unit(kind.tag()),
        AlgKind::Join { .. } => {
            let left = inputs.first().copied().unwrap_or(0.0);
            let right = inputs.get(1).copied().unwrap_or(0.0);
            left * model.join_probe + right * model.join_build
        }
        // sorting is n log n
        AlgKind::Sort { .. } => {
            let n = inputs.first().copied().unwrap_or(0.0);
            n * n.max(2.0).log2() * model.sort
        }
        _ => inputs.iter().sum::<f64>() * model.unit(kind.tag()),
    };
    Cost::new(work + OPERATOR_OVERHEAD)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algebra::JoinType;
    use crate::ast::Expr;
    use polystore_core::ids::{AdapterId, AllocationId, LogicalEntityId};

    fn scan(rank: u32) -> AlgKind {
        AlgKind::PhysicalScan {
            entity: LogicalEntityId::new(1),
            allocation: AllocationId::new(2),
            adapter: AdapterId::new(3),
            columns: vec![],
            partitions: vec![0],
            partition_count: 1,
            rank,
        }
    }

    #[test]
    fn test_cost_ordering() {
        assert!(Cost::new(1.0) < Cost::new(2.0));
        assert_eq!(Cost::new(-3.0), Cost::ZERO);
        assert_eq!((Cost::new(1.0) + Cost::new(0.5)).value(), 1.5);
        assert_eq!(Cost::new(1.0).to_string(), "1.000");
    }

    #[test]
    fn test_rank_penalty() {
        let model = CostModel::default();
        assert!(local_cost(&model, &scan(0), 100.0, &[]) < local_cost(&model, &scan(1), 100.0, &[]));
    }

    #[test]
    fn test_join_charges_build_side_more() {
        let model = CostModel::default();
        let join = AlgKind::Join {
            join_type: JoinType::Inner,
            condition: Expr::literal(true),
        };
        let small_build = local_cost(&model, &join, 10.0, &[1000.0, 10.0]);
        let large_build = local_cost(&model, &join, 10.0, &[10.0, 1000.0]);
        assert!(small_build < large_build);
        assert!(local_cost(&model, &join, 0.0, &[0.0, 0.0]) > Cost::ZERO);
    }
}

//! Predicate pushdown rules.

use super::{Operand, Rule, RuleCall, RuleError};
use crate::algebra::{AlgKind, AlgNode, JoinType, KindTag};
use crate::ast::Expr;

type RuleResult = Result<Vec<AlgNode>, RuleError>;

/// Puts a filter over `node` when any conjunct remains.
fn filter_above(node: AlgNode, conjuncts: Vec<Expr>) -> Result<AlgNode, RuleError> {
    match Expr::and_all(conjuncts) {
        Some(condition) => Ok(AlgNode::filter(node, condition)?),
        None => Ok(node),
    }
}

fn filter_over(tag: KindTag) -> Operand {
    Operand::logical(KindTag::Filter).with_children(vec![Operand::logical(tag)])
}

fn condition(node: &AlgNode) -> Result<&Expr, RuleError> {
    match node.kind() {
        AlgKind::Filter { condition } => Ok(condition),
        _ => Err(RuleError::Declined),
    }
}

fn input(node: &AlgNode, index: usize) -> Result<AlgNode, RuleError> {
    node.input(index).cloned().ok_or(RuleError::Declined)
}

/// `Filter(Filter(x, a), b)` becomes `Filter(x, a AND b)`.
pub struct FilterMergeRule;

impl Rule for FilterMergeRule {
    fn name(&self) -> &'static str {
        "FilterMergeRule"
    }

    fn operand(&self) -> Operand {
        filter_over(KindTag::Filter)
    }

    fn on_match(&self, call: &RuleCall<'_, '_>) -> RuleResult {
        let outer = condition(call.rel(0))?;
        let inner = condition(call.rel(1))?;
        let merged = Expr::and(inner.clone(), outer.clone());
        Ok(vec![AlgNode::filter(input(call.rel(1), 0)?, merged)?])
    }
}

/// Moves a filter below a projection by inlining the projected expressions.
///
/// Declines when the condition would read a non-deterministic expression, which would then be
/// evaluated twice.
pub struct FilterProjectTransposeRule;

impl Rule for FilterProjectTransposeRule {
    fn name(&self) -> &'static str {
        "FilterProjectTransposeRule"
    }

    fn operand(&self) -> Operand {
        filter_over(KindTag::Project)
    }

    fn on_match(&self, call: &RuleCall<'_, '_>) -> RuleResult {
        let filter = call.rel(0);
        let project = call.rel(1);
        let AlgKind::Project { exprs } = project.kind() else {
            return Err(RuleError::Declined);
        };
        let cond = condition(filter)?;
        if cond.fields().iter().any(|&i| exprs.get(i).map_or(true, |e| !e.is_deterministic())) {
            return Err(RuleError::Declined);
        }
        let pushed = cond.substitute(exprs).ok_or(RuleError::Declined)?;
        let below = AlgNode::filter(input(project, 0)?, pushed)?;
        Ok(vec![AlgNode::create(
            project.kind().clone(),
            vec![below],
            filter.row_type().clone(),
            project.traits().clone(),
        )?])
    }
}

/// Moves the conjuncts of a filter that read one side of a join onto that side.
///
/// For inner joins the conjuncts reading both sides join the join condition. Outer joins only
/// accept conjuncts on their preserved side; full outer joins accept none. Non-deterministic
/// conjuncts stay above the join.
pub struct FilterJoinTransposeRule;

impl Rule for FilterJoinTransposeRule {
    fn name(&self) -> &'static str {
        "FilterJoinTransposeRule"
    }

    fn operand(&self) -> Operand {
        filter_over(KindTag::Join)
    }

    fn on_match(&self, call: &RuleCall<'_, '_>) -> RuleResult {
        let join = call.rel(1);
        let AlgKind::Join {
            join_type,
            condition: join_condition,
        } = join.kind()
        else {
            return Err(RuleError::Declined);
        };
        let (left, right) = (input(join, 0)?, input(join, 1)?);
        let left_len = left.row_type().len();

        let mut to_left = Vec::new();
        let mut to_right = Vec::new();
        let mut to_join = Vec::new();
        let mut above = Vec::new();
        for conjunct in condition(call.rel(0))?.conjuncts() {
            if !conjunct.is_deterministic() {
                above.push(conjunct);
                continue;
            }
            let fields = conjunct.fields();
            let left_only = fields.iter().all(|&i| i < left_len);
            let right_only = !fields.is_empty() && fields.iter().all(|&i| i >= left_len);
            match join_type {
                JoinType::Full => above.push(conjunct),
                JoinType::Semi | JoinType::Anti => to_left.push(conjunct),
                JoinType::Inner if left_only => to_left.push(conjunct),
                JoinType::Inner if right_only => to_right.push(conjunct),
                JoinType::Inner => to_join.push(conjunct),
                JoinType::Left if left_only => to_left.push(conjunct),
                JoinType::Right if right_only => to_right.push(conjunct),
                JoinType::Left | JoinType::Right => above.push(conjunct),
            }
        }
        if to_left.is_empty() && to_right.is_empty() && to_join.is_empty() {
            return Err(RuleError::Declined);
        }

        let offset = -(left_len as isize);
        let to_right = to_right
            .iter()
            .map(|c| c.shift(offset))
            .collect::<Option<Vec<_>>>()
            .ok_or(RuleError::Declined)?;
        let left = filter_above(left, to_left)?;
        let right = filter_above(right, to_right)?;
        let mut condition = join_condition.conjuncts();
        condition.extend(to_join);
        let condition = Expr::and_all(condition).unwrap_or_else(|| Expr::literal(true));
        let joined = AlgNode::join(left, right, *join_type, condition)?;
        Ok(vec![filter_above(joined, above)?])
    }
}

/// Moves deterministic conjuncts that only read grouping keys below an aggregate.
pub struct FilterAggregateTransposeRule;

impl Rule for FilterAggregateTransposeRule {
    fn name(&self) -> &'static str {
        "FilterAggregateTransposeRule"
    }

    fn operand(&self) -> Operand {
        filter_over(KindTag::Aggregate)
    }

    fn on_match(&self, call: &RuleCall<'_, '_>) -> RuleResult {
        let aggregate = call.rel(1);
        let AlgKind::Aggregate { group_by, .. } = aggregate.kind() else {
            return Err(RuleError::Declined);
        };
        // A constant predicate below a global aggregate would turn its single row into none.
        let mut pushed = Vec::new();
        let mut above = Vec::new();
        for conjunct in condition(call.rel(0))?.conjuncts() {
            let fields = conjunct.fields();
            let on_keys = conjunct.is_deterministic()
                && fields.iter().all(|&i| i < group_by.len())
                && (!fields.is_empty() || !group_by.is_empty());
            match conjunct.remap_fields(|i| group_by.get(i).copied()) {
                Some(remapped) if on_keys => pushed.push(remapped),
                _ => above.push(conjunct),
            }
        }
        if pushed.is_empty() {
            return Err(RuleError::Declined);
        }
        let below = filter_above(input(aggregate, 0)?, pushed)?;
        let rebuilt = AlgNode::create(
            aggregate.kind().clone(),
            vec![below],
            aggregate.row_type().clone(),
            aggregate.traits().clone(),
        )?;
        Ok(vec![filter_above(rebuilt, above)?])
    }
}

/// Moves the deterministic conjuncts of a filter below a sort without offset or fetch.
pub struct FilterSortTransposeRule;

impl Rule for FilterSortTransposeRule {
    fn name(&self) -> &'static str {
        "FilterSortTransposeRule"
    }

    fn operand(&self) -> Operand {
        filter_over(KindTag::Sort)
    }

    fn on_match(&self, call: &RuleCall<'_, '_>) -> RuleResult {
        let sort = call.rel(1);
        match sort.kind() {
            AlgKind::Sort {
                offset: 0,
                fetch: None,
                ..
            } => {}
            _ => return Err(RuleError::Declined),
        }
        let (pushed, above): (Vec<Expr>, Vec<Expr>) = condition(call.rel(0))?
            .conjuncts()
            .into_iter()
            .partition(Expr::is_deterministic);
        if pushed.is_empty() {
            return Err(RuleError::Declined);
        }
        let below = filter_above(input(sort, 0)?, pushed)?;
        let rebuilt = AlgNode::create(
            sort.kind().clone(),
            vec![below],
            sort.row_type().clone(),
            sort.traits().clone(),
        )?;
        Ok(vec![filter_above(rebuilt, above)?])
    }
}

/// Moves deterministic conjuncts that do not read the unwound field below an unwind.
pub struct FilterUnwindTransposeRule;

impl Rule for FilterUnwindTransposeRule {
    fn name(&self) -> &'static str {
        "FilterUnwindTransposeRule"
    }

    fn operand(&self) -> Operand {
        filter_over(KindTag::Unwind)
    }

    fn on_match(&self, call: &RuleCall<'_, '_>) -> RuleResult {
        let unwind = call.rel(1);
        let AlgKind::Unwind { field } = unwind.kind() else {
            return Err(RuleError::Declined);
        };
        let (pushed, above): (Vec<Expr>, Vec<Expr>) = condition(call.rel(0))?
            .conjuncts()
            .into_iter()
            .partition(|c| c.is_deterministic() && !c.fields().contains(field));
        if pushed.is_empty() {
            return Err(RuleError::Declined);
        }
        let below = filter_above(input(unwind, 0)?, pushed)?;
        let rebuilt = AlgNode::create(
            unwind.kind().clone(),
            vec![below],
            unwind.row_type().clone(),
            unwind.traits().clone(),
        )?;
        Ok(vec![filter_above(rebuilt, above)?])
    }
}

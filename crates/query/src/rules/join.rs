//! Join reordering.

use super::{Operand, Rule, RuleCall, RuleError};
use crate::algebra::{AlgKind, AlgNode, JoinType, KindTag};
use crate::ast::Expr;

/// Swaps the inputs of an inner join.
///
/// The swapped join is wrapped in a projection restoring the original field order, so the
/// result stays in the join's equivalence class.
pub struct JoinCommuteRule;

impl Rule for JoinCommuteRule {
    fn name(&self) -> &'static str {
        "JoinCommuteRule"
    }

    fn operand(&self) -> Operand {
        Operand::logical(KindTag::Join)
    }

    fn on_match(&self, call: &RuleCall<'_, '_>) -> Result<Vec<AlgNode>, RuleError> {
        let join = call.rel(0);
        let AlgKind::Join {
            join_type: JoinType::Inner,
            condition,
        } = join.kind()
        else {
            return Err(RuleError::Declined);
        };
        let (left, right) = match join.inputs() {
            [left, right] => (left, right),
            _ => return Err(RuleError::Declined),
        };
        let (left_len, right_len) = (left.row_type().len(), right.row_type().len());
        let condition = condition
            .remap_fields(|i| Some(if i < left_len { i + right_len } else { i - left_len }))
            .ok_or(RuleError::Declined)?;
        let swapped = AlgNode::join(right.clone(), left.clone(), JoinType::Inner, condition)?;
        let restore: Vec<Expr> = (0..left_len)
            .map(|i| Expr::field(right_len + i))
            .chain((0..right_len).map(Expr::field))
            .collect();
        Ok(vec![AlgNode::create(
            AlgKind::Project { exprs: restore },
            vec![swapped],
            join.row_type().clone(),
            join.traits().clone(),
        )?])
    }
}

//! Plan extraction from the memo.

use super::memo::{ClassId, Memo};
use crate::algebra::AlgNode;
use polystore_core::traits::TraitSet;

/// Builds the cheapest complete plan for `class` under `required`.
///
/// Winners are tried in (cost, rule order, insertion order) order; a winner is taken only if every
/// input class resolves under the trait set the winner asks of it. Returns None if no winner of
/// the class resolves.
pub(crate) fn extract(memo: &Memo, class: ClassId, required: &TraitSet) -> Option<AlgNode> {
    let mut path = Vec::new();
    build(memo, class, required, &mut path)
}

fn build(memo: &Memo, class: ClassId, required: &TraitSet, path: &mut Vec<(ClassId, TraitSet)>) -> Option<AlgNode> {
    let class = memo.find(class);
    if path.iter().any(|(c, t)| *c == class && t == required) {
        return None;
    }
    path.push((class, required.clone()));
    let mut found = None;
    'winners: for winner in memo.candidates(class, required) {
        let expr = memo.expr(winner.expr);
        let mut inputs = Vec::new();
        for (i, input) in memo.inputs_of(winner.expr).into_iter().enumerate() {
            let wanted = expr.kind.input_requirement(i, &expr.traits);
            match build(memo, input, &wanted, path) {
                Some(node) => inputs.push(node),
                None => continue 'winners,
            }
        }
        found = Some(AlgNode::assemble(
            expr.kind.clone(),
            inputs,
            expr.row_type.clone(),
            expr.traits.clone(),
        ));
        break;
    }
    path.pop();
    found
}

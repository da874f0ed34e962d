//! Projection rules.

use super::{Operand, Rule, RuleCall, RuleError};
use crate::algebra::{AlgKind, AlgNode, KindTag};
use crate::ast::Expr;

/// `Project(Project(x, inner), outer)` becomes `Project(x, outer ∘ inner)`.
pub struct ProjectMergeRule;

impl Rule for ProjectMergeRule {
    fn name(&self) -> &'static str {
        "ProjectMergeRule"
    }

    fn operand(&self) -> Operand {
        Operand::logical(KindTag::Project).with_children(vec![Operand::logical(KindTag::Project)])
    }

    fn on_match(&self, call: &RuleCall<'_, '_>) -> Result<Vec<AlgNode>, RuleError> {
        let (outer, inner) = (call.rel(0), call.rel(1));
        let (AlgKind::Project { exprs: outer_exprs }, AlgKind::Project { exprs: inner_exprs }) =
            (outer.kind(), inner.kind())
        else {
            return Err(RuleError::Declined);
        };
        // inlining could duplicate or drop a non-deterministic expression
        if inner_exprs.iter().any(|e| !e.is_deterministic()) {
            return Err(RuleError::Declined);
        }
        let merged = outer_exprs
            .iter()
            .map(|e| e.substitute(inner_exprs))
            .collect::<Option<Vec<Expr>>>()
            .ok_or(RuleError::Declined)?;
        let input = inner.input(0).cloned().ok_or(RuleError::Declined)?;
        Ok(vec![AlgNode::create(
            AlgKind::Project { exprs: merged },
            vec![input],
            outer.row_type().clone(),
            outer.traits().clone(),
        )?])
    }
}

/// Removes a projection that returns its input fields unchanged and in order.
pub struct ProjectRemoveRule;

impl Rule for ProjectRemoveRule {
    fn name(&self) -> &'static str {
        "ProjectRemoveRule"
    }

    fn operand(&self) -> Operand {
        Operand::logical(KindTag::Project)
    }

    fn on_match(&self, call: &RuleCall<'_, '_>) -> Result<Vec<AlgNode>, RuleError> {
        let project = call.rel(0);
        let AlgKind::Project { exprs } = project.kind() else {
            return Err(RuleError::Declined);
        };
        let input = project.input(0).ok_or(RuleError::Declined)?;
        let identity = exprs.len() == input.row_type().len()
            && exprs.iter().enumerate().all(|(i, e)| e.as_field() == Some(i));
        if !identity || !input.row_type().compatible_with(project.row_type()) {
            return Err(RuleError::Declined);
        }
        Ok(vec![input.clone()])
    }
}

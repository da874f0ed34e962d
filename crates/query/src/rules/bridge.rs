//! Data model bridging.

use super::{Operand, Rule, RuleCall, RuleError};
use crate::algebra::{AlgKind, AlgNode};

/// Inserts a context switch below any operator whose input arrives in the wrong data model,
/// e.g. a document unwind over a relational scan.
pub struct ModelBridgeRule;

impl Rule for ModelBridgeRule {
    fn name(&self) -> &'static str {
        "ModelBridgeRule"
    }

    fn operand(&self) -> Operand {
        Operand::any_logical()
    }

    fn on_match(&self, call: &RuleCall<'_, '_>) -> Result<Vec<AlgNode>, RuleError> {
        let node = call.rel(0);
        if matches!(node.kind(), AlgKind::ContextSwitch { .. }) {
            return Err(RuleError::Declined);
        }
        let wanted = node.kind().input_model(node.data_model());
        if node.inputs().iter().all(|i| i.data_model() == wanted) {
            return Err(RuleError::Declined);
        }
        let inputs = node
            .inputs()
            .iter()
            .map(|input| {
                if input.data_model() == wanted {
                    Ok(input.clone())
                } else {
                    AlgNode::context_switch(input.clone(), wanted)
                }
            })
            .collect::<polystore_core::Result<Vec<_>>>()?;
        // a switch that changes the row type may leave the operator invalid
        let bridged = node.with_inputs(inputs).map_err(|_| RuleError::Declined)?;
        Ok(vec![bridged])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algebra::{Field, GraphPattern, JoinType, KindTag, RowType};
    use crate::ast::Expr;
    use crate::rules::tests::{fire, values};
    use polystore_core::{DataModel, DataType};

    fn relational() -> AlgNode {
        values(
            RowType::new(vec![
                Field::new("id", DataType::Int64),
                Field::new("tags", DataType::Array),
            ]),
            DataModel::Relational,
        )
    }

    #[test]
    fn test_bridges_unwind_over_relational_rows() {
        let unwind = AlgNode::unwind(relational(), 1).unwrap();
        let out = fire(&ModelBridgeRule, &unwind).unwrap();
        let switch = out[0].input(0).unwrap();
        assert_eq!(switch.kind().tag(), KindTag::ContextSwitch);
        assert_eq!(switch.data_model(), DataModel::Document);
        assert_eq!(switch.input(0).unwrap(), &relational());
    }

    #[test]
    fn test_bridges_one_join_side() {
        let docs = values(RowType::new(vec![Field::new("k", DataType::Int64)]), DataModel::Document);
        let join = AlgNode::join(relational(), docs, JoinType::Inner, Expr::eq(Expr::field(0), Expr::field(2))).unwrap();
        let out = fire(&ModelBridgeRule, &join).unwrap();
        assert_eq!(out[0].input(0).unwrap(), &relational());
        assert_eq!(out[0].input(1).unwrap().kind().tag(), KindTag::ContextSwitch);
    }

    #[test]
    fn test_declines_when_models_agree() {
        let filter = AlgNode::filter(relational(), Expr::gt(Expr::field(0), Expr::literal(0i64))).unwrap();
        assert_eq!(fire(&ModelBridgeRule, &filter), Err(RuleError::Declined));
        let switch = AlgNode::context_switch(relational(), DataModel::Graph).unwrap();
        assert_eq!(fire(&ModelBridgeRule, &switch), Err(RuleError::Declined));
    }

    #[test]
    fn test_bridges_pattern_match_to_graph() {
        let people = values(RowType::new(vec![Field::new("p", DataType::Node)]), DataModel::Relational);
        let pattern = AlgNode::pattern_match(people, GraphPattern::labeled(&["Person"])).unwrap();
        let out = fire(&ModelBridgeRule, &pattern).unwrap();
        assert_eq!(out[0].input(0).unwrap().data_model(), DataModel::Graph);

        // a graph switch collapses every row into one node field
        let wide = AlgNode::pattern_match(relational(), GraphPattern::labeled(&["Person"])).unwrap();
        assert_eq!(fire(&ModelBridgeRule, &wide), Err(RuleError::Declined));
    }
}

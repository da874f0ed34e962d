//! Tree traversal and rewriting.
//!
//! [`AlgVisitor`] observes a tree in pre-order. [`AlgShuttle`] rewrites it bottom-up and returns
//! a new tree; the original is left untouched.

use super::node::AlgNode;
use super::kind::KindTag;
use polystore_core::Result;

/// Observes every node of a tree, parents before children.
pub trait AlgVisitor {
    fn visit(&mut self, node: &AlgNode, depth: usize);
}

impl<F> AlgVisitor for F
where
    F: FnMut(&AlgNode, usize),
{
    fn visit(&mut self, node: &AlgNode, depth: usize) {
        self(node, depth)
    }
}

/// Rewrites a node whose inputs have already been rewritten.
pub trait AlgShuttle {
    fn rewrite(&mut self, node: AlgNode) -> Result<AlgNode>;
}

impl AlgNode {
    /// Pre-order traversal.
    pub fn accept(&self, visitor: &mut dyn AlgVisitor) {
        self.walk(visitor, 0);
    }

    fn walk(&self, visitor: &mut dyn AlgVisitor, depth: usize) {
        visitor.visit(self, depth);
        for input in self.inputs() {
            input.walk(visitor, depth + 1);
        }
    }

    /// Bottom-up rewrite producing a new tree.
    pub fn transform(&self, shuttle: &mut dyn AlgShuttle) -> Result<AlgNode> {
        let inputs = self
            .inputs()
            .iter()
            .map(|input| input.transform(shuttle))
            .collect::<Result<Vec<_>>>()?;
        let node = if inputs == self.inputs() {
            self.clone()
        } else {
            self.with_inputs(inputs)?
        };
        shuttle.rewrite(node)
    }

    /// Counts the nodes of the given kind in this tree.
    pub fn count(&self, tag: KindTag) -> usize {
        let mut count = 0;
        self.accept(&mut |node: &AlgNode, _depth: usize| {
            if node.kind().tag() == tag {
                count += 1;
            }
        });
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algebra::{Field, RowType};
    use crate::ast::Expr;
    use polystore_core::traits::Convention;
    use polystore_core::{DataModel, DataType, Row, Value};

    fn tree() -> AlgNode {
        let values = AlgNode::values(
            RowType::new(vec![Field::new("id", DataType::Int64)]),
            vec![Row::new(vec![Value::Int64(1)])],
            DataModel::Relational,
        )
        .unwrap();
        let filter = AlgNode::filter(values, Expr::gt(Expr::field(0), Expr::literal(0i64))).unwrap();
        AlgNode::filter(filter, Expr::lt(Expr::field(0), Expr::literal(9i64))).unwrap()
    }

    #[test]
    fn test_visitor_is_pre_order() {
        let mut seen = Vec::new();
        tree().accept(&mut |node: &AlgNode, depth: usize| seen.push((node.kind().tag(), depth)));
        assert_eq!(
            seen,
            vec![(KindTag::Filter, 0), (KindTag::Filter, 1), (KindTag::Values, 2)]
        );
        assert_eq!(tree().count(KindTag::Filter), 2);
    }

    struct ToRowStore;

    impl AlgShuttle for ToRowStore {
        fn rewrite(&mut self, node: AlgNode) -> Result<AlgNode> {
            Ok(node.with_convention(Convention::RowStore))
        }
    }

    #[test]
    fn test_shuttle_returns_new_tree() {
        let original = tree();
        let rewritten = original.transform(&mut ToRowStore).unwrap();
        assert!(rewritten.is_physical());
        assert!(!original.is_physical());
        assert_eq!(rewritten.row_type(), original.row_type());
    }
}

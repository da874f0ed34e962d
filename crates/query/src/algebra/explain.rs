//! Plan rendering.

use super::node::AlgNode;
use std::fmt::Write;

/// Renders a tree, one operator per line, indented by depth, with its traits.
///
/// ```text
/// Filter(($1 > 10)) [relational, RowStore]
///   PhysicalScan(al4@ad1, [c2, c3]) [relational, RowStore]
/// ```
pub fn explain(node: &AlgNode) -> String {
    let mut out = String::new();
    node.accept(&mut |n: &AlgNode, depth: usize| {
        let _ = writeln!(out, "{}{} {}", "  ".repeat(depth), n.kind(), n.traits());
    });
    out
}

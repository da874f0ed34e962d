//! The algebra tree: operator kinds, row types, nodes and their traversal.

mod capability;
mod explain;
mod kind;
mod node;
mod row_type;
mod visitor;

pub use capability::supports;
pub use explain::explain;
pub use kind::{
    AggregateCall, AlgKind, Arity, GraphPattern, JoinType, KindTag, ModifyOp, SetOpKind, SortKey,
};
pub use node::{modify_row_type, switch_row_type, AlgNode};
pub use row_type::{Field, RowType};
pub use visitor::{AlgShuttle, AlgVisitor};

//! Scalar expressions used inside algebra operators.

mod expr;

pub use expr::{AggregateFunc, BinaryOp, Expr, SortOrder, UnaryOp};

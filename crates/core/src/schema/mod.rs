//! Schema module.
//!
//! This module contains the logical schema definitions: columns (or document fields, or graph
//! properties), key constraints and entity schemas.

mod column;
mod constraint;
mod entity;

pub use column::LogicalColumn;
pub use constraint::{ConstraintAction, KeyConstraint, KeyKind};
pub use entity::{check_naming_rules, EntitySchema, SchemaBuilder};

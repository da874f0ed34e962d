//! Polystore Core - Shared types for the Polystore multi-model engine.
//!
//! This crate provides the vocabulary every other Polystore crate speaks:
//!
//! - `ids`: Typed identifiers for namespaces, entities, allocations and adapters
//! - `DataModel`: The data model a namespace is declared with (relational, document, graph)
//! - `traits`: The trait model (`Trait`, `TraitKind`, `Convention`, `TraitSet`) algebra nodes are tagged with
//! - `DataType`, `Value`, `Row`: Runtime values, used for row types and the reference interpreter
//! - `schema`: Logical schema definitions (columns, key constraints, entity schemas)
//! - `Error`: Error types shared by the catalog and the planner
//!
//! # Example
//!
//! ```rust
//! use polystore_core::schema::SchemaBuilder;
//! use polystore_core::traits::{Convention, TraitSet};
//! use polystore_core::{DataModel, DataType};
//!
//! let schema = SchemaBuilder::new()
//!     .add_column("id", DataType::Int64)
//!     .unwrap()
//!     .add_column("total", DataType::Float64)
//!     .unwrap()
//!     .add_primary_key(&["id"])
//!     .unwrap()
//!     .build()
//!     .unwrap();
//! assert_eq!(schema.columns().len(), 2);
//!
//! let logical = TraitSet::of(DataModel::Relational, Convention::Abstract);
//! let physical = logical.replace(Convention::RowStore.into());
//! assert!(!logical.satisfies(&physical));
//! ```

mod error;
pub mod ids;
mod model;
mod row;
pub mod schema;
pub mod traits;
mod types;
mod value;

pub use error::{Error, Result, UnresolvedRequirement};
pub use model::DataModel;
pub use row::Row;
pub use types::DataType;
pub use value::{GraphElement, Value};

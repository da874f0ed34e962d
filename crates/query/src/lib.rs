//! Polystore Query - algebra, rules and the cost-based planner.
//!
//! This crate turns a logical algebra tree into the cheapest physical plan the registered
//! adapters can run:
//!
//! - `ast`: Scalar expressions over positional fields
//! - `algebra`: Operator kinds, row types, `AlgNode` trees, visitors and `explain`
//! - `rules`: Transformation rules and the `RuleEngine` that dispatches them
//! - `planner`: The memo-based `Planner`, its cost model and statistics hooks
//! - `interpreter`: A reference `Interpreter` evaluating trees over in-memory rows
//!
//! # Example
//!
//! ```rust
//! use polystore_catalog::{AllocationSpec, Catalog, CatalogConfig};
//! use polystore_core::schema::SchemaBuilder;
//! use polystore_core::traits::{Convention, TraitSet};
//! use polystore_core::{DataModel, DataType};
//! use polystore_query::algebra::{AlgNode, KindTag};
//! use polystore_query::planner::{Planner, PlannerConfig};
//! use polystore_query::rules::RuleEngine;
//!
//! let catalog = Catalog::new(CatalogConfig::default());
//! let pg = catalog
//!     .register_adapter("pg", Convention::RowStore, &[DataModel::Relational])
//!     .unwrap();
//! let shop = catalog.create_namespace("shop", DataModel::Relational).unwrap();
//! let schema = SchemaBuilder::new()
//!     .add_column("id", DataType::Int64)
//!     .unwrap()
//!     .add_column("total", DataType::Float64)
//!     .unwrap()
//!     .build()
//!     .unwrap();
//! let orders = catalog.create_logical_entity(shop, "orders", schema).unwrap();
//! catalog.add_allocation(orders, AllocationSpec::new(pg)).unwrap();
//!
//! let entity = catalog.logical_entity(orders).unwrap();
//! let scan = AlgNode::scan(&entity, &["id"]).unwrap();
//! let engine = RuleEngine::with_default_rules();
//! let mut planner = Planner::new(&catalog, &engine, PlannerConfig::default());
//! let required = TraitSet::of(DataModel::Relational, Convention::RowStore);
//! let optimized = planner.optimize(&scan, &required).unwrap();
//! assert_eq!(optimized.plan.kind().tag(), KindTag::PhysicalScan);
//! ```

pub mod algebra;
pub mod ast;
pub mod interpreter;
pub mod planner;
pub mod rules;

pub use algebra::{explain, AlgKind, AlgNode, KindTag};
pub use interpreter::Interpreter;
pub use planner::{Optimized, Planner, PlannerConfig};
pub use rules::RuleEngine;

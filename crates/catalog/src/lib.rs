//! Polystore Catalog - the multi-model entity catalog.
//!
//! This crate owns the three-layer entity graph and everything the planner needs to know about
//! where data lives:
//!
//! - `Catalog`: Namespaces, logical entities, allocations and physical entities, with per-namespace
//!   locking and an adapter registry
//! - `Journal`: Append-only change journal, replayable with [`Catalog::replay`]
//! - `PlacementResolver`: Ranks the allocations able to serve a scan or a write
//! - `TransactionCollaborator`: The one question the catalog asks a transaction manager
//!
//! # Example
//!
//! ```rust
//! use polystore_catalog::{AllocationSpec, Catalog, CatalogConfig, PlacementResolver};
//! use polystore_core::schema::SchemaBuilder;
//! use polystore_core::traits::Convention;
//! use polystore_core::{DataModel, DataType};
//!
//! let catalog = Catalog::new(CatalogConfig::default());
//! let pg = catalog
//!     .register_adapter("pg", Convention::RowStore, &[DataModel::Relational])
//!     .unwrap();
//! let shop = catalog.create_namespace("shop", DataModel::Relational).unwrap();
//! let schema = SchemaBuilder::new()
//!     .add_column("id", DataType::Int64)
//!     .unwrap()
//!     .build()
//!     .unwrap();
//! let orders = catalog.create_logical_entity(shop, "orders", schema).unwrap();
//! catalog.add_allocation(orders, AllocationSpec::new(pg)).unwrap();
//!
//! let id = catalog.logical_entity(orders).unwrap().schema.column_ids();
//! let placements = PlacementResolver::new(&catalog)
//!     .eligible_for_scan(orders, &id)
//!     .unwrap();
//! assert_eq!(placements.len(), 1);
//! ```

mod adapter;
mod catalog;
mod config;
pub mod coverage;
mod entity;
mod journal;
mod placement;
mod transaction;

pub use adapter::AdapterInfo;
pub use catalog::{Catalog, EntitySnapshot};
pub use config::CatalogConfig;
pub use entity::{
    AllocationEntity, AllocationSpec, LogicalEntity, Namespace, PartitionScheme, Partitioning,
    PhysicalEntity, PlacementRole, PlacementType,
};
pub use journal::{EntityChange, Journal, JournalOp, JournalRecord};
pub use placement::{Placement, PlacementResolver, ScanRoute, VerticalPart};
pub use transaction::{NoOpenTransactions, TransactionCollaborator};

//! Property-based tests for the coverage invariant.
//!
//! Whatever sequence of placement operations is applied, an entity that has allocations has
//! every column placed, and a rejected operation changes nothing.

use polystore_catalog::coverage::uncovered_columns;
use polystore_catalog::{AllocationSpec, Catalog, CatalogConfig, PlacementRole};
use polystore_core::ids::{AdapterId, LogicalEntityId};
use polystore_core::schema::SchemaBuilder;
use polystore_core::traits::Convention;
use polystore_core::{DataModel, DataType};
use proptest::prelude::*;

const COLUMNS: [&str; 4] = ["id", "total", "note", "status"];

#[derive(Clone, Debug)]
enum Op {
    Add {
        adapter: usize,
        mask: u8,
        secondary: bool,
    },
    Group {
        first: usize,
        second: usize,
        mask: u8,
    },
    Drop(usize),
    DropAdapter(usize),
    DropColumn(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0usize..4, 1u8..16, any::<bool>())
            .prop_map(|(adapter, mask, secondary)| Op::Add { adapter, mask, secondary }),
        2 => (0usize..4, 0usize..4, 1u8..16)
            .prop_map(|(first, second, mask)| Op::Group { first, second, mask }),
        3 => (0usize..8).prop_map(Op::Drop),
        1 => (0usize..4).prop_map(Op::DropAdapter),
        1 => (1usize..4).prop_map(Op::DropColumn),
    ]
}

fn columns_of(mask: u8) -> Vec<&'static str> {
    COLUMNS
        .iter()
        .enumerate()
        .filter(|(i, _)| mask & (1 << i) != 0)
        .map(|(_, c)| *c)
        .collect()
}

fn complement(mask: u8) -> u8 {
    !mask & 0b1111
}

fn setup() -> (Catalog, LogicalEntityId, Vec<AdapterId>) {
    let catalog = Catalog::new(CatalogConfig::default());
    let adapters = (0..4)
        .map(|i| {
            catalog
                .register_adapter(
                    &format!("store{}", i),
                    Convention::RowStore,
                    &[DataModel::Relational],
                )
                .unwrap()
        })
        .collect();
    let ns = catalog
        .create_namespace("shop", DataModel::Relational)
        .unwrap();
    let mut builder = SchemaBuilder::new();
    for column in COLUMNS {
        builder = builder.add_column(column, DataType::String).unwrap();
    }
    let orders = catalog
        .create_logical_entity(ns, "orders", builder.build().unwrap())
        .unwrap();
    (catalog, orders, adapters)
}

fn assert_covered(catalog: &Catalog, orders: LogicalEntityId) -> Result<(), TestCaseError> {
    let snapshot = catalog.entity_snapshot(orders).unwrap();
    if !snapshot.allocations.is_empty() {
        let count = snapshot.allocations[0].partitioning.partition_count;
        let uncovered = uncovered_columns(&snapshot.entity.schema, count, snapshot.allocations.iter());
        prop_assert!(uncovered.is_empty(), "uncovered columns {:?}", uncovered);
    }
    Ok(())
}

proptest! {
    /// Property: the union of allocations always covers the schema once any allocation exists.
    #[test]
    fn coverage_invariant_holds(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let (catalog, orders, adapters) = setup();
        for op in ops {
            let before = catalog.entity_snapshot(orders).unwrap();
            let journal_before = catalog.journal().len();
            let result = match &op {
                Op::Add { adapter, mask, secondary } => {
                    let role = if *secondary { PlacementRole::Secondary } else { PlacementRole::Primary };
                    catalog
                        .add_allocation(
                            orders,
                            AllocationSpec::new(adapters[*adapter])
                                .columns(&columns_of(*mask))
                                .role(role),
                        )
                        .map(|_| ())
                }
                Op::Group { first, second, mask } => catalog
                    .add_allocation_group(
                        orders,
                        vec![
                            AllocationSpec::new(adapters[*first]).columns(&columns_of(*mask)),
                            AllocationSpec::new(adapters[*second])
                                .columns(&columns_of(complement(*mask) | 1)),
                        ],
                    )
                    .map(|_| ()),
                Op::Drop(index) => match before.allocations.get(*index) {
                    Some(alloc) => catalog.drop_allocation(alloc.id),
                    None => Ok(()),
                },
                Op::DropAdapter(index) => {
                    if catalog.adapter(adapters[*index]).is_ok() {
                        catalog.drop_adapter(adapters[*index])
                    } else {
                        Ok(())
                    }
                }
                Op::DropColumn(index) => {
                    if before.entity.column(COLUMNS[*index]).is_some() {
                        catalog.drop_column(orders, COLUMNS[*index])
                    } else {
                        Ok(())
                    }
                }
            };

            if result.is_err() {
                let after = catalog.entity_snapshot(orders).unwrap();
                prop_assert_eq!(&after.allocations, &before.allocations);
                prop_assert_eq!(catalog.journal().len(), journal_before);
            }
            assert_covered(&catalog, orders)?;
        }
    }

    /// Property: replaying the journal reproduces the same placements.
    #[test]
    fn replay_reproduces_placements(ops in prop::collection::vec(op_strategy(), 1..20)) {
        let (catalog, orders, adapters) = setup();
        for op in ops {
            if let Op::Add { adapter, mask, secondary } = op {
                let spec = AllocationSpec::new(adapters[adapter]).columns(&columns_of(mask));
                let spec = if secondary { spec.secondary() } else { spec };
                let _ = catalog.add_allocation(orders, spec);
            }
        }
        let replayed = Catalog::replay(
            CatalogConfig::default(),
            catalog.journal().records(),
            std::sync::Arc::new(polystore_catalog::NoOpenTransactions),
        )
        .unwrap();
        prop_assert_eq!(
            replayed.resolve_allocations(orders).unwrap(),
            catalog.resolve_allocations(orders).unwrap()
        );
    }
}

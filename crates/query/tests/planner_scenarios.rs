//! End-to-end planner scenarios over small catalogs.

use polystore_catalog::{AllocationSpec, Catalog, CatalogConfig, LogicalEntity, Partitioning};
use polystore_core::ids::AdapterId;
use polystore_core::schema::SchemaBuilder;
use polystore_core::traits::{Convention, TraitSet};
use polystore_core::{DataModel, DataType, Error, Row, UnresolvedRequirement, Value};
use polystore_query::algebra::{AlgKind, AlgNode, Field, JoinType, KindTag, ModifyOp, RowType};
use polystore_query::ast::Expr;
use polystore_query::planner::{FixedStatistics, Planner, PlannerConfig, TableStats};
use polystore_query::{explain, Interpreter, RuleEngine};
use test_log::test;

struct Shop {
    catalog: Catalog,
    pg: AdapterId,
    mongo: AdapterId,
    orders: LogicalEntity,
}

fn shop() -> Shop {
    let catalog = Catalog::new(CatalogConfig::default());
    let pg = catalog
        .register_adapter("pg", Convention::RowStore, &[DataModel::Relational])
        .unwrap();
    let mongo = catalog
        .register_adapter(
            "mongo",
            Convention::DocStore,
            &[DataModel::Relational, DataModel::Document],
        )
        .unwrap();
    let ns = catalog.create_namespace("shop", DataModel::Relational).unwrap();
    let schema = SchemaBuilder::new()
        .add_column("id", DataType::Int64)
        .unwrap()
        .add_column("total", DataType::Float64)
        .unwrap()
        .add_column("tags", DataType::Array)
        .unwrap()
        .build()
        .unwrap();
    let id = catalog.create_logical_entity(ns, "orders", schema).unwrap();
    let orders = catalog.logical_entity(id).unwrap();
    Shop {
        catalog,
        pg,
        mongo,
        orders,
    }
}

fn order_rows(n: i64) -> Vec<Row> {
    (0..n)
        .map(|i| {
            let tags: Vec<Value> = (0..i % 3).map(|t| Value::from(format!("t{}", t))).collect();
            Row::new(vec![
                Value::Int64(i),
                Value::Float64((i * 7 % 50) as f64),
                Value::Array(tags),
            ])
        })
        .collect()
}

fn sorted(mut rows: Vec<Row>) -> Vec<Row> {
    rows.sort();
    rows
}

fn relational(convention: Convention) -> TraitSet {
    TraitSet::of(DataModel::Relational, convention)
}

#[test]
fn scan_from_single_allocation() {
    let shop = shop();
    shop.catalog
        .add_allocation(shop.orders.id, AllocationSpec::new(shop.pg))
        .unwrap();
    let engine = RuleEngine::with_default_rules();
    let mut planner = Planner::new(&shop.catalog, &engine, PlannerConfig::default());

    let scan = AlgNode::scan(&shop.orders, &["id"]).unwrap();
    let optimized = planner.optimize(&scan, &relational(Convention::RowStore)).unwrap();
    let plan = &optimized.plan;
    match plan.kind() {
        AlgKind::PhysicalScan { adapter, columns, .. } => {
            assert_eq!(*adapter, shop.pg);
            assert_eq!(columns, &vec![shop.orders.column("id").unwrap().id()]);
        }
        other => panic!("expected a physical scan, got {}", other),
    }
    assert!(plan.inputs().is_empty());
    assert_eq!(plan.convention(), Convention::RowStore);
}

#[test]
fn unwind_over_relational_scan_bridges_once() {
    let shop = shop();
    shop.catalog
        .add_allocation(shop.orders.id, AllocationSpec::new(shop.pg))
        .unwrap();
    let engine = RuleEngine::with_default_rules();
    let mut planner = Planner::new(&shop.catalog, &engine, PlannerConfig::default());

    let tree = AlgNode::unwind(AlgNode::scan(&shop.orders, &[]).unwrap(), 2).unwrap();
    let required = TraitSet::of(DataModel::Document, Convention::Engine);
    let plan = planner.optimize(&tree, &required).unwrap().plan;
    assert_eq!(plan.count(KindTag::ContextSwitch), 1, "{}", explain(&plan));
    assert_eq!(plan.count(KindTag::PhysicalScan), 1);
    assert!(plan.traits().satisfies(&required));
}

#[test]
fn unplaced_entity_names_missing_columns() {
    let shop = shop();
    let engine = RuleEngine::with_default_rules();
    let mut planner = Planner::new(&shop.catalog, &engine, PlannerConfig::default());

    let scan = AlgNode::scan(&shop.orders, &["total"]).unwrap();
    match planner.optimize(&scan, &relational(Convention::Engine)) {
        Err(Error::NoPhysicalPlan { unresolved }) => {
            assert!(unresolved.iter().any(|u| matches!(
                u,
                UnresolvedRequirement::MissingColumns { entity, columns }
                    if entity == "shop.orders" && columns == &vec!["total".to_string()]
            )));
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[test]
fn optimization_is_deterministic() {
    let shop = shop();
    shop.catalog
        .add_allocation(shop.orders.id, AllocationSpec::new(shop.pg))
        .unwrap();
    shop.catalog
        .add_allocation(shop.orders.id, AllocationSpec::new(shop.mongo).columns(&["id", "total"]))
        .unwrap();
    let engine = RuleEngine::with_default_rules();

    let left = AlgNode::scan(&shop.orders, &["id", "total"]).unwrap();
    let right = AlgNode::scan(&shop.orders, &["id"]).unwrap();
    let tree = AlgNode::filter(
        AlgNode::join(left, right, JoinType::Inner, Expr::eq(Expr::field(0), Expr::field(2))).unwrap(),
        Expr::gt(Expr::field(1), Expr::literal(20.0)),
    )
    .unwrap();

    let mut plans = Vec::new();
    for _ in 0..3 {
        let mut planner = Planner::new(&shop.catalog, &engine, PlannerConfig::default());
        let optimized = planner.optimize(&tree, &relational(Convention::Engine)).unwrap();
        plans.push((optimized.plan, optimized.cost, optimized.report));
    }
    assert_eq!(plans[0], plans[1]);
    assert_eq!(plans[1], plans[2]);
}

#[test]
fn partitioned_entity_is_read_as_union() {
    let shop = shop();
    let partitioning = Partitioning::round_robin(2);
    shop.catalog
        .add_allocation_group(
            shop.orders.id,
            vec![
                AllocationSpec::new(shop.pg)
                    .partitioning(partitioning.clone())
                    .partitions(&[0]),
                AllocationSpec::new(shop.mongo)
                    .partitioning(partitioning)
                    .partitions(&[1]),
            ],
        )
        .unwrap();
    let engine = RuleEngine::with_default_rules();
    let mut planner = Planner::new(&shop.catalog, &engine, PlannerConfig::default());

    let tree = AlgNode::filter(
        AlgNode::scan(&shop.orders, &[]).unwrap(),
        Expr::lt(Expr::field(1), Expr::literal(30.0)),
    )
    .unwrap();
    let plan = planner.optimize(&tree, &relational(Convention::Engine)).unwrap().plan;
    assert_eq!(plan.count(KindTag::PhysicalScan), 2, "{}", explain(&plan));
    assert_eq!(plan.count(KindTag::SetOp), 1);

    let interpreter = Interpreter::new(&shop.catalog).with_rows(shop.orders.id, order_rows(40));
    assert_eq!(
        sorted(interpreter.evaluate(&plan).unwrap()),
        sorted(interpreter.evaluate(&tree).unwrap())
    );
}

#[test]
fn union_finds_exact_partition_cover() {
    let shop = shop();
    let cache = shop
        .catalog
        .register_adapter("cache", Convention::RowStore, &[DataModel::Relational])
        .unwrap();
    let partitioning = Partitioning::round_robin(4);
    let spec = |adapter, partitions: &[u32]| {
        AllocationSpec::new(adapter)
            .partitioning(partitioning.clone())
            .partitions(partitions)
    };
    shop.catalog
        .add_allocation_group(
            shop.orders.id,
            vec![
                spec(shop.pg, &[1, 2]),
                spec(shop.mongo, &[0, 1]),
                spec(cache, &[2, 3]),
            ],
        )
        .unwrap();
    let engine = RuleEngine::with_default_rules();
    let mut planner = Planner::new(&shop.catalog, &engine, PlannerConfig::default());

    let tree = AlgNode::scan(&shop.orders, &["id", "total"]).unwrap();
    let plan = planner.optimize(&tree, &relational(Convention::Engine)).unwrap().plan;
    assert_eq!(plan.count(KindTag::PhysicalScan), 2, "{}", explain(&plan));
    assert_eq!(plan.count(KindTag::SetOp), 1);

    let interpreter = Interpreter::new(&shop.catalog).with_rows(shop.orders.id, order_rows(30));
    assert_eq!(
        sorted(interpreter.evaluate(&plan).unwrap()),
        sorted(interpreter.evaluate(&tree).unwrap())
    );
}

#[test]
fn vertically_split_entity_is_joined_on_key() {
    let shop = shop();
    let ns = shop.catalog.namespace_by_name("shop").unwrap().id;
    let schema = SchemaBuilder::new()
        .add_column("id", DataType::Int64)
        .unwrap()
        .add_column("total", DataType::Float64)
        .unwrap()
        .add_column("note", DataType::String)
        .unwrap()
        .add_primary_key(&["id"])
        .unwrap()
        .build()
        .unwrap();
    let invoices = shop.catalog.create_logical_entity(ns, "invoices", schema).unwrap();
    let invoices = shop.catalog.logical_entity(invoices).unwrap();
    shop.catalog
        .add_allocation_group(
            invoices.id,
            vec![
                AllocationSpec::new(shop.pg).columns(&["id", "total"]),
                AllocationSpec::new(shop.mongo).columns(&["id", "note"]),
            ],
        )
        .unwrap();
    let engine = RuleEngine::with_default_rules();
    let mut planner = Planner::new(&shop.catalog, &engine, PlannerConfig::default());

    let tree = AlgNode::filter(
        AlgNode::scan(&invoices, &["note", "total"]).unwrap(),
        Expr::gt(Expr::field(1), Expr::literal(10.0)),
    )
    .unwrap();
    let plan = planner.optimize(&tree, &relational(Convention::Engine)).unwrap().plan;
    assert_eq!(plan.count(KindTag::PhysicalScan), 2, "{}", explain(&plan));
    assert_eq!(plan.count(KindTag::Join), 1);
    assert_eq!(plan.row_type(), tree.row_type());

    let rows: Vec<Row> = (0..20)
        .map(|i| {
            Row::new(vec![
                Value::Int64(i),
                Value::Float64((i * 3 % 25) as f64),
                Value::from(format!("n{}", i)),
            ])
        })
        .collect();
    let interpreter = Interpreter::new(&shop.catalog).with_rows(invoices.id, rows);
    let expected = sorted(interpreter.evaluate(&tree).unwrap());
    assert!(!expected.is_empty());
    assert_eq!(sorted(interpreter.evaluate(&plan).unwrap()), expected);
}

#[test]
fn cross_store_join_matches_logical_result() {
    let shop = shop();
    let ns = shop.catalog.namespace_by_name("shop").unwrap().id;
    let schema = SchemaBuilder::new()
        .add_column("order_id", DataType::Int64)
        .unwrap()
        .add_column("note", DataType::String)
        .unwrap()
        .build()
        .unwrap();
    let notes = shop.catalog.create_logical_entity(ns, "notes", schema).unwrap();
    let notes = shop.catalog.logical_entity(notes).unwrap();
    shop.catalog
        .add_allocation(shop.orders.id, AllocationSpec::new(shop.pg))
        .unwrap();
    shop.catalog
        .add_allocation(notes.id, AllocationSpec::new(shop.mongo))
        .unwrap();
    let engine = RuleEngine::with_default_rules();
    let mut planner = Planner::new(&shop.catalog, &engine, PlannerConfig::default());

    let tree = AlgNode::join(
        AlgNode::scan(&shop.orders, &["id", "total"]).unwrap(),
        AlgNode::scan(&notes, &[]).unwrap(),
        JoinType::Left,
        Expr::eq(Expr::field(0), Expr::field(2)),
    )
    .unwrap();
    let plan = planner.optimize(&tree, &relational(Convention::Engine)).unwrap().plan;
    assert!(plan.count(KindTag::Transfer) >= 1, "{}", explain(&plan));
    assert!(plan.is_physical());

    let note_rows = vec![
        Row::new(vec![Value::Int64(1), Value::from("fragile")]),
        Row::new(vec![Value::Int64(3), Value::from("gift")]),
        Row::new(vec![Value::Int64(3), Value::from("late")]),
    ];
    let interpreter = Interpreter::new(&shop.catalog)
        .with_rows(shop.orders.id, order_rows(6))
        .with_rows(notes.id, note_rows);
    let rows = interpreter.evaluate(&plan).unwrap();
    assert_eq!(rows.len(), 7);
    assert_eq!(sorted(rows), sorted(interpreter.evaluate(&tree).unwrap()));
}

#[test]
fn insert_fans_out_to_every_allocation() {
    let shop = shop();
    shop.catalog
        .add_allocation(shop.orders.id, AllocationSpec::new(shop.pg))
        .unwrap();
    shop.catalog
        .add_allocation(
            shop.orders.id,
            AllocationSpec::new(shop.mongo).columns(&["id"]).secondary(),
        )
        .unwrap();
    let engine = RuleEngine::with_default_rules();
    let mut planner = Planner::new(&shop.catalog, &engine, PlannerConfig::default());

    let row_type = RowType::new(vec![
        Field::new("id", DataType::Int64),
        Field::new("total", DataType::Float64),
        Field::new("tags", DataType::Array),
    ]);
    let values = AlgNode::values(row_type, order_rows(2), DataModel::Relational).unwrap();
    let tree = AlgNode::modify(values, &shop.orders, ModifyOp::Insert).unwrap();
    let plan = planner.optimize(&tree, &relational(Convention::Engine)).unwrap().plan;
    match plan.kind() {
        AlgKind::ModifyFanOut { conventions } => {
            assert_eq!(conventions, &vec![Convention::RowStore, Convention::DocStore]);
        }
        other => panic!("expected a fan-out, got {}", other),
    }
    assert_eq!(plan.count(KindTag::PhysicalModify), 2, "{}", explain(&plan));
}

#[test]
fn exhausted_budget_returns_best_so_far() {
    let shop = shop();
    shop.catalog
        .add_allocation(shop.orders.id, AllocationSpec::new(shop.pg))
        .unwrap();
    let engine = RuleEngine::with_default_rules();
    let config = PlannerConfig::default().with_firing_budget(2);
    let mut planner = Planner::new(&shop.catalog, &engine, config);

    let scan = AlgNode::scan(&shop.orders, &[]).unwrap();
    let optimized = planner.optimize(&scan, &relational(Convention::RowStore)).unwrap();
    assert_eq!(optimized.plan.kind().tag(), KindTag::PhysicalScan);
    assert!(optimized.report.budget_exhausted);
    assert!(optimized.report.degraded());
    assert_eq!(optimized.report.rule_firings, 2);
}

#[test]
fn patience_stops_after_first_root_plan() {
    let shop = shop();
    shop.catalog
        .add_allocation(shop.orders.id, AllocationSpec::new(shop.pg))
        .unwrap();
    let engine = RuleEngine::with_default_rules();
    let swapped = AlgNode::project_fields(AlgNode::scan(&shop.orders, &["id", "total"]).unwrap(), &[1, 0]).unwrap();
    let tree = AlgNode::filter(swapped, Expr::is_not_null(Expr::field(0))).unwrap();

    let config = PlannerConfig::default().with_patience(Some(0));
    let mut planner = Planner::new(&shop.catalog, &engine, config);
    let patient = planner.optimize(&tree, &relational(Convention::RowStore)).unwrap();
    assert!(patient.report.stopped_early);
    assert!(!patient.report.degraded());

    let mut planner = Planner::new(&shop.catalog, &engine, PlannerConfig::default());
    let full = planner.optimize(&tree, &relational(Convention::RowStore)).unwrap();
    assert!(!full.report.stopped_early);
    assert!(full.report.rule_firings >= patient.report.rule_firings);
    assert!(full.cost <= patient.cost);
}

#[test]
fn statistics_steer_row_estimates() {
    let shop = shop();
    shop.catalog
        .add_allocation(shop.orders.id, AllocationSpec::new(shop.pg))
        .unwrap();
    let engine = RuleEngine::with_default_rules();
    let scan = AlgNode::scan(&shop.orders, &[]).unwrap();
    let required = relational(Convention::RowStore);

    let small = FixedStatistics::new().with_table(shop.orders.id, TableStats::new(10.0));
    let large = FixedStatistics::new().with_table(shop.orders.id, TableStats::new(10_000.0));
    let cheap = Planner::new(&shop.catalog, &engine, PlannerConfig::default())
        .with_statistics(&small)
        .optimize(&scan, &required)
        .unwrap();
    let costly = Planner::new(&shop.catalog, &engine, PlannerConfig::default())
        .with_statistics(&large)
        .optimize(&scan, &required)
        .unwrap();
    assert_eq!(cheap.plan, costly.plan);
    assert!(cheap.cost < costly.cost);
}

#[test]
fn preferred_adapter_wins_ties() {
    let shop = shop();
    let other = shop
        .catalog
        .register_adapter("pg2", Convention::RowStore, &[DataModel::Relational])
        .unwrap();
    shop.catalog
        .add_allocation(shop.orders.id, AllocationSpec::new(shop.pg))
        .unwrap();
    shop.catalog
        .add_allocation(shop.orders.id, AllocationSpec::new(other))
        .unwrap();
    let engine = RuleEngine::with_default_rules();
    let scan = AlgNode::scan(&shop.orders, &["id"]).unwrap();

    let config = PlannerConfig::default().with_preferred_adapter(Some(other));
    let plan = Planner::new(&shop.catalog, &engine, config)
        .optimize(&scan, &relational(Convention::RowStore))
        .unwrap()
        .plan;
    assert!(matches!(plan.kind(), AlgKind::PhysicalScan { adapter, .. } if *adapter == other));
}

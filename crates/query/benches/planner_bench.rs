//! Benchmarks for planning.
//!
//! Catalogs and trees are built outside the measured closures; each iteration runs a full
//! optimization or rewrite against a fresh memo.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use polystore_catalog::{AllocationSpec, Catalog, CatalogConfig, LogicalEntity};
use polystore_core::schema::SchemaBuilder;
use polystore_core::traits::{Convention, TraitSet};
use polystore_core::{DataModel, DataType, Row, Value};
use polystore_query::algebra::{AlgNode, JoinType};
use polystore_query::ast::Expr;
use polystore_query::rules::RuleContext;
use polystore_query::{Interpreter, Planner, PlannerConfig, RuleEngine};

// ============================================================================
// Setup
// ============================================================================

/// Registers `tables` entities of three columns, alternating between a row store and a
/// document store.
fn create_catalog(tables: usize) -> (Catalog, Vec<LogicalEntity>) {
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
    let ns = catalog.create_namespace("bench", DataModel::Relational).unwrap();
    let entities = (0..tables)
        .map(|i| {
            let schema = SchemaBuilder::new()
                .add_column("id", DataType::Int64)
                .unwrap()
                .add_column("key", DataType::Int64)
                .unwrap()
                .add_column("name", DataType::String)
                .unwrap()
                .build()
                .unwrap();
            let id = catalog
                .create_logical_entity(ns, &format!("t{}", i), schema)
                .unwrap();
            let adapter = if i % 2 == 0 { pg } else { mongo };
            catalog.add_allocation(id, AllocationSpec::new(adapter)).unwrap();
            catalog.logical_entity(id).unwrap()
        })
        .collect();
    (catalog, entities)
}

/// Left-deep chain of inner joins on `key`, filtered on the first table.
fn join_chain(entities: &[LogicalEntity]) -> AlgNode {
    let mut tree = AlgNode::scan(&entities[0], &[]).unwrap();
    for entity in &entities[1..] {
        let width = tree.row_type().len();
        let right = AlgNode::scan(entity, &[]).unwrap();
        tree = AlgNode::join(
            tree,
            right,
            JoinType::Inner,
            Expr::eq(Expr::field(1), Expr::field(width + 1)),
        )
        .unwrap();
    }
    AlgNode::filter(tree, Expr::lt(Expr::field(0), Expr::literal(100i64))).unwrap()
}

fn create_rows(count: usize) -> Vec<Row> {
    (0..count)
        .map(|i| {
            Row::new(vec![
                Value::Int64(i as i64),
                Value::Int64((i % 10) as i64),
                Value::String(format!("name_{}", i)),
            ])
        })
        .collect()
}

// ============================================================================
// Benchmarks
// ============================================================================

fn bench_optimize_join_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("optimize_join_chain");
    let engine = RuleEngine::with_default_rules();
    let required = TraitSet::of(DataModel::Relational, Convention::Engine);

    for tables in [2, 3, 4].iter() {
        let (catalog, entities) = create_catalog(*tables);
        let tree = join_chain(&entities);
        group.bench_with_input(BenchmarkId::from_parameter(tables), tables, |b, _| {
            b.iter(|| {
                let mut planner = Planner::new(&catalog, &engine, PlannerConfig::default());
                black_box(planner.optimize(black_box(&tree), &required).unwrap())
            });
        });
    }

    group.finish();
}

fn bench_rewrite_join_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("rewrite_join_chain");
    let engine = RuleEngine::pushdown_rules();

    for tables in [2, 4, 8].iter() {
        let (catalog, entities) = create_catalog(*tables);
        let context = RuleContext::for_catalog(&catalog);
        let tree = join_chain(&entities);
        group.bench_with_input(BenchmarkId::from_parameter(tables), tables, |b, _| {
            b.iter(|| black_box(engine.rewrite(&context, black_box(&tree), 8).unwrap()));
        });
    }

    group.finish();
}

fn bench_interpret_optimized(c: &mut Criterion) {
    let mut group = c.benchmark_group("interpret_optimized");
    let engine = RuleEngine::with_default_rules();
    let required = TraitSet::of(DataModel::Relational, Convention::Engine);
    let (catalog, entities) = create_catalog(2);
    let plan = Planner::new(&catalog, &engine, PlannerConfig::default())
        .optimize(&join_chain(&entities), &required)
        .unwrap()
        .plan;

    for size in [100, 1000].iter() {
        let interpreter = entities
            .iter()
            .fold(Interpreter::new(&catalog), |interp, e| interp.with_rows(e.id, create_rows(*size)));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| black_box(interpreter.evaluate(black_box(&plan)).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_optimize_join_chain,
    bench_rewrite_join_chain,
    bench_interpret_optimized,
);

criterion_main!(benches);

//! Property-based tests for rewrites and the planner.
//!
//! Random pipelines of filters, projections, sorts, aggregates and self joins are built over a
//! two-column entity. Rewritten and optimized trees must produce the same row multiset as the
//! tree they came from. Filters on random values must stay above every join, aggregate and
//! sort they started above.

use polystore_catalog::{AllocationSpec, Catalog, CatalogConfig, LogicalEntity};
use polystore_core::schema::SchemaBuilder;
use polystore_core::traits::{Convention, TraitSet};
use polystore_core::{DataModel, DataType, Row, Value};
use polystore_query::algebra::{AggregateCall, AlgKind, AlgNode, JoinType, KindTag, SortKey};
use polystore_query::ast::{AggregateFunc, Expr};
use polystore_query::planner::{Planner, PlannerConfig, PlannerListener};
use polystore_query::rules::RuleContext;
use polystore_query::{Interpreter, RuleEngine};
use proptest::prelude::*;
use std::collections::BTreeMap;

/// One pipeline stage. Every stage keeps the row two fields wide.
#[derive(Clone, Debug)]
enum Step {
    Filter { field: usize, cmp: u8, bound: i64 },
    /// Keeps a row when `RAND()` falls below `bound`, optionally together with a filter on `x`.
    Sample { bound: u8, with_x: bool },
    Swap,
    Double,
    Sort { desc: bool },
    Aggregate,
    SelfJoin,
}

fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        3 => (0usize..2, 0u8..3, 0i64..10).prop_map(|(field, cmp, bound)| Step::Filter { field, cmp, bound }),
        1 => Just(Step::Swap),
        1 => Just(Step::Double),
        1 => any::<bool>().prop_map(|desc| Step::Sort { desc }),
        1 => Just(Step::Aggregate),
        1 => Just(Step::SelfJoin),
    ]
}

/// Like `step_strategy`, with random sampling filters mixed in.
fn sampling_step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        2 => step_strategy(),
        1 => (0u8..10, any::<bool>()).prop_map(|(bound, with_x)| Step::Sample { bound, with_x }),
    ]
}

/// Strategy for generating rows of two small float columns.
fn rows_strategy(max_rows: usize) -> impl Strategy<Value = Vec<Row>> {
    prop::collection::vec((0i64..10, 0i64..10), 0..max_rows).prop_map(|pairs| {
        pairs
            .into_iter()
            .map(|(x, y)| Row::new(vec![Value::Float64(x as f64), Value::Float64(y as f64)]))
            .collect()
    })
}

fn points() -> (Catalog, LogicalEntity) {
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
    let ns = catalog.create_namespace("geo", DataModel::Relational).unwrap();
    let schema = SchemaBuilder::new()
        .add_column("x", DataType::Float64)
        .unwrap()
        .add_column("y", DataType::Float64)
        .unwrap()
        .build()
        .unwrap();
    let id = catalog.create_logical_entity(ns, "points", schema).unwrap();
    catalog.add_allocation(id, AllocationSpec::new(pg)).unwrap();
    catalog
        .add_allocation(id, AllocationSpec::new(mongo).columns(&["x"]).secondary())
        .unwrap();
    let entity = catalog.logical_entity(id).unwrap();
    (catalog, entity)
}

fn build(entity: &LogicalEntity, steps: &[Step]) -> AlgNode {
    let scan = || AlgNode::scan(entity, &[]).unwrap();
    steps.iter().fold(scan(), |tree, step| match step {
        Step::Filter { field, cmp, bound } => {
            let (field, bound) = (Expr::field(*field), Expr::literal(*bound as f64));
            let condition = match cmp {
                0 => Expr::lt(field, bound),
                1 => Expr::ge(field, bound),
                _ => Expr::eq(field, bound),
            };
            AlgNode::filter(tree, condition).unwrap()
        }
        Step::Sample { bound, with_x } => {
            let sample = Expr::lt(
                Expr::function("RAND", vec![]),
                Expr::literal(f64::from(*bound) / 10.0),
            );
            let condition = if *with_x {
                Expr::and(sample, Expr::ge(Expr::field(0), Expr::literal(2.0)))
            } else {
                sample
            };
            AlgNode::filter(tree, condition).unwrap()
        }
        Step::Swap => AlgNode::project_fields(tree, &[1, 0]).unwrap(),
        Step::Double => AlgNode::project(
            tree,
            vec![
                (Expr::mul(Expr::field(0), Expr::literal(2.0)), "a"),
                (Expr::field(1), "b"),
            ],
        )
        .unwrap(),
        Step::Sort { desc } => {
            let key = if *desc { SortKey::desc(0) } else { SortKey::asc(0) };
            AlgNode::sort(tree, vec![key], 0, None).unwrap()
        }
        Step::Aggregate => AlgNode::aggregate(
            tree,
            vec![0],
            vec![AggregateCall::new(AggregateFunc::Sum, Some(1))],
        )
        .unwrap(),
        Step::SelfJoin => {
            let joined = AlgNode::join(
                tree,
                scan(),
                JoinType::Inner,
                Expr::eq(Expr::field(0), Expr::field(2)),
            )
            .unwrap();
            AlgNode::project_fields(joined, &[0, 3]).unwrap()
        }
    })
}

fn sorted(mut rows: Vec<Row>) -> Vec<Row> {
    rows.sort();
    rows
}

/// Collects, for every non-deterministic conjunct, how many joins, aggregates and sorts sit
/// beneath the filter holding it.
fn barriers_below_random(node: &AlgNode, out: &mut Vec<usize>) {
    if let (AlgKind::Filter { condition }, Some(input)) = (node.kind(), node.input(0)) {
        let barriers: usize = [KindTag::Join, KindTag::Aggregate, KindTag::Sort]
            .iter()
            .map(|tag| input.count(*tag))
            .sum();
        let random = condition
            .conjuncts()
            .iter()
            .filter(|c| !c.is_deterministic())
            .count();
        out.extend(std::iter::repeat(barriers).take(random));
    }
    for input in node.inputs() {
        barriers_below_random(input, out);
    }
}

/// Remembers the last cost per class and trait set, counting increases.
#[derive(Default)]
struct CostWatch {
    last: BTreeMap<(usize, TraitSet), f64>,
    increases: usize,
}

impl PlannerListener for CostWatch {
    fn on_cost_improved(&mut self, class: usize, traits: &TraitSet, cost: f64) {
        if let Some(previous) = self.last.insert((class, traits.clone()), cost) {
            if cost > previous {
                self.increases += 1;
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: pushdown rewrites preserve the result multiset.
    #[test]
    fn rewrites_preserve_results(
        steps in prop::collection::vec(step_strategy(), 1..5),
        rows in rows_strategy(16),
    ) {
        let (catalog, entity) = points();
        let tree = build(&entity, &steps);
        let engine = RuleEngine::pushdown_rules();
        let context = RuleContext::for_catalog(&catalog);
        let rewritten = engine.rewrite(&context, &tree, 8).unwrap();

        let interpreter = Interpreter::new(&catalog).with_rows(entity.id, rows);
        let expected = sorted(interpreter.evaluate(&tree).unwrap());
        let actual = sorted(interpreter.evaluate(&rewritten).unwrap());
        prop_assert_eq!(actual, expected);
    }

    /// Property: pushdown leaves random filters above the operators they were written over.
    #[test]
    fn random_filters_are_not_pushed_through_barriers(
        steps in prop::collection::vec(sampling_step_strategy(), 1..6),
    ) {
        let (catalog, entity) = points();
        let tree = build(&entity, &steps);
        let engine = RuleEngine::pushdown_rules();
        let context = RuleContext::for_catalog(&catalog);
        let rewritten = engine.rewrite(&context, &tree, 8).unwrap();

        let (mut before, mut after) = (Vec::new(), Vec::new());
        barriers_below_random(&tree, &mut before);
        barriers_below_random(&rewritten, &mut after);
        before.sort_unstable();
        after.sort_unstable();
        prop_assert_eq!(after, before);
    }

    /// Property: class costs never increase, and the chosen plan computes the logical result.
    #[test]
    fn optimized_plans_are_sound(
        steps in prop::collection::vec(step_strategy(), 1..4),
        rows in rows_strategy(12),
    ) {
        let (catalog, entity) = points();
        let tree = build(&entity, &steps);
        let engine = RuleEngine::with_default_rules();
        let mut watch = CostWatch::default();
        let required = TraitSet::of(DataModel::Relational, Convention::Engine);
        let optimized = Planner::new(&catalog, &engine, PlannerConfig::default())
            .with_listener(&mut watch)
            .optimize(&tree, &required)
            .unwrap();
        prop_assert_eq!(watch.increases, 0);
        prop_assert!(optimized.plan.is_physical());
        prop_assert!(optimized.plan.traits().satisfies(&required));

        let interpreter = Interpreter::new(&catalog).with_rows(entity.id, rows);
        let expected = sorted(interpreter.evaluate(&tree).unwrap());
        let actual = sorted(interpreter.evaluate(&optimized.plan).unwrap());
        prop_assert_eq!(actual, expected);
    }
}

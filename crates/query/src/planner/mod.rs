//! Cost-based planner.
//!
//! The planner searches the space of plans equivalent to an input tree:
//!
//! 1. **Seed** - the tree is registered in a memo of equivalence classes, one class per node.
//!    Expressions are deduplicated structurally, so equal subtrees share a class.
//! 2. **Explore** - rules of the [`RuleEngine`] fire against every new expression and every
//!    expression reading its class. Their outputs join the class they were fired on; an output
//!    that already lives elsewhere merges the two classes.
//! 3. **Cost** - physical expressions are costed as soon as their inputs have plans in the
//!    conventions they ask for. A class keeps its cheapest member per trait set, and that cost
//!    only ever decreases.
//! 4. **Extract** - the cheapest member satisfying the required traits is picked from the root
//!    class, recursively.
//!
//! ## Usage
//!
//! ```ignore
//! let engine = RuleEngine::with_default_rules();
//! let mut planner = Planner::new(&catalog, &engine, PlannerConfig::default());
//! let optimized = planner.optimize(&tree, &TraitSet::of(DataModel::Relational, Convention::Engine))?;
//! println!("{}", explain(&optimized.plan));
//! ```

mod config;
mod cost;
mod extract;
mod listener;
mod memo;
mod report;
mod search;
mod statistics;

pub use config::{CostModel, PlannerConfig};
pub use cost::Cost;
pub use listener::PlannerListener;
pub use report::OptimizationReport;
pub use statistics::{FixedStatistics, NoStatistics, StatisticsProvider, TableStats};

use crate::algebra::AlgNode;
use crate::rules::{RuleContext, RuleEngine};
use log::{info, warn};
use polystore_catalog::{Catalog, PlacementResolver};
use polystore_core::traits::{Convention, TraitSet};
use polystore_core::{Error, Result, UnresolvedRequirement};
use search::Search;

static NO_STATISTICS: NoStatistics = NoStatistics;

/// The outcome of a successful optimization.
#[derive(Clone, Debug)]
pub struct Optimized {
    /// The cheapest physical plan found.
    pub plan: AlgNode,
    /// Its estimated cost.
    pub cost: f64,
    pub report: OptimizationReport,
}

/// Cost-based planner over a catalog and a rule set.
///
/// A planner holds no state between runs; every [`Planner::optimize`] call searches a fresh memo.
pub struct Planner<'a> {
    catalog: &'a Catalog,
    engine: &'a RuleEngine,
    config: PlannerConfig,
    statistics: &'a dyn StatisticsProvider,
    listener: Option<&'a mut dyn PlannerListener>,
}

impl<'a> Planner<'a> {
    pub fn new(catalog: &'a Catalog, engine: &'a RuleEngine, config: PlannerConfig) -> Self {
        Self {
            catalog,
            engine,
            config,
            statistics: &NO_STATISTICS,
            listener: None,
        }
    }

    /// Sets the source of row-count estimates.
    pub fn with_statistics(mut self, statistics: &'a dyn StatisticsProvider) -> Self {
        self.statistics = statistics;
        self
    }

    /// Sets an observer of the search.
    pub fn with_listener(mut self, listener: &'a mut dyn PlannerListener) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Finds the cheapest physical plan equivalent to `root` satisfying `required`.
    ///
    /// `root` is a logical tree as a language frontend produces it. `required` usually names a
    /// data model and a concrete convention; a missing trait kind accepts any value.
    ///
    /// Fails with [`Error::NoPhysicalPlan`] naming the unresolved requirements when no
    /// implementable plan exists. Running out of firing budget is not an error: the best plan
    /// found so far is returned and [`OptimizationReport::budget_exhausted`] is set.
    pub fn optimize(&mut self, root: &AlgNode, required: &TraitSet) -> Result<Optimized> {
        let catalog = self.catalog;
        let mut conventions: Vec<Convention> = catalog.adapters().iter().map(|a| a.convention()).collect();
        conventions.push(Convention::Engine);
        conventions.extend(required.convention());
        let resolver = PlacementResolver::new(catalog).with_preferred_adapter(self.config.preferred_adapter);
        let context = RuleContext::new(resolver, conventions);

        let mut search = Search::new(self, &context, required.clone());
        let root_class = search
            .seed(root)
            .ok_or_else(|| Error::invalid_operation(format!("cannot register {} as a plan root", root.kind().tag())))?;
        search.explore();

        let root_class = search.root().unwrap_or(root_class);
        let report = search.report.clone();
        let best = search.memo.best_for(root_class, required);
        let plan = extract::extract(&search.memo, root_class, required);
        match (plan, best) {
            (Some(plan), Some(best)) => {
                if report.degraded() {
                    warn!("degraded optimization: {}", report);
                }
                info!("optimized {} at cost {}: {}", root.kind().tag(), best.cost, report);
                Ok(Optimized {
                    plan,
                    cost: best.cost.value(),
                    report,
                })
            }
            _ => {
                let mut unresolved: Vec<UnresolvedRequirement> = search.unresolved.iter().cloned().collect();
                unresolved.push(UnresolvedRequirement::UnsatisfiedTraits {
                    operator: root.kind().tag().to_string(),
                    required: required.clone(),
                });
                info!("no physical plan for {}: {}", root.kind().tag(), report);
                Err(Error::NoPhysicalPlan { unresolved })
            }
        }
    }
}

//! Search observers.

use polystore_core::traits::TraitSet;

/// Receives events while the planner searches. Every method defaults to doing nothing.
pub trait PlannerListener {
    /// A rule fired and produced `produced` expressions.
    fn on_rule_fired(&mut self, _rule: &'static str, _produced: usize) {}

    /// The cheapest known plan of `class` under `traits` dropped to `cost`.
    fn on_cost_improved(&mut self, _class: usize, _traits: &TraitSet, _cost: f64) {}

    /// Two equivalence classes were proven equal; `absorbed` now lives on as `kept`.
    fn on_classes_merged(&mut self, _kept: usize, _absorbed: usize) {}
}

//! One optimization run: seeding, rule exploration, cost propagation and convention converters.

use super::cost::{local_cost, Cost};
use super::memo::{ClassId, ExprId, Memo, Winner};
use super::report::OptimizationReport;
use super::Planner;
use crate::algebra::{AlgKind, AlgNode};
use crate::rules::{Operand, RuleCall, RuleContext, RuleError};
use hashbrown::HashSet;
use log::{debug, warn};
use polystore_core::traits::{Convention, TraitSet};
use polystore_core::UnresolvedRequirement;
use std::collections::{BTreeSet, VecDeque};

/// Deferred work produced while registering expressions.
enum Pending {
    /// Recompute the cost of an expression whose inputs got cheaper.
    Recost(ExprId),
    /// Offer the class in every other convention through transfers.
    Convert(ClassId, Convention),
}

pub(crate) struct Search<'s, 'a> {
    planner: &'s mut Planner<'a>,
    context: &'s RuleContext<'a>,
    pub(crate) memo: Memo,
    queue: VecDeque<ExprId>,
    pending: VecDeque<Pending>,
    fired: HashSet<(usize, Vec<ExprId>)>,
    converted: HashSet<(ClassId, Convention)>,
    pub(crate) unresolved: BTreeSet<UnresolvedRequirement>,
    pub(crate) report: OptimizationReport,
    root: Option<ClassId>,
    required: TraitSet,
    since_improvement: usize,
    halted: bool,
}

impl<'s, 'a> Search<'s, 'a> {
    pub fn new(planner: &'s mut Planner<'a>, context: &'s RuleContext<'a>, required: TraitSet) -> Self {
        Self {
            planner,
            context,
            memo: Memo::new(),
            queue: VecDeque::new(),
            pending: VecDeque::new(),
            fired: HashSet::new(),
            converted: HashSet::new(),
            unresolved: BTreeSet::new(),
            report: OptimizationReport::default(),
            root: None,
            required,
            since_improvement: 0,
            halted: false,
        }
    }

    /// Registers the input tree and returns its class, bridged to the required data model.
    pub fn seed(&mut self, tree: &AlgNode) -> Option<ClassId> {
        let mut root = self.register_tree(tree, None, 0)?;
        self.settle();
        let model = self.memo.class(root).model;
        if let Some(wanted) = self.required.data_model() {
            if wanted != model {
                let class = self.memo.class(root);
                let placeholder = AlgNode::subset(root, class.row_type.clone(), model);
                let bridged = AlgNode::context_switch(placeholder, wanted).ok()?;
                debug!("bridging root class {} from {} to {}", root, model, wanted);
                root = self.register_tree(&bridged, None, 0)?;
                self.settle();
            }
        }
        self.root = Some(root);
        Some(root)
    }

    /// Fires rules until no firing produces anything new, the budget runs out or the root plan
    /// stops improving.
    pub fn explore(&mut self) {
        while let Some(expr) = self.queue.pop_front() {
            if self.halted {
                break;
            }
            let class = self.memo.class_of(expr);
            let mut anchors = vec![expr];
            anchors.extend(self.memo.class(class).parents.iter().copied());
            for anchor in anchors {
                self.explore_anchor(anchor, expr);
                if self.halted {
                    break;
                }
            }
        }
        self.report.classes = self.memo.class_count();
        self.report.expressions = self.memo.expr_count();
        self.report.merges = self.memo.merge_count();
    }

    /// Returns the root class, canonicalized.
    pub fn root(&self) -> Option<ClassId> {
        self.root.map(|r| self.memo.find(r))
    }

    fn explore_anchor(&mut self, anchor: ExprId, fresh: ExprId) {
        let engine = self.planner.engine;
        let (tag, convention) = {
            let e = self.memo.expr(anchor);
            (e.kind.tag(), e.traits.convention().unwrap_or(Convention::Abstract))
        };
        for index in engine.candidates(tag) {
            let operand = engine.operand(index);
            if !operand.accepts(tag, convention) {
                continue;
            }
            for binding in self.bindings(operand, anchor) {
                if !binding.contains(&fresh) || !self.fired.insert((index, binding.clone())) {
                    continue;
                }
                if self.out_of_budget() {
                    return;
                }
                self.fire(index, &binding);
            }
        }
    }

    /// Enumerates the expressions matching `operand` rooted at `expr`, in pre-order.
    fn bindings(&self, operand: &Operand, expr: ExprId) -> Vec<Vec<ExprId>> {
        let e = self.memo.expr(expr);
        if !operand.accepts(e.kind.tag(), e.traits.convention().unwrap_or(Convention::Abstract)) {
            return Vec::new();
        }
        let inputs = self.memo.inputs_of(expr);
        let mut out = vec![vec![expr]];
        for (i, child) in operand.children.iter().enumerate() {
            let Some(&input) = inputs.get(i) else {
                return Vec::new();
            };
            let options: Vec<Vec<ExprId>> = self
                .memo
                .class(input)
                .members
                .iter()
                .flat_map(|m| self.bindings(child, *m))
                .collect();
            out = out
                .iter()
                .flat_map(|prefix| {
                    options.iter().map(move |option| {
                        let mut binding = prefix.clone();
                        binding.extend(option.iter().copied());
                        binding
                    })
                })
                .collect();
            if out.is_empty() {
                break;
            }
        }
        out
    }

    fn out_of_budget(&mut self) -> bool {
        let config = &self.planner.config;
        if self.report.rule_firings >= config.firing_budget {
            self.report.budget_exhausted = true;
            self.halted = true;
            warn!(
                "firing budget of {} exhausted, returning the best plan found so far",
                config.firing_budget
            );
            return true;
        }
        if let Some(patience) = config.patience {
            let root_done = self
                .root()
                .map_or(false, |r| self.memo.best_for(r, &self.required).is_some());
            if root_done && self.since_improvement >= patience {
                debug!("root plan unchanged for {} firings, stopping", patience);
                self.report.stopped_early = true;
                self.halted = true;
                return true;
            }
        }
        false
    }

    fn fire(&mut self, index: usize, binding: &[ExprId]) {
        let engine = self.planner.engine;
        self.report.rule_firings += 1;
        self.since_improvement += 1;
        let rels = binding.iter().map(|e| self.memo.view(*e)).collect();
        let call = RuleCall::new(rels, self.context);
        let target = self.memo.class_of(binding[0]);
        match engine.fire(index, &call) {
            Ok(nodes) => {
                let name = engine.rule(index).name();
                debug!("{} produced {} alternatives for class {}", name, nodes.len(), target);
                if let Some(listener) = self.planner.listener.as_mut() {
                    listener.on_rule_fired(name, nodes.len());
                }
                for node in &nodes {
                    let target = self.memo.find(target);
                    self.register_tree(node, Some(target), index + 1);
                    self.settle();
                }
            }
            Err(RuleError::Unsatisfiable(requirement)) => {
                debug!("unsatisfiable requirement: {}", requirement);
                self.unresolved.insert(requirement);
            }
            Err(RuleError::Failed(_)) => self.report.rule_failures += 1,
            Err(RuleError::Declined) => {}
        }
    }

    /// Registers a tree whose placeholders name existing classes.
    ///
    /// With a `target`, the tree's root must produce the same rows as the target class; an
    /// output of another row type or data model is counted as a rule failure and dropped.
    fn register_tree(&mut self, node: &AlgNode, target: Option<ClassId>, rule_order: usize) -> Option<ClassId> {
        if let Some(t) = target {
            let class = self.memo.class(t);
            if !class.row_type.compatible_with(node.row_type()) || class.model != node.data_model() {
                debug!("dropping {} registered into class {}: shape differs", node.kind().tag(), t);
                self.report.rule_failures += 1;
                return None;
            }
        }
        if let AlgKind::Subset { class } = node.kind() {
            let class = self.memo.find(*class);
            if let Some(t) = target {
                let merges = self.memo.merge(t, class);
                self.after_merges(merges);
            }
            return Some(self.memo.find(class));
        }

        let inputs = node
            .inputs()
            .iter()
            .map(|input| self.register_tree(input, None, rule_order))
            .collect::<Option<Vec<_>>>()?;
        let rows = self.estimate_rows(node.kind(), &inputs);
        let insertion = self.memo.insert(
            node.kind().clone(),
            inputs,
            node.traits().clone(),
            node.row_type().clone(),
            rule_order,
            target,
            rows,
        );
        if insertion.created {
            self.queue.push_back(insertion.expr);
            self.cost(insertion.expr);
        }
        self.after_merges(insertion.merges);
        Some(self.memo.find(insertion.class))
    }

    fn after_merges(&mut self, merges: Vec<(ClassId, ClassId)>) {
        for (kept, absorbed) in merges {
            debug!("merged class {} into {}", absorbed, kept);
            if let Some(listener) = self.planner.listener.as_mut() {
                listener.on_classes_merged(kept, absorbed);
            }
            let class = self.memo.class(kept);
            // members may now bind with the other class' neighbours
            self.queue.extend(class.members.iter().copied());
            self.pending.extend(class.parents.iter().map(|p| Pending::Recost(*p)));
        }
        for improvement in self.memo.take_improvements() {
            self.improved(improvement.class, &improvement.traits, improvement.cost);
        }
    }

    /// Drains deferred recosting and conversions.
    fn settle(&mut self) {
        while let Some(pending) = self.pending.pop_front() {
            match pending {
                Pending::Recost(expr) => self.cost(expr),
                Pending::Convert(class, from) => self.convert(class, from),
            }
        }
    }

    /// Costs a physical expression from its inputs' cheapest plans and offers it to its class.
    fn cost(&mut self, expr: ExprId) {
        let e = self.memo.expr(expr);
        if !e.traits.is_physical() {
            return;
        }
        let mut below = Cost::ZERO;
        let mut input_rows = Vec::new();
        for (i, input) in self.memo.inputs_of(expr).into_iter().enumerate() {
            let required = e.kind.input_requirement(i, &e.traits);
            let Some(winner) = self.memo.best_for(input, &required) else {
                return;
            };
            below = below + winner.cost;
            input_rows.push(self.memo.class(input).rows);
        }
        let class = self.memo.class_of(expr);
        let rows = self.memo.class(class).rows;
        let cost = local_cost(&self.planner.config.cost, &e.kind, rows, &input_rows) + below;
        let winner = Winner {
            cost,
            rule_order: e.rule_order,
            expr,
        };
        let traits = e.traits.clone();
        let native = !matches!(e.kind, AlgKind::Transfer { .. });
        if self.memo.offer(class, &traits, winner) {
            self.improved(class, &traits, cost);
            match traits.convention() {
                Some(convention) if native => self.pending.push_back(Pending::Convert(class, convention)),
                _ => {}
            }
        }
    }

    fn improved(&mut self, class: ClassId, traits: &TraitSet, cost: Cost) {
        if let Some(listener) = self.planner.listener.as_mut() {
            listener.on_cost_improved(class, traits, cost.value());
        }
        if self.root() == Some(self.memo.find(class)) && traits.satisfies(&self.required) {
            self.since_improvement = 0;
        }
        let parents = self.memo.class(class).parents.clone();
        self.pending.extend(parents.into_iter().map(Pending::Recost));
    }

    /// Makes a class with a native plan in `from` available in every other offered convention.
    fn convert(&mut self, class: ClassId, from: Convention) {
        let class = self.memo.find(class);
        if !self.converted.insert((class, from)) {
            return;
        }
        let (row_type, model) = {
            let c = self.memo.class(class);
            (c.row_type.clone(), c.model)
        };
        let order = self.planner.engine.len() + 1;
        for &to in self.context.conventions() {
            if to == from {
                continue;
            }
            let placeholder = AlgNode::subset(class, row_type.clone(), model);
            let transfer = AlgNode::assemble(
                AlgKind::Transfer { from, to },
                vec![placeholder],
                row_type.clone(),
                TraitSet::of(model, to),
            );
            let target = self.memo.find(class);
            self.register_tree(&transfer, Some(target), order);
        }
    }

    /// Estimates the output rows of an operator over input classes.
    fn estimate_rows(&self, kind: &AlgKind, inputs: &[ClassId]) -> f64 {
        let config = &self.planner.config;
        let factors = &config.cost;
        let input = |i: usize| inputs.get(i).map_or(1.0, |c| self.memo.class(*c).rows);
        let rows = match kind {
            AlgKind::Scan { entity, .. } => self
                .planner
                .statistics
                .estimate_row_count(*entity, None)
                .unwrap_or(config.default_row_count),
            AlgKind::PhysicalScan {
                entity,
                partitions,
                partition_count,
                ..
            } => {
                let total = self
                    .planner
                    .statistics
                    .estimate_row_count(*entity, None)
                    .unwrap_or(config.default_row_count);
                total * partitions.len() as f64 / f64::from((*partition_count).max(1))
            }
            AlgKind::Values { tuples } => tuples.len() as f64,
            AlgKind::Filter { condition } => self
                .scanned_entity(inputs.first().copied())
                .and_then(|entity| self.planner.statistics.estimate_row_count(entity, Some(condition)))
                .unwrap_or_else(|| input(0) * factors.filter_selectivity),
            AlgKind::Join { join_type, .. } => {
                use crate::algebra::JoinType;
                let (l, r) = (input(0), input(1));
                let matched = l * r * factors.join_selectivity;
                match join_type {
                    JoinType::Inner => matched,
                    JoinType::Left => matched.max(l),
                    JoinType::Right => matched.max(r),
                    JoinType::Full => matched.max(l + r),
                    JoinType::Semi => l * factors.filter_selectivity.max(factors.join_selectivity),
                    JoinType::Anti => l * (1.0 - factors.join_selectivity),
                }
            }
            AlgKind::Aggregate { group_by, .. } => {
                if group_by.is_empty() {
                    1.0
                } else {
                    input(0) * factors.aggregate_factor
                }
            }
            AlgKind::SetOp { op, .. } => {
                use crate::algebra::SetOpKind;
                let all = (0..inputs.len()).map(input);
                match op {
                    SetOpKind::Union => all.sum::<f64>(),
                    SetOpKind::Intersect => all.fold(f64::INFINITY, f64::min),
                    SetOpKind::Except => input(0),
                }
            }
            AlgKind::Sort { fetch, .. } => match fetch {
                Some(n) => input(0).min(*n as f64),
                None => input(0),
            },
            AlgKind::Unwind { .. } => input(0) * factors.unwind_fanout,
            AlgKind::ElemMatch { .. } | AlgKind::PatternMatch { .. } => {
                input(0) * factors.filter_selectivity
            }
            AlgKind::Modify { .. } | AlgKind::PhysicalModify { .. } | AlgKind::ModifyFanOut { .. } => 1.0,
            AlgKind::Project { .. }
            | AlgKind::ContextSwitch { .. }
            | AlgKind::Transfer { .. }
            | AlgKind::Subset { .. } => input(0),
        };
        if rows.is_finite() {
            rows.max(1.0)
        } else {
            1.0
        }
    }

    /// Returns the entity scanned by a logical scan in `class`, if any.
    fn scanned_entity(&self, class: Option<ClassId>) -> Option<polystore_core::ids::LogicalEntityId> {
        let class = self.memo.class(class?);
        class.members.iter().find_map(|m| match &self.memo.expr(*m).kind {
            AlgKind::Scan { entity, .. } => Some(*entity),
            _ => None,
        })
    }
}

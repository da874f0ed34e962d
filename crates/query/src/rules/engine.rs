//! Rule registry and dispatch.

use super::{
    FilterAggregateTransposeRule, FilterJoinTransposeRule, FilterMergeRule,
    FilterProjectTransposeRule, FilterSortTransposeRule, FilterUnwindTransposeRule,
    ImplementationRule, JoinCommuteRule, ModelBridgeRule, ModifyImplementationRule, Operand,
    ProjectMergeRule, ProjectRemoveRule, Rule, RuleCall, RuleContext, RuleError,
    ScanImplementationRule,
};
use crate::algebra::{AlgKind, AlgNode, AlgShuttle, KindTag};
use hashbrown::{HashMap, HashSet};
use log::{debug, warn};
use polystore_core::Result;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Mutex;

/// Upper bound on consecutive rewrites of a single node during [`RuleEngine::rewrite`].
const MAX_LOCAL_REWRITES: usize = 16;

/// Registry of rules, indexed by the operator kind their operand roots at.
///
/// Declaration order matters: it is the order rules fire in and the tie-break between plans of
/// equal cost.
pub struct RuleEngine {
    rules: Vec<Box<dyn Rule>>,
    operands: Vec<Operand>,
    by_kind: HashMap<KindTag, Vec<usize>>,
    wildcard: Vec<usize>,
    reported: Mutex<HashSet<(usize, KindTag)>>,
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::with_default_rules()
    }
}

impl RuleEngine {
    /// Creates an engine without rules.
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            operands: Vec::new(),
            by_kind: HashMap::new(),
            wildcard: Vec::new(),
            reported: Mutex::new(HashSet::new()),
        }
    }

    /// Creates an engine with the full built-in rule set.
    pub fn with_default_rules() -> Self {
        Self::pushdown_rules()
            .with_rule(JoinCommuteRule)
            .with_rule(ModelBridgeRule)
            .with_rule(ScanImplementationRule)
            .with_rule(ModifyImplementationRule)
            .with_rule(ImplementationRule)
    }

    /// Creates an engine with the terminating logical rewrites only: predicate pushdown and
    /// projection cleanup. Suitable for [`RuleEngine::rewrite`].
    pub fn pushdown_rules() -> Self {
        Self::new()
            .with_rule(FilterMergeRule)
            .with_rule(FilterProjectTransposeRule)
            .with_rule(FilterJoinTransposeRule)
            .with_rule(FilterAggregateTransposeRule)
            .with_rule(FilterSortTransposeRule)
            .with_rule(FilterUnwindTransposeRule)
            .with_rule(ProjectMergeRule)
            .with_rule(ProjectRemoveRule)
    }

    /// Registers a rule after the existing ones.
    pub fn register(&mut self, rule: Box<dyn Rule>) {
        let index = self.rules.len();
        let operand = rule.operand();
        match operand.tag {
            Some(tag) => self.by_kind.entry(tag).or_default().push(index),
            None => self.wildcard.push(index),
        }
        debug!("registered rule {} as #{}", rule.name(), index);
        self.operands.push(operand);
        self.rules.push(rule);
    }

    /// Builder form of [`RuleEngine::register`].
    pub fn with_rule(mut self, rule: impl Rule + 'static) -> Self {
        self.register(Box::new(rule));
        self
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Returns the rule registered at `index`.
    pub fn rule(&self, index: usize) -> &dyn Rule {
        self.rules[index].as_ref()
    }

    /// Returns the rule names in declaration order.
    pub fn names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    pub(crate) fn operand(&self, index: usize) -> &Operand {
        &self.operands[index]
    }

    /// Returns the rules whose operand may root at `tag`, in declaration order.
    pub fn candidates(&self, tag: KindTag) -> Vec<usize> {
        let mut out: Vec<usize> = self
            .by_kind
            .get(&tag)
            .map(|v| v.to_vec())
            .unwrap_or_default();
        out.extend(self.wildcard.iter().copied());
        out.sort_unstable();
        out
    }

    /// Fires one rule. A panicking rule is reported as failed.
    ///
    /// Failures are logged once per rule and operator kind.
    pub fn fire(&self, index: usize, call: &RuleCall<'_, '_>) -> std::result::Result<Vec<AlgNode>, RuleError> {
        let rule = self.rule(index);
        let outcome = catch_unwind(AssertUnwindSafe(|| rule.on_match(call)))
            .unwrap_or_else(|_| Err(RuleError::Failed("rule panicked".into())));
        if let Err(RuleError::Failed(message)) = &outcome {
            self.report_failure(index, call.rel(0).kind().tag(), message);
        }
        outcome
    }

    fn report_failure(&self, index: usize, tag: KindTag, message: &str) {
        let mut reported = self.reported.lock().unwrap_or_else(|e| e.into_inner());
        if reported.insert((index, tag)) {
            warn!(
                "rule {} failed on {}: {} (further failures of this pair are not logged)",
                self.rule(index).name(),
                tag,
                message
            );
        }
    }

    /// Applies every rule matching `node` and returns the alternatives produced.
    ///
    /// Child operands are matched against `node`'s actual inputs. `node` is never modified;
    /// declined and failed firings contribute nothing.
    pub fn fire_all(&self, context: &RuleContext<'_>, node: &AlgNode) -> Vec<AlgNode> {
        let mut produced = Vec::new();
        for index in self.candidates(node.kind().tag()) {
            let Some(rels) = bind_tree(self.operand(index), node) else {
                continue;
            };
            let call = RuleCall::new(rels, context);
            match self.fire(index, &call) {
                Ok(nodes) => produced.extend(nodes),
                Err(err) => debug!("{} on {}: {}", self.rule(index).name(), node.kind().tag(), err),
            }
        }
        produced
    }

    /// Rewrites `tree` bottom-up with the first applicable logical alternative at every node,
    /// repeating until a pass changes nothing or `max_passes` is reached.
    ///
    /// Only alternatives that stay logical and keep the node's row type are taken, so the rule
    /// set should be terminating, such as [`RuleEngine::pushdown_rules`].
    pub fn rewrite(&self, context: &RuleContext<'_>, tree: &AlgNode, max_passes: usize) -> Result<AlgNode> {
        let mut current = tree.clone();
        for _ in 0..max_passes {
            let mut shuttle = RewriteShuttle {
                engine: self,
                context,
                changed: false,
            };
            current = current.transform(&mut shuttle)?;
            if !shuttle.changed {
                break;
            }
        }
        Ok(current)
    }

    fn first_rewrite(&self, context: &RuleContext<'_>, node: &AlgNode) -> Option<AlgNode> {
        self.fire_all(context, node).into_iter().find(|candidate| {
            candidate != node
                && is_logical(candidate)
                && candidate.row_type().compatible_with(node.row_type())
        })
    }
}

struct RewriteShuttle<'e, 'c, 'a> {
    engine: &'e RuleEngine,
    context: &'c RuleContext<'a>,
    changed: bool,
}

impl AlgShuttle for RewriteShuttle<'_, '_, '_> {
    fn rewrite(&mut self, node: AlgNode) -> Result<AlgNode> {
        let mut node = node;
        for _ in 0..MAX_LOCAL_REWRITES {
            match self.engine.first_rewrite(self.context, &node) {
                Some(next) => {
                    node = next;
                    self.changed = true;
                }
                None => break,
            }
        }
        Ok(node)
    }
}

fn is_logical(node: &AlgNode) -> bool {
    !node.convention().is_physical()
        && !matches!(node.kind(), AlgKind::Subset { .. })
        && node.inputs().iter().all(is_logical)
}

/// Binds an operand against a concrete tree: child operand `i` matches input `i` itself.
pub(crate) fn bind_tree(operand: &Operand, node: &AlgNode) -> Option<Vec<AlgNode>> {
    if !operand.matches(node) {
        return None;
    }
    let mut rels = vec![node.clone()];
    for (i, child) in operand.children.iter().enumerate() {
        rels.extend(bind_tree(child, node.input(i)?)?);
    }
    Some(rels)
}

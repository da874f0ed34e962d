//! Transformation rules.
//!
//! A rule pairs an [`Operand`] pattern over operator kinds and conventions with a transformation
//! producing equivalent expressions. Rules are stateless and registered once with a
//! [`RuleEngine`]; the planner fires them against its memo, and [`RuleEngine::fire_all`] fires them
//! against a plain tree.
//!
//! Rule outputs refer to the matched operators' inputs through the inputs of the nodes bound in
//! the [`RuleCall`], so the same rule works on a concrete tree and on memo placeholders.

mod bridge;
mod engine;
mod filter;
mod implement;
mod join;
mod project;

pub use bridge::ModelBridgeRule;
pub use engine::RuleEngine;
pub use filter::{
    FilterAggregateTransposeRule, FilterJoinTransposeRule, FilterMergeRule,
    FilterProjectTransposeRule, FilterSortTransposeRule, FilterUnwindTransposeRule,
};
pub use implement::{ImplementationRule, ModifyImplementationRule, ScanImplementationRule};
pub use join::JoinCommuteRule;
pub use project::{ProjectMergeRule, ProjectRemoveRule};

use crate::algebra::{AlgNode, KindTag};
use core::fmt;
use polystore_catalog::{Catalog, PlacementResolver};
use polystore_core::traits::Convention;
use polystore_core::UnresolvedRequirement;

/// Which conventions an operand accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConventionMatch {
    Any,
    /// Only [`Convention::Abstract`] nodes.
    Logical,
    /// Only nodes carrying a concrete convention.
    Physical,
}

impl ConventionMatch {
    pub fn accepts(&self, convention: Convention) -> bool {
        match self {
            ConventionMatch::Any => true,
            ConventionMatch::Logical => !convention.is_physical(),
            ConventionMatch::Physical => convention.is_physical(),
        }
    }
}

/// A pattern over an operator and, optionally, operators producing its inputs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Operand {
    /// Operator kind; None matches any kind.
    pub tag: Option<KindTag>,
    pub convention: ConventionMatch,
    /// Patterns for inputs `0..children.len()`; inputs beyond are unconstrained.
    pub children: Vec<Operand>,
}

impl Operand {
    /// Matches logical operators of kind `tag`.
    pub fn logical(tag: KindTag) -> Self {
        Self {
            tag: Some(tag),
            convention: ConventionMatch::Logical,
            children: Vec::new(),
        }
    }

    /// Matches logical operators of any kind.
    pub fn any_logical() -> Self {
        Self {
            tag: None,
            convention: ConventionMatch::Logical,
            children: Vec::new(),
        }
    }

    /// Adds input patterns.
    pub fn with_children(mut self, children: Vec<Operand>) -> Self {
        self.children = children;
        self
    }

    /// Returns true if `node` itself (not its inputs) matches.
    pub fn matches(&self, node: &AlgNode) -> bool {
        self.accepts(node.kind().tag(), node.convention())
    }

    /// Returns true if an operator of kind `tag` in `convention` matches.
    pub fn accepts(&self, tag: KindTag, convention: Convention) -> bool {
        self.tag.map_or(true, |t| t == tag) && self.convention.accepts(convention)
    }

    /// Number of nodes a binding of this operand holds.
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(Operand::size).sum::<usize>()
    }
}

/// Why a rule produced nothing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RuleError {
    /// The rule does not apply to this binding, or cannot prove the rewrite sound.
    Declined,
    /// The rule applies but a requirement cannot be met, e.g. no allocation holds a column.
    Unsatisfiable(UnresolvedRequirement),
    /// The rule failed unexpectedly.
    Failed(String),
}

impl fmt::Display for RuleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleError::Declined => f.write_str("declined"),
            RuleError::Unsatisfiable(req) => write!(f, "unsatisfiable: {}", req),
            RuleError::Failed(message) => write!(f, "failed: {}", message),
        }
    }
}

impl From<polystore_core::Error> for RuleError {
    fn from(err: polystore_core::Error) -> Self {
        RuleError::Failed(err.to_string())
    }
}

/// Everything a rule may consult besides the matched nodes.
pub struct RuleContext<'a> {
    resolver: PlacementResolver<'a>,
    conventions: Vec<Convention>,
}

impl<'a> RuleContext<'a> {
    /// Creates a context offering the given physical conventions, sorted and deduplicated.
    pub fn new(resolver: PlacementResolver<'a>, mut conventions: Vec<Convention>) -> Self {
        conventions.retain(|c| c.is_physical());
        conventions.sort();
        conventions.dedup();
        Self {
            resolver,
            conventions,
        }
    }

    /// Offers the conventions of every registered adapter plus the built-in engine.
    pub fn for_catalog(catalog: &'a Catalog) -> Self {
        let conventions = catalog
            .adapters()
            .iter()
            .map(|a| a.convention())
            .chain(std::iter::once(Convention::Engine))
            .collect();
        Self::new(PlacementResolver::new(catalog), conventions)
    }

    #[inline]
    pub fn resolver(&self) -> &PlacementResolver<'a> {
        &self.resolver
    }

    #[inline]
    pub fn catalog(&self) -> &'a Catalog {
        self.resolver.catalog()
    }

    /// Physical conventions implementation rules may target, in ascending order.
    #[inline]
    pub fn conventions(&self) -> &[Convention] {
        &self.conventions
    }
}

/// The nodes bound by one match, in pre-order of the operand tree.
pub struct RuleCall<'c, 'a> {
    rels: Vec<AlgNode>,
    context: &'c RuleContext<'a>,
}

impl<'c, 'a> RuleCall<'c, 'a> {
    pub fn new(rels: Vec<AlgNode>, context: &'c RuleContext<'a>) -> Self {
        Self { rels, context }
    }

    /// Returns the `ordinal`-th bound node; 0 is the matched root.
    ///
    /// The engine only fires a rule with a binding of its operand's size.
    #[inline]
    pub fn rel(&self, ordinal: usize) -> &AlgNode {
        &self.rels[ordinal]
    }

    #[inline]
    pub fn context(&self) -> &'c RuleContext<'a> {
        self.context
    }
}

/// A transformation rule.
pub trait Rule: Send + Sync {
    /// Unique rule name, used in logs and reports.
    fn name(&self) -> &'static str;

    /// The pattern the rule fires on.
    fn operand(&self) -> Operand;

    /// Produces expressions equivalent to `call.rel(0)`.
    fn on_match(&self, call: &RuleCall<'_, '_>) -> Result<Vec<AlgNode>, RuleError>;
}

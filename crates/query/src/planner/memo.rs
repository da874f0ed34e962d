//! The memo: equivalence classes of expressions.
//!
//! Classes and expressions live in arenas and refer to each other by index. Merging two classes
//! links the higher id to the lower one (union-find), so stale ids held anywhere stay valid
//! through [`Memo::find`]. Expressions are deduplicated by signature: kind, canonical input
//! classes and traits.

use super::cost::Cost;
use crate::algebra::{AlgKind, AlgNode, RowType};
use hashbrown::HashMap;
use polystore_core::traits::TraitSet;
use polystore_core::DataModel;
use std::collections::BTreeMap;

pub(crate) type ClassId = usize;
pub(crate) type ExprId = usize;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct Signature {
    kind: AlgKind,
    inputs: Vec<ClassId>,
    traits: TraitSet,
}

/// One registered expression. `inputs` and `class` may be stale; canonicalize with `find`.
#[derive(Clone, Debug)]
pub(crate) struct MemoExpr {
    pub kind: AlgKind,
    pub inputs: Vec<ClassId>,
    pub traits: TraitSet,
    pub row_type: RowType,
    /// Declaration order of the rule that produced the expression; 0 for the input tree.
    pub rule_order: usize,
    pub class: ClassId,
}

/// The cheapest known member of a class under one trait set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Winner {
    pub cost: Cost,
    pub rule_order: usize,
    pub expr: ExprId,
}

impl Winner {
    fn key(&self) -> (Cost, usize, ExprId) {
        (self.cost, self.rule_order, self.expr)
    }

    pub fn beats(&self, other: &Winner) -> bool {
        self.key() < other.key()
    }
}

#[derive(Clone, Debug)]
pub(crate) struct EquivalenceClass {
    pub members: Vec<ExprId>,
    pub row_type: RowType,
    pub model: DataModel,
    /// Estimated output rows.
    pub rows: f64,
    pub best: BTreeMap<TraitSet, Winner>,
    /// Expressions reading this class.
    pub parents: Vec<ExprId>,
    link: ClassId,
}

/// Outcome of [`Memo::insert`].
#[derive(Debug)]
pub(crate) struct Insertion {
    pub expr: ExprId,
    pub class: ClassId,
    /// The expression was not known before.
    pub created: bool,
    /// `(kept, absorbed)` pairs, in merge order.
    pub merges: Vec<(ClassId, ClassId)>,
}

/// An improvement of a class winner caused by a merge.
#[derive(Debug)]
pub(crate) struct Improvement {
    pub class: ClassId,
    pub traits: TraitSet,
    pub cost: Cost,
}

#[derive(Default)]
pub(crate) struct Memo {
    classes: Vec<EquivalenceClass>,
    exprs: Vec<MemoExpr>,
    index: HashMap<Signature, ExprId>,
    improvements: Vec<Improvement>,
    merges: usize,
}

impl Memo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the canonical id of `class`.
    pub fn find(&self, mut class: ClassId) -> ClassId {
        while self.classes[class].link != class {
            class = self.classes[class].link;
        }
        class
    }

    pub fn class(&self, class: ClassId) -> &EquivalenceClass {
        &self.classes[self.find(class)]
    }

    pub fn expr(&self, expr: ExprId) -> &MemoExpr {
        &self.exprs[expr]
    }

    pub fn class_of(&self, expr: ExprId) -> ClassId {
        self.find(self.exprs[expr].class)
    }

    pub fn inputs_of(&self, expr: ExprId) -> Vec<ClassId> {
        self.exprs[expr].inputs.iter().map(|c| self.find(*c)).collect()
    }

    /// Number of live (canonical) classes.
    pub fn class_count(&self) -> usize {
        (0..self.classes.len()).filter(|c| self.classes[*c].link == *c).count()
    }

    pub fn expr_count(&self) -> usize {
        self.exprs.len()
    }

    pub fn merge_count(&self) -> usize {
        self.merges
    }

    /// Returns the expression as a node whose inputs are class placeholders.
    pub fn view(&self, expr: ExprId) -> AlgNode {
        let e = &self.exprs[expr];
        let inputs = e
            .inputs
            .iter()
            .map(|c| {
                let id = self.find(*c);
                let class = &self.classes[id];
                AlgNode::subset(id, class.row_type.clone(), class.model)
            })
            .collect();
        AlgNode::assemble(e.kind.clone(), inputs, e.row_type.clone(), e.traits.clone())
    }

    /// Returns the cheapest winner of `class` among trait sets satisfying `required`.
    pub fn best_for(&self, class: ClassId, required: &TraitSet) -> Option<Winner> {
        self.candidates(class, required).into_iter().next()
    }

    /// Returns the winners of `class` satisfying `required`, cheapest first.
    pub fn candidates(&self, class: ClassId, required: &TraitSet) -> Vec<Winner> {
        let mut winners: Vec<Winner> = self
            .class(class)
            .best
            .iter()
            .filter(|(traits, _)| traits.satisfies(required))
            .map(|(_, w)| *w)
            .collect();
        winners.sort_by_key(Winner::key);
        winners
    }

    /// Records `winner` for `class` under `traits` if it beats the current one.
    pub fn offer(&mut self, class: ClassId, traits: &TraitSet, winner: Winner) -> bool {
        let class = self.find(class);
        let best = &mut self.classes[class].best;
        match best.get(traits) {
            Some(current) if !winner.beats(current) => false,
            _ => {
                best.insert(traits.clone(), winner);
                true
            }
        }
    }

    /// Takes the winner improvements caused by merges since the last call.
    pub fn take_improvements(&mut self) -> Vec<Improvement> {
        std::mem::take(&mut self.improvements)
    }

    fn signature(&self, kind: &AlgKind, inputs: &[ClassId], traits: &TraitSet) -> Signature {
        Signature {
            kind: kind.clone(),
            inputs: inputs.iter().map(|c| self.find(*c)).collect(),
            traits: traits.clone(),
        }
    }

    /// Registers an expression over input classes.
    ///
    /// A known signature returns the existing expression; if it lives in a class other than
    /// `target`, the two classes are merged. Otherwise the expression joins `target`, or a new
    /// class with `rows` estimated rows.
    #[allow(clippy::too_many_arguments)]
    pub fn insert(
        &mut self,
        kind: AlgKind,
        inputs: Vec<ClassId>,
        traits: TraitSet,
        row_type: RowType,
        rule_order: usize,
        target: Option<ClassId>,
        rows: f64,
    ) -> Insertion {
        let signature = self.signature(&kind, &inputs, &traits);
        if let Some(&existing) = self.index.get(&signature) {
            let class = self.class_of(existing);
            let merges = match target.map(|t| self.find(t)) {
                Some(t) if t != class => self.merge(t, class),
                _ => Vec::new(),
            };
            return Insertion {
                expr: existing,
                class: self.find(class),
                created: false,
                merges,
            };
        }

        let class = match target {
            Some(t) => self.find(t),
            None => {
                let id = self.classes.len();
                self.classes.push(EquivalenceClass {
                    members: Vec::new(),
                    row_type: row_type.clone(),
                    model: traits.data_model().unwrap_or(DataModel::Relational),
                    rows,
                    best: BTreeMap::new(),
                    parents: Vec::new(),
                    link: id,
                });
                id
            }
        };
        let expr = self.exprs.len();
        for input in &signature.inputs {
            let parents = &mut self.classes[*input].parents;
            if !parents.contains(&expr) {
                parents.push(expr);
            }
        }
        self.exprs.push(MemoExpr {
            kind,
            inputs: signature.inputs.clone(),
            traits,
            row_type,
            rule_order,
            class,
        });
        self.classes[class].members.push(expr);
        self.index.insert(signature, expr);
        Insertion {
            expr,
            class,
            created: true,
            merges: Vec::new(),
        }
    }

    /// Merges two classes, then every pair of classes that became congruent because their
    /// members now read the same inputs. Returns the `(kept, absorbed)` pairs.
    pub fn merge(&mut self, a: ClassId, b: ClassId) -> Vec<(ClassId, ClassId)> {
        let mut pending = vec![(a, b)];
        let mut done = Vec::new();
        while let Some((a, b)) = pending.pop() {
            let (a, b) = (self.find(a), self.find(b));
            if a == b {
                continue;
            }
            let (kept, absorbed) = (a.min(b), a.max(b));
            self.absorb(kept, absorbed);
            done.push((kept, absorbed));

            // re-index parents under their new canonical inputs
            let parents = self.classes[kept].parents.clone();
            for parent in parents {
                let e = &self.exprs[parent];
                let signature = self.signature(&e.kind, &e.inputs, &e.traits);
                match self.index.get(&signature) {
                    Some(&other) if self.class_of(other) != self.class_of(parent) => {
                        pending.push((self.class_of(other), self.class_of(parent)));
                    }
                    Some(_) => {}
                    None => {
                        self.index.insert(signature, parent);
                    }
                }
            }
        }
        done
    }

    fn absorb(&mut self, kept: ClassId, absorbed: ClassId) {
        self.merges += 1;
        self.classes[absorbed].link = kept;
        let members = std::mem::take(&mut self.classes[absorbed].members);
        let parents = std::mem::take(&mut self.classes[absorbed].parents);
        let best = std::mem::take(&mut self.classes[absorbed].best);
        let rows = self.classes[absorbed].rows;

        let target = &mut self.classes[kept];
        target.members.extend(members);
        for parent in parents {
            if !target.parents.contains(&parent) {
                target.parents.push(parent);
            }
        }
        target.rows = target.rows.min(rows);
        for (traits, winner) in best {
            let better = match target.best.get(&traits) {
                Some(current) => winner.beats(current),
                None => true,
            };
            if better {
                self.improvements.push(Improvement {
                    class: kept,
                    traits: traits.clone(),
                    cost: winner.cost,
                });
                target.best.insert(traits, winner);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algebra::Field;
    use crate::ast::Expr;
    use polystore_core::traits::Convention;
    use polystore_core::{DataType, Row, Value};

    fn logical() -> TraitSet {
        TraitSet::of(DataModel::Relational, Convention::Abstract)
    }

    fn row_type() -> RowType {
        RowType::new(vec![Field::new("x", DataType::Int64)])
    }

    fn values(memo: &mut Memo, x: i64) -> ClassId {
        let kind = AlgKind::Values {
            tuples: vec![Row::new(vec![Value::Int64(x)])],
        };
        memo.insert(kind, vec![], logical(), row_type(), 0, None, 1.0).class
    }

    fn filter(memo: &mut Memo, input: ClassId, target: Option<ClassId>) -> Insertion {
        let kind = AlgKind::Filter {
            condition: Expr::gt(Expr::field(0), Expr::literal(0i64)),
        };
        memo.insert(kind, vec![input], logical(), row_type(), 0, target, 1.0)
    }

    #[test]
    fn test_structural_dedup() {
        let mut memo = Memo::new();
        let a = values(&mut memo, 1);
        let first = filter(&mut memo, a, None);
        let second = filter(&mut memo, a, None);
        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.expr, second.expr);
        assert_eq!(memo.expr_count(), 2);
        assert_eq!(memo.class(a).parents, vec![first.expr]);
    }

    #[test]
    fn test_merge_is_congruent() {
        let mut memo = Memo::new();
        let a = values(&mut memo, 1);
        let b = values(&mut memo, 2);
        let fa = filter(&mut memo, a, None).class;
        let fb = filter(&mut memo, b, None).class;
        assert_ne!(fa, fb);

        // proving a = b makes the filters over them equal too
        let merges = memo.merge(b, a);
        assert_eq!(merges[0], (a, b));
        assert_eq!(memo.find(fb), memo.find(fa));
        assert_eq!(memo.find(fa), fa.min(fb));
        assert_eq!(memo.class_count(), 2);
        assert_eq!(memo.merge_count(), 2);
    }

    #[test]
    fn test_insert_into_other_class_merges() {
        let mut memo = Memo::new();
        let a = values(&mut memo, 1);
        let f = filter(&mut memo, a, None).class;
        let b = values(&mut memo, 2);
        let again = filter(&mut memo, a, Some(b));
        assert!(!again.created);
        assert_eq!(again.merges, vec![(f.min(b), f.max(b))]);
        assert_eq!(memo.find(b), memo.find(f));
    }

    #[test]
    fn test_offer_keeps_cheapest() {
        let mut memo = Memo::new();
        let a = values(&mut memo, 1);
        let physical = TraitSet::of(DataModel::Relational, Convention::Engine);
        let winner = |cost: f64, expr| Winner {
            cost: Cost::new(cost),
            rule_order: 1,
            expr,
        };
        assert!(memo.offer(a, &physical, winner(5.0, 0)));
        assert!(!memo.offer(a, &physical, winner(7.0, 0)));
        assert!(memo.offer(a, &physical, winner(3.0, 0)));
        assert_eq!(memo.best_for(a, &physical).unwrap().cost, Cost::new(3.0));
        assert!(memo.best_for(a, &logical()).is_none());
        // a requirement naming only the model accepts any convention
        let any = TraitSet::from_traits([DataModel::Relational.into()]);
        assert!(memo.best_for(a, &any).is_some());
    }

    #[test]
    fn test_merge_keeps_cheaper_winner() {
        let mut memo = Memo::new();
        let a = values(&mut memo, 1);
        let b = values(&mut memo, 2);
        let physical = TraitSet::of(DataModel::Relational, Convention::Engine);
        memo.offer(a, &physical, Winner { cost: Cost::new(4.0), rule_order: 1, expr: 0 });
        memo.offer(b, &physical, Winner { cost: Cost::new(2.0), rule_order: 1, expr: 1 });
        memo.merge(a, b);
        assert_eq!(memo.best_for(a, &physical).unwrap().expr, 1);
        let improvements = memo.take_improvements();
        assert_eq!(improvements.len(), 1);
        assert_eq!(improvements[0].class, a);
    }
}

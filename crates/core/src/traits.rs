//! The trait model.
//!
//! Algebra nodes are tagged with a [`TraitSet`]: exactly one data model trait and one convention
//! trait. The data model says how values are shaped (flat rows, documents, graph elements); the
//! convention says which adapter family can execute the operator. Nodes produced by a language
//! frontend carry [`Convention::Abstract`], which no physical requirement accepts.

use crate::model::DataModel;
use core::fmt;
use serde::{Deserialize, Serialize};

/// The kinds of trait a [`TraitSet`] can hold, in canonical order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TraitKind {
    DataModel,
    Convention,
}

/// Execution engine family able to run an operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Convention {
    /// Not executable; used before implementation rules have run.
    Abstract,
    /// Row-oriented relational stores.
    RowStore,
    /// Document stores.
    DocStore,
    /// Graph stores.
    GraphStore,
    /// Key/value stores.
    KeyValueStore,
    /// Vector stores.
    VectorStore,
    /// The built-in in-memory engine. Runs every operator but holds no data, so rows reach it
    /// through transfers from the stores.
    Engine,
}

impl Convention {
    /// All concrete (executable) conventions.
    pub const PHYSICAL: [Convention; 6] = [
        Convention::RowStore,
        Convention::DocStore,
        Convention::GraphStore,
        Convention::KeyValueStore,
        Convention::VectorStore,
        Convention::Engine,
    ];

    /// Returns true for every convention except [`Convention::Abstract`].
    #[inline]
    pub fn is_physical(&self) -> bool {
        !matches!(self, Convention::Abstract)
    }
}

impl fmt::Display for Convention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A single trait value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Trait {
    DataModel(DataModel),
    Convention(Convention),
}

impl Trait {
    /// Returns the kind of this trait.
    pub fn kind(&self) -> TraitKind {
        match self {
            Trait::DataModel(_) => TraitKind::DataModel,
            Trait::Convention(_) => TraitKind::Convention,
        }
    }
}

impl From<DataModel> for Trait {
    fn from(model: DataModel) -> Self {
        Trait::DataModel(model)
    }
}

impl From<Convention> for Trait {
    fn from(convention: Convention) -> Self {
        Trait::Convention(convention)
    }
}

impl fmt::Display for Trait {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trait::DataModel(m) => write!(f, "{}", m),
            Trait::Convention(c) => write!(f, "{}", c),
        }
    }
}

/// An immutable, ordered collection holding at most one trait per [`TraitKind`].
///
/// A trait set is also used as a *requirement*: a requirement may omit trait kinds it does not
/// care about (see [`TraitSet::satisfies`]).
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TraitSet {
    traits: Vec<Trait>,
}

impl TraitSet {
    /// Creates an empty trait set (a requirement that accepts anything).
    pub fn empty() -> Self {
        Self { traits: Vec::new() }
    }

    /// Creates a trait set with both a data model and a convention.
    pub fn of(model: DataModel, convention: Convention) -> Self {
        Self {
            traits: vec![Trait::DataModel(model), Trait::Convention(convention)],
        }
    }

    /// Creates a trait set from arbitrary traits; later traits of the same kind win.
    pub fn from_traits(traits: impl IntoIterator<Item = Trait>) -> Self {
        traits
            .into_iter()
            .fold(Self::empty(), |set, t| set.replace(t))
    }

    /// Returns a new trait set with the trait of `t`'s kind swapped for `t`.
    ///
    /// The receiver is left untouched.
    pub fn replace(&self, t: Trait) -> Self {
        let mut traits: Vec<Trait> = self
            .traits
            .iter()
            .copied()
            .filter(|existing| existing.kind() != t.kind())
            .collect();
        traits.push(t);
        traits.sort_by_key(|t| t.kind());
        Self { traits }
    }

    /// Returns a new trait set without a trait of `kind`.
    pub fn without(&self, kind: TraitKind) -> Self {
        Self {
            traits: self
                .traits
                .iter()
                .copied()
                .filter(|t| t.kind() != kind)
                .collect(),
        }
    }

    /// Returns the trait of the given kind, if present.
    pub fn get(&self, kind: TraitKind) -> Option<Trait> {
        self.traits.iter().copied().find(|t| t.kind() == kind)
    }

    /// Returns the data model trait, if present.
    pub fn data_model(&self) -> Option<DataModel> {
        match self.get(TraitKind::DataModel) {
            Some(Trait::DataModel(m)) => Some(m),
            _ => None,
        }
    }

    /// Returns the convention trait, if present.
    pub fn convention(&self) -> Option<Convention> {
        match self.get(TraitKind::Convention) {
            Some(Trait::Convention(c)) => Some(c),
            _ => None,
        }
    }

    /// Returns true if the set carries a concrete convention.
    pub fn is_physical(&self) -> bool {
        self.convention().is_some_and(|c| c.is_physical())
    }

    /// Returns the traits in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = &Trait> {
        self.traits.iter()
    }

    /// Returns the number of traits.
    pub fn len(&self) -> usize {
        self.traits.len()
    }

    /// Returns true if the set holds no trait.
    pub fn is_empty(&self) -> bool {
        self.traits.is_empty()
    }

    /// Returns true iff every trait kind present in `required` is present and equal in `self`.
    ///
    /// An abstract convention never equals a concrete one, so abstract nodes never satisfy a
    /// physical requirement.
    pub fn satisfies(&self, required: &TraitSet) -> bool {
        satisfies(required, self)
    }
}

/// Returns true iff every trait kind present in `required` is present and equal in `actual`.
pub fn satisfies(required: &TraitSet, actual: &TraitSet) -> bool {
    required
        .traits
        .iter()
        .all(|r| actual.get(r.kind()) == Some(*r))
}

impl fmt::Display for TraitSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, t) in self.traits.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", t)?;
        }
        f.write_str("]")
    }
}

//! Operator kinds.
//!
//! Every operator is a variant of [`AlgKind`]. Model-specific operators (document unwind and
//! element match, graph pattern match) are kinds of their own so that rules can match them
//! directly. [`KindTag`] is the payload-free discriminant rules are indexed by.

use crate::ast::{AggregateFunc, Expr, SortOrder};
use core::fmt;
use polystore_core::ids::{AdapterId, AllocationId, ColumnId, LogicalEntityId};
use polystore_core::traits::{Convention, TraitSet};
use polystore_core::{DataModel, GraphElement, Row, Value};

/// Join types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
    /// Left rows with at least one match; output is the left row type.
    Semi,
    /// Left rows without a match; output is the left row type.
    Anti,
}

impl JoinType {
    /// Returns true if the output only carries the left input's fields.
    pub fn projects_left_only(&self) -> bool {
        matches!(self, JoinType::Semi | JoinType::Anti)
    }
}

/// Set operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SetOpKind {
    Union,
    Intersect,
    Except,
}

/// What a modification does to the target entity.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ModifyOp {
    Insert,
    /// Update of the given logical columns.
    Update { columns: Vec<ColumnId> },
    Delete,
}

impl ModifyOp {
    /// Returns the columns the operation writes; empty means the whole row.
    pub fn touched_columns(&self) -> &[ColumnId] {
        match self {
            ModifyOp::Update { columns } => columns,
            ModifyOp::Insert | ModifyOp::Delete => &[],
        }
    }
}

/// An aggregate function call over an input field.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AggregateCall {
    pub func: AggregateFunc,
    /// Input field; None for `COUNT(*)`.
    pub arg: Option<usize>,
    pub distinct: bool,
}

impl AggregateCall {
    /// Creates a non-distinct call.
    pub fn new(func: AggregateFunc, arg: Option<usize>) -> Self {
        Self {
            func,
            arg,
            distinct: false,
        }
    }

    /// Creates a `COUNT(*)` call.
    pub fn count_star() -> Self {
        Self::new(AggregateFunc::Count, None)
    }
}

impl fmt::Display for AggregateCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let distinct = if self.distinct { "DISTINCT " } else { "" };
        match self.arg {
            Some(arg) => write!(f, "{}({}${})", self.func.name(), distinct, arg),
            None => write!(f, "{}(*)", self.func.name()),
        }
    }
}

/// A sort key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SortKey {
    pub field: usize,
    pub order: SortOrder,
}

impl SortKey {
    pub fn asc(field: usize) -> Self {
        Self {
            field,
            order: SortOrder::Asc,
        }
    }

    pub fn desc(field: usize) -> Self {
        Self {
            field,
            order: SortOrder::Desc,
        }
    }
}

/// A single-node graph pattern: elements carrying every label and property listed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct GraphPattern {
    pub labels: Vec<String>,
    pub properties: Vec<(String, Value)>,
}

impl GraphPattern {
    /// Creates a pattern matching the given labels.
    pub fn labeled(labels: &[&str]) -> Self {
        Self {
            labels: labels.iter().map(|l| l.to_string()).collect(),
            properties: Vec::new(),
        }
    }

    /// Adds a property equality.
    pub fn with_property(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.push((key.to_string(), value.into()));
        self
    }

    /// Returns true if `element` satisfies the pattern.
    pub fn matches(&self, element: &GraphElement) -> bool {
        self.labels.iter().all(|l| element.labels.contains(l))
            && self
                .properties
                .iter()
                .all(|(k, v)| element.properties.get(k) == Some(v))
    }
}

/// Number of inputs an operator kind takes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(&self, n: usize) -> bool {
        match self {
            Arity::Exact(k) => n == *k,
            Arity::AtLeast(k) => n >= *k,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(k) => write!(f, "{}", k),
            Arity::AtLeast(k) => write!(f, "at least {}", k),
        }
    }
}

/// Payload-free discriminant of [`AlgKind`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KindTag {
    Scan,
    Values,
    Filter,
    Project,
    Join,
    Aggregate,
    SetOp,
    Sort,
    Modify,
    Unwind,
    ElemMatch,
    PatternMatch,
    ContextSwitch,
    PhysicalScan,
    PhysicalModify,
    ModifyFanOut,
    Transfer,
    Subset,
}

impl fmt::Display for KindTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Operator kind with its non-input attributes.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum AlgKind {
    /// Logical scan of an entity's columns.
    Scan {
        entity: LogicalEntityId,
        columns: Vec<ColumnId>,
    },
    /// Literal rows.
    Values { tuples: Vec<Row> },
    Filter { condition: Expr },
    Project { exprs: Vec<Expr> },
    Join { join_type: JoinType, condition: Expr },
    Aggregate {
        group_by: Vec<usize>,
        calls: Vec<AggregateCall>,
    },
    /// N-ary set operation; `all` keeps duplicates.
    SetOp { op: SetOpKind, all: bool },
    Sort {
        keys: Vec<SortKey>,
        offset: usize,
        fetch: Option<usize>,
    },
    /// Logical write of the input rows.
    Modify {
        entity: LogicalEntityId,
        op: ModifyOp,
    },
    /// Emits one row per element of an array field (document model).
    Unwind { field: usize },
    /// Keeps documents with at least one element of an array field matching `condition`, which
    /// reads the element as `$0`.
    ElemMatch { field: usize, condition: Expr },
    /// Keeps graph elements matching a pattern.
    PatternMatch { pattern: GraphPattern },
    /// Converts the representation of every row from one data model to another.
    ContextSwitch { from: DataModel, to: DataModel },
    /// Scan of one allocation.
    PhysicalScan {
        entity: LogicalEntityId,
        allocation: AllocationId,
        adapter: AdapterId,
        columns: Vec<ColumnId>,
        partitions: Vec<u32>,
        partition_count: u32,
        rank: u32,
    },
    /// Write into one allocation.
    PhysicalModify {
        entity: LogicalEntityId,
        allocation: AllocationId,
        adapter: AdapterId,
        op: ModifyOp,
    },
    /// Runs one write per input as a unit; input `i` executes in `conventions[i]`.
    ModifyFanOut { conventions: Vec<Convention> },
    /// Moves rows between adapter conventions.
    Transfer { from: Convention, to: Convention },
    /// Placeholder for an equivalence class of the planner's memo.
    Subset { class: usize },
}

impl AlgKind {
    /// Returns the discriminant.
    pub fn tag(&self) -> KindTag {
        match self {
            AlgKind::Scan { .. } => KindTag::Scan,
            AlgKind::Values { .. } => KindTag::Values,
            AlgKind::Filter { .. } => KindTag::Filter,
            AlgKind::Project { .. } => KindTag::Project,
            AlgKind::Join { .. } => KindTag::Join,
            AlgKind::Aggregate { .. } => KindTag::Aggregate,
            AlgKind::SetOp { .. } => KindTag::SetOp,
            AlgKind::Sort { .. } => KindTag::Sort,
            AlgKind::Modify { .. } => KindTag::Modify,
            AlgKind::Unwind { .. } => KindTag::Unwind,
            AlgKind::ElemMatch { .. } => KindTag::ElemMatch,
            AlgKind::PatternMatch { .. } => KindTag::PatternMatch,
            AlgKind::ContextSwitch { .. } => KindTag::ContextSwitch,
            AlgKind::PhysicalScan { .. } => KindTag::PhysicalScan,
            AlgKind::PhysicalModify { .. } => KindTag::PhysicalModify,
            AlgKind::ModifyFanOut { .. } => KindTag::ModifyFanOut,
            AlgKind::Transfer { .. } => KindTag::Transfer,
            AlgKind::Subset { .. } => KindTag::Subset,
        }
    }

    /// Returns the required number of inputs.
    pub fn arity(&self) -> Arity {
        match self {
            AlgKind::Scan { .. }
            | AlgKind::Values { .. }
            | AlgKind::PhysicalScan { .. }
            | AlgKind::Subset { .. } => Arity::Exact(0),
            AlgKind::Join { .. } => Arity::Exact(2),
            AlgKind::SetOp { .. } => Arity::AtLeast(2),
            AlgKind::ModifyFanOut { .. } => Arity::AtLeast(1),
            _ => Arity::Exact(1),
        }
    }

    /// Returns true for kinds that only exist in physical plans.
    pub fn is_physical_only(&self) -> bool {
        matches!(
            self,
            AlgKind::PhysicalScan { .. } | AlgKind::PhysicalModify { .. } | AlgKind::Transfer { .. }
        )
    }

    /// Returns the data model input `index` must be delivered in, given the operator's own model.
    pub fn input_model(&self, own: DataModel) -> DataModel {
        match self {
            AlgKind::ContextSwitch { from, .. } => *from,
            AlgKind::Unwind { .. } | AlgKind::ElemMatch { .. } => DataModel::Document,
            AlgKind::PatternMatch { .. } => DataModel::Graph,
            _ => own,
        }
    }

    /// Returns the traits input `index` must satisfy for an operator carrying `own`.
    ///
    /// Inputs run in the operator's convention except below a transfer or a write fan-out.
    pub fn input_requirement(&self, index: usize, own: &TraitSet) -> TraitSet {
        let own_model = own.data_model().unwrap_or(DataModel::Relational);
        let own_convention = own.convention().unwrap_or(Convention::Abstract);
        let convention = match self {
            AlgKind::Transfer { from, .. } => *from,
            AlgKind::ModifyFanOut { conventions } => {
                conventions.get(index).copied().unwrap_or(own_convention)
            }
            _ => own_convention,
        };
        TraitSet::of(self.input_model(own_model), convention)
    }
}

impl fmt::Display for AlgKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn list<T: fmt::Display>(items: &[T]) -> String {
            items
                .iter()
                .map(|i| i.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        }
        match self {
            AlgKind::Scan { entity, columns } => write!(f, "Scan({}, [{}])", entity, list(columns)),
            AlgKind::Values { tuples } => write!(f, "Values({} rows)", tuples.len()),
            AlgKind::Filter { condition } => write!(f, "Filter({})", condition),
            AlgKind::Project { exprs } => write!(f, "Project({})", list(exprs)),
            AlgKind::Join {
                join_type,
                condition,
            } => write!(f, "Join({:?}, {})", join_type, condition),
            AlgKind::Aggregate { group_by, calls } => {
                let keys: Vec<String> = group_by.iter().map(|g| format!("${}", g)).collect();
                write!(f, "Aggregate([{}], [{}])", keys.join(", "), list(calls))
            }
            AlgKind::SetOp { op, all } => {
                write!(f, "{:?}{}", op, if *all { "All" } else { "" })
            }
            AlgKind::Sort {
                keys,
                offset,
                fetch,
            } => {
                let keys: Vec<String> = keys
                    .iter()
                    .map(|k| format!("${} {:?}", k.field, k.order))
                    .collect();
                write!(f, "Sort([{}]", keys.join(", "))?;
                if *offset > 0 {
                    write!(f, ", offset={}", offset)?;
                }
                if let Some(fetch) = fetch {
                    write!(f, ", fetch={}", fetch)?;
                }
                f.write_str(")")
            }
            AlgKind::Modify { entity, op } => write!(f, "Modify({}, {:?})", entity, op),
            AlgKind::Unwind { field } => write!(f, "Unwind(${})", field),
            AlgKind::ElemMatch { field, condition } => {
                write!(f, "ElemMatch(${}, {})", field, condition)
            }
            AlgKind::PatternMatch { pattern } => {
                write!(f, "PatternMatch(:{})", pattern.labels.join(":"))
            }
            AlgKind::ContextSwitch { from, to } => write!(f, "ContextSwitch({} -> {})", from, to),
            AlgKind::PhysicalScan {
                allocation,
                adapter,
                columns,
                partitions,
                partition_count,
                ..
            } => {
                write!(f, "PhysicalScan({}@{}, [{}]", allocation, adapter, list(columns))?;
                if *partition_count > 1 && partitions.len() < *partition_count as usize {
                    write!(f, ", partitions=[{}]", list(partitions))?;
                }
                f.write_str(")")
            }
            AlgKind::PhysicalModify {
                allocation,
                adapter,
                op,
                ..
            } => write!(f, "PhysicalModify({}@{}, {:?})", allocation, adapter, op),
            AlgKind::ModifyFanOut { conventions } => {
                write!(f, "ModifyFanOut({})", conventions.len())
            }
            AlgKind::Transfer { from, to } => write!(f, "Transfer({} -> {})", from, to),
            AlgKind::Subset { class } => write!(f, "Subset(#{})", class),
        }
    }
}

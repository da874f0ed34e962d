//! Algebra nodes.
//!
//! An [`AlgNode`] owns its inputs, so a finished tree never shares subexpressions. Nodes are
//! immutable: every rewrite builds a new node. The builder functions derive the output row type
//! from the inputs and tag the result with the input's data model and
//! [`Convention::Abstract`], the way a language frontend hands a tree to the planner.

use super::kind::{AggregateCall, AlgKind, GraphPattern, JoinType, ModifyOp, SetOpKind, SortKey};
use super::row_type::{Field, RowType};
use crate::ast::{AggregateFunc, Expr};
use polystore_catalog::LogicalEntity;
use polystore_core::ids::ColumnId;
use polystore_core::traits::{Convention, TraitSet};
use polystore_core::{DataModel, DataType, Error, Result, Row};

/// An operator with its inputs, output row type and traits.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AlgNode {
    kind: AlgKind,
    inputs: Vec<AlgNode>,
    row_type: RowType,
    traits: TraitSet,
}

impl AlgNode {
    /// Creates a node after checking the input count and the declared row type.
    pub fn create(
        kind: AlgKind,
        inputs: Vec<AlgNode>,
        row_type: RowType,
        traits: TraitSet,
    ) -> Result<AlgNode> {
        let arity = kind.arity();
        if !arity.accepts(inputs.len()) {
            return Err(Error::arity_mismatch(
                kind.tag().to_string(),
                arity.to_string(),
                inputs.len(),
            ));
        }
        if traits.data_model().is_none() || traits.convention().is_none() {
            return Err(Error::type_mismatch(
                kind.tag().to_string(),
                format!("trait set {} needs a data model and a convention", traits),
            ));
        }
        check_row_type(&kind, &inputs, &row_type)?;
        Ok(AlgNode {
            kind,
            inputs,
            row_type,
            traits,
        })
    }

    /// Builds a node whose consistency the caller already guarantees (plan extraction).
    pub(crate) fn assemble(
        kind: AlgKind,
        inputs: Vec<AlgNode>,
        row_type: RowType,
        traits: TraitSet,
    ) -> AlgNode {
        AlgNode {
            kind,
            inputs,
            row_type,
            traits,
        }
    }

    /// Placeholder standing for an equivalence class of the planner's memo.
    pub(crate) fn subset(class: usize, row_type: RowType, model: DataModel) -> AlgNode {
        AlgNode {
            kind: AlgKind::Subset { class },
            inputs: Vec::new(),
            row_type,
            traits: TraitSet::of(model, Convention::Abstract),
        }
    }

    #[inline]
    pub fn kind(&self) -> &AlgKind {
        &self.kind
    }

    #[inline]
    pub fn inputs(&self) -> &[AlgNode] {
        &self.inputs
    }

    #[inline]
    pub fn input(&self, index: usize) -> Option<&AlgNode> {
        self.inputs.get(index)
    }

    #[inline]
    pub fn row_type(&self) -> &RowType {
        &self.row_type
    }

    #[inline]
    pub fn traits(&self) -> &TraitSet {
        &self.traits
    }

    /// Returns the data model trait.
    pub fn data_model(&self) -> DataModel {
        self.traits.data_model().unwrap_or(DataModel::Relational)
    }

    /// Returns the convention trait.
    pub fn convention(&self) -> Convention {
        self.traits.convention().unwrap_or(Convention::Abstract)
    }

    /// Returns true if this node and every node below carries a concrete convention.
    pub fn is_physical(&self) -> bool {
        self.traits.is_physical() && self.inputs.iter().all(AlgNode::is_physical)
    }

    /// Returns a copy carrying `traits`.
    pub fn with_traits(&self, traits: TraitSet) -> AlgNode {
        AlgNode {
            traits,
            ..self.clone()
        }
    }

    /// Returns a copy with the given convention.
    pub fn with_convention(&self, convention: Convention) -> AlgNode {
        self.with_traits(self.traits.replace(convention.into()))
    }

    /// Returns a copy over new inputs, re-validated.
    pub fn with_inputs(&self, inputs: Vec<AlgNode>) -> Result<AlgNode> {
        AlgNode::create(
            self.kind.clone(),
            inputs,
            self.row_type.clone(),
            self.traits.clone(),
        )
    }

    fn logical(kind: AlgKind, inputs: Vec<AlgNode>, row_type: RowType, model: DataModel) -> Result<AlgNode> {
        AlgNode::create(kind, inputs, row_type, TraitSet::of(model, Convention::Abstract))
    }

    /// Scans the named columns of `entity`; an empty list scans every column.
    ///
    /// Graph entities produce one node-typed field whatever columns are requested.
    pub fn scan(entity: &LogicalEntity, columns: &[&str]) -> Result<AlgNode> {
        let picked = if columns.is_empty() {
            entity.schema.columns().to_vec()
        } else {
            columns
                .iter()
                .map(|name| {
                    entity
                        .column(name)
                        .cloned()
                        .ok_or_else(|| Error::column_not_found(entity.qualified_name(), *name))
                })
                .collect::<Result<Vec<_>>>()?
        };
        let row_type = match entity.model {
            DataModel::Graph => RowType::new(vec![Field::new(entity.name.clone(), DataType::Node)]),
            _ => RowType::new(
                picked
                    .iter()
                    .map(|c| Field::new(c.name(), c.data_type()).nullable(c.is_nullable()))
                    .collect(),
            ),
        };
        let ids: Vec<ColumnId> = picked.iter().map(|c| c.id()).collect();
        AlgNode::logical(
            AlgKind::Scan {
                entity: entity.id,
                columns: ids,
            },
            Vec::new(),
            row_type,
            entity.model,
        )
    }

    /// Literal rows of the given row type.
    pub fn values(row_type: RowType, tuples: Vec<Row>, model: DataModel) -> Result<AlgNode> {
        AlgNode::logical(AlgKind::Values { tuples }, Vec::new(), row_type, model)
    }

    pub fn filter(input: AlgNode, condition: Expr) -> Result<AlgNode> {
        let row_type = input.row_type.clone();
        let model = input.data_model();
        AlgNode::logical(AlgKind::Filter { condition }, vec![input], row_type, model)
    }

    /// Projects named expressions.
    pub fn project(input: AlgNode, exprs: Vec<(Expr, &str)>) -> Result<AlgNode> {
        let fields = exprs
            .iter()
            .map(|(e, name)| Field::new(*name, e.data_type(&input.row_type)).nullable(true))
            .collect();
        let model = input.data_model();
        AlgNode::logical(
            AlgKind::Project {
                exprs: exprs.into_iter().map(|(e, _)| e).collect(),
            },
            vec![input],
            RowType::new(fields),
            model,
        )
    }

    /// Projects input fields by position, keeping their names.
    pub fn project_fields(input: AlgNode, fields: &[usize]) -> Result<AlgNode> {
        let row_type = input.row_type.project(fields).ok_or_else(|| {
            Error::type_mismatch("Project", format!("field out of range in {:?}", fields))
        })?;
        let model = input.data_model();
        AlgNode::logical(
            AlgKind::Project {
                exprs: fields.iter().map(|&i| Expr::Field(i)).collect(),
            },
            vec![input],
            row_type,
            model,
        )
    }

    pub fn join(left: AlgNode, right: AlgNode, join_type: JoinType, condition: Expr) -> Result<AlgNode> {
        let row_type = join_row_type(join_type, &left.row_type, &right.row_type);
        let model = left.data_model();
        AlgNode::logical(
            AlgKind::Join {
                join_type,
                condition,
            },
            vec![left, right],
            row_type,
            model,
        )
    }

    pub fn aggregate(input: AlgNode, group_by: Vec<usize>, calls: Vec<AggregateCall>) -> Result<AlgNode> {
        let row_type = aggregate_row_type(&input.row_type, &group_by, &calls)?;
        let model = input.data_model();
        AlgNode::logical(AlgKind::Aggregate { group_by, calls }, vec![input], row_type, model)
    }

    pub fn set_op(inputs: Vec<AlgNode>, op: SetOpKind, all: bool) -> Result<AlgNode> {
        let first = inputs
            .first()
            .ok_or_else(|| Error::arity_mismatch("SetOp", "at least 2", 0))?;
        let row_type = first.row_type.clone();
        let model = first.data_model();
        AlgNode::logical(AlgKind::SetOp { op, all }, inputs, row_type, model)
    }

    pub fn union_all(inputs: Vec<AlgNode>) -> Result<AlgNode> {
        AlgNode::set_op(inputs, SetOpKind::Union, true)
    }

    pub fn sort(input: AlgNode, keys: Vec<SortKey>, offset: usize, fetch: Option<usize>) -> Result<AlgNode> {
        let row_type = input.row_type.clone();
        let model = input.data_model();
        AlgNode::logical(
            AlgKind::Sort {
                keys,
                offset,
                fetch,
            },
            vec![input],
            row_type,
            model,
        )
    }

    /// Unwinds an array field. The result is document-shaped whatever the input model is; a
    /// relational input is bridged by the planner.
    pub fn unwind(input: AlgNode, field: usize) -> Result<AlgNode> {
        let row_type = input.row_type.with_field_type(field, DataType::Any);
        AlgNode::logical(AlgKind::Unwind { field }, vec![input], row_type, DataModel::Document)
    }

    pub fn elem_match(input: AlgNode, field: usize, condition: Expr) -> Result<AlgNode> {
        let row_type = input.row_type.clone();
        AlgNode::logical(
            AlgKind::ElemMatch { field, condition },
            vec![input],
            row_type,
            DataModel::Document,
        )
    }

    pub fn pattern_match(input: AlgNode, pattern: GraphPattern) -> Result<AlgNode> {
        let row_type = input.row_type.clone();
        AlgNode::logical(
            AlgKind::PatternMatch { pattern },
            vec![input],
            row_type,
            DataModel::Graph,
        )
    }

    /// Converts the input's rows to the `to` data model.
    pub fn context_switch(input: AlgNode, to: DataModel) -> Result<AlgNode> {
        let from = input.data_model();
        let row_type = switch_row_type(&input.row_type, from, to);
        let convention = input.convention();
        AlgNode::create(
            AlgKind::ContextSwitch { from, to },
            vec![input],
            row_type,
            TraitSet::of(to, convention),
        )
    }

    /// Writes the input rows into `entity`.
    pub fn modify(input: AlgNode, entity: &LogicalEntity, op: ModifyOp) -> Result<AlgNode> {
        AlgNode::logical(
            AlgKind::Modify {
                entity: entity.id,
                op,
            },
            vec![input],
            modify_row_type(),
            entity.model,
        )
    }
}

/// Output of every write operator: the number of rows affected.
pub fn modify_row_type() -> RowType {
    RowType::new(vec![Field::new("rowcount", DataType::Int64).nullable(false)])
}

fn join_row_type(join_type: JoinType, left: &RowType, right: &RowType) -> RowType {
    match join_type {
        JoinType::Inner => left.concat(right),
        JoinType::Left => left.concat(&right.to_nullable()),
        JoinType::Right => left.to_nullable().concat(right),
        JoinType::Full => left.to_nullable().concat(&right.to_nullable()),
        JoinType::Semi | JoinType::Anti => left.clone(),
    }
}

fn aggregate_row_type(input: &RowType, group_by: &[usize], calls: &[AggregateCall]) -> Result<RowType> {
    let mut fields = input.project(group_by).map(|rt| rt.fields().to_vec()).ok_or_else(|| {
        Error::type_mismatch("Aggregate", format!("group key out of range in {:?}", group_by))
    })?;
    for call in calls {
        let arg_type = match call.arg {
            Some(arg) => input
                .field(arg)
                .map(|f| f.data_type)
                .ok_or_else(|| Error::type_mismatch("Aggregate", format!("argument ${} out of range", arg)))?,
            None => DataType::Int64,
        };
        let data_type = match call.func {
            AggregateFunc::Count => DataType::Int64,
            AggregateFunc::Avg => DataType::Float64,
            AggregateFunc::Sum if arg_type == DataType::Int64 => DataType::Int64,
            AggregateFunc::Sum => DataType::Float64,
            AggregateFunc::Min | AggregateFunc::Max => arg_type,
        };
        fields.push(Field::new(call.to_string(), data_type).nullable(call.func != AggregateFunc::Count));
    }
    Ok(RowType::new(fields))
}

/// Row type after converting rows of `input` from one data model to another.
///
/// Nested values become JSON text in relational rows, graph elements become documents, and a
/// graph is built with one node per row.
pub fn switch_row_type(input: &RowType, from: DataModel, to: DataModel) -> RowType {
    if from == to {
        return input.clone();
    }
    match to {
        DataModel::Graph => RowType::new(vec![Field::new("node", DataType::Node).nullable(false)]),
        DataModel::Relational => RowType::new(
            input
                .fields()
                .iter()
                .map(|f| match f.data_type {
                    DataType::Array | DataType::Document | DataType::Node | DataType::Edge => {
                        Field::new(f.name.clone(), DataType::String).nullable(f.nullable)
                    }
                    _ => f.clone(),
                })
                .collect(),
        ),
        DataModel::Document => RowType::new(
            input
                .fields()
                .iter()
                .map(|f| match f.data_type {
                    DataType::Node | DataType::Edge => {
                        Field::new(f.name.clone(), DataType::Document).nullable(f.nullable)
                    }
                    _ => f.clone(),
                })
                .collect(),
        ),
    }
}

fn mismatch(kind: &AlgKind, message: impl Into<String>) -> Error {
    Error::type_mismatch(kind.tag().to_string(), message)
}

fn check_fields(kind: &AlgKind, expr: &Expr, width: usize) -> Result<()> {
    match expr.fields().into_iter().find(|&i| i >= width) {
        Some(i) => Err(mismatch(kind, format!("{} reads ${} of a {}-field input", expr, i, width))),
        None => Ok(()),
    }
}

fn expect_compatible(kind: &AlgKind, declared: &RowType, expected: &RowType) -> Result<()> {
    if declared.compatible_with(expected) {
        Ok(())
    } else {
        Err(mismatch(kind, format!("declared {} but inputs give {}", declared, expected)))
    }
}

fn check_row_type(kind: &AlgKind, inputs: &[AlgNode], row_type: &RowType) -> Result<()> {
    let first = inputs.first().map(|i| &i.row_type);
    match (kind, first) {
        (AlgKind::Filter { condition }, Some(input)) => {
            check_fields(kind, condition, input.len())?;
            expect_compatible(kind, row_type, input)
        }
        (AlgKind::Sort { keys, .. }, Some(input)) => {
            if let Some(key) = keys.iter().find(|k| k.field >= input.len()) {
                return Err(mismatch(kind, format!("sort key ${} out of range", key.field)));
            }
            expect_compatible(kind, row_type, input)
        }
        (AlgKind::Transfer { .. }, Some(input)) | (AlgKind::PatternMatch { .. }, Some(input)) => {
            expect_compatible(kind, row_type, input)
        }
        (AlgKind::ElemMatch { field, condition }, Some(input)) => {
            if *field >= input.len() {
                return Err(mismatch(kind, format!("field ${} out of range", field)));
            }
            check_fields(kind, condition, 1)?;
            expect_compatible(kind, row_type, input)
        }
        (AlgKind::Unwind { field }, Some(input)) => {
            let unwound = input
                .field(*field)
                .ok_or_else(|| mismatch(kind, format!("field ${} out of range", field)))?;
            if !DataType::Array.accepts(unwound.data_type) {
                return Err(mismatch(kind, format!("field {} is not an array", unwound.name)));
            }
            expect_compatible(kind, row_type, &input.with_field_type(*field, DataType::Any))
        }
        (AlgKind::Project { exprs }, Some(input)) => {
            if exprs.len() != row_type.len() {
                return Err(mismatch(
                    kind,
                    format!("{} expressions for {} fields", exprs.len(), row_type.len()),
                ));
            }
            for (expr, field) in exprs.iter().zip(row_type.fields()) {
                check_fields(kind, expr, input.len())?;
                if !field.data_type.accepts(expr.data_type(input)) {
                    return Err(mismatch(kind, format!("field {} cannot hold {}", field.name, expr)));
                }
            }
            Ok(())
        }
        (AlgKind::Join { join_type, condition }, Some(left)) => {
            let right = &inputs[1].row_type;
            check_fields(kind, condition, left.len() + right.len())?;
            expect_compatible(kind, row_type, &join_row_type(*join_type, left, right))
        }
        (AlgKind::Aggregate { group_by, calls }, Some(input)) => {
            expect_compatible(kind, row_type, &aggregate_row_type(input, group_by, calls)?)
        }
        (AlgKind::SetOp { .. }, _) => {
            for input in inputs {
                expect_compatible(kind, row_type, &input.row_type)?;
            }
            Ok(())
        }
        (AlgKind::ContextSwitch { from, to }, Some(input)) => {
            if inputs[0].data_model() != *from {
                return Err(mismatch(
                    kind,
                    format!("input is {}, not {}", inputs[0].data_model(), from),
                ));
            }
            expect_compatible(kind, row_type, &switch_row_type(input, *from, *to))
        }
        (AlgKind::Values { tuples }, _) => match tuples.iter().find(|t| t.len() != row_type.len()) {
            Some(t) => Err(mismatch(
                kind,
                format!("tuple of {} values for {} fields", t.len(), row_type.len()),
            )),
            None => Ok(()),
        },
        (AlgKind::Modify { .. }, _)
        | (AlgKind::PhysicalModify { .. }, _)
        | (AlgKind::ModifyFanOut { .. }, _) => expect_compatible(kind, row_type, &modify_row_type()),
        _ => Ok(()),
    }
}

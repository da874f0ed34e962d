//! Reference interpreter.
//!
//! Evaluates logical and physical trees over in-memory rows, one row set per logical entity.
//! Rows are stored with every schema column in declaration order; scans pick their columns from
//! them. A physical scan of a partial allocation returns the rows of its partitions, where row `i`
//! of an entity belongs to partition `i % partition_count`.
//!
//! The interpreter exists to check rewrites: a rule is sound if a tree and its rewrite produce
//! the same row multiset. Writes and graph traversals beyond single-element patterns are not
//! evaluated.

use crate::algebra::{AggregateCall, AlgKind, AlgNode, JoinType, RowType, SetOpKind, SortKey};
use crate::ast::{AggregateFunc, BinaryOp, Expr, SortOrder, UnaryOp};
use hashbrown::HashMap;
use log::trace;
use polystore_catalog::Catalog;
use polystore_core::ids::{ColumnId, LogicalEntityId};
use polystore_core::{DataModel, Error, GraphElement, Result, Row, Value};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Evaluates algebra trees against in-memory rows.
pub struct Interpreter<'a> {
    catalog: &'a Catalog,
    tables: HashMap<LogicalEntityId, Vec<Row>>,
}

impl<'a> Interpreter<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self {
            catalog,
            tables: HashMap::new(),
        }
    }

    /// Sets the rows of an entity.
    pub fn with_rows(mut self, entity: LogicalEntityId, rows: Vec<Row>) -> Self {
        self.tables.insert(entity, rows);
        self
    }

    /// Evaluates `node` and returns its rows.
    ///
    /// Fails with [`Error::InvalidOperation`] on writes and memo placeholders.
    pub fn evaluate(&self, node: &AlgNode) -> Result<Vec<Row>> {
        let inputs = node
            .inputs()
            .iter()
            .map(|input| self.evaluate(input))
            .collect::<Result<Vec<_>>>()?;
        trace!("evaluating {}", node.kind());
        let mut inputs = inputs.into_iter();
        let mut next = move || inputs.next().unwrap_or_default();

        Ok(match node.kind() {
            AlgKind::Scan { entity, columns } => self.scan(*entity, columns, None)?,
            AlgKind::PhysicalScan {
                entity,
                columns,
                partitions,
                partition_count,
                ..
            } => self.scan(*entity, columns, Some((partitions.as_slice(), *partition_count)))?,
            AlgKind::Values { tuples } => tuples.clone(),
            AlgKind::Filter { condition } => next()
                .into_iter()
                .filter(|row| is_true(condition, row))
                .collect(),
            AlgKind::Project { exprs } => next()
                .iter()
                .map(|row| Row::new(exprs.iter().map(|e| eval(e, row)).collect()))
                .collect(),
            AlgKind::Join {
                join_type,
                condition,
            } => {
                let (left, right) = (next(), next());
                let widths = match node.inputs() {
                    [l, r] => (l.row_type().len(), r.row_type().len()),
                    _ => return Err(Error::invalid_operation("join needs two inputs")),
                };
                join(*join_type, condition, left, right, widths)
            }
            AlgKind::Aggregate { group_by, calls } => aggregate(next(), group_by, calls),
            AlgKind::SetOp { op, all } => {
                let mut result = next();
                for _ in 1..node.inputs().len() {
                    result = set_op(*op, *all, result, next());
                }
                if !*all {
                    result = distinct(result);
                }
                result
            }
            AlgKind::Sort {
                keys,
                offset,
                fetch,
            } => sort(next(), keys, *offset, *fetch),
            AlgKind::Unwind { field } => unwind(next(), *field),
            AlgKind::ElemMatch { field, condition } => next()
                .into_iter()
                .filter(|row| elem_match(row, *field, condition))
                .collect(),
            AlgKind::PatternMatch { pattern } => next()
                .into_iter()
                .filter(|row| {
                    row.values().iter().any(|v| match v {
                        Value::Node(element) | Value::Edge(element) => pattern.matches(element),
                        _ => false,
                    })
                })
                .collect(),
            AlgKind::ContextSwitch { from, to } => {
                let input_type = node
                    .input(0)
                    .map(|i| i.row_type().clone())
                    .unwrap_or_else(|| RowType::new(Vec::new()));
                switch(next(), &input_type, *from, *to)
            }
            AlgKind::Transfer { .. } => next(),
            AlgKind::Modify { .. } | AlgKind::PhysicalModify { .. } | AlgKind::ModifyFanOut { .. } => {
                return Err(Error::invalid_operation("writes are not evaluated"));
            }
            AlgKind::Subset { class } => {
                return Err(Error::invalid_operation(format!(
                    "cannot evaluate placeholder for class {}",
                    class
                )));
            }
        })
    }

    fn scan(
        &self,
        entity: LogicalEntityId,
        columns: &[ColumnId],
        partitions: Option<(&[u32], u32)>,
    ) -> Result<Vec<Row>> {
        let logical = self.catalog.logical_entity(entity)?;
        let rows = self.tables.get(&entity).map(Vec::as_slice).unwrap_or_default();
        let positions: Vec<usize> = columns
            .iter()
            .map(|id| {
                logical
                    .schema
                    .columns()
                    .iter()
                    .position(|c| c.id() == *id)
                    .ok_or_else(|| Error::column_not_found(logical.qualified_name(), logical.column_name(*id)))
            })
            .collect::<Result<_>>()?;
        let held = |i: usize| match partitions {
            Some((held, count)) => held.contains(&((i as u64 % u64::from(count.max(1))) as u32)),
            None => true,
        };
        Ok(rows
            .iter()
            .enumerate()
            .filter(|(i, _)| held(*i))
            .map(|(_, row)| match logical.model {
                DataModel::Graph => row.clone(),
                _ => Row::new(
                    positions
                        .iter()
                        .map(|p| row.get(*p).cloned().unwrap_or(Value::Null))
                        .collect(),
                ),
            })
            .collect())
    }
}

fn is_true(condition: &Expr, row: &Row) -> bool {
    matches!(eval(condition, row), Value::Boolean(true))
}

/// Evaluates a scalar expression over one row.
pub(crate) fn eval(expr: &Expr, row: &Row) -> Value {
    match expr {
        Expr::Field(i) => row.get(*i).cloned().unwrap_or(Value::Null),
        Expr::Literal(value) => value.clone(),
        Expr::Binary { left, op, right } => binary(*op, &eval(left, row), &eval(right, row)),
        Expr::Unary { op, expr } => unary(*op, &eval(expr, row)),
        Expr::Function { name, args } => {
            let args: Vec<Value> = args.iter().map(|a| eval(a, row)).collect();
            function(name, &args)
        }
        Expr::Path { expr, path } => path.iter().fold(eval(expr, row), |value, key| match value {
            Value::Document(mut fields) => fields.remove(key).unwrap_or(Value::Null),
            Value::Node(mut element) | Value::Edge(mut element) => {
                element.properties.remove(key).unwrap_or(Value::Null)
            }
            _ => Value::Null,
        }),
        Expr::Between { expr, low, high } => {
            let (value, low, high) = (eval(expr, row), eval(low, row), eval(high, row));
            if value.is_null() || low.is_null() || high.is_null() {
                Value::Null
            } else {
                Value::Boolean(value >= low && value <= high)
            }
        }
        Expr::In { expr, list } => {
            let value = eval(expr, row);
            if value.is_null() {
                return Value::Null;
            }
            Value::Boolean(list.iter().any(|item| eval(item, row) == value))
        }
        Expr::Like { expr, pattern } => match eval(expr, row) {
            Value::String(s) => {
                let value: Vec<char> = s.chars().collect();
                let pattern: Vec<char> = pattern.chars().collect();
                Value::Boolean(like(&value, &pattern))
            }
            Value::Null => Value::Null,
            _ => Value::Boolean(false),
        },
    }
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Value {
    // three-valued logic
    if left.is_null() || right.is_null() {
        return match (op, left, right) {
            (BinaryOp::And, Value::Boolean(false), _) | (BinaryOp::And, _, Value::Boolean(false)) => {
                Value::Boolean(false)
            }
            (BinaryOp::Or, Value::Boolean(true), _) | (BinaryOp::Or, _, Value::Boolean(true)) => {
                Value::Boolean(true)
            }
            _ => Value::Null,
        };
    }
    match op {
        BinaryOp::Eq => Value::Boolean(left == right),
        BinaryOp::Ne => Value::Boolean(left != right),
        BinaryOp::Lt => Value::Boolean(left < right),
        BinaryOp::Le => Value::Boolean(left <= right),
        BinaryOp::Gt => Value::Boolean(left > right),
        BinaryOp::Ge => Value::Boolean(left >= right),
        BinaryOp::And => Value::Boolean(left.as_bool() == Some(true) && right.as_bool() == Some(true)),
        BinaryOp::Or => Value::Boolean(left.as_bool() == Some(true) || right.as_bool() == Some(true)),
        BinaryOp::Add => arithmetic(left, right, i64::checked_add, |a, b| a + b),
        BinaryOp::Sub => arithmetic(left, right, i64::checked_sub, |a, b| a - b),
        BinaryOp::Mul => arithmetic(left, right, i64::checked_mul, |a, b| a * b),
        BinaryOp::Div => match right.as_f64() {
            Some(d) if d == 0.0 => Value::Null,
            _ => arithmetic(left, right, i64::checked_div, |a, b| a / b),
        },
        BinaryOp::Mod => match (left, right) {
            (Value::Int64(a), Value::Int64(b)) if *b != 0 => Value::Int64(a % b),
            _ => Value::Null,
        },
    }
}

/// Integer arithmetic stays integral unless it overflows.
fn arithmetic(
    left: &Value,
    right: &Value,
    int: fn(i64, i64) -> Option<i64>,
    float: fn(f64, f64) -> f64,
) -> Value {
    if let (Value::Int64(a), Value::Int64(b)) = (left, right) {
        if let Some(v) = int(*a, *b) {
            return Value::Int64(v);
        }
    }
    match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) => Value::Float64(float(a, b)),
        _ => Value::Null,
    }
}

fn unary(op: UnaryOp, value: &Value) -> Value {
    match op {
        UnaryOp::Not => match value {
            Value::Boolean(b) => Value::Boolean(!b),
            _ => Value::Null,
        },
        UnaryOp::Neg => match value {
            Value::Int64(i) => i.checked_neg().map_or(Value::Null, Value::Int64),
            Value::Float64(f) => Value::Float64(-f),
            _ => Value::Null,
        },
        UnaryOp::IsNull => Value::Boolean(value.is_null()),
        UnaryOp::IsNotNull => Value::Boolean(!value.is_null()),
    }
}

fn function(name: &str, args: &[Value]) -> Value {
    let first = args.first().cloned().unwrap_or(Value::Null);
    match name.to_uppercase().as_str() {
        "ABS" => match first {
            Value::Int64(i) => i.checked_abs().map_or(Value::Null, Value::Int64),
            Value::Float64(f) => Value::Float64(f.abs()),
            _ => Value::Null,
        },
        "UPPER" => first.as_str().map_or(Value::Null, |s| Value::String(s.to_uppercase())),
        "LOWER" => first.as_str().map_or(Value::Null, |s| Value::String(s.to_lowercase())),
        "LENGTH" => match &first {
            Value::String(s) => Value::Int64(s.chars().count() as i64),
            Value::Array(items) => Value::Int64(items.len() as i64),
            _ => Value::Null,
        },
        "COALESCE" => args.iter().find(|v| !v.is_null()).cloned().unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn like(value: &[char], pattern: &[char]) -> bool {
    match pattern.split_first() {
        None => value.is_empty(),
        Some(('%', rest)) => (0..=value.len()).any(|i| like(&value[i..], rest)),
        Some(('_', rest)) => !value.is_empty() && like(&value[1..], rest),
        Some((c, rest)) => value.first() == Some(c) && like(&value[1..], rest),
    }
}

fn join(
    join_type: JoinType,
    condition: &Expr,
    left: Vec<Row>,
    right: Vec<Row>,
    (left_width, right_width): (usize, usize),
) -> Vec<Row> {
    let mut out = Vec::new();
    let mut right_matched = vec![false; right.len()];
    for l in &left {
        let mut matched = false;
        for (j, r) in right.iter().enumerate() {
            let joined = l.concat(r);
            if !is_true(condition, &joined) {
                continue;
            }
            matched = true;
            right_matched[j] = true;
            match join_type {
                JoinType::Semi | JoinType::Anti => break,
                _ => out.push(joined),
            }
        }
        match join_type {
            JoinType::Semi if matched => out.push(l.clone()),
            JoinType::Anti if !matched => out.push(l.clone()),
            JoinType::Left | JoinType::Full if !matched => out.push(l.concat(&Row::nulls(right_width))),
            _ => {}
        }
    }
    if matches!(join_type, JoinType::Right | JoinType::Full) {
        for (r, matched) in right.iter().zip(right_matched) {
            if !matched {
                out.push(Row::nulls(left_width).concat(r));
            }
        }
    }
    out
}

fn aggregate(input: Vec<Row>, group_by: &[usize], calls: &[AggregateCall]) -> Vec<Row> {
    let mut index: HashMap<Vec<Value>, usize> = HashMap::new();
    let mut groups: Vec<(Vec<Value>, Vec<Row>)> = Vec::new();
    for row in input {
        let key: Vec<Value> = group_by
            .iter()
            .map(|i| row.get(*i).cloned().unwrap_or(Value::Null))
            .collect();
        let slot = *index.entry(key.clone()).or_insert_with(|| {
            groups.push((key, Vec::new()));
            groups.len() - 1
        });
        groups[slot].1.push(row);
    }
    // a global aggregate over no rows still yields one row
    if groups.is_empty() && group_by.is_empty() {
        groups.push((Vec::new(), Vec::new()));
    }
    groups
        .into_iter()
        .map(|(mut key, rows)| {
            key.extend(calls.iter().map(|call| aggregate_call(call, &rows)));
            Row::new(key)
        })
        .collect()
}

fn aggregate_call(call: &AggregateCall, rows: &[Row]) -> Value {
    let Some(arg) = call.arg else {
        return Value::Int64(rows.len() as i64);
    };
    let mut values: Vec<Value> = rows
        .iter()
        .filter_map(|r| r.get(arg))
        .filter(|v| !v.is_null())
        .cloned()
        .collect();
    if call.distinct {
        values.sort();
        values.dedup();
    }
    match call.func {
        AggregateFunc::Count => Value::Int64(values.len() as i64),
        AggregateFunc::Min => values.into_iter().min().unwrap_or(Value::Null),
        AggregateFunc::Max => values.into_iter().max().unwrap_or(Value::Null),
        AggregateFunc::Sum => {
            if values.is_empty() {
                return Value::Null;
            }
            values.iter().skip(1).fold(values[0].clone(), |acc, v| binary(BinaryOp::Add, &acc, v))
        }
        AggregateFunc::Avg => {
            let numbers: Vec<f64> = values.iter().filter_map(Value::as_f64).collect();
            if numbers.is_empty() {
                Value::Null
            } else {
                Value::Float64(numbers.iter().sum::<f64>() / numbers.len() as f64)
            }
        }
    }
}

fn distinct(rows: Vec<Row>) -> Vec<Row> {
    let mut seen = hashbrown::HashSet::new();
    rows.into_iter().filter(|r| seen.insert(r.clone())).collect()
}

fn set_op(op: SetOpKind, all: bool, left: Vec<Row>, right: Vec<Row>) -> Vec<Row> {
    match op {
        SetOpKind::Union => left.into_iter().chain(right).collect(),
        SetOpKind::Intersect | SetOpKind::Except => {
            let mut counts: HashMap<Row, usize> = HashMap::new();
            for row in right {
                *counts.entry(row).or_default() += 1;
            }
            let keep_matches = op == SetOpKind::Intersect;
            left.into_iter()
                .filter(|row| {
                    let present = match counts.get_mut(row) {
                        Some(n) if *n > 0 => {
                            if all {
                                *n -= 1;
                            }
                            true
                        }
                        _ => false,
                    };
                    present == keep_matches
                })
                .collect()
        }
    }
}

fn sort(mut rows: Vec<Row>, keys: &[SortKey], offset: usize, fetch: Option<usize>) -> Vec<Row> {
    rows.sort_by(|a, b| {
        keys.iter()
            .map(|key| {
                let ordering = a.get(key.field).cmp(&b.get(key.field));
                match key.order {
                    SortOrder::Asc => ordering,
                    SortOrder::Desc => ordering.reverse(),
                }
            })
            .find(|o| *o != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });
    rows.into_iter()
        .skip(offset)
        .take(fetch.unwrap_or(usize::MAX))
        .collect()
}

/// One row per array element; rows without elements disappear, scalars pass unchanged.
fn unwind(rows: Vec<Row>, field: usize) -> Vec<Row> {
    let mut out = Vec::new();
    for row in rows {
        match row.get(field) {
            Some(Value::Array(items)) => {
                out.extend(items.iter().map(|item| row.with_value(field, item.clone())));
            }
            Some(Value::Null) | None => {}
            Some(_) => out.push(row),
        }
    }
    out
}

fn elem_match(row: &Row, field: usize, condition: &Expr) -> bool {
    match row.get(field) {
        Some(Value::Array(items)) => items
            .iter()
            .any(|item| is_true(condition, &Row::new(vec![item.clone()]))),
        _ => false,
    }
}

fn switch(rows: Vec<Row>, input: &RowType, from: DataModel, to: DataModel) -> Vec<Row> {
    if from == to {
        return rows;
    }
    match to {
        DataModel::Relational => rows
            .into_iter()
            .map(|row| Row::new(row.into_values().into_iter().map(flatten).collect()))
            .collect(),
        DataModel::Document => rows
            .into_iter()
            .map(|row| Row::new(row.into_values().into_iter().map(nest).collect()))
            .collect(),
        DataModel::Graph => rows
            .into_iter()
            .enumerate()
            .map(|(i, row)| Row::new(vec![to_node(i, row, input)]))
            .collect(),
    }
}

fn flatten(value: Value) -> Value {
    match value {
        Value::Array(_) | Value::Document(_) | Value::Node(_) | Value::Edge(_) => {
            Value::String(value.to_json())
        }
        other => other,
    }
}

fn nest(value: Value) -> Value {
    match value {
        Value::Node(element) | Value::Edge(element) => {
            let GraphElement {
                id,
                labels,
                properties,
            } = *element;
            let mut fields: BTreeMap<String, Value> = properties;
            fields.insert("_id".into(), Value::Int64(id));
            fields.insert(
                "_labels".into(),
                Value::Array(labels.into_iter().map(Value::String).collect()),
            );
            Value::Document(fields)
        }
        other => other,
    }
}

fn to_node(position: usize, row: Row, input: &RowType) -> Value {
    if matches!(row.values(), [Value::Node(_)]) {
        return row.into_values().remove(0);
    }
    let mut element = GraphElement::new(position as i64, Vec::new());
    for (field, value) in input.fields().iter().zip(row.into_values()) {
        if !value.is_null() {
            element.properties.insert(field.name.clone(), value);
        }
    }
    Value::Node(Box::new(element))
}

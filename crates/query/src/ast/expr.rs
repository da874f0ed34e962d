//! Expression AST definitions.
//!
//! Expressions address the fields of their operator's input row by position (`$0`, `$1`, ...).
//! Rules that move an expression across an operator rewrite those positions with
//! [`Expr::remap_fields`] or [`Expr::substitute`].

use crate::algebra::RowType;
use core::fmt;
use polystore_core::{DataType, Value};
use std::collections::BTreeSet;

/// Binary operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    // Comparison
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    // Logical
    And,
    Or,
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinaryOp {
    /// Returns the operator symbol used by `explain`.
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
        }
    }

    /// Returns true for operators producing a boolean.
    pub fn is_boolean(&self) -> bool {
        !matches!(
            self,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod
        )
    }
}

/// Unary operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Not,
    Neg,
    IsNull,
    IsNotNull,
}

/// Aggregate functions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AggregateFunc {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunc {
    /// Returns the SQL name of the function.
    pub fn name(&self) -> &'static str {
        match self {
            AggregateFunc::Count => "COUNT",
            AggregateFunc::Sum => "SUM",
            AggregateFunc::Avg => "AVG",
            AggregateFunc::Min => "MIN",
            AggregateFunc::Max => "MAX",
        }
    }
}

/// Sort order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Functions whose result may differ between two evaluations on the same row.
const NON_DETERMINISTIC: [&str; 4] = ["RAND", "RANDOM", "NOW", "UUID"];

/// Expression AST node.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Expr {
    /// Field of the input row, by position.
    Field(usize),
    /// Literal value.
    Literal(Value),
    /// Binary operation.
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    /// Unary operation.
    Unary { op: UnaryOp, expr: Box<Expr> },
    /// Scalar function call.
    Function { name: String, args: Vec<Expr> },
    /// Access into a nested document, e.g. `$0.address.city`.
    Path { expr: Box<Expr>, path: Vec<String> },
    /// BETWEEN expression.
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
    },
    /// IN expression.
    In { expr: Box<Expr>, list: Vec<Expr> },
    /// LIKE expression.
    Like { expr: Box<Expr>, pattern: String },
}

impl Expr {
    /// Creates a field reference.
    pub fn field(index: usize) -> Self {
        Expr::Field(index)
    }

    /// Creates a literal expression.
    pub fn literal(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    fn binary(left: Expr, op: BinaryOp, right: Expr) -> Self {
        Expr::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    /// Creates an equality expression.
    pub fn eq(left: Expr, right: Expr) -> Self {
        Self::binary(left, BinaryOp::Eq, right)
    }

    /// Creates a not-equal expression.
    pub fn ne(left: Expr, right: Expr) -> Self {
        Self::binary(left, BinaryOp::Ne, right)
    }

    /// Creates a less-than expression.
    pub fn lt(left: Expr, right: Expr) -> Self {
        Self::binary(left, BinaryOp::Lt, right)
    }

    /// Creates a less-than-or-equal expression.
    pub fn le(left: Expr, right: Expr) -> Self {
        Self::binary(left, BinaryOp::Le, right)
    }

    /// Creates a greater-than expression.
    pub fn gt(left: Expr, right: Expr) -> Self {
        Self::binary(left, BinaryOp::Gt, right)
    }

    /// Creates a greater-than-or-equal expression.
    pub fn ge(left: Expr, right: Expr) -> Self {
        Self::binary(left, BinaryOp::Ge, right)
    }

    /// Creates an AND expression.
    pub fn and(left: Expr, right: Expr) -> Self {
        Self::binary(left, BinaryOp::And, right)
    }

    /// Creates an OR expression.
    pub fn or(left: Expr, right: Expr) -> Self {
        Self::binary(left, BinaryOp::Or, right)
    }

    /// Creates an addition.
    pub fn add(left: Expr, right: Expr) -> Self {
        Self::binary(left, BinaryOp::Add, right)
    }

    /// Creates a multiplication.
    pub fn mul(left: Expr, right: Expr) -> Self {
        Self::binary(left, BinaryOp::Mul, right)
    }

    /// Creates a NOT expression.
    pub fn not(expr: Expr) -> Self {
        Expr::Unary {
            op: UnaryOp::Not,
            expr: Box::new(expr),
        }
    }

    /// Creates an IS NULL expression.
    pub fn is_null(expr: Expr) -> Self {
        Expr::Unary {
            op: UnaryOp::IsNull,
            expr: Box::new(expr),
        }
    }

    /// Creates an IS NOT NULL expression.
    pub fn is_not_null(expr: Expr) -> Self {
        Expr::Unary {
            op: UnaryOp::IsNotNull,
            expr: Box::new(expr),
        }
    }

    /// Creates a function call.
    pub fn function(name: &str, args: Vec<Expr>) -> Self {
        Expr::Function {
            name: name.to_ascii_uppercase(),
            args,
        }
    }

    /// Creates a nested document access.
    pub fn path(expr: Expr, path: &[&str]) -> Self {
        Expr::Path {
            expr: Box::new(expr),
            path: path.iter().map(|p| p.to_string()).collect(),
        }
    }

    /// Creates a BETWEEN expression.
    pub fn between(expr: Expr, low: Expr, high: Expr) -> Self {
        Expr::Between {
            expr: Box::new(expr),
            low: Box::new(low),
            high: Box::new(high),
        }
    }

    /// Creates an IN expression.
    pub fn in_list(expr: Expr, values: Vec<Value>) -> Self {
        Expr::In {
            expr: Box::new(expr),
            list: values.into_iter().map(Expr::Literal).collect(),
        }
    }

    /// Creates a LIKE expression.
    pub fn like(expr: Expr, pattern: &str) -> Self {
        Expr::Like {
            expr: Box::new(expr),
            pattern: pattern.into(),
        }
    }

    /// Joins conjuncts with AND, left-deep. Returns None for an empty list.
    pub fn and_all(conjuncts: Vec<Expr>) -> Option<Expr> {
        conjuncts.into_iter().reduce(Expr::and)
    }

    /// Splits a condition into its top-level AND conjuncts.
    pub fn conjuncts(&self) -> Vec<Expr> {
        let mut out = Vec::new();
        self.collect_conjuncts(&mut out);
        out
    }

    fn collect_conjuncts(&self, out: &mut Vec<Expr>) {
        match self {
            Expr::Binary {
                left,
                op: BinaryOp::And,
                right,
            } => {
                left.collect_conjuncts(out);
                right.collect_conjuncts(out);
            }
            other => out.push(other.clone()),
        }
    }

    /// Returns the field index if this is a bare field reference.
    pub fn as_field(&self) -> Option<usize> {
        match self {
            Expr::Field(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the positions of every input field the expression reads.
    pub fn fields(&self) -> BTreeSet<usize> {
        let mut out = BTreeSet::new();
        self.for_each(&mut |e| {
            if let Expr::Field(i) = e {
                out.insert(*i);
            }
        });
        out
    }

    /// Returns false if the expression calls a function whose result may change between
    /// evaluations. Rewrite rules must not duplicate, reorder or move such expressions.
    pub fn is_deterministic(&self) -> bool {
        let mut deterministic = true;
        self.for_each(&mut |e| {
            if let Expr::Function { name, .. } = e {
                if NON_DETERMINISTIC.contains(&name.as_str()) {
                    deterministic = false;
                }
            }
        });
        deterministic
    }

    /// Pre-order walk over this expression and its children.
    pub fn for_each(&self, f: &mut dyn FnMut(&Expr)) {
        f(self);
        match self {
            Expr::Field(_) | Expr::Literal(_) => {}
            Expr::Binary { left, right, .. } => {
                left.for_each(f);
                right.for_each(f);
            }
            Expr::Unary { expr, .. } | Expr::Path { expr, .. } | Expr::Like { expr, .. } => {
                expr.for_each(f)
            }
            Expr::Function { args, .. } => args.iter().for_each(|a| a.for_each(f)),
            Expr::Between { expr, low, high } => {
                expr.for_each(f);
                low.for_each(f);
                high.for_each(f);
            }
            Expr::In { expr, list } => {
                expr.for_each(f);
                list.iter().for_each(|a| a.for_each(f));
            }
        }
    }

    /// Rebuilds the expression with every field reference replaced by `f(index)`.
    ///
    /// Returns None as soon as `f` does.
    fn try_map_fields(&self, f: &mut dyn FnMut(usize) -> Option<Expr>) -> Option<Expr> {
        fn boxed(e: &Expr, f: &mut dyn FnMut(usize) -> Option<Expr>) -> Option<Box<Expr>> {
            e.try_map_fields(f).map(Box::new)
        }
        Some(match self {
            Expr::Field(i) => return f(*i),
            Expr::Literal(v) => Expr::Literal(v.clone()),
            Expr::Binary { left, op, right } => Expr::Binary {
                left: boxed(left, f)?,
                op: *op,
                right: boxed(right, f)?,
            },
            Expr::Unary { op, expr } => Expr::Unary {
                op: *op,
                expr: boxed(expr, f)?,
            },
            Expr::Function { name, args } => Expr::Function {
                name: name.clone(),
                args: args
                    .iter()
                    .map(|a| a.try_map_fields(f))
                    .collect::<Option<Vec<_>>>()?,
            },
            Expr::Path { expr, path } => Expr::Path {
                expr: boxed(expr, f)?,
                path: path.clone(),
            },
            Expr::Between { expr, low, high } => Expr::Between {
                expr: boxed(expr, f)?,
                low: boxed(low, f)?,
                high: boxed(high, f)?,
            },
            Expr::In { expr, list } => Expr::In {
                expr: boxed(expr, f)?,
                list: list
                    .iter()
                    .map(|a| a.try_map_fields(f))
                    .collect::<Option<Vec<_>>>()?,
            },
            Expr::Like { expr, pattern } => Expr::Like {
                expr: boxed(expr, f)?,
                pattern: pattern.clone(),
            },
        })
    }

    /// Renumbers field references. Returns None if `mapping` rejects a referenced field.
    pub fn remap_fields(&self, mapping: impl Fn(usize) -> Option<usize>) -> Option<Expr> {
        self.try_map_fields(&mut |i| mapping(i).map(Expr::Field))
    }

    /// Shifts every field reference by `offset`. Returns None if a position would go negative.
    pub fn shift(&self, offset: isize) -> Option<Expr> {
        self.remap_fields(|i| i.checked_add_signed(offset))
    }

    /// Replaces field `i` with `exprs[i]`, inlining the expressions of a projection below.
    ///
    /// Returns None if the expression reads a field `exprs` does not define.
    pub fn substitute(&self, exprs: &[Expr]) -> Option<Expr> {
        self.try_map_fields(&mut |i| exprs.get(i).cloned())
    }

    /// Infers the result type of the expression over rows of `input`.
    pub fn data_type(&self, input: &RowType) -> DataType {
        match self {
            Expr::Field(i) => input
                .field(*i)
                .map(|f| f.data_type)
                .unwrap_or(DataType::Any),
            Expr::Literal(v) => v.data_type().unwrap_or(DataType::Any),
            Expr::Binary { left, op, right } => {
                if op.is_boolean() {
                    return DataType::Boolean;
                }
                match (left.data_type(input), right.data_type(input)) {
                    (DataType::Int64, DataType::Int64) => DataType::Int64,
                    (l, r) if l.is_numeric() && r.is_numeric() => DataType::Float64,
                    _ => DataType::Any,
                }
            }
            Expr::Unary { op, expr } => match op {
                UnaryOp::Neg => expr.data_type(input),
                _ => DataType::Boolean,
            },
            Expr::Function { name, args } => match name.as_str() {
                "ABS" | "COALESCE" => args
                    .first()
                    .map(|a| a.data_type(input))
                    .unwrap_or(DataType::Any),
                "LOWER" | "UPPER" | "UUID" => DataType::String,
                "LENGTH" | "NOW" => DataType::Int64,
                "RAND" | "RANDOM" => DataType::Float64,
                _ => DataType::Any,
            },
            Expr::Path { .. } => DataType::Any,
            Expr::Between { .. } | Expr::In { .. } | Expr::Like { .. } => DataType::Boolean,
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Field(i) => write!(f, "${}", i),
            Expr::Literal(v) => write!(f, "{}", v),
            Expr::Binary { left, op, right } => write!(f, "({} {} {})", left, op.symbol(), right),
            Expr::Unary { op, expr } => match op {
                UnaryOp::Not => write!(f, "NOT {}", expr),
                UnaryOp::Neg => write!(f, "-{}", expr),
                UnaryOp::IsNull => write!(f, "{} IS NULL", expr),
                UnaryOp::IsNotNull => write!(f, "{} IS NOT NULL", expr),
            },
            Expr::Function { name, args } => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                f.write_str(")")
            }
            Expr::Path { expr, path } => write!(f, "{}.{}", expr, path.join(".")),
            Expr::Between { expr, low, high } => {
                write!(f, "{} BETWEEN {} AND {}", expr, low, high)
            }
            Expr::In { expr, list } => {
                write!(f, "{} IN (", expr)?;
                for (i, item) in list.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str(")")
            }
            Expr::Like { expr, pattern } => write!(f, "{} LIKE '{}'", expr, pattern),
        }
    }
}

//! Row structure.
//!
//! Rows are positional: field `i` of a row corresponds to field `i` of the row type of the
//! operator that produced it, whatever the data model.

use crate::value::Value;

/// A row (or document, or graph binding) flowing between operators.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    /// Creates a new row from its values.
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Returns a reference to the values.
    #[inline]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Consumes the row, returning its values.
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Returns the value at the given position.
    #[inline]
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Returns the number of values.
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the row has no values.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Concatenates two rows (used for join results).
    pub fn concat(&self, other: &Row) -> Row {
        let mut values = Vec::with_capacity(self.len() + other.len());
        values.extend_from_slice(&self.values);
        values.extend_from_slice(&other.values);
        Row { values }
    }

    /// Creates a row of `width` nulls (used for outer join padding).
    pub fn nulls(width: usize) -> Row {
        Row {
            values: vec![Value::Null; width],
        }
    }

    /// Returns a copy of this row with the value at `index` replaced.
    pub fn with_value(&self, index: usize, value: Value) -> Row {
        let mut values = self.values.clone();
        if let Some(slot) = values.get_mut(index) {
            *slot = value;
        }
        Row { values }
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Row::new(values)
    }
}

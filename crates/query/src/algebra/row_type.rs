//! Row types.

use core::fmt;
use polystore_core::DataType;

/// A named, typed field of a row type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Field {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

impl Field {
    /// Creates a field, nullable by the default of its type.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: data_type.is_nullable_by_default(),
        }
    }

    /// Sets whether the field is nullable.
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }
}

/// The output record type of an operator: an ordered list of fields.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct RowType {
    fields: Vec<Field>,
}

impl RowType {
    /// Creates a row type from its fields.
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Returns the fields.
    #[inline]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Returns the field at `index`.
    #[inline]
    pub fn field(&self, index: usize) -> Option<&Field> {
        self.fields.get(index)
    }

    /// Returns the number of fields.
    #[inline]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the row type has no fields.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns the position of the first field named `name`.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Returns the field names.
    pub fn names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Concatenates two row types (join output).
    pub fn concat(&self, other: &RowType) -> RowType {
        let mut fields = self.fields.clone();
        fields.extend(other.fields.iter().cloned());
        RowType { fields }
    }

    /// Picks fields by position. Returns None if a position is out of range.
    pub fn project(&self, indices: &[usize]) -> Option<RowType> {
        indices
            .iter()
            .map(|&i| self.fields.get(i).cloned())
            .collect::<Option<Vec<_>>>()
            .map(RowType::new)
    }

    /// Returns a copy with every field nullable (the padded side of an outer join).
    pub fn to_nullable(&self) -> RowType {
        RowType {
            fields: self
                .fields
                .iter()
                .cloned()
                .map(|f| f.nullable(true))
                .collect(),
        }
    }

    /// Returns a copy with the type of field `index` replaced.
    pub fn with_field_type(&self, index: usize, data_type: DataType) -> RowType {
        let mut fields = self.fields.clone();
        if let Some(field) = fields.get_mut(index) {
            field.data_type = data_type;
            field.nullable = true;
        }
        RowType { fields }
    }

    /// Returns true if both row types have the same width and pairwise compatible field types.
    ///
    /// Names are ignored: two equivalent expressions may label their output differently.
    pub fn compatible_with(&self, other: &RowType) -> bool {
        self.len() == other.len()
            && self
                .fields
                .iter()
                .zip(other.fields.iter())
                .all(|(a, b)| a.data_type.accepts(b.data_type))
    }
}

impl fmt::Display for RowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{} {:?}", field.name, field.data_type)?;
        }
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compatible_ignores_names() {
        let a = RowType::new(vec![Field::new("id", DataType::Int64)]);
        let b = RowType::new(vec![Field::new("key", DataType::Int64)]);
        let c = RowType::new(vec![Field::new("id", DataType::String)]);
        assert!(a.compatible_with(&b));
        assert!(!a.compatible_with(&c));
        assert!(!a.compatible_with(&a.concat(&b)));
    }

    #[test]
    fn test_project_and_display() {
        let rt = RowType::new(vec![
            Field::new("id", DataType::Int64),
            Field::new("tags", DataType::Array),
        ]);
        assert_eq!(rt.project(&[1]).unwrap().names(), vec!["tags"]);
        assert!(rt.project(&[2]).is_none());
        assert_eq!(rt.to_string(), "(id Int64, tags Array)");
        assert!(rt.to_nullable().fields().iter().all(|f| f.nullable));
    }
}

//! Entity schema definition.
//!
//! An [`EntitySchema`] is what a language frontend hands to the catalog when it declares a table,
//! a collection or a graph: ordered columns (or properties), key constraints and, for graphs,
//! the label vocabulary.

use super::column::LogicalColumn;
use super::constraint::KeyConstraint;
use crate::error::{Error, Result};
use crate::ids::ColumnId;
use crate::types::DataType;
use serde::{Deserialize, Serialize};

/// Validates a name follows naming rules.
pub fn check_naming_rules(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let first = match chars.next() {
        Some(c) => c,
        None => return Err(Error::invalid_schema("Name cannot be empty")),
    };
    if !first.is_ascii_alphabetic() && first != '_' {
        return Err(Error::invalid_schema(format!(
            "Name must start with letter or underscore: {}",
            name
        )));
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(Error::invalid_schema(format!(
            "Name contains invalid characters: {}",
            name
        )));
    }
    Ok(())
}

/// Schema of a logical entity.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EntitySchema {
    columns: Vec<LogicalColumn>,
    keys: Vec<KeyConstraint>,
    labels: Vec<String>,
}

impl EntitySchema {
    /// Returns the columns in declaration order.
    #[inline]
    pub fn columns(&self) -> &[LogicalColumn] {
        &self.columns
    }

    /// Returns the key constraints.
    #[inline]
    pub fn keys(&self) -> &[KeyConstraint] {
        &self.keys
    }

    /// Returns the graph labels (empty for relational and document entities).
    #[inline]
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Gets a column by name.
    pub fn column(&self, name: &str) -> Option<&LogicalColumn> {
        self.columns.iter().find(|c| c.name() == name)
    }

    /// Gets a column by catalog id.
    pub fn column_by_id(&self, id: ColumnId) -> Option<&LogicalColumn> {
        self.columns.iter().find(|c| c.id() == id)
    }

    /// Returns the catalog ids of all columns, in declaration order.
    pub fn column_ids(&self) -> Vec<ColumnId> {
        self.columns.iter().map(|c| c.id()).collect()
    }

    /// Returns the primary key, if declared.
    pub fn primary_key(&self) -> Option<&KeyConstraint> {
        self.keys.iter().find(|k| k.is_primary())
    }

    /// Returns a copy whose columns carry the given ids, in order.
    ///
    /// The catalog calls this once when the entity is registered.
    pub fn with_column_ids(&self, ids: &[ColumnId]) -> Self {
        let columns = self
            .columns
            .iter()
            .zip(ids.iter())
            .map(|(c, id)| c.clone().with_id(*id))
            .collect();
        Self {
            columns,
            keys: self.keys.clone(),
            labels: self.labels.clone(),
        }
    }

    /// Returns a copy with an additional column at the end.
    pub fn with_added_column(&self, column: LogicalColumn) -> Result<Self> {
        check_naming_rules(column.name())?;
        if self.column(column.name()).is_some() {
            return Err(Error::invalid_schema(format!(
                "Column already exists: {}",
                column.name()
            )));
        }
        let mut next = self.clone();
        let position = next.columns.len();
        next.columns.push(column.with_position(position));
        Ok(next)
    }

    /// Returns a copy without the named column.
    ///
    /// Columns that participate in a key constraint cannot be dropped.
    pub fn without_column(&self, name: &str) -> Result<Self> {
        if self.column(name).is_none() {
            return Err(Error::invalid_schema(format!("Column not found: {}", name)));
        }
        if let Some(key) = self.keys.iter().find(|k| k.references_column(name)) {
            return Err(Error::invalid_schema(format!(
                "Column {} is part of key {}",
                name, key.name
            )));
        }
        let columns = self
            .columns
            .iter()
            .filter(|c| c.name() != name)
            .enumerate()
            .map(|(i, c)| c.clone().with_position(i))
            .collect();
        Ok(Self {
            columns,
            keys: self.keys.clone(),
            labels: self.labels.clone(),
        })
    }

    /// Returns a copy with a column renamed (key constraints follow the rename).
    pub fn with_renamed_column(&self, old: &str, new: &str) -> Result<Self> {
        check_naming_rules(new)?;
        if self.column(old).is_none() {
            return Err(Error::invalid_schema(format!("Column not found: {}", old)));
        }
        if self.column(new).is_some() {
            return Err(Error::invalid_schema(format!("Column already exists: {}", new)));
        }
        let columns = self
            .columns
            .iter()
            .map(|c| {
                if c.name() == old {
                    c.clone().renamed(new)
                } else {
                    c.clone()
                }
            })
            .collect();
        let keys = self
            .keys
            .iter()
            .map(|k| {
                let mut k = k.clone();
                for c in k.columns.iter_mut() {
                    if c == old {
                        *c = new.to_string();
                    }
                }
                k
            })
            .collect();
        Ok(Self {
            columns,
            keys,
            labels: self.labels.clone(),
        })
    }
}

/// Builder for entity schemas.
#[derive(Default)]
pub struct SchemaBuilder {
    columns: Vec<LogicalColumn>,
    keys: Vec<KeyConstraint>,
    labels: Vec<String>,
}

impl SchemaBuilder {
    /// Creates a new schema builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a column.
    pub fn add_column(mut self, name: impl Into<String>, data_type: DataType) -> Result<Self> {
        let name = name.into();
        check_naming_rules(&name)?;
        if self.columns.iter().any(|c| c.name() == name) {
            return Err(Error::invalid_schema(format!(
                "Column already exists: {}",
                name
            )));
        }
        self.columns.push(LogicalColumn::new(name, data_type));
        Ok(self)
    }

    /// Marks columns as nullable.
    pub fn add_nullable(mut self, columns: &[&str]) -> Self {
        for name in columns {
            if let Some(col) = self.columns.iter_mut().find(|c| c.name() == *name) {
                *col = col.clone().nullable(true);
            }
        }
        self
    }

    /// Sets the primary key.
    pub fn add_primary_key(mut self, columns: &[&str]) -> Result<Self> {
        if self.keys.iter().any(|k| k.is_primary()) {
            return Err(Error::invalid_schema("Primary key already defined"));
        }
        self.check_columns(columns)?;
        for name in columns {
            if let Some(col) = self.columns.iter_mut().find(|c| c.name() == *name) {
                *col = col.clone().nullable(false);
            }
        }
        self.keys.push(KeyConstraint::primary(
            "pk",
            columns.iter().map(|c| c.to_string()).collect(),
        ));
        Ok(self)
    }

    /// Adds a unique constraint.
    pub fn add_unique(mut self, name: impl Into<String>, columns: &[&str]) -> Result<Self> {
        let name = name.into();
        check_naming_rules(&name)?;
        self.check_columns(columns)?;
        self.keys.push(KeyConstraint::unique(
            name,
            columns.iter().map(|c| c.to_string()).collect(),
        ));
        Ok(self)
    }

    /// Adds a foreign key constraint.
    pub fn add_foreign_key(
        mut self,
        name: impl Into<String>,
        columns: &[&str],
        parent_entity: &str,
        parent_columns: &[&str],
    ) -> Result<Self> {
        let name = name.into();
        check_naming_rules(&name)?;
        self.check_columns(columns)?;
        if columns.len() != parent_columns.len() {
            return Err(Error::invalid_schema(format!(
                "Foreign key {} has {} columns but references {}",
                name,
                columns.len(),
                parent_columns.len()
            )));
        }
        self.keys.push(KeyConstraint::foreign(
            name,
            columns.iter().map(|c| c.to_string()).collect(),
            parent_entity,
            parent_columns.iter().map(|c| c.to_string()).collect(),
        ));
        Ok(self)
    }

    /// Adds a graph label.
    pub fn add_label(mut self, label: impl Into<String>) -> Result<Self> {
        let label = label.into();
        check_naming_rules(&label)?;
        if !self.labels.contains(&label) {
            self.labels.push(label);
        }
        Ok(self)
    }

    fn check_columns(&self, columns: &[&str]) -> Result<()> {
        if columns.is_empty() {
            return Err(Error::invalid_schema("Key must name at least one column"));
        }
        for name in columns {
            if !self.columns.iter().any(|c| c.name() == *name) {
                return Err(Error::invalid_schema(format!("Column not found: {}", name)));
            }
        }
        Ok(())
    }

    /// Builds the schema.
    pub fn build(self) -> Result<EntitySchema> {
        if self.columns.is_empty() {
            return Err(Error::invalid_schema("Entity must have at least one column"));
        }
        let columns = self
            .columns
            .into_iter()
            .enumerate()
            .map(|(i, c)| c.with_position(i))
            .collect();
        Ok(EntitySchema {
            columns,
            keys: self.keys,
            labels: self.labels,
        })
    }
}

//! Key constraint definitions.

use serde::{Deserialize, Serialize};

/// Foreign key action on update/delete.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConstraintAction {
    /// Reject the operation if it would violate the constraint.
    #[default]
    Restrict,
    /// Cascade the operation to related rows.
    Cascade,
    /// Set the referencing columns to null.
    SetNull,
}

/// The kind of a key constraint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyKind {
    Primary,
    Unique,
    Foreign {
        /// Name of the referenced entity.
        parent_entity: String,
        /// Referenced columns, aligned with the constraint's columns.
        parent_columns: Vec<String>,
        action: ConstraintAction,
    },
}

/// A primary, unique or foreign key over one or more columns.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyConstraint {
    /// Constraint name.
    pub name: String,
    /// Constrained columns, by name.
    pub columns: Vec<String>,
    /// Constraint kind.
    pub kind: KeyKind,
}

impl KeyConstraint {
    /// Creates a primary key.
    pub fn primary(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            kind: KeyKind::Primary,
        }
    }

    /// Creates a unique key.
    pub fn unique(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            kind: KeyKind::Unique,
        }
    }

    /// Creates a foreign key.
    pub fn foreign(
        name: impl Into<String>,
        columns: Vec<String>,
        parent_entity: impl Into<String>,
        parent_columns: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            columns,
            kind: KeyKind::Foreign {
                parent_entity: parent_entity.into(),
                parent_columns,
                action: ConstraintAction::Restrict,
            },
        }
    }

    /// Sets the foreign key action. No-op for other kinds.
    pub fn action(mut self, action: ConstraintAction) -> Self {
        if let KeyKind::Foreign { action: a, .. } = &mut self.kind {
            *a = action;
        }
        self
    }

    /// Returns true for primary keys.
    pub fn is_primary(&self) -> bool {
        self.kind == KeyKind::Primary
    }

    /// Returns true if the constraint mentions `column`.
    pub fn references_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }
}

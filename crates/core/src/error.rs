//! Error types for the Polystore engine.

use crate::model::DataModel;
use crate::traits::TraitSet;
use core::fmt;
use thiserror::Error;

/// Result type alias for Polystore operations.
pub type Result<T> = core::result::Result<T, Error>;

/// A requirement the planner could not satisfy.
///
/// Carried by [`Error::NoPhysicalPlan`] so callers can tell the user what is missing.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UnresolvedRequirement {
    /// No allocation of `entity` holds all of `columns`.
    MissingColumns { entity: String, columns: Vec<String> },
    /// No member of an equivalence class rooted at `operator` carries the `required` traits.
    UnsatisfiedTraits { operator: String, required: TraitSet },
}

impl fmt::Display for UnresolvedRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnresolvedRequirement::MissingColumns { entity, columns } => write!(
                f,
                "no store holds column(s) {} of entity {}",
                columns.join(", "),
                entity
            ),
            UnresolvedRequirement::UnsatisfiedTraits { operator, required } => {
                write!(f, "no implementation of {} satisfies {}", operator, required)
            }
        }
    }
}

fn join_requirements(unresolved: &[UnresolvedRequirement]) -> String {
    unresolved
        .iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Error types for catalog and planning operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A name is already taken in its scope.
    #[error("Duplicate name in {scope}: {name}")]
    DuplicateName { scope: String, name: String },
    /// The requested data model is unknown or disabled.
    #[error("Unsupported data model: {model}")]
    UnsupportedModel { model: String },
    /// Namespace not found.
    #[error("Namespace not found: {namespace}")]
    NamespaceNotFound { namespace: String },
    /// Namespace still holds entities.
    #[error("Namespace {namespace} is not empty")]
    NamespaceNotEmpty { namespace: String },
    /// Logical entity not found.
    #[error("Logical entity not found: {entity}")]
    LogicalEntityNotFound { entity: String },
    /// Allocation not found.
    #[error("Allocation not found: {allocation}")]
    AllocationNotFound { allocation: String },
    /// Physical entity not found.
    #[error("Physical entity not found: {physical}")]
    PhysicalEntityNotFound { physical: String },
    /// Adapter not found.
    #[error("Adapter not found: {adapter}")]
    AdapterNotFound { adapter: String },
    /// The adapter cannot serve the namespace's data model.
    #[error("Adapter {adapter} cannot serve the {model} data model")]
    AdapterIncompatibleModel { adapter: String, model: DataModel },
    /// The operation would leave columns without any placement.
    #[error("Incomplete coverage of {entity}: column(s) {} would be unplaced", columns.join(", "))]
    IncompleteCoverage { entity: String, columns: Vec<String> },
    /// An open transaction still references the entity.
    #[error("Entity {entity} is referenced by an open transaction")]
    EntityInUse { entity: String },
    /// Column not found.
    #[error("Column {column} not found in {entity}")]
    ColumnNotFound { entity: String, column: String },
    /// Invalid schema definition.
    #[error("Invalid schema: {message}")]
    InvalidSchema { message: String },
    /// Invalid operation.
    #[error("Invalid operation: {message}")]
    InvalidOperation { message: String },
    /// No allocation can serve the requested columns.
    #[error("No eligible allocation of {entity} for column(s) {}", columns.join(", "))]
    NoEligibleAllocation { entity: String, columns: Vec<String> },
    /// An operator received the wrong number of inputs.
    #[error("Arity mismatch for {kind}: expected {expected}, got {got}")]
    ArityMismatch {
        kind: String,
        expected: String,
        got: usize,
    },
    /// A declared row type is inconsistent with the operator's inputs.
    #[error("Type mismatch for {kind}: {message}")]
    TypeMismatch { kind: String, message: String },
    /// The planner could not extract an executable plan.
    #[error("No physical plan: {}", join_requirements(unresolved))]
    NoPhysicalPlan { unresolved: Vec<UnresolvedRequirement> },
    /// A journal record could not be encoded or replayed.
    #[error("Journal error: {message}")]
    Journal { message: String },
}

impl Error {
    /// Creates a duplicate name error.
    pub fn duplicate_name(scope: impl Into<String>, name: impl Into<String>) -> Self {
        Error::DuplicateName {
            scope: scope.into(),
            name: name.into(),
        }
    }

    /// Creates an unsupported model error.
    pub fn unsupported_model(model: impl Into<String>) -> Self {
        Error::UnsupportedModel {
            model: model.into(),
        }
    }

    /// Creates a namespace not found error.
    pub fn namespace_not_found(namespace: impl fmt::Display) -> Self {
        Error::NamespaceNotFound {
            namespace: namespace.to_string(),
        }
    }

    /// Creates a logical entity not found error.
    pub fn entity_not_found(entity: impl fmt::Display) -> Self {
        Error::LogicalEntityNotFound {
            entity: entity.to_string(),
        }
    }

    /// Creates an allocation not found error.
    pub fn allocation_not_found(allocation: impl fmt::Display) -> Self {
        Error::AllocationNotFound {
            allocation: allocation.to_string(),
        }
    }

    /// Creates an adapter not found error.
    pub fn adapter_not_found(adapter: impl fmt::Display) -> Self {
        Error::AdapterNotFound {
            adapter: adapter.to_string(),
        }
    }

    /// Creates an incomplete coverage error.
    pub fn incomplete_coverage(entity: impl Into<String>, columns: Vec<String>) -> Self {
        Error::IncompleteCoverage {
            entity: entity.into(),
            columns,
        }
    }

    /// Creates a column not found error.
    pub fn column_not_found(entity: impl Into<String>, column: impl Into<String>) -> Self {
        Error::ColumnNotFound {
            entity: entity.into(),
            column: column.into(),
        }
    }

    /// Creates an invalid schema error.
    pub fn invalid_schema(message: impl Into<String>) -> Self {
        Error::InvalidSchema {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Error::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates an arity mismatch error.
    pub fn arity_mismatch(kind: impl Into<String>, expected: impl Into<String>, got: usize) -> Self {
        Error::ArityMismatch {
            kind: kind.into(),
            expected: expected.into(),
            got,
        }
    }

    /// Creates a type mismatch error.
    pub fn type_mismatch(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Error::TypeMismatch {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Creates a journal error.
    pub fn journal(message: impl Into<String>) -> Self {
        Error::Journal {
            message: message.into(),
        }
    }

    /// Returns true for the catalog integrity errors that indicate a caller-supplied contradiction.
    pub fn is_catalog_integrity(&self) -> bool {
        matches!(
            self,
            Error::DuplicateName { .. }
                | Error::NamespaceNotFound { .. }
                | Error::LogicalEntityNotFound { .. }
                | Error::IncompleteCoverage { .. }
                | Error::AdapterIncompatibleModel { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::Convention;

    #[test]
    fn test_error_display() {
        let err = Error::duplicate_name("namespace", "shop");
        assert!(err.to_string().contains("shop"));

        let err = Error::incomplete_coverage("shop.orders", vec!["total".into()]);
        assert!(err.to_string().contains("total"));
        assert!(err.is_catalog_integrity());
    }

    #[test]
    fn test_no_physical_plan_names_columns() {
        let err = Error::NoPhysicalPlan {
            unresolved: vec![UnresolvedRequirement::MissingColumns {
                entity: "shop.orders".into(),
                columns: vec!["note".into()],
            }],
        };
        let message = err.to_string();
        assert!(message.contains("note"));
        assert!(message.contains("shop.orders"));
        assert!(!err.is_catalog_integrity());
    }

    #[test]
    fn test_unsatisfied_traits_display() {
        let req = UnresolvedRequirement::UnsatisfiedTraits {
            operator: "Join".into(),
            required: TraitSet::of(DataModel::Relational, Convention::RowStore),
        };
        assert!(req.to_string().contains("Join"));
        assert!(req.to_string().contains("RowStore"));
    }
}

//! Transaction collaborator contract.
//!
//! The catalog knows nothing about transactions except whether one still references an entity.

use polystore_core::ids::LogicalEntityId;

/// Answers whether an open transaction holds a reference to an entity.
pub trait TransactionCollaborator: Send + Sync {
    fn is_entity_referenced(&self, entity: LogicalEntityId) -> bool;
}

/// A collaborator for catalogs used without a transaction manager.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpenTransactions;

impl TransactionCollaborator for NoOpenTransactions {
    fn is_entity_referenced(&self, _entity: LogicalEntityId) -> bool {
        false
    }
}

//! Append-only change journal.
//!
//! Every successful catalog mutation appends one or more [`JournalRecord`]s while the mutated
//! namespace is still locked. A persistence layer consumes the records in `seq` order, and
//! [`Catalog::replay`](crate::Catalog::replay) rebuilds an identical catalog from them.

use crate::entity::{AllocationEntity, LogicalEntity};
use polystore_core::ids::AllocationId;
use polystore_core::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// The kind of change a record describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JournalOp {
    AdapterRegistered,
    AdapterDropped,
    NamespaceCreated,
    NamespaceDropped,
    EntityCreated,
    EntityAltered,
    EntityDropped,
    AllocationAdded,
    AllocationRemoved,
    PhysicalMaterialized,
    PhysicalRemoved,
}

/// A single journal record: `(operation, entity id, payload)` plus its position.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JournalRecord {
    /// Position in the journal, starting at 1.
    pub seq: u64,
    pub op: JournalOp,
    /// Raw id of the object the record is about.
    pub entity_id: u64,
    pub payload: serde_json::Value,
}

impl JournalRecord {
    /// Decodes the payload.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.payload.clone()).map_err(|e| {
            Error::journal(format!("record {} ({:?}): {}", self.seq, self.op, e))
        })
    }
}

/// Payload of [`JournalOp::EntityAltered`]: the entity and its allocations after the change.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EntityChange {
    pub entity: LogicalEntity,
    pub allocations: Vec<AllocationEntity>,
    pub removed_allocations: Vec<AllocationId>,
}

/// The journal itself.
#[derive(Debug, Default)]
pub struct Journal {
    records: Mutex<Vec<JournalRecord>>,
}

impl Journal {
    /// Creates a new empty journal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Encodes a payload. Done before a mutation is applied so that encoding failures leave the
    /// catalog untouched.
    pub(crate) fn encode<T: Serialize>(payload: &T) -> Result<serde_json::Value> {
        serde_json::to_value(payload).map_err(|e| Error::journal(e.to_string()))
    }

    /// Appends a record and returns its sequence number.
    pub(crate) fn append(&self, op: JournalOp, entity_id: u64, payload: serde_json::Value) -> u64 {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let seq = records.len() as u64 + 1;
        records.push(JournalRecord {
            seq,
            op,
            entity_id,
            payload,
        });
        seq
    }

    /// Re-appends a replayed record verbatim.
    pub(crate) fn push_replayed(&self, record: JournalRecord) {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.push(record);
    }

    /// Returns a copy of all records in order.
    pub fn records(&self) -> Vec<JournalRecord> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Returns the records with a sequence number greater than `seq`.
    pub fn records_since(&self, seq: u64) -> Vec<JournalRecord> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|r| r.seq > seq)
            .cloned()
            .collect()
    }

    /// Returns the number of records.
    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Returns true if nothing has been journaled.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Namespace;
    use polystore_core::ids::NamespaceId;
    use polystore_core::DataModel;

    #[test]
    fn test_append_and_decode() {
        let journal = Journal::new();
        let ns = Namespace {
            id: NamespaceId::new(1),
            name: "shop".into(),
            model: DataModel::Relational,
        };
        let payload = Journal::encode(&ns).unwrap();
        assert_eq!(journal.append(JournalOp::NamespaceCreated, 1, payload), 1);
        assert_eq!(journal.len(), 1);

        let records = journal.records();
        let decoded: Namespace = records[0].decode().unwrap();
        assert_eq!(decoded, ns);
        assert!(journal.records_since(1).is_empty());
    }

    #[test]
    fn test_decode_wrong_payload() {
        let record = JournalRecord {
            seq: 7,
            op: JournalOp::NamespaceCreated,
            entity_id: 1,
            payload: serde_json::json!({"unexpected": true}),
        };
        let err = record.decode::<Namespace>().unwrap_err();
        assert!(matches!(err, Error::Journal { .. }));
        assert!(err.to_string().contains("record 7"));
    }
}

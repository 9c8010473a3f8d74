use serde::Serialize;

use crate::error::TransportError;
use crate::value::{Timestamp, Variant};
use crate::variable::VariableStatus;

/// One variable captured in a [`PublishSnapshot`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotField {
    pub name: String,
    pub value: Variant,
    pub timestamp: Timestamp,
    pub status: VariableStatus,
    pub version: u64,
}

/// Immutable copy of a set of variables taken at one instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublishSnapshot {
    sequence: u64,
    taken_at: Timestamp,
    fields: Vec<SnapshotField>,
}

impl PublishSnapshot {
    pub(crate) fn new(sequence: u64, fields: Vec<SnapshotField>) -> Self {
        Self {
            sequence,
            taken_at: Timestamp::now(),
            fields,
        }
    }

    /// Store mutation sequence at the time the snapshot was taken.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn taken_at(&self) -> Timestamp {
        self.taken_at
    }

    pub fn fields(&self) -> &[SnapshotField] {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&SnapshotField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Fields written after the store reached `sequence`.
    pub fn changed_since(&self, sequence: u64) -> impl Iterator<Item = &SnapshotField> {
        self.fields.iter().filter(move |f| f.version > sequence)
    }

    pub fn to_json(&self) -> Result<Vec<u8>, TransportError> {
        serde_json::to_vec(self).map_err(|e| TransportError::Encode(e.to_string()))
    }
}

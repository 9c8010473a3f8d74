//! Variable storage with type and access validation.
//!
//! `VariableStore` holds every registered telemetry variable behind a single
//! lock. Multi-variable writes and snapshots each take that lock exactly once,
//! so readers never observe half of a batch.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::Serialize;
use strum::Display;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::snapshot::{PublishSnapshot, SnapshotField};
use crate::value::{DataType, Timestamp, ValueRank, Variant};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, Serialize)]
pub enum AccessLevel {
    Read,
    Write,
    #[default]
    ReadWrite,
}

impl AccessLevel {
    pub fn readable(self) -> bool {
        matches!(self, AccessLevel::Read | AccessLevel::ReadWrite)
    }

    pub fn writable(self) -> bool {
        matches!(self, AccessLevel::Write | AccessLevel::ReadWrite)
    }
}

/// Quality of a stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub enum VariableStatus {
    #[default]
    Good,
    Bad(String),
}

impl VariableStatus {
    pub fn is_good(&self) -> bool {
        matches!(self, VariableStatus::Good)
    }
}

/// Static description of a variable, fixed at registration.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDescriptor {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub data_type: DataType,
    pub rank: ValueRank,
    pub access: AccessLevel,
}

impl VariableDescriptor {
    pub fn new(name: impl Into<String>, data_type: DataType, rank: ValueRank) -> Self {
        let name = name.into();
        Self {
            display_name: name.clone(),
            name,
            description: String::new(),
            data_type,
            rank,
            access: AccessLevel::ReadWrite,
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_access(mut self, access: AccessLevel) -> Self {
        self.access = access;
        self
    }
}

/// A value read from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct DataValue {
    pub value: Variant,
    pub timestamp: Timestamp,
    pub status: VariableStatus,
    /// Mutation sequence number of the last write to this variable.
    pub version: u64,
}

#[derive(Debug)]
struct VariableEntry {
    descriptor: VariableDescriptor,
    value: Variant,
    timestamp: Timestamp,
    status: VariableStatus,
    version: u64,
}

impl VariableEntry {
    fn check_write(&self, value: &Variant) -> Result<()> {
        let d = &self.descriptor;
        if !d.access.writable() {
            return Err(Error::AccessDenied {
                name: d.name.clone(),
                required: "writable",
            });
        }
        if !value.conforms_to(d.data_type, d.rank) {
            return Err(type_mismatch(d, value));
        }
        Ok(())
    }
}

fn type_mismatch(d: &VariableDescriptor, value: &Variant) -> Error {
    let expected = match d.rank {
        ValueRank::Scalar => d.data_type.to_string(),
        ValueRank::OneDimension => format!("{}[]", d.data_type),
        ValueRank::TwoDimensions => format!("{}[][]", d.data_type),
    };
    Error::TypeMismatch {
        name: d.name.clone(),
        expected,
        actual: value.type_name(),
    }
}

#[derive(Debug, Default)]
struct StoreInner {
    entries: HashMap<String, VariableEntry>,
    /// Registration order, used for browsing and full snapshots.
    order: Vec<String>,
    /// Global mutation counter; every successful write or batch bumps it once.
    sequence: u64,
}

impl StoreInner {
    fn entry(&self, name: &str) -> Result<&VariableEntry> {
        self.entries
            .get(name)
            .ok_or_else(|| Error::NotFound(name.to_string()))
    }

    fn next_sequence(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }
}

#[derive(Debug, Default)]
pub struct VariableStore {
    inner: Mutex<StoreInner>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a variable with its initial value.
    pub fn register(&self, descriptor: VariableDescriptor, initial: Variant) -> Result<()> {
        if !descriptor.data_type.is_declarable() {
            return Err(Error::InvalidSchema(format!(
                "variable '{}' declares unsupported type {}",
                descriptor.name, descriptor.data_type
            )));
        }
        if !initial.conforms_to(descriptor.data_type, descriptor.rank) {
            return Err(type_mismatch(&descriptor, &initial));
        }

        let mut inner = self.inner.lock();
        if inner.entries.contains_key(&descriptor.name) {
            return Err(Error::DuplicateName(descriptor.name));
        }
        debug!(
            "[STORE] Registered variable: name={}, type={}, rank={}",
            descriptor.name, descriptor.data_type, descriptor.rank
        );
        let name = descriptor.name.clone();
        inner.order.push(name.clone());
        inner.entries.insert(
            name,
            VariableEntry {
                descriptor,
                value: initial,
                timestamp: Timestamp::now(),
                status: VariableStatus::Good,
                version: 0,
            },
        );
        Ok(())
    }

    pub fn read(&self, name: &str) -> Result<DataValue> {
        let inner = self.inner.lock();
        let entry = inner.entry(name)?;
        if !entry.descriptor.access.readable() {
            return Err(Error::AccessDenied {
                name: name.to_string(),
                required: "readable",
            });
        }
        Ok(DataValue {
            value: entry.value.clone(),
            timestamp: entry.timestamp,
            status: entry.status.clone(),
            version: entry.version,
        })
    }

    /// Replace a single variable's value. The stored value is unchanged on
    /// error.
    pub fn write(&self, name: &str, value: Variant) -> Result<Timestamp> {
        let mut inner = self.inner.lock();
        let prev = {
            let entry = inner.entry(name)?;
            entry.check_write(&value)?;
            entry.timestamp
        };
        let version = inner.next_sequence();
        let timestamp = Timestamp::after(prev);
        if let Some(entry) = inner.entries.get_mut(name) {
            entry.value = value;
            entry.timestamp = timestamp;
            entry.status = VariableStatus::Good;
            entry.version = version;
        }
        trace!("[STORE] write {} (seq={})", name, version);
        Ok(timestamp)
    }

    /// Apply several writes as one transaction.
    ///
    /// Every write is validated before any is applied. All variables in the
    /// batch receive the same timestamp and version.
    pub fn write_many<'a, I>(&self, writes: I) -> Result<Timestamp>
    where
        I: IntoIterator<Item = (&'a str, Variant)>,
    {
        let writes: Vec<(&str, Variant)> = writes.into_iter().collect();

        let mut inner = self.inner.lock();
        let mut timestamp = Timestamp::now();
        for (name, value) in &writes {
            let entry = inner.entry(name)?;
            entry.check_write(value)?;
            timestamp = timestamp.max(Timestamp::after(entry.timestamp));
        }

        let version = inner.next_sequence();
        let count = writes.len();
        for (name, value) in writes {
            if let Some(entry) = inner.entries.get_mut(name) {
                entry.value = value;
                entry.timestamp = timestamp;
                entry.status = VariableStatus::Good;
                entry.version = version;
            }
        }
        debug!("[STORE] Applied batch of {} writes (seq={})", count, version);
        Ok(timestamp)
    }

    /// Mark a variable's current value as bad without changing it.
    pub fn set_bad(&self, name: &str, reason: impl Into<String>) -> Result<()> {
        let reason = reason.into();
        let mut inner = self.inner.lock();
        let version = {
            inner.entry(name)?;
            inner.next_sequence()
        };
        if let Some(entry) = inner.entries.get_mut(name) {
            warn!("[STORE] Variable '{}' marked bad: {}", name, reason);
            entry.status = VariableStatus::Bad(reason);
            entry.version = version;
        }
        Ok(())
    }

    /// Copy the named variables under one lock acquisition.
    pub fn snapshot<S: AsRef<str>>(&self, names: &[S]) -> Result<PublishSnapshot> {
        let inner = self.inner.lock();
        let fields = names
            .iter()
            .map(|name| -> Result<SnapshotField> {
                let entry = inner.entry(name.as_ref())?;
                Ok(SnapshotField {
                    name: entry.descriptor.name.clone(),
                    value: entry.value.clone(),
                    timestamp: entry.timestamp,
                    status: entry.status.clone(),
                    version: entry.version,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(PublishSnapshot::new(inner.sequence, fields))
    }

    /// Snapshot of every variable in registration order.
    pub fn snapshot_all(&self) -> PublishSnapshot {
        let inner = self.inner.lock();
        let fields = inner
            .order
            .iter()
            .filter_map(|name| inner.entries.get(name))
            .map(|entry| SnapshotField {
                name: entry.descriptor.name.clone(),
                value: entry.value.clone(),
                timestamp: entry.timestamp,
                status: entry.status.clone(),
                version: entry.version,
            })
            .collect();
        PublishSnapshot::new(inner.sequence, fields)
    }

    pub fn describe(&self, name: &str) -> Option<VariableDescriptor> {
        self.inner
            .lock()
            .entries
            .get(name)
            .map(|e| e.descriptor.clone())
    }

    /// Registered names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.inner.lock().order.clone()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.lock().entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current mutation sequence number.
    pub fn sequence(&self) -> u64 {
        self.inner.lock().sequence
    }
}

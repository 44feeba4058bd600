// Copyright (c) The devops-reporter Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::records::TestResultRecord;
use indexmap::{IndexMap, IndexSet};

/// The result records for a run, keyed by result id in first-seen order.
///
/// Records that changed since they were last uploaded are tracked, so that each sync only sends
/// what changed.
#[derive(Clone, Debug, Default)]
pub struct ResultAggregator {
    records: IndexMap<u64, TestResultRecord>,
    dirty: IndexSet<u64>,
}

impl ResultAggregator {
    /// Creates an empty aggregator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `record`, or replaces the record with the same id in place.
    ///
    /// A replacement never lowers the recorded duration. Returns true if anything changed; an
    /// identical record is not marked for upload again.
    pub fn upsert(&mut self, mut record: TestResultRecord) -> bool {
        let id = record.id;
        match self.records.get_mut(&id) {
            Some(existing) => {
                record.duration_in_ms = record.duration_in_ms.max(existing.duration_in_ms);
                if *existing == record {
                    return false;
                }
                *existing = record;
            }
            None => {
                self.records.insert(id, record);
            }
        }
        self.dirty.insert(id);
        true
    }

    /// Returns the record with the given id.
    pub fn get(&self, id: u64) -> Option<&TestResultRecord> {
        self.records.get(&id)
    }

    /// Returns copies of the records that changed since they were last synced, in insertion order.
    pub fn pending(&self) -> Vec<TestResultRecord> {
        self.records
            .iter()
            .filter(|(id, _)| self.dirty.contains(*id))
            .map(|(_, record)| record.clone())
            .collect()
    }

    /// Marks the given records as uploaded.
    pub fn mark_synced(&mut self, ids: impl IntoIterator<Item = u64>) {
        for id in ids {
            self.dirty.shift_remove(&id);
        }
    }

    /// Iterates over all records in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &TestResultRecord> {
        self.records.values()
    }

    /// The number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if there are no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Discards every record.
    pub fn clear(&mut self) {
        self.records.clear();
        self.dirty.clear();
    }
}

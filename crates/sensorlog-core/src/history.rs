//! Fixed-capacity ring buffer of records for one sensor key.

use std::collections::VecDeque;

use crate::sensor::{SensorKind, SensorRecord};

/// Default number of records retained per key.
pub const DEFAULT_CAPACITY: usize = 10_000;

/// Append-only history that drops its oldest record once full.
///
/// Insertion order is time order. Eviction is strictly by age of the record,
/// reads never affect what gets evicted.
#[derive(Debug, Clone)]
pub struct BoundedHistory {
    kind: SensorKind,
    capacity: usize,
    records: VecDeque<SensorRecord>,
}

impl BoundedHistory {
    /// Create an empty history. A capacity of zero is raised to one.
    pub fn new(kind: SensorKind, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            kind,
            capacity,
            // grows on demand up to `capacity`
            records: VecDeque::with_capacity(capacity.min(1024)),
        }
    }

    /// Kind fixed when this history was created.
    pub fn kind(&self) -> SensorKind {
        self.kind
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Append a record, evicting the oldest one first when at capacity.
    pub fn append(&mut self, record: SensorRecord) {
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    /// Most recently appended record.
    pub fn latest(&self) -> Option<SensorRecord> {
        self.records.back().copied()
    }

    /// The last `min(n, len)` records in time order. `n == 0` means all.
    pub fn tail(&self, n: usize) -> Vec<SensorRecord> {
        let take = if n == 0 { self.len() } else { n.min(self.len()) };
        self.records
            .iter()
            .skip(self.len() - take)
            .copied()
            .collect()
    }

    /// Iterate over every retained record, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &SensorRecord> {
        self.records.iter()
    }
}

//! Thread-safe mapping from sensor key to its bounded history.
//!
//! Every operation takes the single store lock for the duration of an
//! in-memory mutation or copy, never across I/O. Reads hand back owned
//! copies, so a caller never holds a reference into the store. Each call
//! observes one consistent instant; successive calls may observe different
//! ones.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use log::warn;

use crate::history::{BoundedHistory, DEFAULT_CAPACITY};
use crate::sensor::{SensorKind, SensorRecord};

#[derive(Debug, Default)]
struct Inner {
    histories: HashMap<String, BoundedHistory>,
    /// Keys in order of first observation.
    order: Vec<String>,
    /// Keys already warned about for a kind conflict.
    conflicted: HashSet<String>,
}

/// Aggregate counts used for progress reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Number of keys with at least one record.
    pub sensors: usize,
    /// Records retained across all keys.
    pub total_records: usize,
    /// Length of the longest history.
    pub longest_history: usize,
}

/// Per-key bounded histories behind one lock.
#[derive(Debug)]
pub struct TimeSeriesStore {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl Default for TimeSeriesStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl TimeSeriesStore {
    /// Create an empty store whose histories hold up to `capacity` records.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Per-key capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    // Mutations are single steps on a VecDeque/HashMap, so a panic elsewhere
    // while the lock was held cannot leave a history half-written.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append one value for `key`, creating its history on first sight.
    ///
    /// A value whose kind differs from the kind first recorded for `key` is
    /// dropped; the kind of a key never changes.
    pub fn record(&self, key: &str, value: f64, kind: SensorKind, timestamp: DateTime<Utc>) {
        let mut inner = self.lock();
        let record = SensorRecord::new(timestamp, value, kind);
        Self::append_locked(&mut inner, self.capacity, key, record);
    }

    /// Append a batch of values that share one capture timestamp, under a
    /// single lock acquisition.
    pub fn record_batch<'a, I>(&self, timestamp: DateTime<Utc>, entries: I) -> usize
    where
        I: IntoIterator<Item = (&'a str, f64, SensorKind)>,
    {
        let mut inner = self.lock();
        Self::append_batch_locked(&mut inner, self.capacity, timestamp, entries)
    }

    /// Like [`record_batch`](Self::record_batch), but only while `active` is
    /// still set once the lock is held. Returns `None` and writes nothing
    /// otherwise.
    pub fn record_batch_while<'a, I>(
        &self,
        active: &AtomicBool,
        timestamp: DateTime<Utc>,
        entries: I,
    ) -> Option<usize>
    where
        I: IntoIterator<Item = (&'a str, f64, SensorKind)>,
    {
        let mut inner = self.lock();
        if !active.load(Ordering::Acquire) {
            return None;
        }
        Some(Self::append_batch_locked(
            &mut inner,
            self.capacity,
            timestamp,
            entries,
        ))
    }

    /// Block until no writer holds the lock. Any [`record_batch_while`]
    /// call that starts afterwards sees flags cleared before this call.
    ///
    /// [`record_batch_while`]: Self::record_batch_while
    pub fn fence(&self) {
        drop(self.lock());
    }

    fn append_batch_locked<'a, I>(
        inner: &mut Inner,
        capacity: usize,
        timestamp: DateTime<Utc>,
        entries: I,
    ) -> usize
    where
        I: IntoIterator<Item = (&'a str, f64, SensorKind)>,
    {
        let mut written = 0;
        for (key, value, kind) in entries {
            let record = SensorRecord::new(timestamp, value, kind);
            if Self::append_locked(inner, capacity, key, record) {
                written += 1;
            }
        }
        written
    }

    fn append_locked(inner: &mut Inner, capacity: usize, key: &str, record: SensorRecord) -> bool {
        if let Some(history) = inner.histories.get_mut(key) {
            if history.kind() != record.kind {
                let first_kind = history.kind();
                if inner.conflicted.insert(key.to_string()) {
                    warn!(
                        "dropping {} readings for '{key}': key was first seen as {first_kind}",
                        record.kind
                    );
                }
                return false;
            }
            history.append(record);
            return true;
        }

        let mut history = BoundedHistory::new(record.kind, capacity);
        history.append(record);
        inner.histories.insert(key.to_string(), history);
        inner.order.push(key.to_string());
        true
    }

    /// Most recent record of every key, taken atomically.
    pub fn latest_all(&self) -> BTreeMap<String, SensorRecord> {
        let inner = self.lock();
        inner
            .histories
            .iter()
            .filter_map(|(key, h)| h.latest().map(|r| (key.clone(), r)))
            .collect()
    }

    /// Most recent record for one key.
    pub fn latest(&self, key: &str) -> Option<SensorRecord> {
        self.lock().histories.get(key).and_then(BoundedHistory::latest)
    }

    /// The last `n` records of `key` (all when `n == 0`). Unknown keys yield
    /// an empty vector.
    pub fn timeseries(&self, key: &str, n: usize) -> Vec<SensorRecord> {
        self.lock()
            .histories
            .get(key)
            .map(|h| h.tail(n))
            .unwrap_or_default()
    }

    /// Remove every key and history.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.histories.clear();
        inner.order.clear();
        inner.conflicted.clear();
    }

    /// Keys whose latest record has the given kind.
    pub fn keys_of_kind(&self, kind: SensorKind) -> BTreeSet<String> {
        self.latest_all()
            .into_iter()
            .filter(|(_, r)| r.kind == kind)
            .map(|(key, _)| key)
            .collect()
    }

    /// Keys in order of first observation.
    pub fn keys(&self) -> Vec<String> {
        self.lock().order.clone()
    }

    pub fn stats(&self) -> StoreStats {
        let inner = self.lock();
        inner.histories.values().fold(
            StoreStats {
                sensors: inner.histories.len(),
                ..StoreStats::default()
            },
            |mut acc, h| {
                acc.total_records += h.len();
                acc.longest_history = acc.longest_history.max(h.len());
                acc
            },
        )
    }

    pub fn is_empty(&self) -> bool {
        self.lock().histories.is_empty()
    }

    /// Copy of every history in first-observation order, taken under one
    /// lock acquisition.
    pub fn snapshot(&self) -> Vec<(String, Vec<SensorRecord>)> {
        let inner = self.lock();
        inner
            .order
            .iter()
            .filter_map(|key| {
                inner
                    .histories
                    .get(key)
                    .map(|h| (key.clone(), h.iter().copied().collect()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    #[test]
    fn unknown_key_yields_empty_series() {
        let store = TimeSeriesStore::new(10);
        assert!(store.timeseries("nope", 5).is_empty());
        assert!(store.timeseries("nope", 0).is_empty());
        assert!(store.latest("nope").is_none());
    }

    #[test]
    fn latest_all_only_contains_recorded_keys() {
        let store = TimeSeriesStore::new(10);
        assert!(store.latest_all().is_empty());

        store.record("cpu_temp", 41.0, SensorKind::Temperature, at(0));
        store.record("cpu_temp", 42.0, SensorKind::Temperature, at(100));
        store.record("fan1", 900.0, SensorKind::TachReading, at(100));

        let latest = store.latest_all();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest["cpu_temp"].value, 42.0);
        assert_eq!(latest["fan1"].kind, SensorKind::TachReading);
    }

    #[test]
    fn capacity_applies_per_key() {
        let store = TimeSeriesStore::new(5);
        for (i, v) in [10.0, 20.0, 30.0, 40.0, 50.0, 60.0].into_iter().enumerate() {
            store.record("FanA", v, SensorKind::TachReading, at(i as i64));
        }
        store.record("FanB", 1.0, SensorKind::TachReading, at(0));

        let values: Vec<f64> = store.timeseries("FanA", 5).iter().map(|r| r.value).collect();
        assert_eq!(values, vec![20.0, 30.0, 40.0, 50.0, 60.0]);
        assert_eq!(store.timeseries("FanB", 0).len(), 1);
    }

    #[test]
    fn kind_is_fixed_at_first_observation() {
        let store = TimeSeriesStore::new(10);
        store.record("x", 1.0, SensorKind::Temperature, at(0));
        store.record("x", 2.0, SensorKind::ControlOutput, at(1));
        let series = store.timeseries("x", 0);
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].kind, SensorKind::Temperature);
    }

    #[test]
    fn repeated_kind_conflicts_are_flagged_once() {
        let store = TimeSeriesStore::new(10);
        store.record("x", 1.0, SensorKind::Temperature, at(0));
        let dropped = (1..=5)
            .map(|i| store.record_batch(at(i), [("x", 2.0, SensorKind::ControlOutput)]))
            .filter(|&written| written == 0)
            .count();
        assert_eq!(dropped, 5);
        assert_eq!(store.lock().conflicted.len(), 1);

        store.clear();
        assert!(store.lock().conflicted.is_empty());
    }

    #[test]
    fn guarded_batch_respects_the_flag() {
        let store = TimeSeriesStore::new(10);
        let active = AtomicBool::new(true);
        let batch = [("t", 30.0, SensorKind::Temperature)];
        assert_eq!(store.record_batch_while(&active, at(0), batch), Some(1));

        active.store(false, Ordering::Release);
        store.fence();
        assert_eq!(store.record_batch_while(&active, at(1), batch), None);
        assert_eq!(store.stats().total_records, 1);
    }

    #[test]
    fn clear_removes_everything() {
        let store = TimeSeriesStore::new(10);
        store.record("a", 1.0, SensorKind::Temperature, at(0));
        store.clear();
        assert!(store.is_empty());
        assert!(store.keys().is_empty());
        assert_eq!(store.stats(), StoreStats::default());
    }

    #[test]
    fn keys_keep_first_observation_order() {
        let store = TimeSeriesStore::new(10);
        store.record("zeta", 1.0, SensorKind::Temperature, at(0));
        store.record("alpha", 1.0, SensorKind::Temperature, at(0));
        store.record("zeta", 2.0, SensorKind::Temperature, at(1));
        assert_eq!(store.keys(), vec!["zeta".to_string(), "alpha".to_string()]);

        let snap = store.snapshot();
        assert_eq!(snap[0].0, "zeta");
        assert_eq!(snap[0].1.len(), 2);
        assert_eq!(snap[1].0, "alpha");
    }

    #[test]
    fn keys_of_kind_filters_on_latest() {
        let store = TimeSeriesStore::new(10);
        store.record("pwm1", 40.0, SensorKind::ControlOutput, at(0));
        store.record("pwm2", 60.0, SensorKind::ControlOutput, at(0));
        store.record("fan1", 800.0, SensorKind::TachReading, at(0));

        let controls = store.keys_of_kind(SensorKind::ControlOutput);
        assert_eq!(
            controls.into_iter().collect::<Vec<_>>(),
            vec!["pwm1".to_string(), "pwm2".to_string()]
        );
        assert!(store.keys_of_kind(SensorKind::Temperature).is_empty());
    }

    #[test]
    fn batch_shares_one_timestamp() {
        let store = TimeSeriesStore::new(10);
        let written = store.record_batch(
            at(500),
            [
                ("t", 30.0, SensorKind::Temperature),
                ("f", 700.0, SensorKind::TachReading),
            ],
        );
        assert_eq!(written, 2);
        assert_eq!(store.latest("t").unwrap().timestamp, at(500));
        assert_eq!(store.latest("f").unwrap().timestamp, at(500));

        let stats = store.stats();
        assert_eq!(stats.sensors, 2);
        assert_eq!(stats.total_records, 2);
        assert_eq!(stats.longest_history, 1);
    }

    #[test]
    fn concurrent_readers_see_whole_batches() {
        let store = Arc::new(TimeSeriesStore::new(1000));
        let writer = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for tick in 0..500 {
                    store.record_batch(
                        at(tick),
                        [
                            ("a", tick as f64, SensorKind::Temperature),
                            ("b", tick as f64, SensorKind::Temperature),
                        ],
                    );
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        let latest = store.latest_all();
                        if let (Some(a), Some(b)) = (latest.get("a"), latest.get("b")) {
                            assert_eq!(a.timestamp, b.timestamp);
                        } else {
                            assert!(latest.is_empty());
                        }
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for r in readers {
            r.join().unwrap();
        }
        assert_eq!(store.timeseries("a", 0).len(), 500);
    }
}

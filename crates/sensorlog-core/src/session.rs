//! Bounded-duration collection runs.
//!
//! A [`CollectionSession`] clears the store, runs the sampler for a capped
//! wall-clock duration while reporting progress, then stops the sampler and
//! summarizes everything the store retained. The duration is enforced here,
//! not by the sampler.
//!
//! Cancellation is cooperative: the caller's flag is checked once per
//! progress tick, so a cancelled run ends within about one
//! `progress_interval`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::sampler::{self, Sampler};
use crate::sensor::SensorRecord;
use crate::store::TimeSeriesStore;

/// Longest session that can be requested, in seconds.
pub const MAX_SESSION_SECS: f64 = 300.0;

/// Errors produced by [`CollectionSession`].
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("session duration must be a positive number of seconds, got {0}")]
    InvalidDuration(f64),
    #[error(transparent)]
    Sampler(#[from] sampler::Error),
}

/// Turn a requested duration into the one actually run: non-positive (and
/// NaN) values are rejected, anything above [`MAX_SESSION_SECS`] is clamped.
///
/// # Errors
///
/// Returns [`Error::InvalidDuration`] for `secs <= 0` or NaN.
pub fn validate_duration(secs: f64) -> Result<Duration, Error> {
    if secs.is_nan() || secs <= 0.0 {
        return Err(Error::InvalidDuration(secs));
    }
    if secs > MAX_SESSION_SECS {
        debug!("clamping session duration {secs}s to {MAX_SESSION_SECS}s");
    }
    Ok(Duration::from_secs_f64(secs.min(MAX_SESSION_SECS)))
}

/// Session timing.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// Cadence of progress callbacks and cancellation checks.
    pub progress_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            progress_interval: Duration::from_millis(100),
        }
    }
}

/// Progress snapshot delivered once per progress tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionProgress {
    pub elapsed: Duration,
    pub requested: Duration,
    /// `elapsed / requested`, capped at 1.
    pub fraction: f64,
    /// Records collected so far, across all keys.
    pub samples: usize,
    pub sensors: usize,
    /// Elapsed time divided by the longest per-key history.
    pub avg_interval_ms: Option<f64>,
}

/// `{count, min, max, mean}` over one key's retained history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorSummary {
    pub sample_count: usize,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
}

impl SensorSummary {
    /// Statistics over the finite values in `records`; `None` if there are none.
    pub fn from_records(records: &[SensorRecord]) -> Option<Self> {
        let mut count = 0usize;
        let mut sum = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for v in records.iter().map(|r| r.value).filter(|v| v.is_finite()) {
            count += 1;
            sum += v;
            min = min.min(v);
            max = max.max(v);
        }
        (count > 0).then(|| Self {
            sample_count: count,
            min,
            max,
            avg: sum / count as f64,
        })
    }
}

/// Result of a finished (or cancelled) session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub started_at: DateTime<Utc>,
    /// Seconds, after clamping.
    pub duration_requested: f64,
    /// Seconds between sampler start and sampler stop.
    pub duration_actual: f64,
    pub interval_ms: u64,
    pub cancelled: bool,
    pub total_samples: usize,
    pub sensors_count: usize,
    pub sensors: BTreeMap<String, SensorSummary>,
}

/// Per-key statistics over the store's current contents. Keys with no
/// finite value are left out.
pub fn summarize(store: &TimeSeriesStore) -> BTreeMap<String, SensorSummary> {
    store
        .snapshot()
        .into_iter()
        .filter_map(|(key, records)| SensorSummary::from_records(&records).map(|s| (key, s)))
        .collect()
}

/// One bounded collection run. Consumed by [`CollectionSession::run`].
#[derive(Debug)]
pub struct CollectionSession {
    id: Uuid,
    requested: Duration,
    config: SessionConfig,
}

impl CollectionSession {
    /// # Errors
    ///
    /// Returns [`Error::InvalidDuration`] for non-positive durations. Nothing
    /// is started in that case.
    pub fn new(duration_secs: f64) -> Result<Self, Error> {
        Self::with_config(duration_secs, SessionConfig::default())
    }

    /// # Errors
    ///
    /// Returns [`Error::InvalidDuration`] for non-positive durations.
    pub fn with_config(duration_secs: f64, config: SessionConfig) -> Result<Self, Error> {
        Ok(Self {
            id: Uuid::new_v4(),
            requested: validate_duration(duration_secs)?,
            config,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The duration that will actually be run, after clamping.
    pub fn requested(&self) -> Duration {
        self.requested
    }

    /// Clear the store, run the sampler until the duration elapses or
    /// `cancel` is set, stop it, and summarize.
    ///
    /// A sampler that is already running is stopped first so that no
    /// pre-session tick lands after the clear. It is left stopped afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Sampler`] if the sampler thread could not start.
    pub fn run<F>(
        self,
        sampler: &mut Sampler,
        cancel: &AtomicBool,
        mut on_progress: F,
    ) -> Result<SessionSummary, Error>
    where
        F: FnMut(&SessionProgress),
    {
        if sampler.is_running() {
            info!("stopping the running sampler before session {}", self.id);
            sampler.stop();
        }
        let store = sampler.store().clone();
        store.clear();

        let started_at = Utc::now();
        sampler.start()?;
        let started = Instant::now();
        info!(
            "session {} started for {:.1}s",
            self.id,
            self.requested.as_secs_f64()
        );

        let mut cancelled = false;
        loop {
            let elapsed = started.elapsed();
            on_progress(&self.progress(elapsed, &store));
            if elapsed >= self.requested {
                break;
            }
            if cancel.load(Ordering::Acquire) {
                cancelled = true;
                break;
            }
            thread::sleep(self.config.progress_interval.min(self.requested - elapsed));
        }

        sampler.stop();
        let actual = started.elapsed();

        let sensors = summarize(&store);
        let total_samples = sensors.values().map(|s| s.sample_count).sum();
        info!(
            "session {} {} after {:.2}s with {total_samples} samples",
            self.id,
            if cancelled { "cancelled" } else { "finished" },
            actual.as_secs_f64()
        );

        Ok(SessionSummary {
            id: self.id.to_string(),
            started_at,
            duration_requested: self.requested.as_secs_f64(),
            duration_actual: actual.as_secs_f64(),
            interval_ms: sampler.config().interval.as_millis() as u64,
            cancelled,
            total_samples,
            sensors_count: sensors.len(),
            sensors,
        })
    }

    fn progress(&self, elapsed: Duration, store: &TimeSeriesStore) -> SessionProgress {
        let stats = store.stats();
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        SessionProgress {
            elapsed,
            requested: self.requested,
            fraction: (elapsed.as_secs_f64() / self.requested.as_secs_f64()).min(1.0),
            samples: stats.total_records,
            sensors: stats.sensors,
            avg_interval_ms: (stats.longest_history > 0)
                .then(|| elapsed_ms / stats.longest_history as f64),
        }
    }
}

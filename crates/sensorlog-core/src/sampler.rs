//! Periodic producer that polls a provider into the store.
//!
//! The sampler is either stopped or running one background thread. Each tick
//! polls the provider once, stamps every kept reading with one shared capture
//! timestamp, and writes them to the store as a single batch. A failed poll
//! is logged and skipped; the loop carries on at the next tick. Missed ticks
//! are never caught up.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::Utc;
use log::{debug, info, warn};
use serde::Serialize;

use crate::provider::{self, ProviderHandle};
use crate::store::TimeSeriesStore;

/// Upper bound on one uninterrupted sleep, so `stop()` is seen promptly.
const SLEEP_SLICE: Duration = Duration::from_millis(10);

/// Errors produced by [`Sampler`].
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("sample interval must be at least 1ms, got {0:?}")]
    InvalidInterval(Duration),
    #[error("failed to spawn sampler thread: {0}")]
    Spawn(#[from] io::Error),
}

/// Sampler timing.
#[derive(Debug, Clone, Copy)]
pub struct SamplerConfig {
    /// Time between the starts of consecutive ticks.
    pub interval: Duration,
    /// How long `stop()` waits for the loop to exit before detaching it.
    pub stop_timeout: Duration,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(100),
            stop_timeout: Duration::from_secs(2),
        }
    }
}

impl SamplerConfig {
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            ..Self::default()
        }
    }

    /// # Errors
    ///
    /// Rejects intervals shorter than one millisecond.
    pub fn validate(&self) -> Result<(), Error> {
        if self.interval < Duration::from_millis(1) {
            return Err(Error::InvalidInterval(self.interval));
        }
        if self.interval < Duration::from_millis(10) || self.interval > Duration::from_secs(1) {
            warn!(
                "sample interval {}ms is outside the recommended 10-1000ms range",
                self.interval.as_millis()
            );
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Counters {
    ticks: AtomicU64,
    skipped_ticks: AtomicU64,
    discarded_readings: AtomicU64,
    records_written: AtomicU64,
}

/// Point-in-time view of the sampler's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SamplerStats {
    pub running: bool,
    /// Ticks whose poll succeeded.
    pub ticks: u64,
    /// Ticks whose poll failed.
    pub skipped_ticks: u64,
    /// Readings dropped at ingestion (kind `Other` or non-finite value).
    pub discarded_readings: u64,
    pub records_written: u64,
}

struct Worker {
    running: Arc<AtomicBool>,
    exited: mpsc::Receiver<()>,
    handle: JoinHandle<()>,
}

/// Fixed-interval producer writing provider snapshots into a store.
pub struct Sampler {
    provider: ProviderHandle,
    store: Arc<TimeSeriesStore>,
    config: SamplerConfig,
    counters: Arc<Counters>,
    worker: Option<Worker>,
}

impl Sampler {
    /// # Errors
    ///
    /// Returns [`Error::InvalidInterval`] if the configuration is invalid.
    pub fn new(
        provider: ProviderHandle,
        store: Arc<TimeSeriesStore>,
        config: SamplerConfig,
    ) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self {
            provider,
            store,
            config,
            counters: Arc::new(Counters::default()),
            worker: None,
        })
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<TimeSeriesStore> {
        &self.store
    }

    pub fn provider(&self) -> &ProviderHandle {
        &self.provider
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    pub fn stats(&self) -> SamplerStats {
        SamplerStats {
            running: self.is_running(),
            ticks: self.counters.ticks.load(Ordering::Relaxed),
            skipped_ticks: self.counters.skipped_ticks.load(Ordering::Relaxed),
            discarded_readings: self.counters.discarded_readings.load(Ordering::Relaxed),
            records_written: self.counters.records_written.load(Ordering::Relaxed),
        }
    }

    /// Launch the sampling thread. Returns `Ok(false)` without doing anything
    /// if it is already running.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Spawn`] if the OS refuses to create the thread.
    pub fn start(&mut self) -> Result<bool, Error> {
        if self.worker.is_some() {
            warn!("sampler is already running");
            return Ok(false);
        }

        let running = Arc::new(AtomicBool::new(true));
        let (exited_tx, exited) = mpsc::channel();
        let ctx = TickContext {
            provider: self.provider.clone(),
            store: Arc::clone(&self.store),
            counters: Arc::clone(&self.counters),
            active: Arc::clone(&running),
        };
        let interval = self.config.interval;
        let flag = Arc::clone(&running);

        let handle = thread::Builder::new()
            .name("sensorlog-sampler".to_string())
            .spawn(move || {
                info!(
                    "sampler started ({}, every {}ms)",
                    ctx.provider.name(),
                    interval.as_millis()
                );
                while flag.load(Ordering::Acquire) {
                    let tick_start = Instant::now();
                    ctx.tick();
                    sleep_until(tick_start + interval, &flag);
                }
                debug!("sampler loop exited");
                let _ = exited_tx.send(());
            })?;

        self.worker = Some(Worker {
            running,
            exited,
            handle,
        });
        Ok(true)
    }

    /// Signal the loop to exit after its current tick and wait for it.
    ///
    /// Returns `false` if the sampler was not running. When the loop does not
    /// exit within `stop_timeout` (a provider call that never returns), the
    /// thread is detached with a warning and this returns anyway; whatever
    /// that stuck poll eventually yields is dropped, not stored.
    pub fn stop(&mut self) -> bool {
        let Some(worker) = self.worker.take() else {
            warn!("sampler is not running");
            return false;
        };

        worker.running.store(false, Ordering::Release);
        match worker.exited.recv_timeout(self.config.stop_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                let _ = worker.handle.join();
                info!("sampler stopped");
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "sampler did not exit within {:?}, detaching it",
                    self.config.stop_timeout
                );
                self.store.fence();
            }
        }
        true
    }

    /// Run one tick synchronously on the calling thread.
    ///
    /// # Errors
    ///
    /// Returns the provider error if the poll failed; nothing is written.
    pub fn sample_once(&self) -> Result<usize, provider::Error> {
        TickContext {
            provider: self.provider.clone(),
            store: Arc::clone(&self.store),
            counters: Arc::clone(&self.counters),
            active: Arc::new(AtomicBool::new(true)),
        }
        .try_tick()
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.stop();
        }
    }
}

impl std::fmt::Debug for Sampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sampler")
            .field("provider", &self.provider)
            .field("config", &self.config)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

struct TickContext {
    provider: ProviderHandle,
    store: Arc<TimeSeriesStore>,
    counters: Arc<Counters>,
    /// Cleared by `stop()`. A batch polled after that is dropped.
    active: Arc<AtomicBool>,
}

impl TickContext {
    fn tick(&self) {
        if let Err(e) = self.try_tick() {
            warn!("skipping tick: {e}");
        }
    }

    fn try_tick(&self) -> Result<usize, provider::Error> {
        let readings = match self.provider.poll() {
            Ok(r) => r,
            Err(e) => {
                self.counters.skipped_ticks.fetch_add(1, Ordering::Relaxed);
                return Err(e);
            }
        };
        let captured_at = Utc::now();

        let total = readings.len();
        let kept = readings.iter().filter_map(|r| {
            let kind = r.kind.sensor_kind()?;
            r.value.is_finite().then_some((r.key.as_str(), r.value, kind))
        });
        let Some(written) = self.store.record_batch_while(&self.active, captured_at, kept) else {
            debug!("sampler stopped during poll, dropping {total} readings");
            return Ok(0);
        };

        self.counters.ticks.fetch_add(1, Ordering::Relaxed);
        self.counters
            .records_written
            .fetch_add(written as u64, Ordering::Relaxed);
        self.counters
            .discarded_readings
            .fetch_add((total - written) as u64, Ordering::Relaxed);
        Ok(written)
    }
}

fn sleep_until(deadline: Instant, running: &AtomicBool) {
    loop {
        let now = Instant::now();
        if now >= deadline || !running.load(Ordering::Acquire) {
            return;
        }
        thread::sleep((deadline - now).min(SLEEP_SLICE));
    }
}

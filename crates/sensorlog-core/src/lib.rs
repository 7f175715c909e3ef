//! # sensorlog-core
//!
//! **Sample hardware sensors into memory, then look at them.**
//!
//! `sensorlog-core` polls a telemetry provider (Linux hwmon, or a simulator)
//! at a fixed interval, keeps a bounded history per sensor, and answers
//! latest-value and time-window queries while sampling continues.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::sync::atomic::AtomicBool;
//!
//! use sensorlog_core::providers::SimulatedProvider;
//! use sensorlog_core::{
//!     CollectionSession, ProviderHandle, Sampler, SamplerConfig, TimeSeriesStore,
//! };
//!
//! let provider = ProviderHandle::new(Box::new(SimulatedProvider::default()));
//! let store = Arc::new(TimeSeriesStore::default());
//! let mut sampler = Sampler::new(provider, store.clone(), SamplerConfig::default()).unwrap();
//!
//! // Collect for five seconds, then summarize
//! let cancel = AtomicBool::new(false);
//! let summary = CollectionSession::new(5.0)
//!     .unwrap()
//!     .run(&mut sampler, &cancel, |p| println!("{:.0}%", p.fraction * 100.0))
//!     .unwrap();
//! println!("{} samples from {} sensors", summary.total_samples, summary.sensors_count);
//!
//! // Time-aligned rows, one column per sensor
//! print!("{}", sensorlog_core::TabularExport::from_store(&store).to_csv_string());
//! ```
//!
//! ## Architecture
//!
//! Provider → Sampler (background thread) → TimeSeriesStore → queries / exporters
//!
//! - [`Sampler`] stamps each tick's readings with one shared timestamp, so
//!   the tabular exporter can align sensors on exact timestamps.
//! - [`TimeSeriesStore`] holds one [`BoundedHistory`] per key behind a single
//!   lock. The oldest records are evicted at capacity.
//! - [`CollectionSession`] runs the sampler for a bounded duration and
//!   summarizes the result.
//! - [`ControlGateway`] writes control outputs straight to the provider.

pub mod control;
pub mod export;
pub mod history;
pub mod provider;
pub mod providers;
pub mod sampler;
pub mod sensor;
pub mod session;
pub mod store;

pub use control::{ControlGateway, ControlOutcome};
pub use export::{Format, StructuredExport, TabularExport, default_file_name};
pub use history::{BoundedHistory, DEFAULT_CAPACITY};
pub use provider::{ProviderHandle, TelemetryProvider};
pub use sampler::{Sampler, SamplerConfig, SamplerStats};
pub use sensor::{Reading, ReadingKind, SensorKind, SensorRecord};
pub use session::{
    CollectionSession, MAX_SESSION_SECS, SensorSummary, SessionConfig, SessionProgress,
    SessionSummary, summarize,
};
pub use store::{StoreStats, TimeSeriesStore};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

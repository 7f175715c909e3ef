//! Telemetry provider implementations.

pub mod hwmon;
pub mod simulated;

pub use hwmon::{DEFAULT_HWMON_ROOT, HwmonProvider};
pub use simulated::SimulatedProvider;

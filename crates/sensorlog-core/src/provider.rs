//! Telemetry provider capability and its shared handle.
//!
//! A provider is whatever actually talks to the hardware. The core only needs
//! two things from it: a snapshot of current readings, and a way to set a
//! control output. Every provider implements [`TelemetryProvider`]; the
//! sampler and the control gateway share one through a [`ProviderHandle`],
//! which serializes their calls so providers need not be reentrant.

use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use crate::sensor::Reading;

/// Errors produced by telemetry providers.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The provider could not be opened. Fatal at startup.
    #[error("telemetry provider unavailable: {0}")]
    Unavailable(String),
    /// Wrapper around [`io::Error`] with the path involved.
    #[error("[{}] io error: {err}", path.display())]
    Io {
        /// File or directory being accessed
        path: PathBuf,
        /// The underlying error
        err: io::Error,
    },
    /// A value could not be parsed.
    #[error("malformed reading at {}: {raw:?}", path.display())]
    Malformed {
        /// File the value came from
        path: PathBuf,
        /// The raw text
        raw: String,
    },
}

/// Source of hardware readings and sink for control outputs.
pub trait TelemetryProvider: Send {
    /// Short identifier used in logs (e.g. `"hwmon"`).
    fn name(&self) -> &str;

    /// Return the current set of readings.
    ///
    /// # Errors
    ///
    /// Returns an error if the hardware could not be read at all. Individual
    /// unreadable sensors should be skipped rather than failing the poll.
    fn poll(&mut self) -> Result<Vec<Reading>, Error>;

    /// Set the control output `key` to `percent` (already validated to lie in
    /// `0..=100`). Returns `Ok(false)` if there is no control entry `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the control exists but could not be written.
    fn set_control(&mut self, key: &str, percent: f64) -> Result<bool, Error>;
}

/// Cloneable, serialized access to one provider.
#[derive(Clone)]
pub struct ProviderHandle {
    inner: Arc<Mutex<Box<dyn TelemetryProvider>>>,
    name: Arc<str>,
}

impl ProviderHandle {
    pub fn new(provider: Box<dyn TelemetryProvider>) -> Self {
        let name: Arc<str> = Arc::from(provider.name());
        Self {
            inner: Arc::new(Mutex::new(provider)),
            name,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Poll the provider. Blocks while another caller is using it.
    pub fn poll(&self) -> Result<Vec<Reading>, Error> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .poll()
    }

    /// Forward a control request. Blocks while another caller is using it.
    pub fn set_control(&self, key: &str, percent: f64) -> Result<bool, Error> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .set_control(key, percent)
    }
}

impl std::fmt::Debug for ProviderHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderHandle")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::ReadingKind;

    struct Fixed(Vec<Reading>);

    impl TelemetryProvider for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn poll(&mut self) -> Result<Vec<Reading>, Error> {
            Ok(self.0.clone())
        }

        fn set_control(&mut self, key: &str, percent: f64) -> Result<bool, Error> {
            for r in &mut self.0 {
                if r.key == key && r.kind == ReadingKind::ControlOutput {
                    r.value = percent;
                    return Ok(true);
                }
            }
            Ok(false)
        }
    }

    #[test]
    fn handle_clones_share_one_provider() {
        let handle = ProviderHandle::new(Box::new(Fixed(vec![Reading::new(
            "pwm1",
            10.0,
            ReadingKind::ControlOutput,
        )])));
        let other = handle.clone();
        assert_eq!(handle.name(), "fixed");

        assert!(other.set_control("pwm1", 75.0).unwrap());
        assert!(!other.set_control("pwm9", 75.0).unwrap());
        assert_eq!(handle.poll().unwrap()[0].value, 75.0);
    }

    #[test]
    fn io_error_names_the_path() {
        let err = Error::Io {
            path: PathBuf::from("/sys/class/hwmon/hwmon0/pwm1"),
            err: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        let msg = err.to_string();
        assert!(msg.contains("hwmon0/pwm1"));
        assert!(msg.contains("denied"));
    }
}

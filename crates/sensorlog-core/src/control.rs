//! Validated pass-through to a provider's control outputs.
//!
//! Setting an output never touches the time-series store. The new value shows
//! up in history only when the sampler next reads it back.

use log::{info, warn};
use serde::Serialize;

use crate::provider::ProviderHandle;

/// Errors produced by [`ControlGateway`].
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("percent must be between 0 and 100, got {0}")]
    PercentOutOfRange(f64),
}

/// Outcome of a validated control request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlOutcome {
    /// `false` when no control entry matched or the write failed.
    pub success: bool,
    pub key: String,
    pub percent: f64,
}

#[derive(Debug, Clone)]
pub struct ControlGateway {
    provider: ProviderHandle,
}

impl ControlGateway {
    pub fn new(provider: ProviderHandle) -> Self {
        Self { provider }
    }

    /// Set control output `key` to `percent`.
    ///
    /// Out-of-range values are rejected without calling the provider. A
    /// provider failure is logged and reported as `success: false`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PercentOutOfRange`] unless `0 <= percent <= 100`.
    pub fn set_output(&self, key: &str, percent: f64) -> Result<ControlOutcome, Error> {
        if !(0.0..=100.0).contains(&percent) {
            return Err(Error::PercentOutOfRange(percent));
        }

        let success = match self.provider.set_control(key, percent) {
            Ok(true) => {
                info!("set {key} to {percent:.1}%");
                true
            }
            Ok(false) => {
                warn!("no control output named {key}");
                false
            }
            Err(e) => {
                warn!("failed to set {key}: {e}");
                false
            }
        };

        Ok(ControlOutcome {
            success,
            key: key.to_string(),
            percent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{self, TelemetryProvider};
    use crate::sensor::Reading;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Counting {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    impl TelemetryProvider for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        fn poll(&mut self) -> Result<Vec<Reading>, provider::Error> {
            Ok(Vec::new())
        }

        fn set_control(&mut self, key: &str, _percent: f64) -> Result<bool, provider::Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(provider::Error::Io {
                    path: PathBuf::from("/sys/class/hwmon/hwmon1/pwm1"),
                    err: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
                });
            }
            Ok(key == "pwm1")
        }
    }

    fn gateway(fail: bool) -> (ControlGateway, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = Counting {
            calls: Arc::clone(&calls),
            fail,
        };
        (
            ControlGateway::new(ProviderHandle::new(Box::new(provider))),
            calls,
        )
    }

    #[test]
    fn out_of_range_never_reaches_provider() {
        let (gw, calls) = gateway(false);
        for bad in [-0.1, 100.5, 150.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                gw.set_output("pwm1", bad),
                Err(Error::PercentOutOfRange(_))
            ));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn bounds_are_inclusive() {
        let (gw, calls) = gateway(false);
        assert!(gw.set_output("pwm1", 0.0).unwrap().success);
        assert!(gw.set_output("pwm1", 100.0).unwrap().success);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unknown_key_reports_failure() {
        let (gw, _) = gateway(false);
        let outcome = gw.set_output("fan9", 40.0).unwrap();
        assert_eq!(
            outcome,
            ControlOutcome {
                success: false,
                key: "fan9".into(),
                percent: 40.0
            }
        );
    }

    #[test]
    fn provider_error_is_not_success() {
        let (gw, calls) = gateway(true);
        assert!(!gw.set_output("pwm1", 40.0).unwrap().success);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

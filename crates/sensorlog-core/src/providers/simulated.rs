//! Synthetic hardware for demos and for machines without hwmon.
//!
//! Each simulated fan has a PWM control and a tachometer whose RPM follows
//! its duty with a slow sinusoidal wobble. The CPU temperature falls as the
//! average duty rises.

use std::f64::consts::TAU;
use std::time::Instant;

use log::info;

use crate::provider::{Error, TelemetryProvider};
use crate::sensor::{Reading, ReadingKind};

const CHIP: &str = "sim";

#[derive(Debug, Clone)]
struct SimFan {
    index: usize,
    duty: f64,
    max_rpm: f64,
    wobble_hz: f64,
}

/// Deterministic, time-driven fake provider.
#[derive(Debug)]
pub struct SimulatedProvider {
    started: Instant,
    fans: Vec<SimFan>,
}

impl Default for SimulatedProvider {
    fn default() -> Self {
        Self::new(2)
    }
}

impl SimulatedProvider {
    /// Simulate `fans` fan/PWM pairs, all starting at 50% duty.
    pub fn new(fans: usize) -> Self {
        let fans = (1..=fans)
            .map(|index| SimFan {
                index,
                duty: 50.0,
                max_rpm: 1500.0 + 500.0 * index as f64,
                wobble_hz: index as f64,
            })
            .collect();
        Self {
            started: Instant::now(),
            fans,
        }
    }

    /// Readings as they would be `t` seconds after start.
    pub fn readings_at(&self, t: f64) -> Vec<Reading> {
        let mut out = Vec::with_capacity(self.fans.len() * 2 + 2);

        let avg_duty = if self.fans.is_empty() {
            0.0
        } else {
            self.fans.iter().map(|f| f.duty).sum::<f64>() / self.fans.len() as f64
        };
        let temp = 35.0 + 20.0 * (1.0 - avg_duty / 100.0) + 1.5 * (TAU * 0.05 * t).sin();
        out.push(
            Reading::new(format!("{CHIP}_cpu_package"), temp, ReadingKind::Temperature)
                .with_limits(None, Some(100.0)),
        );

        for fan in &self.fans {
            let base = fan.max_rpm * fan.duty / 100.0;
            let rpm = (base + 0.1 * base * (TAU * fan.wobble_hz * t).sin()).max(0.0);
            out.push(
                Reading::new(format!("{CHIP}_fan{}", fan.index), rpm, ReadingKind::TachReading)
                    .with_limits(Some(0.0), Some(fan.max_rpm * 1.1)),
            );
            out.push(Reading::new(
                format!("{CHIP}_pwm{}", fan.index),
                fan.duty,
                ReadingKind::ControlOutput,
            ));
        }

        out.push(Reading::new(format!("{CHIP}_vcore"), 1.2, ReadingKind::Other));
        out
    }
}

impl TelemetryProvider for SimulatedProvider {
    fn name(&self) -> &str {
        "sim"
    }

    fn poll(&mut self) -> Result<Vec<Reading>, Error> {
        Ok(self.readings_at(self.started.elapsed().as_secs_f64()))
    }

    fn set_control(&mut self, key: &str, percent: f64) -> Result<bool, Error> {
        let Some(fan) = self
            .fans
            .iter_mut()
            .find(|f| format!("{CHIP}_pwm{}", f.index) == key)
        else {
            return Ok(false);
        };
        fan.duty = percent.clamp(0.0, 100.0);
        info!("sim: {key} set to {percent:.1}%");
        Ok(true)
    }
}

//! Sensor kinds, stored records, and raw provider readings.
//!
//! A [`Reading`] is what a telemetry provider hands back from a poll. Only
//! readings whose [`ReadingKind`] maps onto a [`SensorKind`] are kept; the
//! sampler turns those into immutable [`SensorRecord`]s.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};

/// RFC 3339 in UTC with microsecond precision and a `Z` suffix. Every
/// timestamp written by an export or the HTTP API uses this form.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// `serialize_with` adapter for [`format_timestamp`].
pub fn serialize_timestamp<S: Serializer>(
    ts: &DateTime<Utc>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&format_timestamp(ts))
}

/// Kind of a stored sensor stream. Fixed at the first observation of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SensorKind {
    /// Temperature in degrees Celsius.
    Temperature,
    /// Fan tachometer reading in RPM.
    #[serde(rename = "Fan")]
    TachReading,
    /// Control output (PWM duty) in percent.
    #[serde(rename = "Control")]
    ControlOutput,
}

impl SensorKind {
    /// Every kind the sampler stores.
    pub const ALL: [SensorKind; 3] = [
        SensorKind::Temperature,
        SensorKind::TachReading,
        SensorKind::ControlOutput,
    ];

    /// Display unit for values of this kind.
    pub fn unit(self) -> &'static str {
        match self {
            Self::Temperature => "°C",
            Self::TachReading => "RPM",
            Self::ControlOutput => "%",
        }
    }

    /// Format a value with this kind's unit and precision.
    pub fn format_value(self, value: f64) -> String {
        match self {
            Self::Temperature => format!("{value:6.1} {}", self.unit()),
            Self::TachReading => format!("{value:6.0} {}", self.unit()),
            Self::ControlOutput => format!("{value:6.1} {}", self.unit()),
        }
    }
}

impl std::fmt::Display for SensorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Temperature => write!(f, "Temperature"),
            Self::TachReading => write!(f, "Fan"),
            Self::ControlOutput => write!(f, "Control"),
        }
    }
}

/// One timestamped value. Never mutated after it is stored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorRecord {
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    #[serde(rename = "type")]
    pub kind: SensorKind,
}

impl SensorRecord {
    pub fn new(timestamp: DateTime<Utc>, value: f64, kind: SensorKind) -> Self {
        Self {
            timestamp,
            value,
            kind,
        }
    }
}

/// Kind of a reading as reported by a provider, before ingestion filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadingKind {
    Temperature,
    TachReading,
    ControlOutput,
    /// Voltages, currents, power and anything else the provider exposes.
    Other,
}

impl ReadingKind {
    /// The stored kind, or `None` for readings the sampler discards.
    pub fn sensor_kind(self) -> Option<SensorKind> {
        match self {
            Self::Temperature => Some(SensorKind::Temperature),
            Self::TachReading => Some(SensorKind::TachReading),
            Self::ControlOutput => Some(SensorKind::ControlOutput),
            Self::Other => None,
        }
    }
}

impl From<SensorKind> for ReadingKind {
    fn from(kind: SensorKind) -> Self {
        match kind {
            SensorKind::Temperature => Self::Temperature,
            SensorKind::TachReading => Self::TachReading,
            SensorKind::ControlOutput => Self::ControlOutput,
        }
    }
}

impl std::fmt::Display for ReadingKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.sensor_kind() {
            Some(kind) => write!(f, "{kind}"),
            None => write!(f, "Other"),
        }
    }
}

/// A single reading returned by [`TelemetryProvider::poll`].
///
/// `min` and `max` are the provider's own limits or extremes when it reports
/// them; the core does not interpret them.
///
/// [`TelemetryProvider::poll`]: crate::provider::TelemetryProvider::poll
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    /// Unique per (hardware component, reading name) pair.
    pub key: String,
    pub value: f64,
    pub kind: ReadingKind,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl Reading {
    pub fn new(key: impl Into<String>, value: f64, kind: ReadingKind) -> Self {
        Self {
            key: key.into(),
            value,
            kind,
            min: None,
            max: None,
        }
    }

    pub fn with_limits(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min = min;
        self.max = max;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn other_readings_have_no_sensor_kind() {
        assert_eq!(ReadingKind::Other.sensor_kind(), None);
        for kind in SensorKind::ALL {
            assert_eq!(ReadingKind::from(kind).sensor_kind(), Some(kind));
        }
    }

    #[test]
    fn record_serializes_type_names() {
        let ts = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let rec = SensorRecord::new(ts, 1200.0, SensorKind::TachReading);
        let json = serde_json::to_value(rec).unwrap();
        assert_eq!(json["type"], "Fan");
        assert_eq!(json["value"], 1200.0);
        assert!(json["timestamp"].as_str().unwrap().starts_with("2026-01-01T00:00:00"));

        let ctl = SensorRecord::new(ts, 40.0, SensorKind::ControlOutput);
        assert_eq!(serde_json::to_value(ctl).unwrap()["type"], "Control");
    }

    #[test]
    fn timestamps_serialize_with_microseconds() {
        use chrono::Timelike;

        let ts = DateTime::parse_from_rfc3339("2026-01-01T00:00:00.123456789Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(format_timestamp(&ts), "2026-01-01T00:00:00.123456Z");

        let rec = SensorRecord::new(ts, 1.0, SensorKind::Temperature);
        let json = serde_json::to_value(rec).unwrap();
        assert_eq!(json["timestamp"], format_timestamp(&ts));

        let back: SensorRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back.timestamp, ts.with_nanosecond(123_456_000).unwrap());
    }

    #[test]
    fn format_value_uses_units() {
        assert_eq!(SensorKind::Temperature.format_value(45.0), "  45.0 °C");
        assert_eq!(SensorKind::TachReading.format_value(1234.4), "  1234 RPM");
        assert_eq!(SensorKind::ControlOutput.format_value(50.0), "  50.0 %");
    }
}

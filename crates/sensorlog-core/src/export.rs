//! Structured (JSON) and tabular (CSV) exports of the store's contents.
//!
//! # Formats
//!
//! - JSON: `{"timestamp", "sample_interval_ms", "sensors": {key: [record, ...]}}`
//!   with keys in first-observation order.
//! - CSV: header `timestamp,<key1>,<key2>,...`, then one row per distinct
//!   captured timestamp. A cell is empty when that key has no record at that
//!   exact timestamp.
//!
//! Payloads are built completely in memory and written through a temporary
//! file in the destination directory, so a failed export never leaves a
//! partial file behind.

use std::collections::{BTreeSet, HashMap};
use std::fmt::Write as _;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::info;
use serde::{Serialize, Serializer};
use tempfile::NamedTempFile;

use crate::sensor::{SensorRecord, format_timestamp, serialize_timestamp};
use crate::store::TimeSeriesStore;

/// Errors produced while exporting.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Wrapper around [`io::Error`] with what was being done.
    #[error("{context}: {err}")]
    Io {
        /// What the exporter was doing
        context: String,
        /// The underlying error
        err: io::Error,
    },
    #[error("failed to serialize export: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to move export into place: {0}")]
    Persist(#[from] tempfile::PersistError),
}

/// Export file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Csv,
}

impl Format {
    pub fn extension(self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::Csv => "csv",
        }
    }
}

/// `sensor_data_<YYYYmmdd_HHMMSS>.<ext>` for the given moment.
pub fn default_file_name(format: Format, at: DateTime<Utc>) -> String {
    format!(
        "sensor_data_{}.{}",
        at.format("%Y%m%d_%H%M%S"),
        format.extension()
    )
}

// ---------------------------------------------------------------------------
// Structured export
// ---------------------------------------------------------------------------

/// Every retained record, grouped by key.
#[derive(Debug, Clone, Serialize)]
pub struct StructuredExport {
    /// When the export was taken.
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub sample_interval_ms: u64,
    #[serde(serialize_with = "ordered_map")]
    pub sensors: Vec<(String, Vec<SensorRecord>)>,
}

fn ordered_map<S: Serializer>(
    sensors: &[(String, Vec<SensorRecord>)],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_map(sensors.iter().map(|(key, records)| (key, records)))
}

impl StructuredExport {
    /// Copy the store's contents.
    pub fn from_store(store: &TimeSeriesStore, sample_interval_ms: u64) -> Self {
        Self {
            timestamp: Utc::now(),
            sample_interval_ms,
            sensors: store.snapshot(),
        }
    }

    /// Pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    pub fn to_json_string(&self) -> Result<String, Error> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Total records across all keys.
    pub fn record_count(&self) -> usize {
        self.sensors.iter().map(|(_, records)| records.len()).sum()
    }
}

// ---------------------------------------------------------------------------
// Tabular export
// ---------------------------------------------------------------------------

/// Time-aligned rows: an outer join of every key's history on exact
/// timestamp equality. No interpolation.
#[derive(Debug, Clone, PartialEq)]
pub struct TabularExport {
    /// Keys, in first-observation order. The CSV prepends `timestamp`.
    pub keys: Vec<String>,
    pub rows: Vec<TabularRow>,
}

/// One captured timestamp and each key's value at it.
#[derive(Debug, Clone, PartialEq)]
pub struct TabularRow {
    pub timestamp: DateTime<Utc>,
    /// Parallel to [`TabularExport::keys`].
    pub values: Vec<Option<f64>>,
}

impl TabularExport {
    pub fn from_store(store: &TimeSeriesStore) -> Self {
        Self::from_snapshot(&store.snapshot())
    }

    pub fn from_snapshot(snapshot: &[(String, Vec<SensorRecord>)]) -> Self {
        let by_time: Vec<HashMap<DateTime<Utc>, f64>> = snapshot
            .iter()
            .map(|(_, records)| records.iter().map(|r| (r.timestamp, r.value)).collect())
            .collect();

        let timestamps: BTreeSet<DateTime<Utc>> = snapshot
            .iter()
            .flat_map(|(_, records)| records.iter().map(|r| r.timestamp))
            .collect();

        let rows = timestamps
            .into_iter()
            .map(|timestamp| TabularRow {
                timestamp,
                values: by_time.iter().map(|m| m.get(&timestamp).copied()).collect(),
            })
            .collect();

        Self {
            keys: snapshot.iter().map(|(key, _)| key.clone()).collect(),
            rows,
        }
    }

    pub fn to_csv_string(&self) -> String {
        let mut out = String::from("timestamp");
        for key in &self.keys {
            out.push(',');
            out.push_str(&csv_field(key));
        }
        out.push('\n');

        for row in &self.rows {
            out.push_str(&format_timestamp(&row.timestamp));
            for value in &row.values {
                out.push(',');
                if let Some(v) = value {
                    let _ = write!(out, "{v}");
                }
            }
            out.push('\n');
        }
        out
    }
}

/// Quote a CSV field if it contains a separator, quote, or line break.
fn csv_field(raw: &str) -> String {
    if raw.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}

// ---------------------------------------------------------------------------
// File output
// ---------------------------------------------------------------------------

/// Write `contents` to `path` in one step: temp file in the same directory,
/// then rename over the destination.
///
/// # Errors
///
/// Returns [`Error::Io`] if the temp file cannot be created or written and
/// [`Error::Persist`] if the final rename fails.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), Error> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(|err| Error::Io {
        context: format!("failed to create temp file in {}", dir.display()),
        err,
    })?;
    tmp.write_all(contents)
        .and_then(|()| tmp.flush())
        .map_err(|err| Error::Io {
            context: format!("failed to write {}", path.display()),
            err,
        })?;
    tmp.persist(path)?;
    Ok(())
}

/// Export the store as JSON into `path`.
///
/// # Errors
///
/// See [`write_atomic`].
pub fn write_json(
    store: &TimeSeriesStore,
    sample_interval_ms: u64,
    path: &Path,
) -> Result<PathBuf, Error> {
    let export = StructuredExport::from_store(store, sample_interval_ms);
    write_atomic(path, export.to_json_string()?.as_bytes())?;
    info!(
        "exported {} records for {} sensors to {}",
        export.record_count(),
        export.sensors.len(),
        path.display()
    );
    Ok(path.to_path_buf())
}

/// Export the store as CSV into `path`.
///
/// # Errors
///
/// See [`write_atomic`].
pub fn write_csv(store: &TimeSeriesStore, path: &Path) -> Result<PathBuf, Error> {
    let export = TabularExport::from_store(store);
    write_atomic(path, export.to_csv_string().as_bytes())?;
    info!(
        "exported {} rows x {} sensors to {}",
        export.rows.len(),
        export.keys.len(),
        path.display()
    );
    Ok(path.to_path_buf())
}

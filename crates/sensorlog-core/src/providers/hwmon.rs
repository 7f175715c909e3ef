//! Linux hwmon provider.
//!
//! Reads `/sys/class/hwmon/hwmon*/` (or any directory laid out the same way):
//! - `tempN_input` millidegrees Celsius → [`ReadingKind::Temperature`]
//! - `fanN_input` RPM → [`ReadingKind::TachReading`]
//! - `pwmN` duty 0–255 → [`ReadingKind::ControlOutput`] in percent
//! - `inN_input`, `currN_input`, `powerN_input` → [`ReadingKind::Other`]
//!
//! Keys are `<chip>_<label>`, with the chip taken from the `name` file and the
//! label from `<stem>_label` when present.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::provider::{Error, TelemetryProvider};
use crate::sensor::{Reading, ReadingKind};

/// Standard sysfs location of hwmon chips.
pub const DEFAULT_HWMON_ROOT: &str = "/sys/class/hwmon";

const PWM_MAX: f64 = 255.0;

#[derive(Debug, Clone)]
struct Channel {
    key: String,
    kind: ReadingKind,
    input: PathBuf,
    /// Divisor turning the raw sysfs integer into the reported unit.
    scale: f64,
    min: Option<PathBuf>,
    max: Option<PathBuf>,
    /// `pwmN_enable`, switched to manual mode before writing a duty.
    enable: Option<PathBuf>,
}

impl Channel {
    fn read(&self) -> Result<Reading, Error> {
        let value = read_number(&self.input)? / self.scale;
        let limit = |p: &Option<PathBuf>| {
            p.as_deref()
                .and_then(|p| read_number(p).ok())
                .map(|v| v / self.scale)
        };
        Ok(Reading::new(self.key.clone(), value, self.kind)
            .with_limits(limit(&self.min), limit(&self.max)))
    }
}

/// Telemetry provider backed by hwmon sysfs files.
#[derive(Debug)]
pub struct HwmonProvider {
    channels: Vec<Channel>,
}

impl HwmonProvider {
    /// Discover every channel under `root`.
    ///
    /// # Errors
    ///
    /// Fails when `root` cannot be listed or contains no usable channel.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, Error> {
        let root = root.as_ref().to_path_buf();
        let entries = read_dir_sorted(&root).map_err(|err| {
            Error::Unavailable(format!("cannot list {}: {err}", root.display()))
        })?;

        let mut channels = Vec::new();
        let mut chips_seen = HashSet::new();
        for dir in entries {
            if !dir.is_dir() {
                continue;
            }
            let dir_name = dir
                .file_name()
                .and_then(|s| s.to_str())
                .unwrap_or("hwmon")
                .to_string();
            let mut chip = read_trimmed(&dir.join("name"))
                .map(|s| normalize_key(&s))
                .unwrap_or_else(|| normalize_key(&dir_name));
            // Two identical chips (e.g. a pair of nvme drives) stay distinct.
            if !chips_seen.insert(chip.clone()) {
                chip = format!("{chip}_{}", normalize_key(&dir_name));
                chips_seen.insert(chip.clone());
            }
            discover_chip(&dir, &chip, &mut channels);
        }

        if channels.is_empty() {
            return Err(Error::Unavailable(format!(
                "no hwmon sensors found under {}",
                root.display()
            )));
        }
        info!(
            "hwmon: {} channels under {}",
            channels.len(),
            root.display()
        );
        Ok(Self { channels })
    }

    /// Number of discovered channels, of every kind.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

impl TelemetryProvider for HwmonProvider {
    fn name(&self) -> &str {
        "hwmon"
    }

    fn poll(&mut self) -> Result<Vec<Reading>, Error> {
        let mut readings = Vec::with_capacity(self.channels.len());
        let mut first_err = None;
        for channel in &self.channels {
            match channel.read() {
                Ok(r) if r.value.is_finite() => readings.push(r),
                Ok(_) => {}
                Err(e) => {
                    debug!("hwmon: skipping {}: {e}", channel.key);
                    first_err.get_or_insert(e);
                }
            }
        }
        match first_err {
            Some(e) if readings.is_empty() => Err(e),
            _ => Ok(readings),
        }
    }

    fn set_control(&mut self, key: &str, percent: f64) -> Result<bool, Error> {
        let Some(channel) = self
            .channels
            .iter()
            .find(|c| c.kind == ReadingKind::ControlOutput && c.key == key)
        else {
            return Ok(false);
        };

        if let Some(enable) = &channel.enable {
            write_value(enable, "1")?;
        }
        let duty = (percent.clamp(0.0, 100.0) * PWM_MAX / 100.0).round() as u8;
        write_value(&channel.input, &duty.to_string())?;
        info!("hwmon: {key} set to {percent:.1}% (duty {duty})");
        Ok(true)
    }
}

fn discover_chip(dir: &Path, chip: &str, out: &mut Vec<Channel>) {
    let Ok(files) = read_dir_sorted(dir) else {
        return;
    };
    for path in files {
        let Some(fname) = path.file_name().and_then(|s| s.to_str()) else {
            continue;
        };

        if let Some(stem) = fname.strip_suffix("_input") {
            let (kind, scale) = if stem.starts_with("temp") {
                (ReadingKind::Temperature, 1000.0)
            } else if stem.starts_with("fan") {
                (ReadingKind::TachReading, 1.0)
            } else if stem.starts_with("in") || stem.starts_with("curr") {
                (ReadingKind::Other, 1000.0)
            } else if stem.starts_with("power") {
                (ReadingKind::Other, 1_000_000.0)
            } else {
                continue;
            };
            out.push(Channel {
                key: format!("{chip}_{}", label_for(dir, stem)),
                kind,
                input: path.clone(),
                scale,
                min: existing(dir.join(format!("{stem}_min"))),
                max: existing(dir.join(format!("{stem}_max"))),
                enable: None,
            });
        } else if is_pwm_file(fname) {
            out.push(Channel {
                key: format!("{chip}_{}", label_for(dir, fname)),
                kind: ReadingKind::ControlOutput,
                input: path.clone(),
                scale: PWM_MAX / 100.0,
                min: None,
                max: None,
                enable: existing(dir.join(format!("{fname}_enable"))),
            });
        }
    }
}

/// `pwm1`, `pwm2`, ... but not `pwm1_enable` or `pwm1_mode`.
fn is_pwm_file(fname: &str) -> bool {
    fname
        .strip_prefix("pwm")
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

fn label_for(dir: &Path, stem: &str) -> String {
    read_trimmed(&dir.join(format!("{stem}_label")))
        .map(|s| normalize_key(&s))
        .unwrap_or_else(|| normalize_key(stem))
}

fn existing(path: PathBuf) -> Option<PathBuf> {
    path.exists().then_some(path)
}

fn read_dir_sorted(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .flatten()
        .map(|e| e.path())
        .collect();
    paths.sort();
    Ok(paths)
}

fn read_trimmed(path: &Path) -> Option<String> {
    let raw = fs::read_to_string(path).ok()?;
    let v = raw.trim();
    if v.is_empty() {
        None
    } else {
        Some(v.to_string())
    }
}

fn read_number(path: &Path) -> Result<f64, Error> {
    let raw = fs::read_to_string(path).map_err(|err| Error::Io {
        path: path.to_path_buf(),
        err,
    })?;
    raw.trim().parse::<f64>().map_err(|_| Error::Malformed {
        path: path.to_path_buf(),
        raw: raw.trim().to_string(),
    })
}

fn write_value(path: &Path, value: &str) -> Result<(), Error> {
    fs::write(path, value).map_err(|err| Error::Io {
        path: path.to_path_buf(),
        err,
    })
}

/// Lowercase, with runs of non-alphanumerics collapsed to one `_`.
fn normalize_key(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut prev_us = false;
    for ch in raw.to_ascii_lowercase().chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch);
            prev_us = false;
        } else if !prev_us {
            out.push('_');
            prev_us = true;
        }
    }
    out.trim_matches('_').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, contents: &str) {
        fs::write(dir.join(name), contents).unwrap();
    }

    /// Two chips: a CPU sensor and a Super I/O chip with one fan and PWM.
    fn fake_tree() -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();

        let cpu = tmp.path().join("hwmon0");
        fs::create_dir(&cpu).unwrap();
        write(&cpu, "name", "coretemp\n");
        write(&cpu, "temp1_input", "45500\n");
        write(&cpu, "temp1_label", "Package id 0\n");
        write(&cpu, "temp1_max", "100000\n");

        let sio = tmp.path().join("hwmon1");
        fs::create_dir(&sio).unwrap();
        write(&sio, "name", "nct6798\n");
        write(&sio, "fan1_input", "1180\n");
        write(&sio, "fan1_label", "CPU FAN\n");
        write(&sio, "pwm1", "128\n");
        write(&sio, "pwm1_enable", "5\n");
        write(&sio, "in0_input", "1200\n");
        tmp
    }

    #[test]
    fn normalize_key_collapses_separators() {
        assert_eq!(normalize_key("Package id 0"), "package_id_0");
        assert_eq!(normalize_key("  CPU--FAN "), "cpu_fan");
    }

    #[test]
    fn pwm_file_detection() {
        assert!(is_pwm_file("pwm1"));
        assert!(is_pwm_file("pwm12"));
        assert!(!is_pwm_file("pwm"));
        assert!(!is_pwm_file("pwm1_enable"));
    }

    #[test]
    fn discovers_and_scales_readings() {
        let tmp = fake_tree();
        let mut provider = HwmonProvider::open(tmp.path()).unwrap();
        assert_eq!(provider.channel_count(), 4);

        let readings = provider.poll().unwrap();
        let get = |key: &str| readings.iter().find(|r| r.key == key).unwrap().clone();

        let temp = get("coretemp_package_id_0");
        assert_eq!(temp.kind, ReadingKind::Temperature);
        assert!((temp.value - 45.5).abs() < 1e-9);
        assert_eq!(temp.max, Some(100.0));

        let fan = get("nct6798_cpu_fan");
        assert_eq!(fan.kind, ReadingKind::TachReading);
        assert_eq!(fan.value, 1180.0);

        let pwm = get("nct6798_pwm1");
        assert_eq!(pwm.kind, ReadingKind::ControlOutput);
        assert!((pwm.value - 128.0 * 100.0 / 255.0).abs() < 1e-9);

        assert_eq!(get("nct6798_in0").kind, ReadingKind::Other);
    }

    #[test]
    fn set_control_writes_duty_and_manual_mode() {
        let tmp = fake_tree();
        let mut provider = HwmonProvider::open(tmp.path()).unwrap();

        assert!(provider.set_control("nct6798_pwm1", 100.0).unwrap());
        let sio = tmp.path().join("hwmon1");
        assert_eq!(fs::read_to_string(sio.join("pwm1")).unwrap(), "255");
        assert_eq!(fs::read_to_string(sio.join("pwm1_enable")).unwrap(), "1");

        assert!(provider.set_control("nct6798_pwm1", 50.0).unwrap());
        assert_eq!(fs::read_to_string(sio.join("pwm1")).unwrap(), "128");
    }

    #[test]
    fn set_control_unknown_or_non_control_key() {
        let tmp = fake_tree();
        let mut provider = HwmonProvider::open(tmp.path()).unwrap();
        assert!(!provider.set_control("nct6798_pwm7", 10.0).unwrap());
        assert!(!provider.set_control("nct6798_cpu_fan", 10.0).unwrap());
    }

    #[test]
    fn duplicate_chip_names_get_distinct_keys() {
        let tmp = tempfile::tempdir().unwrap();
        for dir in ["hwmon2", "hwmon3"] {
            let d = tmp.path().join(dir);
            fs::create_dir(&d).unwrap();
            write(&d, "name", "nvme");
            write(&d, "temp1_input", "30000");
        }
        let mut provider = HwmonProvider::open(tmp.path()).unwrap();
        let mut keys: Vec<String> = provider.poll().unwrap().into_iter().map(|r| r.key).collect();
        keys.sort();
        assert_eq!(keys, vec!["nvme_hwmon3_temp1", "nvme_temp1"]);
    }

    #[test]
    fn open_fails_without_sensors() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(matches!(
            HwmonProvider::open(tmp.path()),
            Err(Error::Unavailable(_))
        ));
        assert!(matches!(
            HwmonProvider::open(tmp.path().join("missing")),
            Err(Error::Unavailable(_))
        ));
    }

    #[test]
    fn poll_skips_unreadable_channels() {
        let tmp = fake_tree();
        let mut provider = HwmonProvider::open(tmp.path()).unwrap();
        fs::remove_file(tmp.path().join("hwmon1/fan1_input")).unwrap();
        let readings = provider.poll().unwrap();
        assert_eq!(readings.len(), 3);
        assert!(readings.iter().all(|r| r.key != "nct6798_cpu_fan"));
    }

    #[test]
    fn poll_fails_when_everything_is_gone() {
        let tmp = fake_tree();
        let mut provider = HwmonProvider::open(tmp.path()).unwrap();
        fs::remove_dir_all(tmp.path().join("hwmon0")).unwrap();
        fs::remove_dir_all(tmp.path().join("hwmon1")).unwrap();
        assert!(matches!(provider.poll(), Err(Error::Io { .. })));
    }
}

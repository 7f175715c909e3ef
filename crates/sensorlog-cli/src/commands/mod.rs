pub mod collect;
pub mod sensors;
pub mod serve;
pub mod set;
pub mod shell;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::warn;
use sensorlog_core::providers::{HwmonProvider, SimulatedProvider};
use sensorlog_core::{
    ProviderHandle, Sampler, SamplerConfig, SessionProgress, SessionSummary, TimeSeriesStore,
};

/// Global options shared by every subcommand.
pub struct SamplerOptions<'a> {
    pub provider: &'a str,
    pub hwmon_root: &'a Path,
    pub interval: Duration,
    pub capacity: usize,
}

/// Open the selected provider, or exit with a message if it is unavailable.
pub fn make_provider(opts: &SamplerOptions) -> ProviderHandle {
    match opts.provider {
        "sim" => ProviderHandle::new(Box::new(SimulatedProvider::default())),
        _ => match HwmonProvider::open(opts.hwmon_root) {
            Ok(p) => ProviderHandle::new(Box::new(p)),
            Err(e) => {
                eprintln!("Error: {e}");
                eprintln!("Try --provider sim for simulated hardware.");
                std::process::exit(1);
            }
        },
    }
}

/// Build a stopped sampler over a fresh store, or exit on invalid options.
pub fn make_sampler(opts: &SamplerOptions) -> Sampler {
    let store = Arc::new(TimeSeriesStore::new(opts.capacity));
    let config = SamplerConfig::with_interval(opts.interval);
    match Sampler::new(make_provider(opts), store, config) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

/// Parse a duration string like "100ms", "2s", "5m", "1h". Bare numbers are
/// seconds; fractions are allowed ("0.5s").
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();

    let (numeric, unit_nanos) = if let Some(rest) = s.strip_suffix("ms") {
        (rest, 1e6)
    } else if let Some(rest) = s.strip_suffix('s') {
        (rest, 1e9)
    } else if let Some(rest) = s.strip_suffix('m') {
        (rest, 60e9)
    } else if let Some(rest) = s.strip_suffix('h') {
        (rest, 3600e9)
    } else {
        (s, 1e9)
    };

    let value: f64 = numeric
        .trim()
        .parse()
        .map_err(|_| format!("invalid duration: {s:?}"))?;
    if !value.is_finite() || value < 0.0 {
        return Err(format!("invalid duration: {s:?}"));
    }
    Ok(Duration::from_nanos((value * unit_nanos).round() as u64))
}

/// Ctrl+C wiring. While armed, Ctrl+C cancels the running collection;
/// otherwise it exits the process.
#[derive(Clone)]
pub struct Interrupt {
    cancel: Arc<AtomicBool>,
    armed: Arc<AtomicBool>,
}

impl Interrupt {
    /// Install the process-wide handler. Can only be called once.
    pub fn install() -> Self {
        let this = Self {
            cancel: Arc::new(AtomicBool::new(false)),
            armed: Arc::new(AtomicBool::new(false)),
        };
        let handler = this.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            if handler.armed.load(Ordering::SeqCst) {
                handler.cancel.store(true, Ordering::SeqCst);
            } else {
                std::process::exit(130);
            }
        }) {
            warn!("Ctrl+C handler not installed: {e}");
        }
        this
    }

    /// Clear any stale cancellation and route Ctrl+C to the returned flag.
    pub fn arm(&self) -> &AtomicBool {
        self.cancel.store(false, Ordering::SeqCst);
        self.armed.store(true, Ordering::SeqCst);
        &self.cancel
    }

    pub fn disarm(&self) {
        self.armed.store(false, Ordering::SeqCst);
    }
}

/// One-line progress display, redrawn in place.
pub fn format_progress(p: &SessionProgress) -> String {
    const WIDTH: usize = 30;
    let filled = ((p.fraction * WIDTH as f64).round() as usize).min(WIDTH);
    let avg = p
        .avg_interval_ms
        .map_or_else(|| "-".to_string(), |ms| format!("{ms:.1}ms"));
    format!(
        "[{}{}] {:5.1}%  {:.1}/{:.1}s  samples: {:<7} avg interval: {avg}",
        "#".repeat(filled),
        "-".repeat(WIDTH - filled),
        p.fraction * 100.0,
        p.elapsed.as_secs_f64(),
        p.requested.as_secs_f64(),
        p.samples,
    )
}

/// Print the session summary as a table.
pub fn print_summary(summary: &SessionSummary) {
    println!(
        "Session {}{}",
        summary.id,
        if summary.cancelled { " (cancelled)" } else { "" }
    );
    println!(
        "  Duration:  {:.2}s of {:.1}s requested",
        summary.duration_actual, summary.duration_requested
    );
    println!("  Interval:  {}ms", summary.interval_ms);
    println!(
        "  Samples:   {} across {} sensors",
        summary.total_samples, summary.sensors_count
    );
    if summary.sensors.is_empty() {
        println!("  (no data collected)");
        return;
    }
    println!();
    println!(
        "  {:<32} {:>8} {:>10} {:>10} {:>10}",
        "Sensor", "Count", "Min", "Max", "Avg"
    );
    println!("  {}", "-".repeat(74));
    for (key, s) in &summary.sensors {
        println!(
            "  {key:<32} {:>8} {:>10.2} {:>10.2} {:>10.2}",
            s.sample_count, s.min, s.max, s.avg
        );
    }
}

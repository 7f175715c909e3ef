//! `sensorlog collect` — run one bounded session, summarize, export, exit.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use sensorlog_core::export::{self, Format};
use sensorlog_core::{CollectionSession, SessionSummary, TimeSeriesStore};

use super::{Interrupt, SamplerOptions, format_progress, make_sampler, print_summary};

/// Formats selected by a `--format` value.
pub fn formats_for(format: &str) -> &'static [Format] {
    match format {
        "json" => &[Format::Json],
        "csv" => &[Format::Csv],
        "none" => &[],
        _ => &[Format::Json, Format::Csv],
    }
}

/// Write one export per format into `dir` under the default file names.
pub fn export_all(
    store: &TimeSeriesStore,
    interval_ms: u64,
    formats: &[Format],
    dir: &Path,
) -> Result<Vec<PathBuf>, export::Error> {
    let now = Utc::now();
    formats
        .iter()
        .map(|&format| {
            let path = dir.join(export::default_file_name(format, now));
            match format {
                Format::Json => export::write_json(store, interval_ms, &path),
                Format::Csv => export::write_csv(store, &path),
            }
        })
        .collect()
}

/// Write the summary as pretty JSON into `dir`.
pub fn write_summary(summary: &SessionSummary, dir: &Path) -> Result<PathBuf, export::Error> {
    let path = dir.join(format!(
        "session_summary_{}.json",
        summary.started_at.format("%Y%m%d_%H%M%S")
    ));
    export::write_atomic(&path, &serde_json::to_vec_pretty(summary)?)?;
    Ok(path)
}

pub fn run(opts: &SamplerOptions, duration: f64, format: &str, output: &Path, summary: bool) {
    let session = match CollectionSession::new(duration) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(2);
        }
    };
    if let Err(e) = std::fs::create_dir_all(output) {
        eprintln!("Error creating {}: {e}", output.display());
        std::process::exit(1);
    }

    let mut sampler = make_sampler(opts);
    let interrupt = Interrupt::install();

    println!("Collecting sensor data");
    println!("  Provider:  {}", sampler.provider().name());
    println!("  Duration:  {:.1}s", session.requested().as_secs_f64());
    println!("  Interval:  {}ms", sampler.config().interval.as_millis());
    println!("  Output:    {}", output.display());
    println!("  (Ctrl+C stops early and keeps what was collected)");
    println!();

    let cancel = interrupt.arm();
    let result = session.run(&mut sampler, cancel, |p| {
        print!("\r  {}", format_progress(p));
        let _ = std::io::stdout().flush();
    });
    interrupt.disarm();
    println!();
    println!();

    let session_summary = match result {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };
    print_summary(&session_summary);
    println!();

    let interval_ms = session_summary.interval_ms;
    match export_all(sampler.store(), interval_ms, formats_for(format), output) {
        Ok(paths) => {
            for path in paths {
                println!("Exported {}", path.display());
            }
        }
        Err(e) => {
            eprintln!("Export failed: {e}");
            std::process::exit(1);
        }
    }

    if summary {
        match write_summary(&session_summary, output) {
            Ok(path) => println!("Summary saved to {}", path.display()),
            Err(e) => {
                eprintln!("Error saving summary: {e}");
                std::process::exit(1);
            }
        }
    }
}

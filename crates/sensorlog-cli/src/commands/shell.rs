//! `sensorlog shell` — interactive commands over a live sampler.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use sensorlog_core::export::{self, Format};
use sensorlog_core::{CollectionSession, ControlGateway, Sampler, SensorKind, TimeSeriesStore};

use super::{Interrupt, SamplerOptions, format_progress, make_sampler, print_summary};

const DEFAULT_SERIES_LEN: usize = 20;

#[derive(Debug, PartialEq)]
enum ShellCommand {
    Latest,
    Series { key: String, n: usize },
    Set { key: String, percent: f64 },
    Collect { secs: f64 },
    Export { format: Format, path: Option<PathBuf> },
    Stats,
    Help,
    Quit,
    Empty,
}

fn parse_command(line: &str) -> Result<ShellCommand, String> {
    let mut words = line.split_whitespace();
    let Some(cmd) = words.next() else {
        return Ok(ShellCommand::Empty);
    };
    let args: Vec<&str> = words.collect();

    let number = |s: &str, what: &str| -> Result<f64, String> {
        s.parse::<f64>().map_err(|_| format!("{what} must be a number, got '{s}'"))
    };

    match (cmd, args.as_slice()) {
        ("latest" | "l", []) => Ok(ShellCommand::Latest),
        ("series" | "s", [key]) => Ok(ShellCommand::Series {
            key: (*key).to_string(),
            n: DEFAULT_SERIES_LEN,
        }),
        ("series" | "s", [key, n]) => Ok(ShellCommand::Series {
            key: (*key).to_string(),
            n: n.parse().map_err(|_| format!("n must be a count, got '{n}'"))?,
        }),
        ("set", [key, percent]) => Ok(ShellCommand::Set {
            key: (*key).to_string(),
            percent: number(*percent, "percent")?,
        }),
        ("collect" | "c", [secs]) => Ok(ShellCommand::Collect {
            secs: number(*secs, "duration")?,
        }),
        ("json", rest) | ("csv", rest) if rest.len() <= 1 => Ok(ShellCommand::Export {
            format: if cmd == "json" { Format::Json } else { Format::Csv },
            path: rest.first().map(|p| PathBuf::from(*p)),
        }),
        ("stats", []) => Ok(ShellCommand::Stats),
        ("help" | "h" | "?", []) => Ok(ShellCommand::Help),
        ("quit" | "q" | "exit", []) => Ok(ShellCommand::Quit),
        _ => Err(format!("unknown command '{}' (try 'help')", line.trim())),
    }
}

fn print_help() {
    println!("Commands:");
    println!("  latest                 Latest value of every sensor");
    println!("  series <key> [n]       Last n records of one sensor (default {DEFAULT_SERIES_LEN}, 0 = all)");
    println!("  set <key> <percent>    Set a control output (0-100)");
    println!("  collect <secs>         Clear history and run a bounded session (max 300s)");
    println!("  json [path]            Export history as JSON");
    println!("  csv [path]             Export history as time-aligned CSV");
    println!("  stats                  Sampler and store counters");
    println!("  help                   This list");
    println!("  quit                   Stop sampling and exit");
}

fn print_latest(store: &TimeSeriesStore) {
    let latest = store.latest_all();
    if latest.is_empty() {
        println!("  (no readings yet)");
        return;
    }
    for kind in SensorKind::ALL {
        let keys = store.keys_of_kind(kind);
        if keys.is_empty() {
            continue;
        }
        println!("{kind}:");
        for key in keys {
            if let Some(r) = latest.get(&key) {
                println!(
                    "  {key:<32} {}   {}",
                    kind.format_value(r.value),
                    r.timestamp.format("%H:%M:%S%.3f")
                );
            }
        }
    }
}

fn print_series(store: &TimeSeriesStore, key: &str, n: usize) {
    let records = store.timeseries(key, n);
    if records.is_empty() {
        println!("  Sensor '{key}' not found");
        return;
    }
    for r in records {
        println!(
            "  {}  {}",
            r.timestamp.format("%H:%M:%S%.3f"),
            r.kind.format_value(r.value)
        );
    }
}

fn start_sampler(sampler: &mut Sampler) {
    if let Err(e) = sampler.start() {
        eprintln!("Error starting sampler: {e}");
        std::process::exit(1);
    }
}

fn run_collect(sampler: &mut Sampler, interrupt: &Interrupt, secs: f64) {
    let session = match CollectionSession::new(secs) {
        Ok(s) => s,
        Err(e) => {
            println!("  {e}");
            return;
        }
    };
    println!(
        "  Collecting for {:.1}s (Ctrl+C to stop early)",
        session.requested().as_secs_f64()
    );
    let cancel = interrupt.arm();
    let result = session.run(sampler, cancel, |p| {
        print!("\r  {}", format_progress(p));
        let _ = io::stdout().flush();
    });
    interrupt.disarm();
    println!();

    match result {
        Ok(summary) => print_summary(&summary),
        Err(e) => println!("  Session failed: {e}"),
    }
    // The session leaves the sampler stopped; resume live sampling.
    start_sampler(sampler);
}

fn run_export(sampler: &Sampler, format: Format, path: Option<PathBuf>) {
    let path =
        path.unwrap_or_else(|| PathBuf::from(export::default_file_name(format, Utc::now())));
    let interval_ms = sampler.config().interval.as_millis() as u64;
    let result = match format {
        Format::Json => export::write_json(sampler.store(), interval_ms, &path),
        Format::Csv => export::write_csv(sampler.store(), &path),
    };
    match result {
        Ok(path) => println!("  Exported {}", path.display()),
        Err(e) => println!("  Export failed: {e}"),
    }
}

fn print_stats(sampler: &Sampler) {
    let s = sampler.stats();
    let store = sampler.store().stats();
    println!(
        "  Sampler:  {} every {}ms, {} ticks ({} skipped), {} records written, {} readings discarded",
        if s.running { "running" } else { "stopped" },
        sampler.config().interval.as_millis(),
        s.ticks,
        s.skipped_ticks,
        s.records_written,
        s.discarded_readings
    );
    println!(
        "  Store:    {} sensors, {} records (longest history {} of {})",
        store.sensors,
        store.total_records,
        store.longest_history,
        sampler.store().capacity()
    );
}

pub fn run(opts: &SamplerOptions, warmup: Duration) {
    let mut sampler = make_sampler(opts);
    let gateway = ControlGateway::new(sampler.provider().clone());
    let interrupt = Interrupt::install();

    start_sampler(&mut sampler);
    println!(
        "sensorlog v{} — {} provider, sampling every {}ms",
        sensorlog_core::VERSION,
        sampler.provider().name(),
        sampler.config().interval.as_millis()
    );
    std::thread::sleep(warmup);
    print_latest(sampler.store());
    println!("\nType 'help' for commands.");

    let stdin = io::stdin();
    loop {
        print!("sensorlog> ");
        let _ = io::stdout().flush();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                eprintln!("Error reading input: {e}");
                break;
            }
        }

        match parse_command(&line) {
            Ok(ShellCommand::Latest) => print_latest(sampler.store()),
            Ok(ShellCommand::Series { key, n }) => print_series(sampler.store(), &key, n),
            Ok(ShellCommand::Set { key, percent }) => match gateway.set_output(&key, percent) {
                Ok(o) if o.success => println!("  Set {key} to {percent:.1}%"),
                Ok(_) => println!("  Control '{key}' not found"),
                Err(e) => println!("  {e}"),
            },
            Ok(ShellCommand::Collect { secs }) => run_collect(&mut sampler, &interrupt, secs),
            Ok(ShellCommand::Export { format, path }) => run_export(&sampler, format, path),
            Ok(ShellCommand::Stats) => print_stats(&sampler),
            Ok(ShellCommand::Help) => print_help(),
            Ok(ShellCommand::Quit) => break,
            Ok(ShellCommand::Empty) => {}
            Err(msg) => println!("  {msg}"),
        }
    }

    sampler.stop();
}

//! CLI for sensorlog — sample hardware sensors, collect sessions, export them.

mod commands;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use sensorlog_core::DEFAULT_CAPACITY;
use sensorlog_core::providers::DEFAULT_HWMON_ROOT;

#[derive(Parser)]
#[command(name = "sensorlog")]
#[command(about = "sensorlog — sample temperatures, fan speeds and PWM outputs into memory")]
#[command(version = sensorlog_core::VERSION)]
struct Cli {
    /// Telemetry provider: hwmon (Linux sysfs) or sim (synthetic hardware)
    #[arg(long, global = true, default_value = "hwmon", value_parser = ["hwmon", "sim"])]
    provider: String,

    /// Root of the hwmon sysfs tree
    #[arg(long, global = true, default_value = DEFAULT_HWMON_ROOT)]
    hwmon_root: PathBuf,

    /// Sample interval (e.g. "100ms", "1s")
    #[arg(long, global = true, default_value = "100ms", value_parser = commands::parse_duration)]
    interval: Duration,

    /// Records kept per sensor before the oldest are evicted
    #[arg(long, global = true, default_value_t = DEFAULT_CAPACITY)]
    capacity: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the provider once and list every reading
    Sensors,

    /// Set a control output (PWM) to a percentage
    Set {
        /// Control key, as listed by `sensors`
        key: String,

        /// Duty in percent (0-100)
        percent: f64,
    },

    /// Run one bounded collection session, print its summary and export
    Collect {
        /// Session length in seconds (capped at 300)
        #[arg(long, default_value = "10")]
        duration: f64,

        /// Export format
        #[arg(long, default_value = "both", value_parser = ["json", "csv", "both", "none"])]
        format: String,

        /// Directory for export files
        #[arg(long, default_value = ".")]
        output: PathBuf,

        /// Also write the session summary as JSON
        #[arg(long)]
        summary: bool,
    },

    /// Interactive shell over a live sampler
    Shell {
        /// Sample for this long before the first prompt (e.g. "1s")
        #[arg(long, default_value = "1s", value_parser = commands::parse_duration)]
        warmup: Duration,
    },

    /// Start the HTTP API
    Serve {
        /// Bind address
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port
        #[arg(long, default_value = "8042")]
        port: u16,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let opts = commands::SamplerOptions {
        provider: &cli.provider,
        hwmon_root: &cli.hwmon_root,
        interval: cli.interval,
        capacity: cli.capacity,
    };

    match cli.command {
        Commands::Sensors => commands::sensors::run(&opts),
        Commands::Set { key, percent } => commands::set::run(&opts, &key, percent),
        Commands::Collect {
            duration,
            format,
            output,
            summary,
        } => commands::collect::run(&opts, duration, &format, &output, summary),
        Commands::Shell { warmup } => commands::shell::run(&opts, warmup),
        Commands::Serve { host, port } => commands::serve::run(&opts, &host, port),
    }
}

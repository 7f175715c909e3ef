//! Sample simulated hardware for a few seconds and print a CSV.
//!
//! Turns the first fan up halfway through to show the temperature respond.
//!
//! Run: `cargo run --example simulated`

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use sensorlog_core::providers::SimulatedProvider;
use sensorlog_core::{
    ControlGateway, ProviderHandle, Sampler, SamplerConfig, TabularExport, TimeSeriesStore,
};

fn main() {
    let provider = ProviderHandle::new(Box::new(SimulatedProvider::new(1)));
    let store = Arc::new(TimeSeriesStore::new(1000));
    let config = SamplerConfig::with_interval(Duration::from_millis(250));
    let Ok(mut sampler) = Sampler::new(provider.clone(), Arc::clone(&store), config) else {
        eprintln!("invalid sampler configuration");
        return;
    };

    if let Err(e) = sampler.start() {
        eprintln!("failed to start sampler: {e}");
        return;
    }
    thread::sleep(Duration::from_secs(2));

    let gateway = ControlGateway::new(provider);
    match gateway.set_output("sim_pwm1", 100.0) {
        Ok(outcome) => println!(
            "set sim_pwm1 -> {}% (success: {})",
            outcome.percent, outcome.success
        ),
        Err(e) => eprintln!("{e}"),
    }
    thread::sleep(Duration::from_secs(2));
    sampler.stop();

    let stats = store.stats();
    println!("{} sensors, {} records\n", stats.sensors, stats.total_records);
    print!("{}", TabularExport::from_store(&store).to_csv_string());
}

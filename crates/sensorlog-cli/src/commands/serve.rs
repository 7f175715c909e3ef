use std::sync::Arc;

use sensorlog_server::AppState;

use super::{SamplerOptions, make_sampler};

pub fn run(opts: &SamplerOptions, host: &str, port: u16) {
    let mut sampler = make_sampler(opts);

    let base = format!("http://{host}:{port}");
    println!("sensorlog server v{}", sensorlog_core::VERSION);
    println!("   {base}");
    println!(
        "   {} provider, sampling every {}ms, {} records per sensor",
        sampler.provider().name(),
        sampler.config().interval.as_millis(),
        sampler.store().capacity()
    );
    println!();
    println!("   Endpoints:");
    println!("     GET  /                              API index (try: curl {base})");
    println!("     GET  /api/latest                    Latest record for every sensor");
    println!("     GET  /api/sensors                   Sensors with kind, unit and value");
    println!("     GET  /api/timeseries/<key>?n=300    Recent records of one sensor");
    println!("     POST /api/control/<key>/<percent>   Set a control output");
    println!("     GET  /api/export/json               Full history as JSON");
    println!("     GET  /api/export/csv                Time-aligned CSV");
    println!("     GET  /health                        Sampler status");
    println!();

    if let Err(e) = sampler.start() {
        eprintln!("Error starting sampler: {e}");
        std::process::exit(1);
    }
    let state = Arc::new(AppState::new(sampler));

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error starting runtime: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = rt.block_on(sensorlog_server::run_server(state, host, port)) {
        eprintln!("Server error: {e}");
        std::process::exit(1);
    }
}

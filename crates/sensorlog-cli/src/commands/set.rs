use sensorlog_core::ControlGateway;

use super::{SamplerOptions, make_provider};

pub fn run(opts: &SamplerOptions, key: &str, percent: f64) {
    let gateway = ControlGateway::new(make_provider(opts));
    match gateway.set_output(key, percent) {
        Ok(outcome) if outcome.success => {
            println!("Set {} to {:.1}%", outcome.key, outcome.percent);
        }
        Ok(outcome) => {
            eprintln!(
                "Control '{}' not found or not writable. Run `sensorlog sensors` to list controls.",
                outcome.key
            );
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(2);
        }
    }
}

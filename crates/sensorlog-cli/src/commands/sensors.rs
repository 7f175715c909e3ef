use sensorlog_core::Reading;

use super::{SamplerOptions, make_provider};

pub fn run(opts: &SamplerOptions) {
    let provider = make_provider(opts);
    let readings = match provider.poll() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error reading sensors: {e}");
            std::process::exit(1);
        }
    };

    println!(
        "Provider: {} ({} readings)\n",
        provider.name(),
        readings.len()
    );
    println!(
        "     {:<32} {:<12} {:>12} {:>10} {:>10}",
        "Key", "Type", "Value", "Min", "Max"
    );
    for r in &readings {
        println!("  {}", format_reading(r));
    }
    if readings.is_empty() {
        println!("  (none found)");
    }
    println!("\n  \u{2705} sampled into history   \u{00B7} reported only");
}

fn format_reading(r: &Reading) -> String {
    let limit = |v: Option<f64>| v.map_or_else(|| "-".to_string(), |v| format!("{v:.1}"));
    let (marker, value) = match r.kind.sensor_kind() {
        Some(kind) => ("\u{2705}", kind.format_value(r.value)),
        None => ("\u{00B7} ", format!("{:6.3}", r.value)),
    };
    format!(
        "{marker} {:<32} {:<12} {:>12} {:>10} {:>10}",
        r.key,
        r.kind.to_string(),
        value,
        limit(r.min),
        limit(r.max)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensorlog_core::ReadingKind;

    #[test]
    fn test_collected_kinds_show_units() {
        let line = format_reading(
            &Reading::new("k10temp_tctl", 48.25, ReadingKind::Temperature)
                .with_limits(None, Some(95.0)),
        );
        assert!(line.starts_with('\u{2705}'));
        assert!(line.contains("k10temp_tctl"));
        assert!(line.contains("48.2 °C") || line.contains("48.3 °C"));
        assert!(line.trim_end().ends_with("95.0"));
    }

    #[test]
    fn test_other_kinds_are_marked_not_collected() {
        let line = format_reading(&Reading::new("nct6798_in0", 1.2, ReadingKind::Other));
        assert!(line.starts_with('\u{00B7}'));
        assert!(line.contains("1.200"));
    }
}

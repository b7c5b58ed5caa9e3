//! Check command implementation.
//!
//! Opens the statistics provider, polls it and prints what it returned.

use std::collections::BTreeMap;
use std::time::Instant;

use devstat_exporter::devstat::open_provider;
use devstat_exporter::{DevstatCollector, Sample, OBSERVATIONS_PER_DEVICE};

use crate::config::{validate_effective_config, Config};

/// Polls device statistics `iterations` times and prints the result.
pub fn command_check(
    iterations: usize,
    verbose: bool,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Devstat Exporter - System Check");
    println!("==================================");

    let mut all_ok = true;

    println!("\n⚙️  Checking configuration...");
    match validate_effective_config(config) {
        Ok(_) => println!("   ✅ Configuration is valid"),
        Err(e) => {
            println!("   ❌ Configuration invalid: {}", e);
            all_ok = false;
        }
    }

    println!("\n💽 Opening device statistics provider...");
    let provider = match open_provider(config.test_data_file.as_deref()) {
        Ok(provider) => {
            println!("   ✅ Provider ready");
            provider
        }
        Err(e) => {
            println!("   ❌ {}", e);
            std::process::exit(1);
        }
    };
    let collector = DevstatCollector::new(provider, config.namespace())?;

    let mut last = Vec::new();
    for i in 1..=iterations.max(1) {
        let start = Instant::now();
        let mut samples: Vec<Sample> = Vec::new();
        match collector.update(&mut samples) {
            Ok(emitted) => {
                println!(
                    "   ✅ Poll {}: {} devices, {} observations in {:.2}ms",
                    i,
                    emitted / OBSERVATIONS_PER_DEVICE,
                    emitted,
                    start.elapsed().as_secs_f64() * 1000.0
                );
                last = samples;
            }
            Err(e) => {
                println!("   ❌ Poll {} failed: {}", i, e);
                all_ok = false;
            }
        }
    }

    if verbose {
        println!("\n📊 Observations:");
        for sample in &last {
            let labels: Vec<String> = sample
                .labels
                .iter()
                .map(|(k, v)| format!("{}=\"{}\"", k, v))
                .collect();
            println!("   {}{{{}}} {}", sample.name, labels.join(","), sample.value);
        }
    } else {
        println!("\n📊 Devices:");
        for (device, bytes) in summarize(&last) {
            println!("   {:16} {:>20} bytes", device, bytes);
        }
    }

    println!("\n📋 Summary:");
    if all_ok {
        println!("   ✅ All checks passed");
        Ok(())
    } else {
        println!("   ❌ Some checks failed - please review output");
        std::process::exit(1);
    }
}

/// Total bytes per device, taken from the bytes_total series.
fn summarize(samples: &[Sample]) -> BTreeMap<String, f64> {
    let mut devices = BTreeMap::new();
    for sample in samples {
        let Some(device) = sample.label("device") else {
            continue;
        };
        let total = devices.entry(device.to_string()).or_insert(0.0);
        if sample.name.ends_with("_bytes_total") {
            *total += sample.value;
        }
    }
    devices
}

#[cfg(test)]
mod tests {
    use super::*;
    use devstat_exporter::MetricKind;

    fn sample(name: &str, device: &str, value: f64) -> Sample {
        Sample {
            name: name.to_string(),
            kind: MetricKind::Counter,
            labels: vec![("device".to_string(), device.to_string())],
            value,
        }
    }

    #[test]
    fn test_summarize_sums_bytes_per_device() {
        let samples = vec![
            sample("node_devstat_bytes_total", "ada0", 1024.0),
            sample("node_devstat_bytes_total", "ada0", 2048.0),
            sample("node_devstat_transfers_total", "ada0", 7.0),
            sample("node_devstat_queue_length", "da1", 3.0),
        ];
        let summary = summarize(&samples);
        assert_eq!(summary.get("ada0"), Some(&3072.0));
        assert_eq!(summary.get("da1"), Some(&0.0));
    }
}

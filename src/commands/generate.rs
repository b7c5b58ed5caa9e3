//! Generate testdata command implementation.
//!
//! Writes a synthetic device statistics fixture that `--test-data-file`
//! can replay on hosts without libdevstat.

use std::fs;
use std::path::PathBuf;
use tracing::debug;

use devstat_exporter::devstat::fixture::generate;

/// Generates a synthetic test data JSON file.
pub fn command_generate_testdata(
    output: PathBuf,
    drivers: &str,
    units: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let drivers: Vec<&str> = drivers
        .split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .collect();
    if drivers.is_empty() {
        return Err("at least one driver name is required".into());
    }

    debug!(
        "Generating test data: drivers={:?}, units={}, output={}",
        drivers,
        units,
        output.display()
    );

    let fixture = generate(&drivers, units);
    fixture.validate()?;

    let json_content = serde_json::to_string_pretty(&fixture)?;
    fs::write(&output, &json_content)?;

    println!(
        "✅ Generated test data: {} devices in {}",
        fixture.devices.len(),
        output.display()
    );

    Ok(())
}

//! Synthetic device statistics loaded from a JSON test data file.
//!
//! Lets the exporter run on hosts without libdevstat. Each poll hands out a
//! freshly allocated copy of the fixture's records, just like the native
//! backend does.

use std::collections::HashSet;
use std::fs;
use std::os::raw::c_int;
use std::path::Path;
use std::ptr;

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::compute::{compute_counters, KernelCounters, CUMULATIVE_ETIME};
use super::{DeviceCounters, DeviceStatRecord, StatsProvider, DEVSTAT_NAME_LEN};
use crate::error::DevstatError;

/// Test data format version written by [`generate`].
pub const FIXTURE_VERSION: &str = "1.0";

// Constants for test data generation ranges
const GB: u64 = 1024 * 1024 * 1024;
const MAX_DEVICE_BYTES: u64 = 500 * GB;
const MAX_DEVICE_OPS: u64 = 50_000_000;
const MAX_DURATION_SECONDS: f64 = 100_000.0;

/// One device entry in the test data file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureDevice {
    pub name: String,
    pub unit: c_int,
    #[serde(flatten)]
    pub counters: DeviceCounters,
}

/// Root structure of the test data JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureFile {
    pub version: String,
    pub generated_at: String,
    pub devices: Vec<FixtureDevice>,
}

impl FixtureFile {
    /// Checks the invariants a real devstat snapshot guarantees.
    pub fn validate(&self) -> Result<(), DevstatError> {
        let mut seen = HashSet::new();
        for device in &self.devices {
            if device.name.is_empty() || device.name.len() >= DEVSTAT_NAME_LEN {
                return Err(DevstatError::InvalidFixture(format!(
                    "device name '{}' must be 1-{} bytes",
                    device.name,
                    DEVSTAT_NAME_LEN - 1
                )));
            }
            if device.unit < 0 {
                return Err(DevstatError::InvalidFixture(format!(
                    "device '{}' has negative unit {}",
                    device.name, device.unit
                )));
            }
            let id = format!("{}{}", device.name, device.unit);
            if !seen.insert(id.clone()) {
                return Err(DevstatError::InvalidFixture(format!(
                    "duplicate device '{}'",
                    id
                )));
            }
            if let Some(field) = negative_field(&device.counters) {
                return Err(DevstatError::InvalidFixture(format!(
                    "device '{}' has negative {}",
                    id, field
                )));
            }
        }
        Ok(())
    }
}

/// Returns the name of the first counter that is negative or NaN.
fn negative_field(c: &DeviceCounters) -> Option<&'static str> {
    let fields = [
        ("duration.read", c.duration.read),
        ("duration.write", c.duration.write),
        ("duration.free", c.duration.free),
        ("duration.other", c.duration.other),
        ("busy_time", c.busy_time),
        ("busy_percent", c.busy_percent),
        ("tps.read", c.tps.read),
        ("tps.write", c.tps.write),
        ("tps.free", c.tps.free),
        ("tps.other", c.tps.other),
        ("tps.total", c.tps.total),
        ("mbps.read", c.mbps.read),
        ("mbps.write", c.mbps.write),
        ("kbpt.read", c.kbpt.read),
        ("kbpt.write", c.kbpt.write),
        ("kbpt.free", c.kbpt.free),
        ("mspertxn.read", c.mspertxn.read),
        ("mspertxn.write", c.mspertxn.write),
        ("mspertxn.other", c.mspertxn.other),
    ];
    fields
        .into_iter()
        .find(|(_, v)| v.is_nan() || *v < 0.0)
        .map(|(name, _)| name)
}

/// Load and validate test data from a JSON file.
pub fn load_fixture(path: &Path) -> Result<FixtureFile, DevstatError> {
    debug!("Loading test data from: {}", path.display());

    let content = fs::read_to_string(path).map_err(|source| DevstatError::FixtureIo {
        path: path.to_path_buf(),
        source,
    })?;
    let fixture: FixtureFile =
        serde_json::from_str(&content).map_err(|source| DevstatError::FixtureFormat {
            path: path.to_path_buf(),
            source,
        })?;
    fixture.validate()?;

    info!(
        "Loaded test data version {} from {} ({} devices)",
        fixture.version,
        fixture.generated_at,
        fixture.devices.len()
    );
    Ok(fixture)
}

/// Provider serving the same device table on every poll.
#[derive(Debug, Clone)]
pub struct FixtureProvider {
    records: Vec<DeviceStatRecord>,
}

impl FixtureProvider {
    pub fn new(fixture: &FixtureFile) -> Self {
        let records = fixture
            .devices
            .iter()
            .map(|d| DeviceStatRecord::new(&d.name, d.unit, d.counters))
            .collect();
        Self { records }
    }

    pub fn from_file(path: &Path) -> Result<Self, DevstatError> {
        Ok(Self::new(&load_fixture(path)?))
    }

    pub fn device_count(&self) -> usize {
        self.records.len()
    }
}

unsafe impl StatsProvider for FixtureProvider {
    fn get_stats(&mut self, records: &mut *mut DeviceStatRecord) -> c_int {
        if self.records.is_empty() {
            *records = ptr::null_mut();
            return 0;
        }
        let copy: Box<[DeviceStatRecord]> = self.records.clone().into_boxed_slice();
        let len = copy.len();
        *records = Box::into_raw(copy) as *mut DeviceStatRecord;
        len as c_int
    }

    unsafe fn release(&mut self, records: *mut DeviceStatRecord) {
        if records.is_null() {
            return;
        }
        // The fixture table never changes, so the length matches the
        // allocation made in `get_stats`.
        let slice = ptr::slice_from_raw_parts_mut(records, self.records.len());
        drop(Box::from_raw(slice));
    }
}

/// Generates a synthetic fixture with `disks` disks per driver name.
pub fn generate(drivers: &[&str], disks: usize) -> FixtureFile {
    let mut rng = rand::thread_rng();
    let mut devices = Vec::with_capacity(drivers.len() * disks);

    for driver in drivers {
        for unit in 0..disks {
            devices.push(FixtureDevice {
                name: driver.to_string(),
                unit: unit as c_int,
                counters: generate_random_counters(&mut rng),
            });
        }
    }

    FixtureFile {
        version: FIXTURE_VERSION.to_string(),
        generated_at: Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        devices,
    }
}

/// Generates kernel-style raw counters and derives the exported statistics.
fn generate_random_counters(rng: &mut impl Rng) -> DeviceCounters {
    let mut raw = KernelCounters {
        block_size: 512,
        ..KernelCounters::default()
    };
    for i in 0..raw.bytes.len() {
        raw.operations[i] = rng.gen_range(0..MAX_DEVICE_OPS);
        // Roughly 4-128 KB per operation
        raw.bytes[i] = (raw.operations[i] * rng.gen_range(4..128) * 1024).min(MAX_DEVICE_BYTES);
        raw.duration[i] = rng.gen_range(0.0..MAX_DURATION_SECONDS);
    }
    // No-data operations carry no bytes
    raw.bytes[super::compute::DEVSTAT_NO_DATA] = 0;
    raw.busy_time = rng.gen_range(0.0..MAX_DURATION_SECONDS);
    raw.start_count = rng.gen_range(0..1_000_000);
    raw.end_count = raw.start_count.saturating_sub(rng.gen_range(0..32));

    compute_counters(&raw, CUMULATIVE_ETIME)
}

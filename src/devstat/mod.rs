//! Device statistics records and the native provider contract.
//!
//! A [`StatsProvider`] hands out an array of [`DeviceStatRecord`]s that lives
//! in memory the provider owns (for the FreeBSD backend, a `calloc`ed block).
//! [`snapshot`] wraps that array in a [`StatsBuffer`], which releases it back
//! to the provider exactly once when dropped.

pub mod compute;
pub mod fixture;
#[cfg(target_os = "freebsd")]
pub mod freebsd;

use std::ffi::CStr;
use std::fmt;
use std::os::raw::{c_char, c_int};
use std::path::Path;
use std::ptr;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::DevstatError;

/// Length of the device name buffer, including the trailing NUL.
pub const DEVSTAT_NAME_LEN: usize = 16;

/// Byte counters per operation type.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ByteCounts {
    pub read: u64,
    pub write: u64,
    pub free: u64,
}

/// Transfer (operation) counters per operation type.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferCounts {
    pub read: u64,
    pub write: u64,
    pub free: u64,
    pub other: u64,
}

/// Cumulative time spent in transactions, in seconds.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Durations {
    pub read: f64,
    pub write: f64,
    pub free: f64,
    pub other: f64,
}

/// Transfers per second.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferRates {
    pub read: f64,
    pub write: f64,
    pub free: f64,
    pub other: f64,
    pub total: f64,
}

/// Throughput in megabytes per second.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Throughput {
    pub read: f64,
    pub write: f64,
}

/// Average transfer size in kilobytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferSizes {
    pub read: f64,
    pub write: f64,
    pub free: f64,
}

/// Average latency per transaction in milliseconds.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Latencies {
    pub read: f64,
    pub write: f64,
    pub other: f64,
}

/// Derived statistics for one device, as computed by [`compute::compute_counters`].
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceCounters {
    pub bytes: ByteCounts,
    pub transfers: TransferCounts,
    pub duration: Durations,
    pub busy_time: f64,
    pub busy_percent: f64,
    pub blocks: u64,
    pub queue_length: u64,
    pub tps: TransferRates,
    pub mbps: Throughput,
    pub kbpt: TransferSizes,
    pub mspertxn: Latencies,
}

/// One device entry as laid out in the provider's record array.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct DeviceStatRecord {
    device: [c_char; DEVSTAT_NAME_LEN],
    pub unit: c_int,
    pub counters: DeviceCounters,
}

impl DeviceStatRecord {
    /// Builds a record, truncating `name` to fit the fixed name buffer.
    pub fn new(name: &str, unit: c_int, counters: DeviceCounters) -> Self {
        let mut device = [0 as c_char; DEVSTAT_NAME_LEN];
        for (dst, src) in device
            .iter_mut()
            .zip(name.bytes().take(DEVSTAT_NAME_LEN - 1))
        {
            *dst = src as c_char;
        }
        Self {
            device,
            unit,
            counters,
        }
    }

    /// Builds a record from a raw C name buffer.
    pub fn from_raw_name(
        device: [c_char; DEVSTAT_NAME_LEN],
        unit: c_int,
        counters: DeviceCounters,
    ) -> Self {
        let mut record = Self {
            device,
            unit,
            counters,
        };
        record.device[DEVSTAT_NAME_LEN - 1] = 0;
        record
    }

    /// Driver name without the unit number, e.g. `ada`.
    pub fn name(&self) -> String {
        // The last byte is always NUL, see `new` and `from_raw_name`.
        let bytes: Vec<u8> = self
            .device
            .iter()
            .take_while(|&&c| c != 0)
            .map(|&c| c as u8)
            .collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    /// Device identifier: name immediately followed by the decimal unit number.
    pub fn device_id(&self) -> String {
        format!("{}{}", self.name(), self.unit)
    }
}

impl fmt::Debug for DeviceStatRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceStatRecord")
            .field("device", &self.device_id())
            .field("counters", &self.counters)
            .finish()
    }
}

/// Source of device statistics with a C-style ownership contract.
///
/// # Safety
///
/// `get_stats` must either return a negative count, or a count `n >= 0`
/// after storing into `records` a pointer to `n` initialized records
/// (the pointer may be null when `n == 0`). That memory must stay valid and
/// unaliased until `release` is called with the same pointer.
pub unsafe trait StatsProvider: Send {
    /// Enumerates devices. Returns the number of records, or -1 on failure.
    fn get_stats(&mut self, records: &mut *mut DeviceStatRecord) -> c_int;

    /// Frees an array previously returned by `get_stats`.
    ///
    /// # Safety
    ///
    /// `records` must come from the last successful `get_stats` call and must
    /// not be used afterwards. Called exactly once per such array.
    unsafe fn release(&mut self, records: *mut DeviceStatRecord);
}

unsafe impl<P: StatsProvider + ?Sized> StatsProvider for Box<P> {
    fn get_stats(&mut self, records: &mut *mut DeviceStatRecord) -> c_int {
        (**self).get_stats(records)
    }

    unsafe fn release(&mut self, records: *mut DeviceStatRecord) {
        (**self).release(records)
    }
}

/// Scoped owner of one provider-allocated record array.
///
/// Records can only be borrowed from the buffer, so nothing read from the
/// array outlives the release performed in `Drop`.
pub struct StatsBuffer<'a, P: StatsProvider + ?Sized> {
    provider: &'a mut P,
    ptr: *mut DeviceStatRecord,
    len: usize,
}

impl<P: StatsProvider + ?Sized> StatsBuffer<'_, P> {
    pub fn records(&self) -> &[DeviceStatRecord] {
        if self.len == 0 || self.ptr.is_null() {
            return &[];
        }
        // SAFETY: the provider contract guarantees `len` initialized records
        // at `ptr`, valid until release, which only happens in `drop`.
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<P: StatsProvider + ?Sized> Drop for StatsBuffer<'_, P> {
    fn drop(&mut self) {
        // SAFETY: `ptr` came from the matching `get_stats` call and is
        // released only here.
        unsafe { self.provider.release(self.ptr) }
    }
}

/// Runs one native enumeration and takes ownership of the returned array.
pub fn snapshot<P: StatsProvider + ?Sized>(
    provider: &mut P,
) -> Result<StatsBuffer<'_, P>, DevstatError> {
    let mut records = ptr::null_mut();
    let count = provider.get_stats(&mut records);
    if count < 0 {
        return Err(DevstatError::EnumerationFailed);
    }
    Ok(StatsBuffer {
        provider,
        ptr: records,
        len: count as usize,
    })
}

/// Opens the statistics provider for this host.
///
/// A test data file takes precedence; otherwise the native libdevstat
/// backend is used, which only exists on FreeBSD.
pub fn open_provider(
    test_data_file: Option<&Path>,
) -> Result<Box<dyn StatsProvider>, DevstatError> {
    if let Some(path) = test_data_file {
        info!("Using synthetic device statistics from {}", path.display());
        return Ok(Box::new(fixture::FixtureProvider::from_file(path)?));
    }

    #[cfg(target_os = "freebsd")]
    {
        Ok(Box::new(freebsd::Devstat::new()?))
    }

    #[cfg(not(target_os = "freebsd"))]
    {
        Err(DevstatError::Unsupported(std::env::consts::OS))
    }
}

/// Reads a NUL-terminated C string into an owned `String`.
#[cfg_attr(not(target_os = "freebsd"), allow(dead_code))] // Used by the FreeBSD backend
pub(crate) fn c_string_lossy(buf: &[c_char]) -> String {
    if !buf.contains(&0) {
        return String::new();
    }
    // SAFETY: the buffer contains a NUL terminator within bounds.
    unsafe { CStr::from_ptr(buf.as_ptr()) }
        .to_string_lossy()
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_id_concatenates_name_and_unit() {
        let record = DeviceStatRecord::new("da", 0, DeviceCounters::default());
        assert_eq!(record.device_id(), "da0");

        let record = DeviceStatRecord::new("nvd", 12, DeviceCounters::default());
        assert_eq!(record.device_id(), "nvd12");
    }

    #[test]
    fn test_long_names_are_truncated() {
        let record = DeviceStatRecord::new("averyveryverylongname", 3, DeviceCounters::default());
        assert_eq!(record.name().len(), DEVSTAT_NAME_LEN - 1);
        assert_eq!(record.device_id(), "averyveryverylo3");
    }

    #[test]
    fn test_from_raw_name_forces_terminator() {
        let raw = [b'x' as c_char; DEVSTAT_NAME_LEN];
        let record = DeviceStatRecord::from_raw_name(raw, 1, DeviceCounters::default());
        assert_eq!(record.name(), "x".repeat(DEVSTAT_NAME_LEN - 1));
    }

    #[test]
    fn test_c_string_lossy() {
        let mut buf = [0 as c_char; 8];
        for (dst, src) in buf.iter_mut().zip(b"bad") {
            *dst = *src as c_char;
        }
        assert_eq!(c_string_lossy(&buf), "bad");
        assert_eq!(c_string_lossy(&[b'a' as c_char; 4]), "");
    }
}

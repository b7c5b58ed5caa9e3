//! FreeBSD libdevstat backend.
//!
//! Enumerates devices with `devstat_getdevs(3)` and derives the per-device
//! statistics in Rust, since `devstat_compute_statistics(3)` is variadic over
//! `long double` and cannot be called from stable Rust.

use std::mem;
use std::os::raw::{c_char, c_int, c_long, c_uint, c_void};
use std::ptr;

use tracing::{debug, warn};

use super::compute::{compute_counters, KernelCounters, CUMULATIVE_ETIME, DEVSTAT_N_TRANS_FLAGS};
use super::{c_string_lossy, DeviceStatRecord, StatsProvider, DEVSTAT_NAME_LEN};
use crate::error::DevstatError;

const CPUSTATES: usize = 5;
const DEVSTAT_ERRBUF_SIZE: usize = 2048;

/// 2^-64, the weight of one unit of `bintime.frac`.
const BINTIME_SCALE: f64 = 1.0 / 18_446_744_073_709_551_616.0;

#[repr(C)]
#[derive(Clone, Copy)]
struct Bintime {
    sec: libc::time_t,
    frac: u64,
}

impl Bintime {
    fn as_secs_f64(&self) -> f64 {
        self.sec as f64 + self.frac as f64 * BINTIME_SCALE
    }
}

/// `struct devstat` from `<sys/devicestat.h>`.
#[repr(C)]
#[allow(dead_code)] // Layout mirrors the C struct
struct RawDevstat {
    sequence0: c_uint,
    allocated: c_int,
    start_count: c_uint,
    end_count: c_uint,
    busy_from: Bintime,
    dev_links: *mut RawDevstat,
    device_number: u32,
    device_name: [c_char; DEVSTAT_NAME_LEN],
    unit_number: c_int,
    bytes: [u64; DEVSTAT_N_TRANS_FLAGS],
    operations: [u64; DEVSTAT_N_TRANS_FLAGS],
    duration: [Bintime; DEVSTAT_N_TRANS_FLAGS],
    busy_time: Bintime,
    creation_time: Bintime,
    block_size: u32,
    tag_types: [u64; 3],
    flags: c_int,
    device_type: c_int,
    priority: c_int,
    id: *const c_void,
    sequence1: c_uint,
}

/// `struct devinfo` from `<devstat.h>`.
#[repr(C)]
struct RawDevinfo {
    devices: *mut RawDevstat,
    mem_ptr: *mut u8,
    generation: c_long,
    numdevs: c_int,
}

/// Storage for a C `long double`; only ever written by libdevstat.
#[repr(C, align(16))]
#[allow(dead_code)]
struct LongDouble([u8; 16]);

/// `struct statinfo` from `<devstat.h>`.
#[repr(C)]
#[allow(dead_code)]
struct RawStatinfo {
    cp_time: [c_long; CPUSTATES],
    tk_nin: c_long,
    tk_nout: c_long,
    dinfo: *mut RawDevinfo,
    snap_time: LongDouble,
}

#[link(name = "devstat")]
#[link(name = "kvm")]
extern "C" {
    fn devstat_getdevs(kd: *mut c_void, stats: *mut RawStatinfo) -> c_int;
    fn devstat_checkversion(kd: *mut c_void) -> c_int;
    static devstat_errbuf: [c_char; DEVSTAT_ERRBUF_SIZE];
}

fn last_error() -> String {
    // SAFETY: libdevstat keeps a NUL-terminated message in this buffer.
    c_string_lossy(unsafe { &devstat_errbuf })
}

impl RawDevstat {
    fn kernel_counters(&self) -> KernelCounters {
        let mut duration = [0.0; DEVSTAT_N_TRANS_FLAGS];
        for (dst, src) in duration.iter_mut().zip(self.duration.iter()) {
            *dst = src.as_secs_f64();
        }
        KernelCounters {
            bytes: self.bytes,
            operations: self.operations,
            duration,
            busy_time: self.busy_time.as_secs_f64(),
            block_size: self.block_size,
            start_count: self.start_count,
            end_count: self.end_count,
        }
    }
}

/// Handle onto the kernel devstat interface (read through sysctl, no kvm).
pub struct Devstat {
    devinfo: Box<RawDevinfo>,
}

// SAFETY: the raw pointers inside `RawDevinfo` point at memory owned by this
// handle (allocated by libdevstat) and are only touched through `&mut self`.
unsafe impl Send for Devstat {}

impl Devstat {
    /// Opens the devstat interface after checking the library matches the kernel.
    pub fn new() -> Result<Self, DevstatError> {
        // SAFETY: a null kvm handle selects the sysctl interface.
        if unsafe { devstat_checkversion(ptr::null_mut()) } != 0 {
            return Err(DevstatError::VersionMismatch(last_error()));
        }
        // SAFETY: an all-zero devinfo is the documented initial state.
        let devinfo = Box::new(unsafe { mem::zeroed::<RawDevinfo>() });
        Ok(Self { devinfo })
    }
}

unsafe impl StatsProvider for Devstat {
    fn get_stats(&mut self, records: &mut *mut DeviceStatRecord) -> c_int {
        // SAFETY: zeroed statinfo is valid input; dinfo points at our devinfo.
        let mut current: RawStatinfo = unsafe { mem::zeroed() };
        current.dinfo = &mut *self.devinfo;

        // SAFETY: a null kvm handle selects sysctl; `current` is initialized
        // above and libdevstat only writes through `dinfo`.
        if unsafe { devstat_getdevs(ptr::null_mut(), &mut current) } == -1 {
            warn!("devstat_getdevs failed: {}", last_error());
            return -1;
        }

        let numdevs = self.devinfo.numdevs.max(0) as usize;
        // SAFETY: calloc has no preconditions; the result is checked for null
        // below and freed in `release`.
        let out = unsafe { libc::calloc(numdevs, mem::size_of::<DeviceStatRecord>()) }
            as *mut DeviceStatRecord;
        if out.is_null() && numdevs > 0 {
            warn!("failed to allocate {} devstat records", numdevs);
            return -1;
        }

        for i in 0..numdevs {
            // SAFETY: libdevstat filled `numdevs` entries at `devices`, and
            // `out` has room for `numdevs` records.
            unsafe {
                let dev = &*self.devinfo.devices.add(i);
                let counters = compute_counters(&dev.kernel_counters(), CUMULATIVE_ETIME);
                out.add(i).write(DeviceStatRecord::from_raw_name(
                    dev.device_name,
                    dev.unit_number,
                    counters,
                ));
            }
        }

        debug!(
            "devstat_getdevs returned {} devices (generation {})",
            numdevs, self.devinfo.generation
        );
        *records = out;
        numdevs as c_int
    }

    unsafe fn release(&mut self, records: *mut DeviceStatRecord) {
        // SAFETY: `records` is the calloced array from `get_stats`.
        libc::free(records as *mut c_void);
    }
}

impl Drop for Devstat {
    fn drop(&mut self) {
        // libdevstat allocates the device table with malloc and reuses it
        // across calls; we own it once the handle goes away.
        if !self.devinfo.mem_ptr.is_null() {
            // SAFETY: `mem_ptr` was malloced by libdevstat and nothing else
            // refers to it once the handle is dropped.
            unsafe { libc::free(self.devinfo.mem_ptr as *mut c_void) };
            self.devinfo.mem_ptr = ptr::null_mut();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bintime_conversion() {
        let bt = Bintime {
            sec: 3,
            frac: 1 << 63,
        };
        assert_eq!(bt.as_secs_f64(), 3.5);
    }

    #[test]
    fn test_native_enumeration() {
        let mut devstat = Devstat::new().expect("devstat version check");
        let buffer = crate::devstat::snapshot(&mut devstat).expect("devstat_getdevs");
        for record in buffer.records() {
            assert!(!record.name().is_empty());
        }
    }
}

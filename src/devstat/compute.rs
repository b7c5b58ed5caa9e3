//! Derived statistics for one device.
//!
//! Mirrors libdevstat's `devstat_compute_statistics()` for the case the
//! collector uses: no previous snapshot and an elapsed time of
//! [`CUMULATIVE_ETIME`], so every value is cumulative since the kernel last
//! reset the device's counters.

use super::{
    ByteCounts, DeviceCounters, Durations, Latencies, Throughput, TransferCounts, TransferRates,
    TransferSizes,
};

/// Time base used for every per-second statistic.
pub const CUMULATIVE_ETIME: f64 = 1.0;

/// Block size assumed when the kernel reports none.
const DEFAULT_BLOCK_SIZE: u64 = 512;

const BYTES_PER_KB: f64 = 1024.0;
const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Index of each transaction type in the kernel's per-type arrays.
pub const DEVSTAT_NO_DATA: usize = 0;
pub const DEVSTAT_READ: usize = 1;
pub const DEVSTAT_WRITE: usize = 2;
pub const DEVSTAT_FREE: usize = 3;
pub const DEVSTAT_N_TRANS_FLAGS: usize = 4;

/// Raw per-device counters as maintained by the kernel.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct KernelCounters {
    pub bytes: [u64; DEVSTAT_N_TRANS_FLAGS],
    pub operations: [u64; DEVSTAT_N_TRANS_FLAGS],
    /// Seconds spent per transaction type.
    pub duration: [f64; DEVSTAT_N_TRANS_FLAGS],
    /// Seconds with one or more transactions outstanding.
    pub busy_time: f64,
    pub block_size: u32,
    pub start_count: u32,
    pub end_count: u32,
}

/// Computes every derived statistic over `etime` seconds.
pub fn compute_counters(raw: &KernelCounters, etime: f64) -> DeviceCounters {
    let bytes_read = raw.bytes[DEVSTAT_READ];
    let bytes_write = raw.bytes[DEVSTAT_WRITE];
    let bytes_free = raw.bytes[DEVSTAT_FREE];
    let total_bytes = bytes_read
        .wrapping_add(bytes_write)
        .wrapping_add(bytes_free);

    let ops_read = raw.operations[DEVSTAT_READ];
    let ops_write = raw.operations[DEVSTAT_WRITE];
    let ops_free = raw.operations[DEVSTAT_FREE];
    let ops_other = raw.operations[DEVSTAT_NO_DATA];
    let total_ops = ops_read
        .wrapping_add(ops_write)
        .wrapping_add(ops_free)
        .wrapping_add(ops_other);

    let block_size = match raw.block_size {
        0 => DEFAULT_BLOCK_SIZE,
        size => u64::from(size),
    };

    let per_second = |value: f64| if etime > 0.0 { value / etime } else { 0.0 };
    let kb_per_transfer = |bytes: u64, ops: u64| {
        if ops > 0 {
            bytes as f64 / ops as f64 / BYTES_PER_KB
        } else {
            0.0
        }
    };
    let ms_per_transaction = |seconds: f64, ops: u64| {
        if ops > 0 {
            seconds * 1000.0 / ops as f64
        } else {
            0.0
        }
    };

    let busy_time = raw.busy_time.max(0.0);

    DeviceCounters {
        bytes: ByteCounts {
            read: bytes_read,
            write: bytes_write,
            free: bytes_free,
        },
        transfers: TransferCounts {
            read: ops_read,
            write: ops_write,
            free: ops_free,
            other: ops_other,
        },
        duration: Durations {
            read: raw.duration[DEVSTAT_READ],
            write: raw.duration[DEVSTAT_WRITE],
            free: raw.duration[DEVSTAT_FREE],
            other: raw.duration[DEVSTAT_NO_DATA],
        },
        busy_time,
        busy_percent: per_second(busy_time) * 100.0,
        blocks: total_bytes / block_size,
        queue_length: u64::from(raw.start_count.wrapping_sub(raw.end_count)),
        tps: TransferRates {
            read: per_second(ops_read as f64),
            write: per_second(ops_write as f64),
            free: per_second(ops_free as f64),
            other: per_second(ops_other as f64),
            total: per_second(total_ops as f64),
        },
        mbps: Throughput {
            read: per_second(bytes_read as f64 / BYTES_PER_MB),
            write: per_second(bytes_write as f64 / BYTES_PER_MB),
        },
        kbpt: TransferSizes {
            read: kb_per_transfer(bytes_read, ops_read),
            write: kb_per_transfer(bytes_write, ops_write),
            free: kb_per_transfer(bytes_free, ops_free),
        },
        mspertxn: Latencies {
            read: ms_per_transaction(raw.duration[DEVSTAT_READ], ops_read),
            write: ms_per_transaction(raw.duration[DEVSTAT_WRITE], ops_write),
            other: ms_per_transaction(raw.duration[DEVSTAT_NO_DATA], ops_other),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> KernelCounters {
        KernelCounters {
            bytes: [0, 4 * 1024 * 1024, 2 * 1024 * 1024, 1024 * 1024],
            operations: [5, 64, 32, 8],
            duration: [0.5, 2.0, 1.0, 0.25],
            busy_time: 3.5,
            block_size: 4096,
            start_count: 110,
            end_count: 108,
        }
    }

    #[test]
    fn test_totals_are_copied_per_type() {
        let c = compute_counters(&sample(), CUMULATIVE_ETIME);
        assert_eq!(c.bytes.read, 4 * 1024 * 1024);
        assert_eq!(c.bytes.write, 2 * 1024 * 1024);
        assert_eq!(c.bytes.free, 1024 * 1024);
        assert_eq!(c.transfers.other, 5);
        assert_eq!(c.transfers.read, 64);
        assert_eq!(c.duration.other, 0.5);
        assert_eq!(c.duration.read, 2.0);
        assert_eq!(c.busy_time, 3.5);
    }

    #[test]
    fn test_cumulative_rates_equal_totals() {
        let c = compute_counters(&sample(), CUMULATIVE_ETIME);
        assert_eq!(c.tps.read, 64.0);
        assert_eq!(c.tps.other, 5.0);
        assert_eq!(c.tps.total, 109.0);
        assert_eq!(c.mbps.read, 4.0);
        assert_eq!(c.mbps.write, 2.0);
        assert_eq!(c.busy_percent, 350.0);
    }

    #[test]
    fn test_averages() {
        let c = compute_counters(&sample(), CUMULATIVE_ETIME);
        assert_eq!(c.kbpt.read, 64.0);
        assert_eq!(c.kbpt.write, 64.0);
        assert_eq!(c.kbpt.free, 128.0);
        assert_eq!(c.mspertxn.read, 2000.0 / 64.0);
        assert_eq!(c.mspertxn.other, 100.0);
    }

    #[test]
    fn test_blocks_and_queue() {
        let c = compute_counters(&sample(), CUMULATIVE_ETIME);
        assert_eq!(c.blocks, 7 * 1024 * 1024 / 4096);
        assert_eq!(c.queue_length, 2);

        let raw = KernelCounters {
            block_size: 0,
            ..sample()
        };
        assert_eq!(compute_counters(&raw, CUMULATIVE_ETIME).blocks, 7 * 1024 * 1024 / 512);
    }

    #[test]
    fn test_idle_device_has_zero_averages() {
        let c = compute_counters(&KernelCounters::default(), CUMULATIVE_ETIME);
        assert_eq!(c.kbpt.read, 0.0);
        assert_eq!(c.mspertxn.write, 0.0);
        assert_eq!(c.tps.total, 0.0);
        assert_eq!(c, DeviceCounters::default());
    }

    #[test]
    fn test_zero_etime_yields_zero_rates() {
        let c = compute_counters(&sample(), 0.0);
        assert_eq!(c.tps.total, 0.0);
        assert_eq!(c.mbps.read, 0.0);
        assert_eq!(c.busy_percent, 0.0);
        // Totals do not depend on the time base
        assert_eq!(c.transfers.read, 64);
    }
}

//! Devstat collector: polls the statistics provider and translates each
//! device record into counter observations.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, trace, warn};

use crate::devstat::{snapshot, DeviceStatRecord, StatsProvider};
use crate::error::DevstatError;

/// Subsystem component of every metric name.
pub const DEVSTAT_SUBSYSTEM: &str = "devstat";

/// Namespace used by node exporters.
pub const DEFAULT_NAMESPACE: &str = "node";

/// Number of observations emitted for every device record.
pub const OBSERVATIONS_PER_DEVICE: usize = 25;

const LABELS_DEVICE: &[&str] = &["device"];
const LABELS_DEVICE_TYPE: &[&str] = &["device", "type"];

/// Metric value semantics. Every devstat series is a cumulative counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
}

/// Operation-type label values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpType {
    Read,
    Write,
    Free,
    Other,
    Total,
}

impl OpType {
    pub fn as_str(self) -> &'static str {
        match self {
            OpType::Read => "read",
            OpType::Write => "write",
            OpType::Free => "free",
            OpType::Other => "other",
            OpType::Total => "total",
        }
    }
}

impl fmt::Display for OpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every metric the collector exposes. The discriminant indexes [`METRICS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricId {
    Bytes,
    Transfers,
    Duration,
    BusyTime,
    BusyPercent,
    Blocks,
    QueueLength,
    Tps,
    Mbps,
    Kbpt,
    MsPerTxn,
}

impl MetricId {
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Static description of one metric, before namespacing.
pub struct MetricSpec {
    pub id: MetricId,
    pub name: &'static str,
    pub help: &'static str,
    pub labels: &'static [&'static str],
}

pub static METRICS: [MetricSpec; 11] = [
    MetricSpec {
        id: MetricId::Bytes,
        name: "bytes_total",
        help: "The total number of bytes in transactions.",
        labels: LABELS_DEVICE_TYPE,
    },
    MetricSpec {
        id: MetricId::Transfers,
        name: "transfers_total",
        help: "The total number of transactions.",
        labels: LABELS_DEVICE_TYPE,
    },
    MetricSpec {
        id: MetricId::Duration,
        name: "duration_seconds_total",
        help: "The total duration of transactions in seconds.",
        labels: LABELS_DEVICE_TYPE,
    },
    MetricSpec {
        id: MetricId::BusyTime,
        name: "busy_time_seconds_total",
        help: "Total time the device had one or more transactions outstanding in seconds.",
        labels: LABELS_DEVICE,
    },
    MetricSpec {
        id: MetricId::BusyPercent,
        name: "busy_time_percentage_total",
        help: "Total percentage of the block device time spent in busy.",
        labels: LABELS_DEVICE,
    },
    MetricSpec {
        id: MetricId::Blocks,
        name: "blocks_transferred_total",
        help: "The total number of blocks transferred.",
        labels: LABELS_DEVICE,
    },
    MetricSpec {
        id: MetricId::QueueLength,
        name: "queue_length",
        help: "The length of the command queue by device for pending operations.",
        labels: LABELS_DEVICE,
    },
    MetricSpec {
        id: MetricId::Tps,
        name: "transactions_per_second",
        help: "The number of IO transactions per second for each device.",
        labels: LABELS_DEVICE_TYPE,
    },
    MetricSpec {
        id: MetricId::Mbps,
        name: "megabytes_per_second",
        help: "The throughput by operation type in megabytes per second for each device.",
        labels: LABELS_DEVICE_TYPE,
    },
    MetricSpec {
        id: MetricId::Kbpt,
        name: "kilobytes_per_transfer",
        help: "The average size of the transaction by operation type in kilobytes for each device.",
        labels: LABELS_DEVICE_TYPE,
    },
    MetricSpec {
        id: MetricId::MsPerTxn,
        name: "milliseconds_per_transaction",
        help: "The average number of milliseconds per transaction per type for each device.",
        labels: LABELS_DEVICE_TYPE,
    },
];

/// One row of the translation table: which record field feeds which series.
pub struct ObservationSpec {
    pub metric: MetricId,
    pub op: Option<OpType>,
    pub value: fn(&DeviceStatRecord) -> f64,
}

macro_rules! obs {
    ($metric:ident, $op:ident, |$r:ident| $value:expr) => {
        ObservationSpec {
            metric: MetricId::$metric,
            op: Some(OpType::$op),
            value: |$r| $value as f64,
        }
    };
    ($metric:ident, |$r:ident| $value:expr) => {
        ObservationSpec {
            metric: MetricId::$metric,
            op: None,
            value: |$r| $value as f64,
        }
    };
}

/// Translation table, in emission order.
pub static OBSERVATIONS: [ObservationSpec; OBSERVATIONS_PER_DEVICE] = [
    obs!(Bytes, Read, |r| r.counters.bytes.read),
    obs!(Bytes, Write, |r| r.counters.bytes.write),
    obs!(Transfers, Other, |r| r.counters.transfers.other),
    obs!(Transfers, Read, |r| r.counters.transfers.read),
    obs!(Transfers, Write, |r| r.counters.transfers.write),
    obs!(Duration, Other, |r| r.counters.duration.other),
    obs!(Duration, Read, |r| r.counters.duration.read),
    obs!(Duration, Write, |r| r.counters.duration.write),
    obs!(BusyTime, |r| r.counters.busy_time),
    obs!(Blocks, |r| r.counters.blocks),
    obs!(BusyPercent, |r| r.counters.busy_percent),
    obs!(QueueLength, |r| r.counters.queue_length),
    obs!(Tps, Read, |r| r.counters.tps.read),
    obs!(Tps, Write, |r| r.counters.tps.write),
    obs!(Tps, Free, |r| r.counters.tps.free),
    obs!(Tps, Other, |r| r.counters.tps.other),
    obs!(Tps, Total, |r| r.counters.tps.total),
    obs!(Mbps, Read, |r| r.counters.mbps.read),
    obs!(Mbps, Write, |r| r.counters.mbps.write),
    obs!(Kbpt, Read, |r| r.counters.kbpt.read),
    obs!(Kbpt, Write, |r| r.counters.kbpt.write),
    obs!(Kbpt, Free, |r| r.counters.kbpt.free),
    obs!(MsPerTxn, Read, |r| r.counters.mspertxn.read),
    obs!(MsPerTxn, Write, |r| r.counters.mspertxn.write),
    obs!(MsPerTxn, Other, |r| r.counters.mspertxn.other),
];

/// Fully-qualified metric description, built once per collector.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricDescriptor {
    pub id: MetricId,
    pub fq_name: String,
    pub help: &'static str,
    pub kind: MetricKind,
    pub labels: &'static [&'static str],
}

/// A single translated value, borrowed from the poll in progress.
#[derive(Debug, Clone, Copy)]
pub struct Observation<'a> {
    pub desc: &'a MetricDescriptor,
    pub device: &'a str,
    pub op: Option<OpType>,
    pub value: f64,
}

impl Observation<'_> {
    /// Label values in the descriptor's label order.
    pub fn label_values(&self) -> Vec<&str> {
        let mut values = vec![self.device];
        if let Some(op) = self.op {
            values.push(op.as_str());
        }
        values
    }
}

/// Owned form of an [`Observation`].
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub name: String,
    pub kind: MetricKind,
    pub labels: Vec<(String, String)>,
    pub value: f64,
}

impl Sample {
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl From<Observation<'_>> for Sample {
    fn from(obs: Observation<'_>) -> Self {
        let labels = obs
            .desc
            .labels
            .iter()
            .zip(obs.label_values())
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Sample {
            name: obs.desc.fq_name.clone(),
            kind: obs.desc.kind,
            labels,
            value: obs.value,
        }
    }
}

/// Output channel for translated observations, supplied by the host.
pub trait MetricSink {
    fn observe(&mut self, obs: Observation<'_>);
}

impl MetricSink for Vec<Sample> {
    fn observe(&mut self, obs: Observation<'_>) {
        self.push(obs.into());
    }
}

impl<S: MetricSink + ?Sized> MetricSink for &mut S {
    fn observe(&mut self, obs: Observation<'_>) {
        (**self).observe(obs)
    }
}

/// Joins the non-empty name components with underscores.
pub fn build_fq_name(namespace: &str, subsystem: &str, name: &str) -> String {
    [namespace, subsystem, name]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("_")
}

/// Valid metric name prefix; `None` only if the pattern fails to compile.
static NAMESPACE_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z_:][a-zA-Z0-9_:]*$").ok());

/// Checks that `namespace` is usable as a metric name prefix.
pub fn validate_namespace(namespace: &str) -> Result<(), DevstatError> {
    if namespace.is_empty() {
        return Ok(());
    }
    match NAMESPACE_RE.as_ref() {
        Some(re) if re.is_match(namespace) => Ok(()),
        _ => Err(DevstatError::InvalidNamespace(namespace.to_string())),
    }
}

/// Returns the first device id that occurs more than once in `records`.
fn duplicate_device(records: &[DeviceStatRecord]) -> Option<String> {
    let mut seen = HashSet::with_capacity(records.len());
    records
        .iter()
        .map(DeviceStatRecord::device_id)
        .find(|id| !seen.insert(id.clone()))
}

/// Collector exposing device I/O statistics.
///
/// The provider sits behind a mutex held for the whole poll, so at most one
/// native enumeration is in flight per collector.
pub struct DevstatCollector<P: StatsProvider + ?Sized> {
    namespace: String,
    descriptors: Vec<MetricDescriptor>,
    provider: Mutex<P>,
}

impl<P: StatsProvider> DevstatCollector<P> {
    /// Builds the descriptor set under `namespace` (may be empty).
    pub fn new(provider: P, namespace: &str) -> Result<Self, DevstatError> {
        validate_namespace(namespace)?;

        let descriptors: Vec<MetricDescriptor> = METRICS
            .iter()
            .map(|spec| MetricDescriptor {
                id: spec.id,
                fq_name: build_fq_name(namespace, DEVSTAT_SUBSYSTEM, spec.name),
                help: spec.help,
                kind: MetricKind::Counter,
                labels: spec.labels,
            })
            .collect();

        info!(
            "devstat collector initialized: {} metrics, {} series per device, namespace '{}'",
            descriptors.len(),
            OBSERVATIONS_PER_DEVICE,
            namespace
        );

        Ok(Self {
            namespace: namespace.to_string(),
            descriptors,
            provider: Mutex::new(provider),
        })
    }
}

impl<P: StatsProvider + ?Sized> DevstatCollector<P> {
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn descriptors(&self) -> &[MetricDescriptor] {
        &self.descriptors
    }

    pub fn descriptor(&self, id: MetricId) -> &MetricDescriptor {
        &self.descriptors[id.index()]
    }

    /// Polls the provider once and writes every observation to `sink`.
    ///
    /// Returns the number of observations emitted. On enumeration failure,
    /// or when two records share a device id, nothing is emitted.
    pub fn update<S: MetricSink + ?Sized>(&self, sink: &mut S) -> Result<usize, DevstatError> {
        let start = Instant::now();
        // A panic in a previous poll's sink leaves the provider intact; the
        // buffer was already released while unwinding.
        let mut provider = self
            .provider
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        trace!("devstat lock acquired after {:?}", start.elapsed());

        let buffer = snapshot(&mut *provider)?;
        if let Some(id) = duplicate_device(buffer.records()) {
            warn!("devstat returned device '{}' more than once, dropping poll", id);
            return Err(DevstatError::DuplicateDevice(id));
        }
        let mut emitted = 0;

        for record in buffer.records() {
            let device = record.device_id();
            for spec in OBSERVATIONS.iter() {
                sink.observe(Observation {
                    desc: self.descriptor(spec.metric),
                    device: &device,
                    op: spec.op,
                    value: (spec.value)(record),
                });
                emitted += 1;
            }
        }

        let devices = buffer.len();
        drop(buffer);

        debug!(
            "devstat poll: {} devices, {} observations in {:?}",
            devices,
            emitted,
            start.elapsed()
        );
        Ok(emitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_table_is_indexed_by_id() {
        for (i, spec) in METRICS.iter().enumerate() {
            assert_eq!(spec.id.index(), i, "{} out of order", spec.name);
        }
    }

    #[test]
    fn test_observation_labels_match_schema() {
        for obs in OBSERVATIONS.iter() {
            let spec = &METRICS[obs.metric.index()];
            let expected = if obs.op.is_some() { 2 } else { 1 };
            assert_eq!(spec.labels.len(), expected, "{}", spec.name);
        }
    }

    #[test]
    fn test_every_metric_is_emitted() {
        for spec in METRICS.iter() {
            assert!(
                OBSERVATIONS.iter().any(|o| o.metric == spec.id),
                "{} never emitted",
                spec.name
            );
        }
    }

    #[test]
    fn test_no_duplicate_series() {
        for (i, a) in OBSERVATIONS.iter().enumerate() {
            for b in OBSERVATIONS.iter().skip(i + 1) {
                assert!(!(a.metric == b.metric && a.op == b.op));
            }
        }
    }

    #[test]
    fn test_build_fq_name() {
        assert_eq!(
            build_fq_name("node", "devstat", "bytes_total"),
            "node_devstat_bytes_total"
        );
        assert_eq!(build_fq_name("", "devstat", "queue_length"), "devstat_queue_length");
    }

    #[test]
    fn test_validate_namespace() {
        assert!(validate_namespace("node").is_ok());
        assert!(validate_namespace("my_exporter:v2").is_ok());
        assert!(validate_namespace("").is_ok());
        assert!(validate_namespace("9node").is_err());
        assert!(validate_namespace("node-exporter").is_err());
    }

    #[test]
    fn test_duplicate_device() {
        fn record(name: &str, unit: i32) -> DeviceStatRecord {
            DeviceStatRecord::new(name, unit, crate::devstat::DeviceCounters::default())
        }
        assert_eq!(duplicate_device(&[record("ada", 0), record("ada", 1)]), None);
        assert_eq!(
            duplicate_device(&[record("da", 1), record("ada", 0), record("da", 1)]),
            Some("da1".to_string())
        );
    }

    #[test]
    fn test_sample_labels_follow_descriptor_order() {
        let desc = MetricDescriptor {
            id: MetricId::Bytes,
            fq_name: "node_devstat_bytes_total".to_string(),
            help: "",
            kind: MetricKind::Counter,
            labels: LABELS_DEVICE_TYPE,
        };
        let sample: Sample = Observation {
            desc: &desc,
            device: "ada0",
            op: Some(OpType::Read),
            value: 1024.0,
        }
        .into();
        assert_eq!(sample.label("device"), Some("ada0"));
        assert_eq!(sample.label("type"), Some("read"));
        assert_eq!(sample.kind, MetricKind::Counter);
    }
}

//! Devstat Exporter Library
//!
//! This library polls the FreeBSD device statistics subsystem (libdevstat)
//! and translates each device's cumulative I/O counters into Prometheus
//! counter observations.
//!
//! # Features
//!
//! - **Fixed metric table**: 11 metrics, 25 series per device, all counters
//! - **Serialized native access**: one enumeration in flight per collector
//! - **Scoped foreign memory**: the record array is released exactly once per poll
//! - **Pluggable output**: anything implementing [`MetricSink`]
//!
//! # Usage
//!
//! ```rust
//! use devstat_exporter::devstat::fixture::{generate, FixtureProvider};
//! use devstat_exporter::{DevstatCollector, Sample, OBSERVATIONS_PER_DEVICE};
//!
//! let provider = FixtureProvider::new(&generate(&["ada"], 2));
//! let collector = DevstatCollector::new(provider, "node").unwrap();
//!
//! let mut samples: Vec<Sample> = Vec::new();
//! let emitted = collector.update(&mut samples).unwrap();
//! assert_eq!(emitted, 2 * OBSERVATIONS_PER_DEVICE);
//! assert_eq!(samples[0].label("device"), Some("ada0"));
//! ```

pub mod collector;
pub mod devstat;
pub mod error;
pub mod health_stats;
pub mod metrics;

// Re-export main types for convenience
pub use collector::{
    DevstatCollector, MetricDescriptor, MetricKind, MetricSink, Observation, OpType, Sample,
    DEFAULT_NAMESPACE, OBSERVATIONS_PER_DEVICE,
};
pub use devstat::{DeviceCounters, DeviceStatRecord, StatsBuffer, StatsProvider};
pub use error::DevstatError;
pub use metrics::{DevstatMetrics, ExporterMetrics};

//! Prometheus metrics definitions for devstat-exporter.
//!
//! `DevstatMetrics` is the Prometheus-backed [`MetricSink`]: one `CounterVec`
//! per descriptor, created against a scrape-local registry so concurrent
//! scrapes never share series. `ExporterMetrics` holds the exporter's own
//! per-collector telemetry and lives for the whole process.

use prometheus::proto::MetricFamily;
use prometheus::{CounterVec, Encoder, GaugeVec, Opts, Registry, TextEncoder};
use tracing::trace;

use crate::collector::{build_fq_name, MetricDescriptor, MetricSink, Observation};

/// Collector label value used in exporter telemetry.
pub const COLLECTOR_NAME: &str = "devstat";

/// Counter vectors for one scrape.
pub struct DevstatMetrics {
    // Indexed by MetricId, same order as the collector's descriptors
    counters: Vec<CounterVec>,
}

impl DevstatMetrics {
    /// Creates and registers one counter vector per descriptor.
    pub fn new(
        registry: &Registry,
        descriptors: &[MetricDescriptor],
    ) -> Result<Self, prometheus::Error> {
        let mut counters = Vec::with_capacity(descriptors.len());
        for desc in descriptors {
            let counter = CounterVec::new(Opts::new(desc.fq_name.clone(), desc.help), desc.labels)?;
            registry.register(Box::new(counter.clone()))?;
            counters.push(counter);
        }
        Ok(Self { counters })
    }
}

impl MetricSink for DevstatMetrics {
    fn observe(&mut self, obs: Observation<'_>) {
        // Each series is created fresh for this scrape, so inc_by from zero
        // sets the kernel's cumulative value.
        let counter =
            self.counters[obs.desc.id.index()].with_label_values(obs.label_values().as_slice());
        if obs.value.is_finite() && obs.value > 0.0 {
            counter.inc_by(obs.value);
        } else if obs.value != 0.0 {
            trace!(
                "{}{{device=\"{}\"}}: value {} is not a valid counter, exporting 0",
                obs.desc.fq_name,
                obs.device,
                obs.value
            );
        }
    }
}

/// Encodes metric families in the Prometheus text exposition format.
pub fn encode_text(families: &[MetricFamily]) -> Result<String, prometheus::Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

/// Exporter self-telemetry, registered once at startup.
#[derive(Clone)]
pub struct ExporterMetrics {
    pub scrape_collector_success: GaugeVec, // labels: collector
    pub scrape_collector_duration_seconds: GaugeVec, // labels: collector
}

impl ExporterMetrics {
    /// Creates and registers exporter metrics with the registry.
    pub fn new(registry: &Registry, namespace: &str) -> Result<Self, prometheus::Error> {
        let scrape_collector_success = GaugeVec::new(
            Opts::new(
                build_fq_name(namespace, "scrape", "collector_success"),
                "Whether a collector succeeded.",
            ),
            &["collector"],
        )?;
        let scrape_collector_duration_seconds = GaugeVec::new(
            Opts::new(
                build_fq_name(namespace, "scrape", "collector_duration_seconds"),
                "Duration of a collector scrape.",
            ),
            &["collector"],
        )?;

        registry.register(Box::new(scrape_collector_success.clone()))?;
        registry.register(Box::new(scrape_collector_duration_seconds.clone()))?;

        Ok(Self {
            scrape_collector_success,
            scrape_collector_duration_seconds,
        })
    }

    /// Records the outcome of one collector poll.
    pub fn record_poll(&self, collector: &str, success: bool, duration_seconds: f64) {
        self.scrape_collector_success
            .with_label_values(&[collector])
            .set(if success { 1.0 } else { 0.0 });
        self.scrape_collector_duration_seconds
            .with_label_values(&[collector])
            .set(duration_seconds);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{MetricId, MetricKind, OpType};

    fn descriptor() -> MetricDescriptor {
        MetricDescriptor {
            id: MetricId::Bytes,
            fq_name: "node_devstat_bytes_total".to_string(),
            help: "The total number of bytes in transactions.",
            kind: MetricKind::Counter,
            labels: &["device", "type"],
        }
    }

    #[test]
    fn test_observation_sets_counter_value() {
        let registry = Registry::new();
        let descriptors = vec![descriptor()];
        let mut metrics = DevstatMetrics::new(&registry, &descriptors).unwrap();

        metrics.observe(Observation {
            desc: &descriptors[0],
            device: "ada0",
            op: Some(OpType::Read),
            value: 1024.0,
        });

        let counter = metrics.counters[0].with_label_values(&["ada0", "read"]);
        assert_eq!(counter.get(), 1024.0);

        let text = encode_text(&registry.gather()).unwrap();
        assert!(text.contains("# TYPE node_devstat_bytes_total counter"));
        assert!(text.contains(r#"node_devstat_bytes_total{device="ada0",type="read"} 1024"#));
    }

    #[test]
    fn test_zero_value_still_creates_series() {
        let registry = Registry::new();
        let descriptors = vec![descriptor()];
        let mut metrics = DevstatMetrics::new(&registry, &descriptors).unwrap();

        metrics.observe(Observation {
            desc: &descriptors[0],
            device: "da1",
            op: Some(OpType::Write),
            value: 0.0,
        });

        let text = encode_text(&registry.gather()).unwrap();
        assert!(text.contains(r#"node_devstat_bytes_total{device="da1",type="write"} 0"#));
    }

    #[test]
    fn test_invalid_values_export_zero() {
        let registry = Registry::new();
        let descriptors = vec![descriptor()];
        let mut metrics = DevstatMetrics::new(&registry, &descriptors).unwrap();

        for (device, value) in [("ada0", -5.0), ("ada1", f64::NAN), ("ada2", f64::INFINITY)] {
            metrics.observe(Observation {
                desc: &descriptors[0],
                device,
                op: Some(OpType::Read),
                value,
            });
        }

        let text = encode_text(&registry.gather()).unwrap();
        for device in ["ada0", "ada1", "ada2"] {
            let line = format!(r#"node_devstat_bytes_total{{device="{}",type="read"}} 0"#, device);
            assert!(text.contains(&line), "{}", line);
        }
    }

    #[test]
    fn test_exporter_metrics_record_poll() {
        let registry = Registry::new();
        let metrics = ExporterMetrics::new(&registry, "node").unwrap();
        metrics.record_poll(COLLECTOR_NAME, false, 0.25);

        let text = encode_text(&registry.gather()).unwrap();
        assert!(text.contains(r#"node_scrape_collector_success{collector="devstat"} 0"#));
        assert!(text.contains(r#"node_scrape_collector_duration_seconds{collector="devstat"} 0.25"#));
    }
}

//! Metrics endpoint handler for Prometheus scraping.
//!
//! Every request runs exactly one devstat poll on the blocking pool. The
//! device counters go into a registry that lives only for this scrape; the
//! exporter's own telemetry comes from the process-wide registry.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use devstat_exporter::metrics::{encode_text, COLLECTOR_NAME};
use devstat_exporter::{DevstatError, DevstatMetrics, OBSERVATIONS_PER_DEVICE};
use prometheus::proto::MetricFamily;
use prometheus::Registry;
use std::time::Instant;
use tracing::{debug, error, instrument, warn};

use crate::state::{AppState, SharedState};

/// Error type for metrics endpoint failures.
#[derive(Debug)]
pub enum MetricsError {
    EncodingFailed,
    PollAborted,
}

impl IntoResponse for MetricsError {
    fn into_response(self) -> axum::response::Response {
        let message = match self {
            MetricsError::EncodingFailed => "Failed to encode metrics",
            MetricsError::PollAborted => "Device statistics poll aborted",
        };
        (StatusCode::INTERNAL_SERVER_ERROR, message).into_response()
    }
}

/// Reasons a single devstat poll produced no device metrics.
#[derive(Debug, thiserror::Error)]
enum PollError {
    #[error(transparent)]
    Devstat(#[from] DevstatError),
    #[error("metric registration failed: {0}")]
    Registry(#[from] prometheus::Error),
}

/// Output of one successful poll.
struct PollOutput {
    families: Vec<MetricFamily>,
    observations: usize,
}

/// Polls the collector into a scrape-local registry. Runs on the blocking pool.
fn poll_devstat(state: &AppState) -> Result<PollOutput, PollError> {
    let registry = Registry::new();
    let mut sink = DevstatMetrics::new(&registry, state.collector.descriptors())?;
    let observations = state.collector.update(&mut sink)?;
    Ok(PollOutput {
        families: registry.gather(),
        observations,
    })
}

/// Handler for the /metrics endpoint.
#[instrument(skip(state))]
pub async fn metrics_handler(State(state): State<SharedState>) -> Result<String, MetricsError> {
    let start = Instant::now();
    debug!("Processing /metrics request");
    state.health_stats.record_http_request();

    let poll_state = state.clone();
    let result = tokio::task::spawn_blocking(move || poll_devstat(&poll_state))
        .await
        .map_err(|e| {
            error!("devstat poll task failed: {}", e);
            MetricsError::PollAborted
        })?;
    let poll_seconds = start.elapsed().as_secs_f64();

    let mut families = match result {
        Ok(output) => {
            let devices = output.observations / OBSERVATIONS_PER_DEVICE;
            state.health_stats.record_poll_success(
                devices as u64,
                output.observations as u64,
                poll_seconds,
            );
            if let Some(exporter) = &state.exporter {
                exporter.record_poll(COLLECTOR_NAME, true, poll_seconds);
            }
            output.families
        }
        Err(e) => {
            warn!("devstat collector failed: {}", e);
            state
                .health_stats
                .record_poll_failure(&e.to_string(), poll_seconds);
            if let Some(exporter) = &state.exporter {
                exporter.record_poll(COLLECTOR_NAME, false, poll_seconds);
            }
            Vec::new()
        }
    };

    let serialize_start = Instant::now();
    families.extend(state.registry.gather());

    let body = encode_text(&families).map_err(|e| {
        error!("Failed to encode Prometheus metrics: {}", e);
        MetricsError::EncodingFailed
    })?;

    let serialization_ms = serialize_start.elapsed().as_secs_f64() * 1000.0;
    state
        .health_stats
        .record_serialization_duration_ms(serialization_ms);
    state.health_stats.record_metrics_endpoint_call();

    debug!(
        "Metrics request completed: {} families, {} bytes, {:.3}ms",
        families.len(),
        body.len(),
        start.elapsed().as_secs_f64() * 1000.0
    );

    Ok(body)
}

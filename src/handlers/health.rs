//! Health check endpoint handler.
//!
//! This module provides the `/health` endpoint handler that returns
//! exporter health statistics and the outcome of the last poll.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use devstat_exporter::health_stats::LastPoll;
use tracing::{debug, instrument};

use crate::state::SharedState;

// Time conversion constants
const SECONDS_PER_HOUR: f64 = 3600.0;
const MINUTES_PER_HOUR: f64 = 60.0;
const HOURS_PER_DAY: f64 = 24.0;

/// Footer text for human-readable HTTP endpoints.
pub const FOOTER_TEXT: &str = concat!("devstat-exporter ", env!("CARGO_PKG_VERSION"));

/// Maps the last poll outcome to an HTTP status and a short message.
pub fn poll_status(last_poll: &LastPoll) -> (StatusCode, String) {
    match last_poll {
        LastPoll::Never => (StatusCode::OK, "OK - No poll yet".to_string()),
        LastPoll::Succeeded { devices } => (StatusCode::OK, format!("OK - {} devices", devices)),
        LastPoll::Failed { error } => (
            StatusCode::SERVICE_UNAVAILABLE,
            format!("Last poll failed: {}", error),
        ),
    }
}

/// Formats an uptime in seconds the way the health page shows it.
fn format_uptime(uptime_seconds: u64) -> String {
    let uptime_hours = uptime_seconds as f64 / SECONDS_PER_HOUR;
    if uptime_hours < 1.0 {
        format!("{:.1} minutes", uptime_hours * MINUTES_PER_HOUR)
    } else if uptime_hours < HOURS_PER_DAY {
        format!("{:.1} hours", uptime_hours)
    } else {
        format!("{:.1} days", uptime_hours / HOURS_PER_DAY)
    }
}

/// Handler for the /health endpoint.
#[instrument(skip(state))]
pub async fn health_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing /health request");

    // Track HTTP request for health endpoint
    state.health_stats.record_http_request();

    let (status, message) = poll_status(&state.health_stats.last_poll());
    let uptime_str = format_uptime(state.health_stats.get_uptime_seconds());

    // Render plain-text table from HealthStats
    let table = state.health_stats.render_table();

    debug!("Health check: {} - {}", status, message);
    (
        status,
        [("Content-Type", "text/plain; charset=utf-8")],
        format!("{message}\n\nUptime: {uptime_str}\n\n{table}\n{FOOTER_TEXT}"),
    )
}

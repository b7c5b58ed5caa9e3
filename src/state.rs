//! Application state management for the exporter.
//!
//! This module defines the shared application state that is passed
//! to HTTP handlers and to the blocking poll task.

use devstat_exporter::health_stats::HealthStats;
use devstat_exporter::{DevstatCollector, ExporterMetrics, StatsProvider};
use prometheus::Registry;
use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;

/// Type alias for shared application state.
pub type SharedState = Arc<AppState>;

/// Global application state shared across requests.
pub struct AppState {
    /// Process-lifetime registry holding the exporter's own metrics.
    pub registry: Registry,
    /// Per-collector scrape telemetry, absent when disabled in config.
    pub exporter: Option<ExporterMetrics>,
    pub collector: DevstatCollector<Box<dyn StatsProvider>>,
    pub config: Arc<Config>,
    pub health_stats: Arc<HealthStats>,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

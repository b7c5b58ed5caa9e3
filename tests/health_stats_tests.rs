//! Integration tests for health stats module.
//!
//! These tests verify that HealthStats tracks poll outcomes and renders
//! them in the /health table.

use devstat_exporter::health_stats::{HealthStats, LastPoll};
use std::sync::atomic::Ordering;
use std::sync::Arc;

#[test]
fn test_health_stats_initialize_empty() {
    let stats = HealthStats::new();

    let (cur, avg, _, _, count) = stats.devices.snapshot();
    assert_eq!(count, 0);
    assert_eq!(cur, 0.0);
    assert_eq!(avg, 0.0);

    assert_eq!(stats.poll_success_count.load(Ordering::Relaxed), 0);
    assert_eq!(stats.poll_failure_count.load(Ordering::Relaxed), 0);
    assert_eq!(stats.last_poll(), LastPoll::Never);
    assert_eq!(stats.get_last_poll_time_str(), "N/A");
    assert_eq!(stats.get_poll_success_rate(), 100.0);
}

#[test]
fn test_poll_outcomes_are_tracked() {
    let stats = HealthStats::new();

    stats.record_poll_success(4, 100, 0.002);
    assert_eq!(stats.last_poll(), LastPoll::Succeeded { devices: 4 });

    stats.record_poll_failure("stat enumeration failed", 0.001);
    assert_eq!(
        stats.last_poll(),
        LastPoll::Failed {
            error: "stat enumeration failed".to_string()
        }
    );

    assert_eq!(stats.poll_success_count.load(Ordering::Relaxed), 1);
    assert_eq!(stats.poll_failure_count.load(Ordering::Relaxed), 1);
    assert_eq!(stats.get_poll_success_rate(), 50.0);

    let (_, _, max, min, count) = stats.poll_duration_seconds.snapshot();
    assert_eq!(count, 2);
    assert_eq!(max, 0.002);
    assert_eq!(min, 0.001);

    // Failures do not feed the device statistics
    let (cur, _, _, _, count) = stats.devices.snapshot();
    assert_eq!(count, 1);
    assert_eq!(cur, 4.0);

    assert_ne!(stats.get_last_poll_time_str(), "N/A");
}

#[test]
fn test_render_table_contains_sections() {
    let stats = HealthStats::new();
    stats.record_poll_success(2, 50, 0.01);
    stats.record_metrics_endpoint_call();
    stats.record_http_request();
    stats.record_serialization_duration_ms(0.5);

    let table = stats.render_table();
    assert!(table.contains("HEALTH ENDPOINT - EXPORTER INTERNAL STATS"));
    assert!(table.contains("POLL PERFORMANCE"));
    assert!(table.contains("COUNTERS"));
    assert!(table.contains("polls_succeeded"));
    assert!(table.contains("metrics_endpoint_calls"));
    assert!(!table.contains("last_error"));

    stats.record_poll_failure("boom", 0.01);
    assert!(stats.render_table().contains("boom"));
}

#[test]
fn test_concurrent_recording() {
    let stats = Arc::new(HealthStats::new());

    std::thread::scope(|s| {
        for _ in 0..8 {
            let stats = stats.clone();
            s.spawn(move || {
                for _ in 0..100 {
                    stats.record_poll_success(1, 25, 0.001);
                    stats.record_http_request();
                }
            });
        }
    });

    assert_eq!(stats.poll_success_count.load(Ordering::Relaxed), 800);
    assert_eq!(stats.http_request_timestamps.count_last_minute(), 800);
    let (_, _, _, _, count) = stats.observations.snapshot();
    assert_eq!(count, 800);
}

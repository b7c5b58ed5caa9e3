//! Health statistics and monitoring for the exporter.
//!
//! This module provides types and functionality for tracking exporter health,
//! including poll performance, failures, and HTTP request metrics.

use std::collections::VecDeque;
use std::fmt::Write as FmtWrite;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock as StdRwLock};
use std::time::{Instant, SystemTime};

/// Running statistics for a single metric.
#[derive(Clone, Copy, Default)]
pub struct RunningStat {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
    last: f64,
}

impl RunningStat {
    pub fn add(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
            self.last = value;
            self.sum = value;
            self.count = 1;
            return;
        }
        self.count += 1;
        self.sum += value;
        self.last = value;
        if value < self.min {
            self.min = value;
        }
        if value > self.max {
            self.max = value;
        }
    }

    pub fn avg(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / (self.count as f64)
        }
    }
}

/// Thread-safe wrapper for running statistics.
#[derive(Default)]
pub struct Stat {
    inner: Mutex<RunningStat>,
}

impl Stat {
    pub fn add_sample(&self, value: f64) {
        if let Ok(mut s) = self.inner.lock() {
            s.add(value);
        }
    }

    /// Returns (last, avg, max, min, count).
    pub fn snapshot(&self) -> (f64, f64, f64, f64, u64) {
        if let Ok(s) = self.inner.lock() {
            (s.last, s.avg(), s.max, s.min, s.count)
        } else {
            (0.0, 0.0, 0.0, 0.0, 0)
        }
    }
}

/// Thread-safe circular buffer for tracking HTTP request timestamps.
pub struct RequestTimestamps {
    inner: Mutex<VecDeque<Instant>>,
}

impl Default for RequestTimestamps {
    fn default() -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(1024)),
        }
    }
}

impl RequestTimestamps {
    pub fn record(&self) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.push_back(Instant::now());
            // Keep only last 10 minutes of timestamps to avoid unbounded growth
            let cutoff = Instant::now() - std::time::Duration::from_secs(600);
            while guard.front().is_some_and(|&t| t < cutoff) {
                guard.pop_front();
            }
        }
    }

    pub fn count_last_minute(&self) -> u64 {
        if let Ok(guard) = self.inner.lock() {
            let cutoff = Instant::now() - std::time::Duration::from_secs(60);
            guard.iter().filter(|&&t| t >= cutoff).count() as u64
        } else {
            0
        }
    }
}

/// Outcome of the most recent poll.
#[derive(Debug, Clone, PartialEq)]
pub enum LastPoll {
    Never,
    Succeeded { devices: u64 },
    Failed { error: String },
}

/// Health statistics for the exporter.
pub struct HealthStats {
    // Poll performance
    pub devices: Stat,
    pub observations: Stat,
    pub poll_duration_seconds: Stat,
    pub poll_success_count: AtomicU64,
    pub poll_failure_count: AtomicU64,

    // HTTP server stats
    pub http_request_timestamps: RequestTimestamps,
    pub metrics_endpoint_calls: AtomicU64,
    pub serialization_duration_ms: Stat,

    // Timing
    pub start_time: Instant,
    pub last_poll_time: StdRwLock<Option<Instant>>,
    pub last_poll: StdRwLock<LastPoll>,
}

impl Default for HealthStats {
    fn default() -> Self {
        Self {
            devices: Stat::default(),
            observations: Stat::default(),
            poll_duration_seconds: Stat::default(),
            poll_success_count: AtomicU64::new(0),
            poll_failure_count: AtomicU64::new(0),
            http_request_timestamps: RequestTimestamps::default(),
            metrics_endpoint_calls: AtomicU64::new(0),
            serialization_duration_ms: Stat::default(),
            start_time: Instant::now(),
            last_poll_time: StdRwLock::new(None),
            last_poll: StdRwLock::new(LastPoll::Never),
        }
    }
}

impl HealthStats {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn record_poll_success(&self, devices: u64, observations: u64, duration_seconds: f64) {
        self.devices.add_sample(devices as f64);
        self.observations.add_sample(observations as f64);
        self.poll_duration_seconds.add_sample(duration_seconds);
        self.poll_success_count.fetch_add(1, Ordering::Relaxed);
        self.set_last_poll(LastPoll::Succeeded { devices });
    }

    pub fn record_poll_failure(&self, error: &str, duration_seconds: f64) {
        self.poll_duration_seconds.add_sample(duration_seconds);
        self.poll_failure_count.fetch_add(1, Ordering::Relaxed);
        self.set_last_poll(LastPoll::Failed {
            error: error.to_string(),
        });
    }

    fn set_last_poll(&self, outcome: LastPoll) {
        if let Ok(mut guard) = self.last_poll.write() {
            *guard = outcome;
        }
        if let Ok(mut guard) = self.last_poll_time.write() {
            *guard = Some(Instant::now());
        }
    }

    pub fn last_poll(&self) -> LastPoll {
        self.last_poll
            .read()
            .map(|guard| guard.clone())
            .unwrap_or(LastPoll::Never)
    }

    pub fn record_http_request(&self) {
        self.http_request_timestamps.record();
    }

    pub fn record_metrics_endpoint_call(&self) {
        self.metrics_endpoint_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_serialization_duration_ms(&self, duration_ms: f64) {
        self.serialization_duration_ms.add_sample(duration_ms);
    }

    pub fn get_poll_success_rate(&self) -> f64 {
        let success = self.poll_success_count.load(Ordering::Relaxed);
        let failure = self.poll_failure_count.load(Ordering::Relaxed);
        let total = success + failure;
        if total == 0 {
            100.0
        } else {
            (success as f64 / total as f64) * 100.0
        }
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn get_last_poll_time_str(&self) -> String {
        const SECS_PER_DAY: u64 = 86400;
        const SECS_PER_HOUR: u64 = 3600;
        const SECS_PER_MINUTE: u64 = 60;

        if let Ok(guard) = self.last_poll_time.read() {
            if let Some(last_poll) = *guard {
                let elapsed_since_poll = last_poll.elapsed();
                let now = SystemTime::now();
                if let Ok(duration) = now.duration_since(SystemTime::UNIX_EPOCH) {
                    let poll_time_secs = duration
                        .as_secs()
                        .saturating_sub(elapsed_since_poll.as_secs());
                    let hours = (poll_time_secs % SECS_PER_DAY) / SECS_PER_HOUR;
                    let minutes = (poll_time_secs % SECS_PER_HOUR) / SECS_PER_MINUTE;
                    let seconds = poll_time_secs % SECS_PER_MINUTE;
                    return format!("{:02}:{:02}:{:02} UTC", hours, minutes, seconds);
                }
            }
        }
        "N/A".to_string()
    }

    pub fn render_table(&self) -> String {
        let left_col = 26usize;
        let col_w = 12usize;

        let mut out = String::new();

        writeln!(out, "HEALTH ENDPOINT - EXPORTER INTERNAL STATS").ok();
        writeln!(out, "==========================================").ok();
        writeln!(out).ok();

        writeln!(
            out,
            "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
            "",
            "current",
            "average",
            "max",
            "min",
            left = left_col,
            col = col_w
        )
        .ok();

        writeln!(out).ok();
        writeln!(out, "POLL PERFORMANCE").ok();
        writeln!(out, "----------------").ok();

        let rows = [
            ("devices", &self.devices, 0usize),
            ("observations", &self.observations, 0),
            ("poll_duration (s)", &self.poll_duration_seconds, 3),
            ("serialization (ms)", &self.serialization_duration_ms, 2),
        ];
        for (label, stat, precision) in rows {
            let (cur, avg, max, min, _) = stat.snapshot();
            writeln!(
                out,
                "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
                label,
                format!("{:.*}", precision, cur),
                format!("{:.*}", precision.max(1), avg),
                format!("{:.*}", precision, max),
                format!("{:.*}", precision, min),
                left = left_col,
                col = col_w
            )
            .ok();
        }

        writeln!(out).ok();
        writeln!(out, "COUNTERS").ok();
        writeln!(out, "--------").ok();
        writeln!(
            out,
            "{:left$} | {}",
            "polls_succeeded",
            self.poll_success_count.load(Ordering::Relaxed),
            left = left_col
        )
        .ok();
        writeln!(
            out,
            "{:left$} | {}",
            "polls_failed",
            self.poll_failure_count.load(Ordering::Relaxed),
            left = left_col
        )
        .ok();
        writeln!(
            out,
            "{:left$} | {:.1}",
            "poll_success_rate (%)",
            self.get_poll_success_rate(),
            left = left_col
        )
        .ok();
        writeln!(
            out,
            "{:left$} | {}",
            "metrics_endpoint_calls",
            self.metrics_endpoint_calls.load(Ordering::Relaxed),
            left = left_col
        )
        .ok();
        writeln!(
            out,
            "{:left$} | {}",
            "http_requests_last_minute",
            self.http_request_timestamps.count_last_minute(),
            left = left_col
        )
        .ok();
        writeln!(
            out,
            "{:left$} | {}",
            "last_poll",
            self.get_last_poll_time_str(),
            left = left_col
        )
        .ok();

        if let LastPoll::Failed { error } = self.last_poll() {
            writeln!(out, "{:left$} | {}", "last_error", error, left = left_col).ok();
        }

        out
    }
}

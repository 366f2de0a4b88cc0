//! Refresh cycle metrics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Counters kept by the refresh scheduler.
#[derive(Debug, Default)]
pub struct RefreshMetrics {
    pub cycles_started: u64,
    pub cycles_succeeded: u64,
    pub cycles_failed: u64,
    pub consecutive_failures: u64,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_duration_ms: u64,
    pub node_count: usize,
    pub link_count: usize,
}

impl RefreshMetrics {
    /// Record a cycle start and return its number, starting at 1.
    pub fn record_cycle_start(&mut self) -> u64 {
        self.cycles_started += 1;
        self.cycles_started
    }

    /// Record a published snapshot.
    pub fn record_success(&mut self, nodes: usize, links: usize, elapsed: Duration) {
        self.cycles_succeeded += 1;
        self.consecutive_failures = 0;
        self.last_success = Some(Utc::now());
        self.last_error = None;
        self.last_duration_ms = elapsed.as_millis() as u64;
        self.node_count = nodes;
        self.link_count = links;
    }

    /// Record an aborted cycle. Node and link counts keep describing the
    /// snapshot still being served.
    pub fn record_failure(&mut self, error: &str, elapsed: Duration) {
        self.cycles_failed += 1;
        self.consecutive_failures += 1;
        self.last_error = Some(error.to_string());
        self.last_duration_ms = elapsed.as_millis() as u64;
    }

    pub fn snapshot(&self) -> RefreshMetricsSnapshot {
        RefreshMetricsSnapshot {
            cycles_started: self.cycles_started,
            cycles_succeeded: self.cycles_succeeded,
            cycles_failed: self.cycles_failed,
            consecutive_failures: self.consecutive_failures,
            last_success: self.last_success,
            last_error: self.last_error.clone(),
            last_duration_ms: self.last_duration_ms,
            node_count: self.node_count,
            link_count: self.link_count,
        }
    }
}

/// Serializable view of [`RefreshMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RefreshMetricsSnapshot {
    pub cycles_started: u64,
    pub cycles_succeeded: u64,
    pub cycles_failed: u64,
    pub consecutive_failures: u64,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_duration_ms: u64,
    pub node_count: usize,
    pub link_count: usize,
}

impl RefreshMetricsSnapshot {
    /// `"ok"` once a cycle succeeded and the last one did not fail,
    /// `"degraded"` after a failure, `"starting"` before any cycle finished.
    pub fn status(&self) -> &'static str {
        if self.consecutive_failures > 0 {
            "degraded"
        } else if self.cycles_succeeded > 0 {
            "ok"
        } else {
            "starting"
        }
    }
}

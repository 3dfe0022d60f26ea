use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub timestamp: String,
    pub uptime_secs: u64,
    pub operations: TotalsMetrics,
    pub latency: LatencyMetrics,
    pub restarts: u64,
    pub by_operation: BTreeMap<String, OperationMetrics>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TotalsMetrics {
    pub total: u64,
    pub success: u64,
    pub failed: u64,
    pub success_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LatencyMetrics {
    pub avg_ms: f64,
    pub min_ms: u64,
    pub max_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OperationMetrics {
    pub success: u64,
    pub failed: u64,
}

/// Counts ledger operations and their latency. Cheap to share behind an `Arc`.
#[derive(Debug)]
pub struct MetricsCollector {
    ops_total: AtomicU64,
    ops_success: AtomicU64,
    ops_failed: AtomicU64,
    latency_sum_ms: AtomicU64,
    latency_min_ms: AtomicU64,
    latency_max_ms: AtomicU64,
    restarts: AtomicU64,
    by_operation: Mutex<BTreeMap<String, OperationMetrics>>,
    start_time: Instant,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self {
            ops_total: AtomicU64::new(0),
            ops_success: AtomicU64::new(0),
            ops_failed: AtomicU64::new(0),
            latency_sum_ms: AtomicU64::new(0),
            latency_min_ms: AtomicU64::new(u64::MAX),
            latency_max_ms: AtomicU64::new(0),
            restarts: AtomicU64::new(0),
            by_operation: Mutex::new(BTreeMap::new()),
            start_time: Instant::now(),
        }
    }
}

impl MetricsCollector {
    pub fn record_operation(&self, name: &str, latency: Duration, success: bool) {
        let latency_ms = latency.as_millis() as u64;

        self.ops_total.fetch_add(1, Ordering::SeqCst);
        self.latency_sum_ms.fetch_add(latency_ms, Ordering::SeqCst);
        self.latency_min_ms.fetch_min(latency_ms, Ordering::SeqCst);
        self.latency_max_ms.fetch_max(latency_ms, Ordering::SeqCst);

        if success {
            self.ops_success.fetch_add(1, Ordering::SeqCst);
        } else {
            self.ops_failed.fetch_add(1, Ordering::SeqCst);
        }

        let mut by_operation = self
            .by_operation
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let entry = by_operation.entry(name.to_string()).or_default();
        if success {
            entry.success += 1;
        } else {
            entry.failed += 1;
        }
    }

    pub fn record_restart(&self) {
        self.restarts.fetch_add(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let total = self.ops_total.load(Ordering::SeqCst);
        let success = self.ops_success.load(Ordering::SeqCst);
        let latency_sum = self.latency_sum_ms.load(Ordering::SeqCst);
        let min_latency = self.latency_min_ms.load(Ordering::SeqCst);

        MetricsSnapshot {
            timestamp: Utc::now().to_rfc3339(),
            uptime_secs: self.uptime().as_secs(),
            operations: TotalsMetrics {
                total,
                success,
                failed: self.ops_failed.load(Ordering::SeqCst),
                success_rate: if total > 0 {
                    success as f64 / total as f64 * 100.0
                } else {
                    0.0
                },
            },
            latency: LatencyMetrics {
                avg_ms: if total > 0 {
                    latency_sum as f64 / total as f64
                } else {
                    0.0
                },
                min_ms: if min_latency == u64::MAX {
                    0
                } else {
                    min_latency
                },
                max_ms: self.latency_max_ms.load(Ordering::SeqCst),
            },
            restarts: self.restarts.load(Ordering::SeqCst),
            by_operation: self
                .by_operation
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }

    pub fn to_json(&self) -> String {
        let snapshot = self.snapshot();
        serde_json::to_string_pretty(&snapshot).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn operation(&self, name: &str) -> OperationMetrics {
        self.by_operation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    pub fn ops_success(&self) -> u64 {
        self.ops_success.load(Ordering::SeqCst)
    }

    pub fn ops_failed(&self) -> u64 {
        self.ops_failed.load(Ordering::SeqCst)
    }

    pub fn restarts(&self) -> u64 {
        self.restarts.load(Ordering::SeqCst)
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }
}

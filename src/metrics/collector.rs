//! # Collector de Métricas
//! src/metrics/collector.rs
//!
//! Recolecta y agrega métricas del servidor en tiempo real: requests HTTP
//! (conteos, latencias) y ciclo de vida de tareas de generación.

use crate::jobs::types::TaskStatus;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Máximo de latencias a guardar (para calcular percentiles)
const MAX_LATENCIES: usize = 10_000;

/// Collector de métricas thread-safe
#[derive(Clone)]
pub struct MetricsCollector {
    inner: Arc<Mutex<MetricsData>>,
    start_time: Instant,
}

#[derive(Default)]
struct MetricsData {
    total_requests: u64,
    status_codes: HashMap<u16, u64>,
    /// Latencias registradas (en microsegundos)
    latencies: Vec<u64>,
    requests_per_route: HashMap<String, u64>,
    active_connections: u64,

    tasks_submitted: u64,
    tasks_deduplicated: u64,
    tasks_in_flight: u64,
    tasks_completed: u64,
    tasks_failed: u64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MetricsData {
                latencies: Vec::with_capacity(MAX_LATENCIES),
                ..MetricsData::default()
            })),
            start_time: Instant::now(),
        }
    }

    // Un panic con el lock tomado no invalida contadores
    fn data(&self) -> MutexGuard<'_, MetricsData> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registra un request ya respondido. `route` es el patrón, no la ruta
    /// concreta, para no abrir una entrada por cada task id.
    pub fn record_request(&self, route: &str, status_code: u16, latency: Duration) {
        let mut data = self.data();

        data.total_requests += 1;
        *data.status_codes.entry(status_code).or_insert(0) += 1;

        if data.latencies.len() >= MAX_LATENCIES {
            data.latencies.remove(0);
        }
        data.latencies.push(latency.as_micros() as u64);

        *data.requests_per_route.entry(route.to_string()).or_insert(0) += 1;
    }

    pub fn increment_active_connections(&self) {
        self.data().active_connections += 1;
    }

    pub fn decrement_active_connections(&self) {
        let mut data = self.data();
        data.active_connections = data.active_connections.saturating_sub(1);
    }

    pub fn active_connections(&self) -> u64 {
        self.data().active_connections
    }

    /// Submit que creó una tarea nueva
    pub fn record_task_submitted(&self) {
        self.data().tasks_submitted += 1;
    }

    /// Submit resuelto contra una tarea ya en curso
    pub fn record_task_deduplicated(&self) {
        self.data().tasks_deduplicated += 1;
    }

    pub fn record_task_started(&self) {
        self.data().tasks_in_flight += 1;
    }

    pub fn record_task_finished(&self, status: TaskStatus) {
        let mut data = self.data();
        data.tasks_in_flight = data.tasks_in_flight.saturating_sub(1);
        match status {
            TaskStatus::Completed => data.tasks_completed += 1,
            TaskStatus::Failed => data.tasks_failed += 1,
            TaskStatus::Processing => {}
        }
    }

    /// Métricas actuales en formato JSON
    pub fn get_metrics_json(&self) -> serde_json::Value {
        let snapshot = self.get_snapshot();
        let data = self.data();

        let status_codes: HashMap<String, u64> = data
            .status_codes
            .iter()
            .map(|(code, count)| (code.to_string(), *count))
            .collect();

        // Top 10 rutas más accedidas
        let mut routes: Vec<_> = data.requests_per_route.iter().collect();
        routes.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        let top_routes: Vec<_> = routes
            .iter()
            .take(10)
            .map(|(route, count)| json!({ "route": route, "count": count }))
            .collect();

        let stddev = calculate_stddev(&data.latencies, snapshot.latency_avg_us);

        json!({
            "server": {
                "uptime_seconds": snapshot.uptime_secs,
            },
            "requests": {
                "total": snapshot.total_requests,
                "active_connections": snapshot.active_connections,
                "status_codes": status_codes,
                "top_routes": top_routes,
            },
            "latency_us": {
                "p50": snapshot.latency_p50_us,
                "p95": snapshot.latency_p95_us,
                "p99": snapshot.latency_p99_us,
                "avg": snapshot.latency_avg_us,
                "stddev": (stddev * 100.0).round() / 100.0,
                "samples": data.latencies.len(),
            },
            "tasks": {
                "submitted": snapshot.tasks_submitted,
                "deduplicated": snapshot.tasks_deduplicated,
                "in_flight": snapshot.tasks_in_flight,
                "completed": snapshot.tasks_completed,
                "failed": snapshot.tasks_failed,
            }
        })
    }

    pub fn get_snapshot(&self) -> MetricsSnapshot {
        let data = self.data();
        let (p50, p95, p99, avg) = calculate_percentiles(&data.latencies);

        MetricsSnapshot {
            total_requests: data.total_requests,
            active_connections: data.active_connections,
            uptime_secs: self.start_time.elapsed().as_secs(),
            latency_p50_us: p50,
            latency_p95_us: p95,
            latency_p99_us: p99,
            latency_avg_us: avg,
            tasks_submitted: data.tasks_submitted,
            tasks_deduplicated: data.tasks_deduplicated,
            tasks_in_flight: data.tasks_in_flight,
            tasks_completed: data.tasks_completed,
            tasks_failed: data.tasks_failed,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// (p50, p95, p99, promedio)
fn calculate_percentiles(latencies: &[u64]) -> (u64, u64, u64, u64) {
    if latencies.is_empty() {
        return (0, 0, 0, 0);
    }

    let mut sorted = latencies.to_vec();
    sorted.sort_unstable();

    let len = sorted.len();
    let p50 = sorted[len * 50 / 100];
    let p95 = sorted[len * 95 / 100];
    let p99 = sorted[len * 99 / 100];
    let avg = sorted.iter().sum::<u64>() / len as u64;

    (p50, p95, p99, avg)
}

fn calculate_stddev(latencies: &[u64], avg: u64) -> f64 {
    if latencies.is_empty() {
        return 0.0;
    }

    let variance: f64 = latencies
        .iter()
        .map(|&x| {
            let diff = x as f64 - avg as f64;
            diff * diff
        })
        .sum::<f64>()
        / latencies.len() as f64;

    variance.sqrt()
}

/// Snapshot de métricas (para uso externo)
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub active_connections: u64,
    pub uptime_secs: u64,
    pub latency_p50_us: u64,
    pub latency_p95_us: u64,
    pub latency_p99_us: u64,
    pub latency_avg_us: u64,
    pub tasks_submitted: u64,
    pub tasks_deduplicated: u64,
    pub tasks_in_flight: u64,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_counting() {
        let collector = MetricsCollector::new();

        collector.record_request("/health", 200, Duration::from_millis(10));
        collector.record_request("/api/design/psd/status/:task_id", 200, Duration::from_millis(20));
        collector.record_request("/api/design/psd/status/:task_id", 404, Duration::from_millis(5));

        assert_eq!(collector.get_snapshot().total_requests, 3);
    }

    #[test]
    fn test_percentiles() {
        let collector = MetricsCollector::new();
        for i in 1..=100 {
            collector.record_request("/health", 200, Duration::from_micros(i));
        }

        let snapshot = collector.get_snapshot();
        assert!(snapshot.latency_p50_us > 0);
        assert!(snapshot.latency_p95_us > snapshot.latency_p50_us);
        assert!(snapshot.latency_p99_us > snapshot.latency_p95_us);
    }

    #[test]
    fn test_active_connections_never_negative() {
        let collector = MetricsCollector::new();
        collector.increment_active_connections();
        collector.decrement_active_connections();
        collector.decrement_active_connections();
        assert_eq!(collector.active_connections(), 0);
    }

    #[test]
    fn test_task_lifecycle_counters() {
        let collector = MetricsCollector::new();

        collector.record_task_submitted();
        collector.record_task_started();
        collector.record_task_submitted();
        collector.record_task_started();
        collector.record_task_deduplicated();

        let snapshot = collector.get_snapshot();
        assert_eq!(snapshot.tasks_submitted, 2);
        assert_eq!(snapshot.tasks_deduplicated, 1);
        assert_eq!(snapshot.tasks_in_flight, 2);

        collector.record_task_finished(TaskStatus::Completed);
        collector.record_task_finished(TaskStatus::Failed);

        let snapshot = collector.get_snapshot();
        assert_eq!(snapshot.tasks_in_flight, 0);
        assert_eq!(snapshot.tasks_completed, 1);
        assert_eq!(snapshot.tasks_failed, 1);
    }

    #[test]
    fn test_json_format() {
        let collector = MetricsCollector::new();
        collector.record_request("/health", 200, Duration::from_millis(50));
        collector.record_request("/health", 200, Duration::from_millis(40));
        collector.record_request("/metrics", 200, Duration::from_millis(5));
        collector.record_task_submitted();

        let json = collector.get_metrics_json();
        assert_eq!(json["requests"]["total"], 3);
        assert_eq!(json["requests"]["status_codes"]["200"], 3);
        assert_eq!(json["requests"]["top_routes"][0]["route"], "/health");
        assert_eq!(json["tasks"]["submitted"], 1);
        assert!(json["latency_us"]["p50"].as_u64().unwrap() > 0);
    }

    #[test]
    fn test_latency_window_management() {
        let collector = MetricsCollector::new();
        for i in 0..15_000 {
            collector.record_request("/health", 200, Duration::from_micros(i));
        }

        let json = collector.get_metrics_json();
        assert_eq!(json["latency_us"]["samples"], MAX_LATENCIES);
        assert_eq!(collector.get_snapshot().total_requests, 15_000);
    }

    #[test]
    fn test_poisoned_lock_still_counts() {
        let collector = MetricsCollector::new();
        let clone = collector.clone();
        let _ = std::thread::spawn(move || {
            let _guard = clone.inner.lock().unwrap();
            panic!("poison");
        })
        .join();

        collector.record_task_submitted();
        assert_eq!(collector.get_snapshot().tasks_submitted, 1);
    }
}

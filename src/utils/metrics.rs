use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Request metrics collector shared by every API call of a run
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    /// In-memory metrics store
    metrics: Arc<Mutex<Metrics>>,
}

/// Metrics data structure
#[derive(Debug, Clone, Serialize)]
pub struct Metrics {
    /// Start time of the metrics collection
    pub start_time: DateTime<Utc>,

    /// Total requests made
    pub total_requests: usize,

    /// Successful requests
    pub successful_requests: usize,

    /// Failed requests (any non-2xx or transport error)
    pub failed_requests: usize,

    /// Responses that asked us to slow down
    pub rate_limited: usize,

    /// Time spent per endpoint (endpoint label -> total milliseconds)
    pub endpoint_time_ms: HashMap<String, u64>,

    /// Requests per endpoint label
    pub endpoint_requests: HashMap<String, usize>,

    /// HTTP status code counts
    pub status_codes: HashMap<u16, usize>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            start_time: Utc::now(),
            total_requests: 0,
            successful_requests: 0,
            failed_requests: 0,
            rate_limited: 0,
            endpoint_time_ms: HashMap::new(),
            endpoint_requests: HashMap::new(),
            status_codes: HashMap::new(),
        }
    }
}

impl MetricsCollector {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            metrics: Arc::new(Mutex::new(Metrics::default())),
        }
    }

    /// Record a finished request
    pub async fn record_request(&self, endpoint: &str, duration_ms: u64, status_code: Option<u16>) {
        let mut metrics = self.metrics.lock().await;

        metrics.total_requests += 1;

        let success = matches!(status_code, Some(code) if (200..400).contains(&code));
        if success {
            metrics.successful_requests += 1;
        } else {
            metrics.failed_requests += 1;
        }

        if let Some(code) = status_code {
            *metrics.status_codes.entry(code).or_default() += 1;
            if code == 429 {
                metrics.rate_limited += 1;
            }
        }

        *metrics.endpoint_time_ms.entry(endpoint.to_string()).or_default() += duration_ms;
        *metrics.endpoint_requests.entry(endpoint.to_string()).or_default() += 1;
    }

    /// Start timing a request
    pub fn start_timer(&self) -> RequestTimer {
        RequestTimer {
            start: Instant::now(),
        }
    }

    /// Get all metrics
    pub async fn get_metrics(&self) -> Metrics {
        self.metrics.lock().await.clone()
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Request timer for measuring request durations
pub struct RequestTimer {
    /// Start time of the request
    start: Instant,
}

impl RequestTimer {
    /// End timing and get the duration in milliseconds
    pub fn end(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_record_request_counts() {
        let collector = MetricsCollector::new();
        collector.record_request("resolve", 12, Some(200)).await;
        collector.record_request("comments", 30, Some(429)).await;
        collector.record_request("comments", 5, None).await;

        let metrics = collector.get_metrics().await;
        assert_eq!(metrics.total_requests, 3);
        assert_eq!(metrics.successful_requests, 1);
        assert_eq!(metrics.failed_requests, 2);
        assert_eq!(metrics.rate_limited, 1);
        assert_eq!(metrics.endpoint_requests["comments"], 2);
        assert_eq!(metrics.endpoint_time_ms["comments"], 35);
        assert_eq!(metrics.status_codes[&429], 1);
    }
}

//! Connector metrics
//!
//! Recorded through the `metrics` facade; nothing is exported unless the
//! host process installs a recorder.

use std::time::{Duration, Instant};

/// Record the duration of a backend request
pub fn record_fetch_duration(kind: &str, backend: &str, duration: Duration) {
    metrics::histogram!(
        "prism_tap_fetch_duration_seconds",
        "kind" => kind.to_string(),
        "backend" => backend.to_string(),
    )
    .record(duration.as_secs_f64());
}

/// Record a page received from the backend
pub fn record_page_fetched(kind: &str, backend: &str, documents: usize) {
    metrics::counter!(
        "prism_tap_pages_total",
        "kind" => kind.to_string(),
        "backend" => backend.to_string(),
    )
    .increment(1);

    metrics::counter!(
        "prism_tap_documents_total",
        "backend" => backend.to_string(),
    )
    .increment(documents as u64);
}

/// Record a failed backend request
pub fn record_fetch_error(kind: &str, backend: &str, error_type: &str) {
    metrics::counter!(
        "prism_tap_fetch_errors_total",
        "kind" => kind.to_string(),
        "backend" => backend.to_string(),
        "error_type" => error_type.to_string(),
    )
    .increment(1);
}

/// Record a page that exceeded the requested size and was cut
pub fn record_page_truncated(backend: &str, dropped: usize) {
    metrics::counter!(
        "prism_tap_truncated_documents_total",
        "backend" => backend.to_string(),
    )
    .increment(dropped as u64);
}

/// Record a path that ran into a scalar while decoding
pub fn record_decode_anomaly() {
    metrics::counter!("prism_tap_decode_anomalies_total").increment(1);
}

/// Times one backend request
pub struct FetchTimer {
    kind: &'static str,
    backend: &'static str,
    start: Instant,
}

impl FetchTimer {
    pub fn new(kind: &'static str, backend: &'static str) -> Self {
        Self {
            kind,
            backend,
            start: Instant::now(),
        }
    }

    pub fn success(self, documents: usize) {
        record_fetch_duration(self.kind, self.backend, self.start.elapsed());
        record_page_fetched(self.kind, self.backend, documents);
    }

    pub fn error(self, error_type: &str) {
        record_fetch_duration(self.kind, self.backend, self.start.elapsed());
        record_fetch_error(self.kind, self.backend, error_type);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_timer_without_recorder() {
        let timer = FetchTimer::new("search", "memory");
        std::thread::sleep(Duration::from_millis(1));
        timer.success(10);

        FetchTimer::new("scroll", "memory").error("connection");
        record_decode_anomaly();
        record_page_truncated("memory", 3);
    }
}

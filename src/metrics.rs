//! Production observability metrics for harvest runs
//!
//! Counters and histograms go through the `metrics` facade and are no-ops
//! until [`init_metrics`] installs the Prometheus exporter, so library code
//! records unconditionally.
//!
//! ## Metrics
//!
//! - `http_requests_total` / `http_request_duration_seconds`
//! - `http_retries_total` / `retry_backoff_duration_seconds`
//! - `throttle_wait_seconds`
//! - `index_pages_total` / `index_entries_total`
//! - `items_completed_total` / `item_duration_seconds`
//! - `flushes_total` / `flush_duration_seconds`

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Set once the exporter is installed
static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Correlation ID generator for request tracing
static CORRELATION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Install the Prometheus exporter on `addr`.
///
/// Idempotent: later calls are ignored.
///
/// # Errors
/// Fails if the listener cannot be bound or a recorder is already installed.
pub fn init_metrics(addr: SocketAddr) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        debug!("Metrics already initialized, skipping");
        return Ok(());
    }

    info!("Initializing metrics system on {}", addr);

    if let Err(e) = PrometheusBuilder::new().with_http_listener(addr).install() {
        METRICS_INITIALIZED.store(false, Ordering::SeqCst);
        return Err(format!("Failed to install Prometheus exporter: {e}").into());
    }

    describe_counter!(
        "http_requests_total",
        Unit::Count,
        "Total number of HTTP requests made to the remote index"
    );
    describe_histogram!(
        "http_request_duration_seconds",
        Unit::Seconds,
        "HTTP request duration in seconds"
    );
    describe_counter!(
        "http_retries_total",
        Unit::Count,
        "Total number of retry attempts"
    );
    describe_histogram!(
        "retry_backoff_duration_seconds",
        Unit::Seconds,
        "Duration of retry backoff in seconds"
    );
    describe_histogram!(
        "throttle_wait_seconds",
        Unit::Seconds,
        "Time spent waiting for the politeness throttle"
    );
    describe_counter!(
        "index_pages_total",
        Unit::Count,
        "Index pages appended to the checkpoint"
    );
    describe_counter!(
        "index_entries_total",
        Unit::Count,
        "Index entries discovered"
    );
    describe_counter!(
        "items_completed_total",
        Unit::Count,
        "Item fetches completed, by outcome"
    );
    describe_histogram!(
        "item_duration_seconds",
        Unit::Seconds,
        "Wall time of one item task including throttle and retries"
    );
    describe_counter!(
        "flushes_total",
        Unit::Count,
        "Durable writes of item cache and ledger"
    );
    describe_histogram!(
        "flush_duration_seconds",
        Unit::Seconds,
        "Duration of one batch flush"
    );

    info!("Metrics system initialized successfully on {}", addr);
    Ok(())
}

/// Generate a new correlation ID for request tracing
pub fn generate_correlation_id() -> String {
    let id = CORRELATION_COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
    format!("req-{id:08x}")
}

/// Timing for one HTTP request
pub struct HttpRequestMetrics {
    endpoint: &'static str,
    start_time: Instant,
    correlation_id: String,
}

impl HttpRequestMetrics {
    /// Start timing a request to `endpoint` (`index` or `item`)
    pub fn start(endpoint: &'static str) -> Self {
        let correlation_id = generate_correlation_id();
        debug!(correlation_id = %correlation_id, endpoint, "Starting HTTP request");
        Self {
            endpoint,
            start_time: Instant::now(),
            correlation_id,
        }
    }

    /// Record a response with `status_code`
    pub fn record_complete(&self, status_code: u16) {
        let duration = self.start_time.elapsed();
        counter!(
            "http_requests_total",
            "endpoint" => self.endpoint,
            "status" => status_code.to_string(),
        )
        .increment(1);
        histogram!("http_request_duration_seconds", "endpoint" => self.endpoint)
            .record(duration.as_secs_f64());

        if status_code == 429 {
            warn!(
                correlation_id = %self.correlation_id,
                endpoint = self.endpoint,
                duration_ms = duration.as_millis() as u64,
                "Rate limit error (429) recorded"
            );
        }
        debug!(
            correlation_id = %self.correlation_id,
            endpoint = self.endpoint,
            status = status_code,
            duration_ms = duration.as_millis() as u64,
            "HTTP request completed"
        );
    }

    /// Record a transport failure (no status code)
    pub fn record_network_error(&self) {
        let duration = self.start_time.elapsed();
        counter!(
            "http_requests_total",
            "endpoint" => self.endpoint,
            "status" => "network_error",
        )
        .increment(1);
        histogram!("http_request_duration_seconds", "endpoint" => self.endpoint)
            .record(duration.as_secs_f64());
        debug!(
            correlation_id = %self.correlation_id,
            endpoint = self.endpoint,
            duration_ms = duration.as_millis() as u64,
            "Network error recorded"
        );
    }
}

/// Record a retry backoff
pub fn record_retry_backoff(duration: Duration, attempt: u32) {
    counter!("http_retries_total", "attempt" => attempt.to_string()).increment(1);
    histogram!("retry_backoff_duration_seconds").record(duration.as_secs_f64());
}

/// Record time spent in the throttle
pub fn record_throttle_wait(wait: Duration) {
    histogram!("throttle_wait_seconds").record(wait.as_secs_f64());
}

/// Record an appended index page
pub fn record_index_page(doc_type: &str, entries: usize) {
    counter!("index_pages_total", "doc_type" => doc_type.to_string()).increment(1);
    counter!("index_entries_total", "doc_type" => doc_type.to_string()).increment(entries as u64);
}

/// Record a finished item task
pub fn record_item_outcome(doc_type: &str, outcome: &'static str, elapsed: Duration) {
    counter!(
        "items_completed_total",
        "doc_type" => doc_type.to_string(),
        "outcome" => outcome,
    )
    .increment(1);
    histogram!("item_duration_seconds", "outcome" => outcome).record(elapsed.as_secs_f64());
}

/// Record a batch flush of `batch` completions
pub fn record_flush(batch: usize, duration: Duration) {
    counter!("flushes_total").increment(1);
    histogram!("flush_duration_seconds").record(duration.as_secs_f64());
    debug!(batch, duration_ms = duration.as_millis() as u64, "Flush recorded");
}

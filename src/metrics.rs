//! Production observability metrics for the harvester
//!
//! Counters and histograms for remote calls, rate-limit responses, retries,
//! budget waits and harvest throughput.
//!
//! ## Architecture
//!
//! - Uses `metrics` crate for low-overhead metric collection
//! - Optional Prometheus exporter for a scrape endpoint (`--metrics-addr`)
//! - Without an installed recorder every macro is a no-op

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::Lazy;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::harvester::rate_limit::EndpointClass;
use crate::harvester::retry::ErrorClass;

/// Global metrics registry initialization flag
static METRICS_INITIALIZED: Lazy<RwLock<bool>> = Lazy::new(|| RwLock::new(false));

/// Correlation ID generator for request tracing
static CORRELATION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Initialize metrics system with Prometheus exporter
///
/// Idempotent: a second call is a no-op.
///
/// # Errors
/// Returns an error if the exporter cannot bind `addr`.
pub async fn init_metrics(addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    let mut initialized = METRICS_INITIALIZED.write().await;
    if *initialized {
        debug!("Metrics already initialized, skipping");
        return Ok(());
    }

    info!("Initializing metrics system on {}", addr);

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        "harvest_requests_total",
        Unit::Count,
        "Remote calls made, by endpoint class and outcome"
    );
    describe_counter!(
        "harvest_rate_limited_total",
        Unit::Count,
        "Rate-limit responses received"
    );
    describe_counter!(
        "harvest_retries_total",
        Unit::Count,
        "Retry waits scheduled, by error class"
    );
    describe_histogram!(
        "harvest_request_duration_seconds",
        Unit::Seconds,
        "Remote call duration in seconds"
    );
    describe_histogram!(
        "harvest_retry_wait_seconds",
        Unit::Seconds,
        "Wait scheduled before a retry"
    );
    describe_histogram!(
        "harvest_admission_wait_seconds",
        Unit::Seconds,
        "Time spent waiting for budget admission"
    );
    describe_counter!(
        "harvest_units_processed_total",
        Unit::Count,
        "Discovery units processed"
    );
    describe_counter!(
        "harvest_records_appended_total",
        Unit::Count,
        "Records appended to the raw store"
    );
    describe_counter!(
        "harvest_snapshots_saved_total",
        Unit::Count,
        "Progress snapshots persisted"
    );

    *initialized = true;
    info!("Metrics system initialized successfully on {}", addr);
    Ok(())
}

/// Check if metrics system is initialized
pub async fn is_initialized() -> bool {
    *METRICS_INITIALIZED.read().await
}

/// Generate a new correlation ID for request tracing
pub fn generate_correlation_id() -> String {
    let n = CORRELATION_COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
    format!("req-{n:08x}")
}

/// Timing and outcome of one remote call attempt
pub struct RequestMetrics {
    class: EndpointClass,
    operation: String,
    start_time: Instant,
    correlation_id: String,
    attempt: u32,
}

impl RequestMetrics {
    /// Start recording a call attempt
    pub fn start(class: EndpointClass, operation: impl Into<String>, attempt: u32) -> Self {
        let operation = operation.into();
        let correlation_id = generate_correlation_id();
        debug!(
            correlation_id = %correlation_id,
            class = %class,
            operation = %operation,
            attempt,
            "Starting remote call"
        );
        Self {
            class,
            operation,
            start_time: Instant::now(),
            correlation_id,
            attempt,
        }
    }

    /// Record a successful call
    pub fn record_success(&self) {
        self.record("ok");
    }

    /// Record a failed call
    pub fn record_failure(&self, class: ErrorClass) {
        self.record(class.as_str());
        if class == ErrorClass::RateLimited {
            counter!("harvest_rate_limited_total", "class" => self.class.as_str()).increment(1);
            warn!(
                correlation_id = %self.correlation_id,
                class = %self.class,
                operation = %self.operation,
                attempt = self.attempt,
                "Rate limit response recorded"
            );
        }
    }

    fn record(&self, outcome: &'static str) {
        let duration = self.start_time.elapsed();
        counter!(
            "harvest_requests_total",
            "class" => self.class.as_str(),
            "outcome" => outcome,
        )
        .increment(1);
        histogram!(
            "harvest_request_duration_seconds",
            "class" => self.class.as_str(),
        )
        .record(duration.as_secs_f64());
        debug!(
            correlation_id = %self.correlation_id,
            outcome,
            duration_ms = duration.as_millis() as u64,
            "Remote call finished"
        );
    }

    /// Correlation ID of this call
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }
}

/// Record a scheduled retry wait
pub fn record_retry_wait(class: ErrorClass, wait: Duration) {
    counter!("harvest_retries_total", "class" => class.as_str()).increment(1);
    histogram!("harvest_retry_wait_seconds", "class" => class.as_str()).record(wait.as_secs_f64());
}

/// Record time spent waiting for admission
pub fn record_budget_wait(class: EndpointClass, waited: Duration) {
    histogram!("harvest_admission_wait_seconds", "class" => class.as_str())
        .record(waited.as_secs_f64());
    if waited.as_millis() > 100 {
        debug!(
            class = %class,
            wait_ms = waited.as_millis() as u64,
            "Budget admission after wait"
        );
    }
}

/// Record a processed unit and the records it appended
pub fn record_unit_processed(appended: usize) {
    counter!("harvest_units_processed_total").increment(1);
    counter!("harvest_records_appended_total").increment(appended as u64);
}

/// Record a persisted snapshot
pub fn record_snapshot_saved() {
    counter!("harvest_snapshots_saved_total").increment(1);
}

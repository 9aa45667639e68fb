//! Metrics collection for observability

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec_with_registry, register_counter_with_registry,
    register_histogram_vec_with_registry, register_histogram_with_registry, Counter, CounterVec,
    Histogram, HistogramVec, Opts, Registry,
};
use std::sync::Arc;
use std::time::Duration;

/// Global metrics registry
pub static METRICS: Lazy<Arc<Metrics>> =
    Lazy::new(|| Arc::new(Metrics::new().expect("Failed to initialize metrics")));

/// Metrics collector
pub struct Metrics {
    registry: Registry,

    // Relay metrics
    pub relay_requests: CounterVec,
    pub relay_request_duration: HistogramVec,

    // Token budget metrics
    pub prompt_tokens: Histogram,
    pub trimmed_messages: Counter,

    // Registry metrics
    pub registry_reloads: CounterVec,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        #[cfg(target_os = "linux")]
        registry.register(Box::new(
            prometheus::process_collector::ProcessCollector::for_self(),
        ))?;

        let relay_requests = register_counter_vec_with_registry!(
            Opts::new("relay_requests_total", "Total relay requests"),
            &["model", "outcome"],
            registry
        )?;

        let relay_request_duration = register_histogram_vec_with_registry!(
            "relay_request_duration_seconds",
            "Relay request duration in seconds",
            &["model"],
            registry
        )?;

        let prompt_tokens = register_histogram_with_registry!(
            "relay_prompt_tokens",
            "Prompt tokens per dispatched request, after trimming",
            vec![64.0, 256.0, 1024.0, 2048.0, 4096.0, 8192.0, 16384.0, 32768.0],
            registry
        )?;

        let trimmed_messages = register_counter_with_registry!(
            Opts::new(
                "relay_trimmed_messages_total",
                "Total messages evicted to fit token budgets"
            ),
            registry
        )?;

        let registry_reloads = register_counter_vec_with_registry!(
            Opts::new("registry_reloads_total", "Total model registry reloads"),
            &["status"],
            registry
        )?;

        Ok(Self {
            registry,
            relay_requests,
            relay_request_duration,
            prompt_tokens,
            trimmed_messages,
            registry_reloads,
        })
    }

    /// Record a finished relay call; `outcome` is "success" or an error code
    pub fn record_relay(&self, model: &str, outcome: &str, elapsed: Duration) {
        self.relay_requests
            .with_label_values(&[model, outcome])
            .inc();
        self.relay_request_duration
            .with_label_values(&[model])
            .observe(elapsed.as_secs_f64());
    }

    /// Record the token accounting of a dispatched request
    pub fn record_trim(&self, prompt_tokens: usize, removed: usize) {
        self.prompt_tokens.observe(prompt_tokens as f64);
        self.trimmed_messages.inc_by(removed as f64);
    }

    /// Record a registry reload attempt
    pub fn record_reload(&self, success: bool) {
        let status = if success { "success" } else { "error" };
        self.registry_reloads.with_label_values(&[status]).inc();
    }

    /// Export metrics in Prometheus text format
    pub fn export_prometheus(&self) -> String {
        use prometheus::Encoder;

        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).unwrap_or_default();

        String::from_utf8(buffer).unwrap_or_default()
    }
}

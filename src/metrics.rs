// Prometheus metrics for the quota engine
//
// Exposes metrics on /metrics HTTP endpoint:
// - Quota decisions by service and outcome (counter)
// - Evaluation latency (histogram)
// - Store failures by operation (counter)
// - Admin resets and fail-open fallbacks (counter)

use lazy_static::lazy_static;
use prometheus::{Encoder, Histogram, IntCounter, IntCounterVec, Registry, TextEncoder};
use std::sync::Arc;

lazy_static! {
    pub static ref REGISTRY: Arc<Registry> = Arc::new(Registry::new());

    pub static ref QUOTA_DECISIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("quota_decisions_total", "Quota decisions by service and outcome"),
        &["service", "outcome"]
    ).expect("Failed to create quota decisions metric");

    pub static ref QUOTA_EVALUATE_DURATION_SECONDS: Histogram = Histogram::with_opts(
        prometheus::HistogramOpts::new("quota_evaluate_duration_seconds", "Time to evaluate one quota request"),
    ).expect("Failed to create evaluate duration metric");

    pub static ref QUOTA_STORE_ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("quota_store_errors_total", "Usage and config store failures"),
        &["operation"]
    ).expect("Failed to create store errors metric");

    pub static ref QUOTA_RESETS_TOTAL: IntCounter = IntCounter::new(
        "quota_resets_total",
        "Administrative quota resets"
    ).expect("Failed to create resets metric");

    pub static ref QUOTA_FAIL_OPEN_TOTAL: IntCounter = IntCounter::new(
        "quota_fail_open_total",
        "Lookups answered by the fail-open policy after an engine error"
    ).expect("Failed to create fail-open metric");
}

/// Initialize metrics registry - must be called once before serving metrics
pub fn init() -> prometheus::Result<()> {
    REGISTRY.register(Box::new(QUOTA_DECISIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(QUOTA_EVALUATE_DURATION_SECONDS.clone()))?;
    REGISTRY.register(Box::new(QUOTA_STORE_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(QUOTA_RESETS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(QUOTA_FAIL_OPEN_TOTAL.clone()))?;
    Ok(())
}

/// Gather all metrics in Prometheus text format
pub fn gather_metrics() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| anyhow::anyhow!("Failed to encode metrics: {}", e))?;
    String::from_utf8(buffer).map_err(|e| anyhow::anyhow!("Invalid UTF-8 in metrics: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_increment() {
        let before = QUOTA_DECISIONS_TOTAL
            .with_label_values(&["metrics-test", "allowed"])
            .get();
        QUOTA_DECISIONS_TOTAL
            .with_label_values(&["metrics-test", "allowed"])
            .inc();
        assert_eq!(
            QUOTA_DECISIONS_TOTAL
                .with_label_values(&["metrics-test", "allowed"])
                .get(),
            before + 1
        );
    }

    #[test]
    fn test_gather_metrics_renders_text() {
        // Registration may already have happened in another test
        let _ = init();
        QUOTA_RESETS_TOTAL.inc();
        let text = gather_metrics().unwrap();
        assert!(text.contains("quota_resets_total"));
    }
}

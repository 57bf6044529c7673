// Telemetry module for structured logging and metrics

use anyhow::Result;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Initialize structured logging with JSON formatting
///
/// `RUST_LOG` wins over `log_level` when set.
pub fn init_logging(log_level: &str) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| anyhow::anyhow!("Failed to create env filter: {}", e))?;

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_target(true)
        .with_thread_names(true)
        .with_filter(env_filter);

    tracing_subscriber::registry()
        .with(json_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;

    tracing::info!(log_level = log_level, "Structured logging initialized");

    Ok(())
}

/// Initialize the Prometheus metrics exporter and describe the dispatch metrics
pub fn init_metrics(metrics_port: u16) -> Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", metrics_port)
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid metrics port: {}", e))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

    describe_counter!(
        "scheduled_items_sent_total",
        "Scheduled items delivered successfully"
    );
    describe_counter!(
        "scheduled_items_failed_total",
        "Scheduled items whose delivery failed"
    );
    describe_gauge!(
        "scheduled_items_pending",
        "Items currently waiting in the in-memory index"
    );
    describe_histogram!(
        "delivery_duration_seconds",
        "Time spent handing one message to the mail transport"
    );
    describe_counter!(
        "store_fallback_total",
        "Items kept in memory only because the item store was unavailable"
    );
    describe_counter!("immediate_sends_total", "Messages sent outside the schedule");

    tracing::info!(
        metrics_port = metrics_port,
        metrics_endpoint = format!("http://0.0.0.0:{}/metrics", metrics_port),
        "Prometheus metrics exporter initialized"
    );

    Ok(())
}

#[inline]
pub fn record_item_sent(category: &str) {
    counter!("scheduled_items_sent_total", "category" => category.to_string()).increment(1);
}

#[inline]
pub fn record_item_failed(category: &str, reason: &str) {
    counter!(
        "scheduled_items_failed_total",
        "category" => category.to_string(),
        "reason" => reason.to_string()
    )
    .increment(1);
}

#[inline]
pub fn record_delivery_duration(duration_seconds: f64) {
    histogram!("delivery_duration_seconds").record(duration_seconds);
}

#[inline]
pub fn update_pending_count(size: usize) {
    gauge!("scheduled_items_pending").set(size as f64);
}

#[inline]
pub fn record_store_fallback() {
    counter!("store_fallback_total").increment(1);
}

#[inline]
pub fn record_immediate_send(success: bool) {
    let outcome = if success { "sent" } else { "failed" };
    counter!("immediate_sends_total", "outcome" => outcome).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_installs_global_subscriber_once() {
        let _ = init_logging("info");
        // The global subscriber is now set, so a second install is refused
        let err = init_logging("debug").unwrap_err();
        assert!(err.to_string().contains("Failed to initialize tracing subscriber"));
    }

    #[test]
    fn test_metrics_recording() {
        // No recorder installed: calls must still be no-ops rather than panics
        record_item_sent("sponsor");
        record_item_failed("certificate", "transport");
        record_delivery_duration(0.25);
        update_pending_count(3);
        record_store_fallback();
        record_immediate_send(true);
        record_immediate_send(false);
    }
}

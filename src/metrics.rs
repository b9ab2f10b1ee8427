//! Runtime metrics
//!
//! # Metrics
//!
//! - `sentinel_messages_dispatched_total`: Counter of records handed to a handling unit
//! - `sentinel_messages_skipped_total`: Counter of nil records ignored by the dispatcher
//! - `sentinel_handlers_in_flight`: Gauge of handling units currently running
//! - `sentinel_events_total`: Counter of client events by `stream` and `kind`
//! - `sentinel_broker_verifications_total`: Counter of broker checks by `result`

use ::metrics::{decrement_gauge, increment_counter, increment_gauge};

use crate::kafka::ClientEvent;

/// Count one dispatched record
pub fn record_dispatched(topic: &str) {
    increment_counter!("sentinel_messages_dispatched_total", "topic" => topic.to_string());
}

/// Count one skipped nil record
pub fn record_skipped() {
    increment_counter!("sentinel_messages_skipped_total");
}

/// Count one supervised client event
pub fn record_event(event: &ClientEvent) {
    increment_counter!(
        "sentinel_events_total",
        "stream" => event.stream(),
        "kind" => event.kind().as_str()
    );
}

/// Count one broker verification with `result` of `valid` or `invalid`
pub fn record_verification(result: &'static str) {
    increment_counter!("sentinel_broker_verifications_total", "result" => result);
}

/// Tracks one running handling unit
///
/// Increments `sentinel_handlers_in_flight` on creation and decrements it
/// on drop, so a panicking handler still releases its slot in the gauge.
#[derive(Debug)]
pub struct InFlightGuard {
    _private: (),
}

impl InFlightGuard {
    /// Mark a handling unit as started
    pub fn start() -> Self {
        increment_gauge!("sentinel_handlers_in_flight", 1.0);
        Self { _private: () }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        decrement_gauge!("sentinel_handlers_in_flight", 1.0);
    }
}

/// Initializes the metrics exporter for Prometheus
///
/// Only has an effect when built with the `prometheus` feature; otherwise
/// it is safe to call and does nothing.
pub fn init_metrics_exporter() {
    #[cfg(feature = "prometheus")]
    {
        use metrics_exporter_prometheus::PrometheusBuilder;
        let builder = PrometheusBuilder::new();
        let _ = builder.install().map_err(|e| {
            tracing::warn!("Failed to install Prometheus exporter: {}", e);
        });
    }
}

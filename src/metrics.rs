//! Prometheus metrics collection for quayd.
//!
//! Tracks connection counts, event throughput by operation, broadcast
//! fan-out, and frames dropped to backpressure. Served over HTTP by
//! [`crate::http`].

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

/// Currently connected, authenticated sessions.
pub static CONNECTED_SESSIONS: OnceLock<IntGauge> = OnceLock::new();

/// Inbound events processed by operation.
pub static EVENTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Inbound event errors by operation and error code.
pub static EVENT_ERRORS: OnceLock<IntCounterVec> = OnceLock::new();

/// Messages persisted and handed to the broadcaster.
pub static MESSAGES_BROADCAST: OnceLock<IntCounter> = OnceLock::new();

/// Frames dropped because a subscriber's outgoing queue was full.
pub static FRAMES_DROPPED: OnceLock<IntCounter> = OnceLock::new();

/// Message fan-out histogram: recipients per broadcast.
pub static MESSAGE_FANOUT: OnceLock<Histogram> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Must be called once at startup before any metrics are recorded.
pub fn init() {
    let r = registry();

    macro_rules! register {
        ($metric:ident, $init:expr) => {
            let m = $init.expect(concat!(stringify!($metric), " creation failed"));
            if let Err(e) = r.register(Box::new(m.clone())) {
                tracing::warn!(error = %e, concat!("Failed to register metric ", stringify!($metric)));
            }
            let _ = $metric.set(m);
        };
    }

    register!(
        CONNECTED_SESSIONS,
        IntGauge::new("quayd_connected_sessions", "Currently connected sessions")
    );
    register!(
        EVENTS_TOTAL,
        IntCounterVec::new(
            Opts::new("quayd_events_total", "Inbound events by operation"),
            &["op"]
        )
    );
    register!(
        EVENT_ERRORS,
        IntCounterVec::new(
            Opts::new("quayd_event_errors_total", "Event errors by operation and code"),
            &["op", "error"]
        )
    );
    register!(
        MESSAGES_BROADCAST,
        IntCounter::new("quayd_messages_broadcast_total", "Messages broadcast")
    );
    register!(
        FRAMES_DROPPED,
        IntCounter::new(
            "quayd_frames_dropped_total",
            "Frames dropped due to subscriber backpressure"
        )
    );
    register!(
        MESSAGE_FANOUT,
        Histogram::with_opts(
            HistogramOpts::new("quayd_message_fanout", "Recipients per broadcast")
                .buckets(vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0])
        )
    );
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}

/// Record a processed inbound event.
#[inline]
pub fn record_event(op: &str) {
    if let Some(c) = EVENTS_TOTAL.get() {
        c.with_label_values(&[op]).inc();
    }
}

/// Record an event error.
#[inline]
pub fn record_event_error(op: &str, error: &str) {
    if let Some(c) = EVENT_ERRORS.get() {
        c.with_label_values(&[op, error]).inc();
    }
}

/// Record a completed message broadcast.
#[inline]
pub fn record_broadcast() {
    if let Some(c) = MESSAGES_BROADCAST.get() {
        c.inc();
    }
}

/// Record a frame dropped to backpressure.
#[inline]
pub fn record_dropped() {
    if let Some(c) = FRAMES_DROPPED.get() {
        c.inc();
    }
}

/// Record message fan-out (recipients per broadcast).
#[inline]
pub fn record_fanout(recipients: usize) {
    if let Some(h) = MESSAGE_FANOUT.get() {
        h.observe(recipients as f64);
    }
}

/// Adjust the connected-sessions gauge.
#[inline]
pub fn session_opened() {
    if let Some(g) = CONNECTED_SESSIONS.get() {
        g.inc();
    }
}

#[inline]
pub fn session_closed() {
    if let Some(g) = CONNECTED_SESSIONS.get() {
        g.dec();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_lifecycle() {
        init();

        record_event("join");
        record_fanout(3);

        let output = gather_metrics();
        assert!(output.contains("quayd_events_total"));
    }
}

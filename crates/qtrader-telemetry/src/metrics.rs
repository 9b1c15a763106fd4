//! Prometheus metrics for qtrader.
//!
//! Covers:
//! - Connection state and connect attempts
//! - Synthetic fallback
//! - Tick throughput, malformed payloads and stale discards
//! - Rolling statistics (tick rate, latency estimate) and consensus confidence
//!
//! # Panics
//!
//! Metric registration uses `unwrap()`. A failure means a duplicate metric
//! name, which is a programming error; it surfaces on first use of the metric.

use crate::error::{TelemetryError, TelemetryResult};
use once_cell::sync::Lazy;
use prometheus::{
    register_gauge, register_gauge_vec, register_histogram, register_int_counter,
    register_int_counter_vec, register_int_gauge, Encoder, Gauge, GaugeVec, Histogram,
    IntCounter, IntCounterVec, IntGauge, TextEncoder,
};

/// Connection state labels, matching the transport's state names.
/// Connected indicator (1 = connected or synthetic fallback).
pub static WS_CONNECTED: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "qtrader_ws_connected",
        "Connected indicator shown to collaborators (1=connected)"
    )
    .unwrap()
});

/// Transport state machine current state.
pub static CONNECTION_STATE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "qtrader_connection_state",
        "Transport state machine current state (1=active, 0=inactive)",
        &["state"]
    )
    .unwrap()
});

/// Connect attempts by outcome (opened/failed).
pub static CONNECT_ATTEMPTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "qtrader_connect_attempts_total",
        "Live connection attempts by outcome",
        &["outcome"]
    )
    .unwrap()
});

/// Synthetic stream active (1 = active).
pub static SYNTHETIC_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "qtrader_synthetic_active",
        "Synthetic stream active (1=active)"
    )
    .unwrap()
});

/// Ticks processed by source (live/synthetic).
pub static TICKS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "qtrader_ticks_total",
        "Ticks processed by source",
        &["source"]
    )
    .unwrap()
});

/// Dropped inbound payloads that failed to decode.
pub static MALFORMED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "qtrader_malformed_total",
        "Inbound payloads dropped as malformed"
    )
    .unwrap()
});

/// Events discarded because their generation was superseded.
pub static STALE_DISCARDED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "qtrader_stale_discarded_total",
        "Events discarded from superseded connections or generator runs"
    )
    .unwrap()
});

/// Rolling average tick rate.
pub static TICK_RATE: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!("qtrader_tick_rate", "Rolling average ticks per second").unwrap()
});

/// Latency estimate samples. Not a measured round trip.
pub static LATENCY_ESTIMATE_MS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "qtrader_latency_estimate_ms",
        "Estimated (not measured) per-tick latency in milliseconds",
        vec![1.0, 2.0, 4.0, 5.0, 6.0, 7.0, 8.0, 10.0, 20.0, 50.0]
    )
    .unwrap()
});

/// Confidence of the latest consensus.
pub static CONSENSUS_CONFIDENCE: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "qtrader_consensus_confidence",
        "Mean strategy strength of the latest tick (0-100)"
    )
    .unwrap()
});

/// Metrics facade.
pub struct Metrics;

impl Metrics {
    /// Set the connected indicator.
    pub fn ws_connected(connected: bool) {
        WS_CONNECTED.set(i64::from(connected));
    }

    /// Set the transport state. Only the active state is 1.
    /// Mark `current` active and every other name in `all` inactive.
    pub fn connection_state_set<'a>(current: &str, all: impl IntoIterator<Item = &'a str>) {
        for s in all {
            CONNECTION_STATE.with_label_values(&[s]).set(0.0);
        }
        CONNECTION_STATE.with_label_values(&[current]).set(1.0);
    }

    pub fn connect_opened() {
        CONNECT_ATTEMPTS_TOTAL.with_label_values(&["opened"]).inc();
    }

    pub fn connect_failed() {
        CONNECT_ATTEMPTS_TOTAL.with_label_values(&["failed"]).inc();
    }

    pub fn synthetic_active(active: bool) {
        SYNTHETIC_ACTIVE.set(i64::from(active));
    }

    /// Count a processed tick. `source` is `live` or `synthetic`.
    pub fn tick(source: &str) {
        TICKS_TOTAL.with_label_values(&[source]).inc();
    }

    pub fn malformed() {
        MALFORMED_TOTAL.inc();
    }

    pub fn stale_discarded() {
        STALE_DISCARDED_TOTAL.inc();
    }

    pub fn tick_rate(rate: f64) {
        TICK_RATE.set(rate);
    }

    pub fn latency_estimate(latency_ms: f64) {
        LATENCY_ESTIMATE_MS.observe(latency_ms);
    }

    pub fn consensus_confidence(confidence: u8) {
        CONSENSUS_CONFIDENCE.set(i64::from(confidence));
    }
}

/// Encode the default registry in Prometheus text format.
pub fn gather_text() -> TelemetryResult<String> {
    let encoder = TextEncoder::new();
    let mut buf = Vec::new();
    encoder
        .encode(&prometheus::gather(), &mut buf)
        .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
    Ok(String::from_utf8(buf)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state_is_one_hot() {
        let states = ["connecting", "retrying", "synthetic_fallback"];
        Metrics::connection_state_set("retrying", states);
        Metrics::connection_state_set("synthetic_fallback", states);

        let active: Vec<_> = states
            .into_iter()
            .filter(|s| CONNECTION_STATE.with_label_values(&[*s]).get() == 1.0)
            .collect();
        assert_eq!(active, vec!["synthetic_fallback"]);
    }

    #[test]
    fn test_gather_text_contains_metrics() {
        Metrics::tick("live");
        Metrics::malformed();
        let text = gather_text().unwrap();
        assert!(text.contains("qtrader_ticks_total"));
        assert!(text.contains("qtrader_malformed_total"));
    }
}

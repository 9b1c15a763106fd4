//! Tick type and JSON wire codec.
//!
//! Supports two inbound shapes:
//! 1. Flat: `{"price", "bufferIndex", "signals": {...}, "consensus"}`
//! 2. Live backend: `consensus` nested inside `signals`
//!
//! Decoding rules:
//! - `price` must be finite and positive, `bufferIndex` a non-negative integer
//!   (reduced modulo [`BUFFER_SLOTS`]); anything else is `CoreError::Malformed`.
//! - A missing strategy decodes as `{NEUTRAL, 0, ""}`.
//! - A missing or unknown consensus label is recomputed from the signals.
//! - Unknown fields are ignored.

use crate::consensus::{vote, ConsensusLabel};
use crate::error::{CoreError, Result};
use crate::signal::{SignalBundle, SignalType, Strategy, StrategySignal};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

/// Number of slots in the producer's ring buffer; `bufferIndex` wraps at this value.
pub const BUFFER_SLOTS: u16 = 1000;

/// One unit of streamed price and signal data.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tick {
    pub price: f64,
    /// Ring buffer position, always in `[0, 1000)`.
    pub buffer_index: u16,
    pub signals: SignalBundle,
    pub consensus: ConsensusLabel,
    /// Producer timestamp (unix seconds), when the producer sends one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl Tick {
    /// Build a tick whose consensus is computed from `signals`.
    pub fn new(price: f64, buffer_index: u16, signals: SignalBundle) -> Self {
        let consensus = vote(&signals);
        Self {
            price,
            buffer_index: buffer_index % BUFFER_SLOTS,
            signals,
            consensus,
            timestamp: None,
        }
    }

    /// Decode a text frame.
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(&value)
    }

    /// Decode an already-parsed JSON value.
    pub fn from_value(value: &Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| CoreError::Malformed("payload is not a JSON object".to_string()))?;

        let price = obj
            .get("price")
            .and_then(Value::as_f64)
            .ok_or_else(|| CoreError::Malformed("missing or non-numeric price".to_string()))?;
        if !price.is_finite() || price <= 0.0 {
            return Err(CoreError::Malformed(format!("price must be positive: {price}")));
        }

        let raw_index = obj
            .get("bufferIndex")
            .and_then(Value::as_u64)
            .ok_or_else(|| CoreError::Malformed("missing or invalid bufferIndex".to_string()))?;
        let buffer_index = (raw_index % u64::from(BUFFER_SLOTS)) as u16;

        let signal_map = obj.get("signals").and_then(Value::as_object);
        let signals = signal_map.map(decode_bundle).unwrap_or_default();

        // Top-level label wins over the nested one.
        let reported = obj
            .get("consensus")
            .or_else(|| signal_map.and_then(|m| m.get("consensus")))
            .and_then(Value::as_str);
        let consensus = match reported.and_then(ConsensusLabel::from_wire) {
            Some(label) => label,
            None => {
                if let Some(raw) = reported {
                    debug!(label = raw, "Unknown consensus label, recomputing");
                }
                vote(&signals)
            }
        };

        let timestamp = obj.get("timestamp").and_then(Value::as_i64);

        Ok(Self {
            price,
            buffer_index,
            signals,
            consensus,
            timestamp,
        })
    }

    /// Encode as a JSON text frame.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

fn decode_bundle(map: &Map<String, Value>) -> SignalBundle {
    let mut bundle = SignalBundle::default();
    for strategy in Strategy::ALL {
        match map.get(strategy.wire_name()) {
            Some(value) => bundle.set(strategy, decode_signal(value)),
            None => debug!(%strategy, "Strategy missing from tick, defaulting to NEUTRAL"),
        }
    }
    bundle
}

fn decode_signal(value: &Value) -> StrategySignal {
    let Some(obj) = value.as_object() else {
        return StrategySignal::neutral();
    };

    let signal_type = obj
        .get("type")
        .and_then(Value::as_str)
        .map(SignalType::from_wire)
        .unwrap_or_default();

    let strength = obj
        .get("strength")
        .and_then(Value::as_f64)
        .filter(|s| s.is_finite())
        .map(|s| s.round().clamp(0.0, 100.0) as u8)
        .unwrap_or(0);

    let reason = obj
        .get("reason")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    StrategySignal {
        signal_type,
        strength,
        reason,
    }
}

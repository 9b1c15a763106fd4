//! Dashboard data types.
//!
//! These types are serialized to JSON for the REST API and WebSocket.

use qtrader_core::{weighted_share, ConsensusLabel, ConsensusResult, SignalBundle, Tick};
use qtrader_telemetry::StatsSnapshot;
use serde::Serialize;

/// Full published state (sent on connect, via REST, and as each update).
#[derive(Debug, Clone, Serialize)]
pub struct DashboardSnapshot {
    /// Timestamp when snapshot was taken (Unix milliseconds).
    pub timestamp_ms: i64,
    /// Connected indicator; stays true on the synthetic stream.
    pub connected: bool,
    /// True while ticks come from the synthetic generator.
    pub using_synthetic_data: bool,
    pub connection_state: String,
    /// Generation of the current connection attempt.
    pub generation: u64,
    pub tick: Option<TickView>,
    pub consensus: Option<ConsensusView>,
    pub stats: Option<StatsSnapshot>,
    pub ticks_processed: u64,
    /// Bumped on every change.
    pub sequence: u64,
}

/// The latest tick as received.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickView {
    pub price: f64,
    pub buffer_index: u16,
    pub signals: SignalBundle,
    /// Label carried on the wire; `consensus.label` is the authoritative one.
    pub reported_consensus: ConsensusLabel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl From<&Tick> for TickView {
    fn from(tick: &Tick) -> Self {
        Self {
            price: tick.price,
            buffer_index: tick.buffer_index,
            signals: tick.signals.clone(),
            reported_consensus: tick.consensus,
            timestamp: tick.timestamp,
        }
    }
}

/// Aggregated consensus with display values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsensusView {
    pub label: ConsensusLabel,
    pub confidence: u8,
    pub agreement_count: u8,
    /// `"k/4"`.
    pub agreement: String,
    /// Presentational only.
    pub weighted_share: Option<f64>,
}

impl ConsensusView {
    pub fn from_signals(signals: &SignalBundle) -> Self {
        let result = ConsensusResult::from_signals(signals);
        Self {
            label: result.label,
            confidence: result.confidence,
            agreement_count: result.agreement_count,
            agreement: result.agreement_display(),
            weighted_share: weighted_share(signals, result.label),
        }
    }
}

/// WebSocket message types.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DashboardMessage {
    /// Full snapshot (sent on connect).
    Snapshot(DashboardSnapshot),
    /// State changed since the last message.
    Update(DashboardSnapshot),
}

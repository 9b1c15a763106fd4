//! Published state.
//!
//! The session is the only writer. Display collaborators read snapshots.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;

use qtrader_core::Tick;
use qtrader_telemetry::StatsSnapshot;
use qtrader_ws::ConnectionState;

use crate::types::{ConsensusView, DashboardSnapshot, TickView};

#[derive(Debug)]
struct Inner {
    connection_state: ConnectionState,
    generation: u64,
    tick: Option<TickView>,
    consensus: Option<ConsensusView>,
    stats: Option<StatsSnapshot>,
    ticks_processed: u64,
    sequence: u64,
}

/// Shared handle to the published state. Clones share the same state.
#[derive(Debug, Clone)]
pub struct DashboardState {
    inner: Arc<RwLock<Inner>>,
}

impl Default for DashboardState {
    fn default() -> Self {
        Self::new()
    }
}

impl DashboardState {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                connection_state: ConnectionState::Disconnected,
                generation: 0,
                tick: None,
                consensus: None,
                stats: None,
                ticks_processed: 0,
                sequence: 0,
            })),
        }
    }

    /// Publish the transport state.
    pub fn set_connection(&self, state: ConnectionState, generation: u64) {
        let mut inner = self.inner.write();
        if inner.connection_state == state && inner.generation == generation {
            return;
        }
        inner.connection_state = state;
        inner.generation = generation;
        inner.sequence += 1;
    }

    /// Publish a tick with its aggregated consensus.
    ///
    /// `stats` is `None` when the tick was not a new sample; the previous
    /// statistics stay published.
    pub fn publish_tick(&self, tick: &Tick, stats: Option<StatsSnapshot>) -> ConsensusView {
        let consensus = ConsensusView::from_signals(&tick.signals);
        let mut inner = self.inner.write();
        inner.tick = Some(TickView::from(tick));
        inner.consensus = Some(consensus.clone());
        if stats.is_some() {
            inner.stats = stats;
        }
        inner.ticks_processed += 1;
        inner.sequence += 1;
        consensus
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.read().connection_state
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state().is_connected_indicator()
    }

    pub fn is_using_synthetic(&self) -> bool {
        self.connection_state().is_synthetic()
    }

    pub fn latest_tick(&self) -> Option<TickView> {
        self.inner.read().tick.clone()
    }

    pub fn ticks_processed(&self) -> u64 {
        self.inner.read().ticks_processed
    }

    pub fn sequence(&self) -> u64 {
        self.inner.read().sequence
    }

    pub fn collect_snapshot(&self) -> DashboardSnapshot {
        let inner = self.inner.read();
        DashboardSnapshot {
            timestamp_ms: Utc::now().timestamp_millis(),
            connected: inner.connection_state.is_connected_indicator(),
            using_synthetic_data: inner.connection_state.is_synthetic(),
            connection_state: inner.connection_state.as_str().to_string(),
            generation: inner.generation,
            tick: inner.tick.clone(),
            consensus: inner.consensus.clone(),
            stats: inner.stats.clone(),
            ticks_processed: inner.ticks_processed,
            sequence: inner.sequence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qtrader_core::{ConsensusLabel, SignalBundle, SignalType, Strategy, StrategySignal};

    fn tick() -> Tick {
        let mut signals = SignalBundle::default();
        signals.set(Strategy::MeanReversion, StrategySignal::new(SignalType::Buy, 85, ""));
        signals.set(Strategy::Momentum, StrategySignal::new(SignalType::Buy, 72, ""));
        signals.set(Strategy::Breakout, StrategySignal::new(SignalType::Buy, 68, ""));
        signals.set(Strategy::Rsi, StrategySignal::new(SignalType::Neutral, 50, ""));
        let mut tick = Tick::new(67000.0, 12, signals);
        // wire label disagrees with the vote
        tick.consensus = ConsensusLabel::Sell;
        tick
    }

    #[test]
    fn test_synthetic_fallback_flags() {
        let state = DashboardState::new();
        assert!(!state.is_connected());

        state.set_connection(ConnectionState::SyntheticFallback, 3);
        let snap = state.collect_snapshot();
        assert!(snap.connected);
        assert!(snap.using_synthetic_data);
        assert_eq!(snap.connection_state, "synthetic_fallback");
        assert_eq!(snap.generation, 3);

        state.set_connection(ConnectionState::Connected, 4);
        assert!(state.is_connected());
        assert!(!state.is_using_synthetic());
    }

    #[test]
    fn test_aggregated_consensus_is_authoritative() {
        let state = DashboardState::new();
        let view = state.publish_tick(&tick(), None);

        assert_eq!(view.label, ConsensusLabel::StrongBuy);
        assert_eq!(view.confidence, 69);
        assert_eq!(view.agreement, "3/4");

        let latest = state.latest_tick().unwrap();
        assert_eq!(latest.reported_consensus, ConsensusLabel::Sell);
        assert_eq!(state.ticks_processed(), 1);
    }

    #[test]
    fn test_sequence_tracks_changes() {
        let state = DashboardState::new();
        state.set_connection(ConnectionState::Connecting, 1);
        assert_eq!(state.sequence(), 1);
        // unchanged state does not bump
        state.set_connection(ConnectionState::Connecting, 1);
        assert_eq!(state.sequence(), 1);
        state.publish_tick(&tick(), None);
        assert_eq!(state.sequence(), 2);
    }

    #[test]
    fn test_snapshot_json_shape() {
        let state = DashboardState::new();
        state.publish_tick(&tick(), None);
        let json = serde_json::to_value(state.collect_snapshot()).unwrap();
        assert_eq!(json["consensus"]["label"], "STRONG BUY");
        assert_eq!(json["tick"]["signals"]["meanReversion"]["type"], "BUY");
        assert!(json["stats"].is_null());
    }
}

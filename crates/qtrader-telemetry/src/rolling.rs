//! Rolling statistics over the tick stream.
//!
//! A tick is a new sample iff its `bufferIndex` differs from the last recorded
//! one and wall-clock time has advanced since the last recorded observation.
//! Only new samples touch the windows or the markers.
//!
//! The latency figure is an estimate: a fixed base plus uniform jitter. It is
//! not a measured round trip, and every snapshot says so via
//! [`LatencyStats::is_estimate`].
//!
//! Percentiles sort a copy of the window on every update, O(n log n) per tick
//! at n <= 100.

use qtrader_core::{SignalBundle, BUFFER_SLOTS};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Instant;

/// Statistics configuration (`[stats]` table).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsConfig {
    #[serde(default = "default_tick_rate_window")]
    pub tick_rate_window: usize,
    #[serde(default = "default_latency_window")]
    pub latency_window: usize,
    #[serde(default = "default_latency_base_ms")]
    pub latency_base_ms: f64,
    /// Upper bound (exclusive) of the uniform jitter added to the base.
    #[serde(default = "default_latency_jitter_ms")]
    pub latency_jitter_ms: f64,
}

fn default_tick_rate_window() -> usize {
    60
}

fn default_latency_window() -> usize {
    100
}

fn default_latency_base_ms() -> f64 {
    5.0
}

fn default_latency_jitter_ms() -> f64 {
    3.0
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            tick_rate_window: default_tick_rate_window(),
            latency_window: default_latency_window(),
            latency_base_ms: default_latency_base_ms(),
            latency_jitter_ms: default_latency_jitter_ms(),
        }
    }
}

/// Bounded FIFO of samples. Pushing past capacity evicts the oldest.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl RollingWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, sample: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &f64> {
        self.samples.iter()
    }

    pub fn mean(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        Some(self.samples.iter().sum::<f64>() / self.samples.len() as f64)
    }

    /// Sorted-copy percentile at index `floor(n * q)`, clamped to `n - 1`.
    pub fn percentile(&self, q: f64) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let mut sorted: Vec<f64> = self.samples.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);
        let n = sorted.len();
        let idx = ((n as f64 * q).floor() as usize).min(n - 1);
        Some(sorted[idx])
    }
}

/// Latency figures. Always an estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatencyStats {
    pub current_ms: f64,
    pub p50_ms: f64,
    pub p99_ms: f64,
    pub is_estimate: bool,
}

/// Derived statistics after a new sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    /// Mean of the tick-rate window, ticks per second.
    pub tick_rate: f64,
    pub latency: LatencyStats,
    /// `bufferIndex / 1000 * 100`.
    pub buffer_utilization_pct: f64,
    /// `0.1 * tick_rate`.
    pub signal_change_rate: f64,
    pub strategy_correlation: f64,
    pub tick_rate_samples: usize,
    pub latency_samples: usize,
}

/// Agreement diversity of the four votes: `min(population variance / 2, 1)`.
///
/// Votes map BUY=+1, SELL=-1, NEUTRAL=0. Low values mean the strategies disagree.
pub fn strategy_correlation(signals: &SignalBundle) -> f64 {
    let votes: Vec<f64> = signals
        .iter()
        .map(|(_, sig)| sig.signal_type.as_vote())
        .collect();
    let n = votes.len() as f64;
    let mean = votes.iter().sum::<f64>() / n;
    let variance = votes.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (variance / 2.0).min(1.0)
}

/// Rolling statistics state.
#[derive(Debug)]
pub struct StatisticsEngine<R: Rng> {
    config: StatsConfig,
    rng: R,
    tick_rates: RollingWindow,
    latencies: RollingWindow,
    /// `None` until the first sample is recorded.
    last_index: Option<u16>,
    last_time: Instant,
}

impl<R: Rng> StatisticsEngine<R> {
    /// `started_at` is the reference time for the first sample.
    pub fn new(config: StatsConfig, rng: R, started_at: Instant) -> Self {
        Self {
            tick_rates: RollingWindow::new(config.tick_rate_window),
            latencies: RollingWindow::new(config.latency_window),
            config,
            rng,
            last_index: None,
            last_time: started_at,
        }
    }

    pub fn tick_rates(&self) -> &RollingWindow {
        &self.tick_rates
    }

    pub fn latencies(&self) -> &RollingWindow {
        &self.latencies
    }

    /// Feed one tick. Returns a snapshot only when the tick is a new sample.
    pub fn observe(
        &mut self,
        buffer_index: u16,
        signals: &SignalBundle,
        now: Instant,
    ) -> Option<StatsSnapshot> {
        if self.last_index == Some(buffer_index) {
            return None;
        }
        let elapsed = now.saturating_duration_since(self.last_time).as_secs_f64();
        if elapsed <= 0.0 {
            return None;
        }

        let instant_rate = 1.0 / elapsed;
        self.tick_rates.push(instant_rate);

        let latency = self.sample_latency();
        self.latencies.push(latency);

        let tick_rate = self.tick_rates.mean().unwrap_or(instant_rate);
        let snapshot = StatsSnapshot {
            tick_rate,
            latency: LatencyStats {
                current_ms: latency,
                p50_ms: self.latencies.percentile(0.5).unwrap_or(latency),
                p99_ms: self.latencies.percentile(0.99).unwrap_or(latency),
                is_estimate: true,
            },
            buffer_utilization_pct: f64::from(buffer_index) / f64::from(BUFFER_SLOTS) * 100.0,
            signal_change_rate: 0.1 * tick_rate,
            strategy_correlation: strategy_correlation(signals),
            tick_rate_samples: self.tick_rates.len(),
            latency_samples: self.latencies.len(),
        };

        self.last_index = Some(buffer_index);
        self.last_time = now;
        Some(snapshot)
    }

    fn sample_latency(&mut self) -> f64 {
        let jitter = if self.config.latency_jitter_ms > 0.0 {
            self.rng.gen_range(0.0..self.config.latency_jitter_ms)
        } else {
            0.0
        };
        self.config.latency_base_ms + jitter
    }
}

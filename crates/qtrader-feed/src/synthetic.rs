//! Synthetic tick generator.
//!
//! Two independent schedules:
//! - price: bounded random walk, clamped to `[min_price, max_price]`, and the
//!   buffer index advanced by one (mod 1000)
//! - signal: one strategy picked uniformly and given a fresh vote
//!   (`type` uniform over BUY/SELL/NEUTRAL, `strength` uniform in `[40, 100)`),
//!   then the consensus is recomputed
//!
//! All draws go through the generic `Rng`, so a seeded `StdRng` makes the
//! stream reproducible.

use crate::error::{FeedError, FeedResult};
use qtrader_core::{SignalBundle, SignalType, Strategy, StrategySignal, Tick, BUFFER_SLOTS};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const MIN_STRENGTH: u8 = 40;
const MAX_STRENGTH: u8 = 100;

/// Synthetic stream configuration (`[synthetic]` table).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntheticConfig {
    #[serde(default = "default_price_interval_ms")]
    pub price_interval_ms: u64,
    #[serde(default = "default_signal_interval_ms")]
    pub signal_interval_ms: u64,
    #[serde(default = "default_initial_price")]
    pub initial_price: f64,
    #[serde(default = "default_min_price")]
    pub min_price: f64,
    #[serde(default = "default_max_price")]
    pub max_price: f64,
    /// Largest absolute price change per step.
    #[serde(default = "default_max_step")]
    pub max_step: f64,
}

fn default_price_interval_ms() -> u64 {
    1000
}

fn default_signal_interval_ms() -> u64 {
    3000
}

fn default_initial_price() -> f64 {
    67432.50
}

fn default_min_price() -> f64 {
    60000.0
}

fn default_max_price() -> f64 {
    75000.0
}

fn default_max_step() -> f64 {
    25.0
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            price_interval_ms: default_price_interval_ms(),
            signal_interval_ms: default_signal_interval_ms(),
            initial_price: default_initial_price(),
            min_price: default_min_price(),
            max_price: default_max_price(),
            max_step: default_max_step(),
        }
    }
}

impl SyntheticConfig {
    pub fn validate(&self) -> FeedResult<()> {
        if self.price_interval_ms == 0 || self.signal_interval_ms == 0 {
            return Err(FeedError::InvalidConfig(
                "intervals must be positive".to_string(),
            ));
        }
        if !(self.min_price > 0.0 && self.min_price <= self.max_price) {
            return Err(FeedError::InvalidConfig(format!(
                "price range [{}, {}] is empty or non-positive",
                self.min_price, self.max_price
            )));
        }
        if !self.max_step.is_finite() || self.max_step < 0.0 {
            return Err(FeedError::InvalidConfig(format!(
                "max_step must be non-negative: {}",
                self.max_step
            )));
        }
        Ok(())
    }

    pub fn price_interval(&self) -> Duration {
        Duration::from_millis(self.price_interval_ms.max(1))
    }

    pub fn signal_interval(&self) -> Duration {
        Duration::from_millis(self.signal_interval_ms.max(1))
    }
}

/// Generator state. Each step returns the full current tick.
#[derive(Debug)]
pub struct SyntheticGenerator<R: Rng> {
    config: SyntheticConfig,
    rng: R,
    price: f64,
    buffer_index: u16,
    signals: SignalBundle,
}

impl<R: Rng> SyntheticGenerator<R> {
    pub fn new(config: SyntheticConfig, rng: R) -> Self {
        let price = config
            .initial_price
            .clamp(config.min_price, config.max_price);
        Self {
            config,
            rng,
            price,
            buffer_index: 0,
            signals: SignalBundle::default(),
        }
    }

    /// Current state as a tick; consensus follows the shared vote rule.
    pub fn current(&self) -> Tick {
        Tick::new(self.price, self.buffer_index, self.signals.clone())
    }

    /// Price schedule step.
    pub fn step_price(&mut self) -> Tick {
        let step = self.config.max_step;
        let delta = if step > 0.0 {
            self.rng.gen_range(-step..=step)
        } else {
            0.0
        };
        self.price = (self.price + delta).clamp(self.config.min_price, self.config.max_price);
        self.buffer_index = (self.buffer_index + 1) % BUFFER_SLOTS;
        self.current()
    }

    /// Signal schedule step. The other three strategies keep their last vote.
    pub fn step_signal(&mut self) -> Tick {
        let strategy = Strategy::ALL[self.rng.gen_range(0..Strategy::ALL.len())];
        let signal_type = SignalType::ALL[self.rng.gen_range(0..SignalType::ALL.len())];
        let strength = self.rng.gen_range(MIN_STRENGTH..MAX_STRENGTH);

        self.signals.set(
            strategy,
            StrategySignal::new(
                signal_type,
                strength,
                format!("Synthetic {signal_type} @ {strength}%"),
            ),
        );
        self.current()
    }
}

/// A synthetic tick tagged with the generation of the feed run that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticTick {
    pub generation: u64,
    pub tick: Tick,
}

/// Runs a [`SyntheticGenerator`] on tokio timers.
pub struct SyntheticFeed {
    config: SyntheticConfig,
    seed: Option<u64>,
    generation: u64,
    running: Option<CancellationToken>,
    parent: CancellationToken,
}

impl SyntheticFeed {
    /// `seed` fixes the RNG of every run (offset by generation); `None` seeds from entropy.
    /// Cancelling `parent` stops any running task.
    pub fn new(config: SyntheticConfig, seed: Option<u64>, parent: CancellationToken) -> Self {
        Self {
            config,
            seed,
            generation: 0,
            running: None,
            parent,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// True if `tick` came from the run that is active right now.
    pub fn is_current(&self, tick: &SyntheticTick) -> bool {
        self.is_running() && tick.generation == self.generation
    }

    /// Start a new run. Already running: keeps the current run and returns its generation.
    ///
    /// The task emits the initial state right away, then one tick per schedule firing.
    pub fn start<E>(&mut self, tx: mpsc::Sender<E>) -> u64
    where
        E: From<SyntheticTick> + Send + 'static,
    {
        if self.running.is_some() {
            return self.generation;
        }

        self.generation += 1;
        let generation = self.generation;
        let token = self.parent.child_token();
        self.running = Some(token.clone());

        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(generation)),
            None => StdRng::from_entropy(),
        };
        let generator = SyntheticGenerator::new(self.config.clone(), rng);
        let price_period = self.config.price_interval();
        let signal_period = self.config.signal_interval();

        info!(generation, "Synthetic stream started");
        tokio::spawn(run_feed(
            generator,
            generation,
            price_period,
            signal_period,
            tx,
            token,
        ));
        generation
    }

    /// Stop the running task. Safe to call when nothing is running.
    pub fn stop(&mut self) -> bool {
        match self.running.take() {
            Some(token) => {
                token.cancel();
                info!(generation = self.generation, "Synthetic stream stopped");
                true
            }
            None => false,
        }
    }
}

impl Drop for SyntheticFeed {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_feed<R, E>(
    mut generator: SyntheticGenerator<R>,
    generation: u64,
    price_period: Duration,
    signal_period: Duration,
    tx: mpsc::Sender<E>,
    token: CancellationToken,
) where
    R: Rng + Send,
    E: From<SyntheticTick> + Send + 'static,
{
    let start = Instant::now();
    let mut price_timer = interval_at(start + price_period, price_period);
    let mut signal_timer = interval_at(start + signal_period, signal_period);

    let mut tick = generator.current();
    loop {
        let delivered = tokio::select! {
            biased;
            () = token.cancelled() => false,
            result = tx.send(E::from(SyntheticTick { generation, tick })) => result.is_ok(),
        };
        if !delivered {
            debug!(generation, "Synthetic task stopped");
            return;
        }

        tick = tokio::select! {
            biased;
            () = token.cancelled() => {
                debug!(generation, "Synthetic task cancelled");
                return;
            }
            _ = price_timer.tick() => generator.step_price(),
            _ = signal_timer.tick() => generator.step_signal(),
        };
    }
}

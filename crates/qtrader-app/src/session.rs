//! Session runtime.
//!
//! The session owns every piece of mutable state: the transport machine, the
//! live connection, the retry and probe timers, the synthetic feed and the
//! statistics windows. Producers (connector tasks, the synthetic task, timer
//! tasks) only send [`SessionEvent`]s into one channel; the session applies
//! them one at a time in arrival order.

use std::time::Duration;

use qtrader_core::Tick;
use qtrader_dashboard::DashboardState;
use qtrader_feed::{SyntheticFeed, SyntheticTick};
use qtrader_telemetry::{Metrics, StatisticsEngine};
use qtrader_ws::{
    ConnectionState, Connector, Disposition, TaggedEvent, TransportCommand, TransportEvent,
    TransportMachine,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::error::AppResult;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Everything the session reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Transport(TaggedEvent),
    Synthetic(SyntheticTick),
    RetryElapsed { generation: u64 },
    ProbeElapsed,
}

impl From<TaggedEvent> for SessionEvent {
    fn from(event: TaggedEvent) -> Self {
        SessionEvent::Transport(event)
    }
}

impl From<SyntheticTick> for SessionEvent {
    fn from(tick: SyntheticTick) -> Self {
        SessionEvent::Synthetic(tick)
    }
}

/// Stops a running session from another task.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    token: CancellationToken,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Token cancelled on shutdown, for tasks that should stop with the session.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

struct ActiveConnection {
    generation: u64,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// One client session.
pub struct Session {
    machine: TransportMachine,
    connector: Connector,
    synthetic: SyntheticFeed,
    stats: StatisticsEngine<StdRng>,
    latest: Option<Tick>,
    state: DashboardState,
    events_tx: mpsc::Sender<SessionEvent>,
    events_rx: mpsc::Receiver<SessionEvent>,
    root: CancellationToken,
    connection: Option<ActiveConnection>,
    retry_timer: Option<(u64, CancellationToken)>,
    probe_timer: Option<CancellationToken>,
}

impl Session {
    pub fn new(config: &AppConfig, state: DashboardState) -> AppResult<Self> {
        config.validate()?;
        let connection = config.connection_config()?;
        info!(url = %connection.url, "Live endpoint resolved");

        let root = CancellationToken::new();
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let stats_rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            machine: TransportMachine::new(
                connection.max_attempts,
                connection.retry_delay(),
                connection.probe_interval(),
            ),
            connector: Connector::from_config(&connection),
            synthetic: SyntheticFeed::new(
                config.synthetic.clone(),
                config.rng_seed,
                root.child_token(),
            ),
            stats: StatisticsEngine::new(config.stats.clone(), stats_rng, now()),
            latest: None,
            state,
            events_tx,
            events_rx,
            root,
            connection: None,
            retry_timer: None,
            probe_timer: None,
        })
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            token: self.root.clone(),
        }
    }

    pub fn state(&self) -> &DashboardState {
        &self.state
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.machine.state()
    }

    pub fn generation(&self) -> u64 {
        self.machine.generation()
    }

    pub fn latest_tick(&self) -> Option<&Tick> {
        self.latest.as_ref()
    }

    pub fn has_open_connection(&self) -> bool {
        self.connection.is_some()
    }

    pub fn has_active_timers(&self) -> bool {
        self.retry_timer.is_some() || self.probe_timer.is_some()
    }

    pub fn is_synthetic_running(&self) -> bool {
        self.synthetic.is_running()
    }

    /// Begin the first connection attempt.
    pub fn start(&mut self) {
        let transition = self.machine.start();
        self.execute(transition.commands);
        self.publish_connection();
    }

    /// Process events until shut down.
    pub async fn run(&mut self) -> AppResult<()> {
        self.start();

        loop {
            tokio::select! {
                biased;
                () = self.root.cancelled() => break,
                event = self.events_rx.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },
            }
        }

        self.shutdown();
        Ok(())
    }

    /// Receive and apply one event. Returns `None` once shut down.
    pub async fn step(&mut self) -> Option<SessionEvent> {
        let event = tokio::select! {
            biased;
            () = self.root.cancelled() => return None,
            event = self.events_rx.recv() => event?,
        };
        self.handle_event(event.clone());
        Some(event)
    }

    /// Apply one event.
    pub fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Transport(TaggedEvent { generation, event }) => {
                self.on_transport(generation, event)
            }
            SessionEvent::Synthetic(tick) => {
                if !self.synthetic.is_current(&tick) {
                    debug!(
                        generation = tick.generation,
                        current = self.synthetic.generation(),
                        "Discarding tick from stopped generator"
                    );
                    Metrics::stale_discarded();
                    return;
                }
                self.apply_tick(tick.tick, "synthetic");
            }
            SessionEvent::RetryElapsed { generation } => {
                if matches!(self.retry_timer, Some((g, _)) if g == generation) {
                    self.retry_timer = None;
                }
                let transition = self.machine.retry_elapsed(generation);
                if transition.disposition == Disposition::Stale {
                    Metrics::stale_discarded();
                }
                self.execute(transition.commands);
            }
            SessionEvent::ProbeElapsed => {
                self.probe_timer = None;
                let transition = self.machine.probe_elapsed();
                self.execute(transition.commands);
            }
        }
        self.publish_connection();
    }

    /// Tear everything down. Safe to call any number of times, in any state.
    pub fn shutdown(&mut self) {
        self.root.cancel();
        self.cancel_timers();

        let transition = self.machine.shutdown();
        if transition.disposition == Disposition::Applied {
            info!("Session shutting down");
        }
        self.execute(transition.commands);
        // Covers a session that never started.
        self.close_connection();
        self.synthetic.stop();
        Metrics::synthetic_active(false);
        self.publish_connection();
    }

    fn on_transport(&mut self, generation: u64, event: TransportEvent) {
        let malformed = match &event {
            TransportEvent::Malformed(reason) => Some(reason.clone()),
            _ => None,
        };
        let opened = matches!(event, TransportEvent::Opened);
        let failure = match &event {
            TransportEvent::Errored(e) => Some(e.clone()),
            TransportEvent::Closed { code, reason } => Some(format!("closed {code}: {reason}")),
            _ => None,
        };

        let transition = self.machine.handle(generation, event);
        match transition.disposition {
            Disposition::Stale => {
                Metrics::stale_discarded();
                return;
            }
            Disposition::Ignored => {
                debug!(generation, state = %self.machine.state(), "Event ignored in current state");
            }
            Disposition::Applied => {
                if let Some(reason) = malformed {
                    warn!(generation, %reason, "Dropping malformed payload");
                    Metrics::malformed();
                }
                if opened {
                    Metrics::connect_opened();
                }
                if let Some(error) = failure {
                    debug!(generation, %error, "Live connection failed");
                    Metrics::connect_failed();
                    if matches!(&self.connection, Some(c) if c.generation == generation) {
                        self.close_connection();
                    }
                }
            }
        }
        self.execute(transition.commands);
    }

    fn execute(&mut self, commands: Vec<TransportCommand>) {
        for command in commands {
            match command {
                TransportCommand::Connect { generation } => {
                    self.close_connection();
                    let token = self.root.child_token();
                    let handle =
                        self.connector
                            .spawn(generation, self.events_tx.clone(), token.clone());
                    self.connection = Some(ActiveConnection {
                        generation,
                        token,
                        handle,
                    });
                }
                TransportCommand::CloseConnection => self.close_connection(),
                TransportCommand::ScheduleRetry { generation, delay } => {
                    let token = self.schedule(delay, SessionEvent::RetryElapsed { generation });
                    if let Some((_, old)) = self.retry_timer.replace((generation, token)) {
                        old.cancel();
                    }
                }
                TransportCommand::ScheduleProbe { delay } => {
                    let token = self.schedule(delay, SessionEvent::ProbeElapsed);
                    if let Some(old) = self.probe_timer.replace(token) {
                        old.cancel();
                    }
                }
                TransportCommand::StartSynthetic => {
                    if !self.root.is_cancelled() {
                        self.synthetic.start(self.events_tx.clone());
                        Metrics::synthetic_active(true);
                    }
                }
                TransportCommand::StopSynthetic => {
                    self.synthetic.stop();
                    Metrics::synthetic_active(false);
                }
                TransportCommand::Publish(tick) => self.apply_tick(tick, "live"),
            }
        }
    }

    /// Run the statistics engine and the aggregator on a tick, then publish.
    fn apply_tick(&mut self, tick: Tick, source: &str) {
        let stats = self
            .stats
            .observe(tick.buffer_index, &tick.signals, now());
        if let Some(snapshot) = &stats {
            Metrics::tick_rate(snapshot.tick_rate);
            Metrics::latency_estimate(snapshot.latency.current_ms);
        }

        let consensus = self.state.publish_tick(&tick, stats);
        if consensus.label != tick.consensus {
            debug!(
                reported = %tick.consensus,
                aggregated = %consensus.label,
                "Reported consensus differs from vote count"
            );
        }
        Metrics::consensus_confidence(consensus.confidence);
        Metrics::tick(source);

        self.latest = Some(tick);
    }

    fn schedule(&self, delay: Duration, event: SessionEvent) -> CancellationToken {
        let token = self.root.child_token();
        let cancel = token.clone();
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            // Cancellation also abandons a send blocked on a full channel.
            tokio::select! {
                biased;
                () = cancel.cancelled() => {}
                _ = async {
                    tokio::time::sleep(delay).await;
                    tx.send(event).await
                } => {}
            }
        });
        token
    }

    fn close_connection(&mut self) {
        if let Some(conn) = self.connection.take() {
            conn.token.cancel();
            if conn.handle.is_finished() {
                debug!(generation = conn.generation, "Connection task already finished");
            } else {
                debug!(generation = conn.generation, "Closing live connection");
            }
        }
    }

    fn cancel_timers(&mut self) {
        if let Some((_, token)) = self.retry_timer.take() {
            token.cancel();
        }
        if let Some(token) = self.probe_timer.take() {
            token.cancel();
        }
    }

    fn publish_connection(&self) {
        let state = self.machine.state();
        self.state.set_connection(state, self.machine.generation());
        Metrics::ws_connected(state.is_connected_indicator());
        Metrics::connection_state_set(
            state.as_str(),
            ConnectionState::ALL.iter().map(|s| s.as_str()),
        );
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.root.cancel();
    }
}

fn now() -> std::time::Instant {
    tokio::time::Instant::now().into_std()
}

#[cfg(test)]
mod tests {
    use super::*;
    use qtrader_core::{ConsensusLabel, SignalBundle, SignalType};

    fn config() -> AppConfig {
        let mut config = AppConfig::default();
        config.transport.page_origin = "http://127.0.0.1:9".to_string();
        config.transport.retry_delay_ms = 10;
        config.transport.connect_timeout_ms = 200;
        config.rng_seed = Some(7);
        config
    }

    fn session() -> Session {
        Session::new(&config(), DashboardState::new()).unwrap()
    }

    fn tagged(generation: u64, event: TransportEvent) -> SessionEvent {
        SessionEvent::Transport(TaggedEvent { generation, event })
    }

    fn errored() -> TransportEvent {
        TransportEvent::Errored("refused".to_string())
    }

    fn live_tick(index: u16) -> Tick {
        Tick::new(
            66000.0,
            index,
            SignalBundle::from_types([
                SignalType::Buy,
                SignalType::Buy,
                SignalType::Buy,
                SignalType::Neutral,
            ]),
        )
    }

    #[tokio::test]
    async fn test_live_tick_is_published() {
        let mut s = session();
        s.start();
        s.handle_event(tagged(1, TransportEvent::Opened));
        assert_eq!(s.connection_state(), ConnectionState::Connected);

        s.handle_event(tagged(1, TransportEvent::Message(live_tick(4))));
        let snap = s.state().collect_snapshot();
        assert!(snap.connected);
        assert!(!snap.using_synthetic_data);
        assert_eq!(snap.tick.unwrap().buffer_index, 4);
        assert_eq!(snap.consensus.unwrap().label, ConsensusLabel::StrongBuy);
        assert!(snap.stats.is_some());
        s.shutdown();
    }

    #[tokio::test]
    async fn test_stale_message_does_not_mutate_state() {
        let mut s = session();
        s.start();
        s.handle_event(tagged(1, errored()));
        s.handle_event(SessionEvent::RetryElapsed { generation: 1 });
        s.handle_event(tagged(2, TransportEvent::Opened));

        s.handle_event(tagged(1, TransportEvent::Message(live_tick(9))));
        assert!(s.latest_tick().is_none());
        assert_eq!(s.state().ticks_processed(), 0);

        s.handle_event(tagged(1, TransportEvent::Closed {
            code: 1006,
            reason: "late".to_string(),
        }));
        assert_eq!(s.connection_state(), ConnectionState::Connected);
        s.shutdown();
    }

    #[tokio::test]
    async fn test_malformed_payload_is_dropped() {
        let mut s = session();
        s.start();
        s.handle_event(tagged(1, TransportEvent::Opened));
        s.handle_event(tagged(1, TransportEvent::Malformed("bad json".to_string())));
        assert_eq!(s.connection_state(), ConnectionState::Connected);
        assert_eq!(s.state().ticks_processed(), 0);
        s.shutdown();
    }

    #[tokio::test]
    async fn test_fallback_starts_synthetic_once() {
        let mut s = session();
        s.start();
        for generation in 1..=3 {
            s.handle_event(tagged(generation, errored()));
            s.handle_event(SessionEvent::RetryElapsed { generation });
        }
        assert_eq!(s.connection_state(), ConnectionState::SyntheticFallback);
        assert!(s.is_synthetic_running());
        assert!(!s.has_active_timers());

        let snap = s.state().collect_snapshot();
        assert!(snap.connected);
        assert!(snap.using_synthetic_data);

        // late connector events are stale; the feed's first tick gets applied
        loop {
            if let SessionEvent::Synthetic(_) = s.step().await.unwrap() {
                break;
            }
        }
        assert_eq!(s.state().ticks_processed(), 1);
        assert_eq!(s.connection_state(), ConnectionState::SyntheticFallback);
        s.shutdown();
    }

    #[tokio::test]
    async fn test_synthetic_tick_from_old_run_discarded() {
        let mut s = session();
        let old = SyntheticTick {
            generation: 42,
            tick: live_tick(1),
        };
        s.handle_event(SessionEvent::Synthetic(old));
        assert_eq!(s.state().ticks_processed(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_twice_is_clean() {
        let mut s = session();
        s.start();
        s.handle_event(tagged(1, errored()));
        assert!(s.has_active_timers());

        s.shutdown();
        s.shutdown();
        assert!(!s.has_active_timers());
        assert!(!s.has_open_connection());
        assert!(!s.is_synthetic_running());
        assert_eq!(s.connection_state(), ConnectionState::Disconnected);
        assert!(s.step().await.is_none());
    }

    #[tokio::test]
    async fn test_shutdown_before_start() {
        let mut s = session();
        s.shutdown();
        s.shutdown();
        assert_eq!(s.connection_state(), ConnectionState::Disconnected);
        assert!(s.shutdown_handle().is_shutdown());
    }
}

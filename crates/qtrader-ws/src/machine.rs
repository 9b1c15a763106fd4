//! Connection state machine.
//!
//! ```text
//!  Disconnected ──start──▶ Connecting ──Opened──▶ Connected
//!                             ▲  │                   │
//!               retry elapsed │  │ Errored/Closed     │ Errored/Closed
//!                             │  ▼                   ▼
//!                           Retrying ◀───────────────┘
//!                              │ attempts == max
//!                              ▼
//!                      SyntheticFallback (terminal unless probing is enabled)
//! ```
//!
//! Every `Connect` command carries a new generation. Inputs tagged with any
//! other generation are reported as [`Disposition::Stale`] and change nothing.

use crate::connection::TransportEvent;
use qtrader_core::Tick;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Retrying,
    SyntheticFallback,
}

impl ConnectionState {
    pub const ALL: [ConnectionState; 5] = [
        ConnectionState::Disconnected,
        ConnectionState::Connecting,
        ConnectionState::Connected,
        ConnectionState::Retrying,
        ConnectionState::SyntheticFallback,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Retrying => "retrying",
            ConnectionState::SyntheticFallback => "synthetic_fallback",
        }
    }

    /// The boolean "connected" indicator shown to collaborators.
    ///
    /// Stays true in synthetic fallback: the display keeps working on synthetic ticks.
    pub fn is_connected_indicator(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connected | ConnectionState::SyntheticFallback
        )
    }

    pub fn is_synthetic(&self) -> bool {
        *self == ConnectionState::SyntheticFallback
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Side effect requested by the machine. The owner executes these in order.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCommand {
    /// Open a new connection tagged with `generation`.
    Connect { generation: u64 },
    /// Close whatever connection is open.
    CloseConnection,
    /// Call `retry_elapsed(generation)` after `delay`.
    ScheduleRetry { generation: u64, delay: Duration },
    /// Call `probe_elapsed()` after `delay`.
    ScheduleProbe { delay: Duration },
    StartSynthetic,
    StopSynthetic,
    /// Hand a live tick to downstream consumers.
    Publish(Tick),
}

/// How an input was treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Applied,
    /// Tagged with a superseded generation; discarded.
    Stale,
    /// Current generation but meaningless in the current state.
    Ignored,
}

/// Result of feeding one input to the machine.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub disposition: Disposition,
    pub commands: Vec<TransportCommand>,
}

impl Transition {
    fn applied(commands: Vec<TransportCommand>) -> Self {
        Self {
            disposition: Disposition::Applied,
            commands,
        }
    }

    fn stale() -> Self {
        Self {
            disposition: Disposition::Stale,
            commands: Vec::new(),
        }
    }

    fn ignored() -> Self {
        Self {
            disposition: Disposition::Ignored,
            commands: Vec::new(),
        }
    }
}

/// Pure transport state machine.
#[derive(Debug)]
pub struct TransportMachine {
    state: ConnectionState,
    generation: u64,
    attempts: u32,
    max_attempts: u32,
    retry_delay: Duration,
    /// `None` keeps synthetic fallback terminal.
    probe_interval: Option<Duration>,
    probing: bool,
    fallback_entries: u32,
    shut_down: bool,
}

impl TransportMachine {
    pub fn new(max_attempts: u32, retry_delay: Duration, probe_interval: Option<Duration>) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            generation: 0,
            attempts: 0,
            max_attempts: max_attempts.max(1),
            retry_delay,
            probe_interval: probe_interval.filter(|d| !d.is_zero()),
            probing: false,
            fallback_entries: 0,
            shut_down: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Consecutive failed attempts since the last successful handshake.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// How many times the machine has entered synthetic fallback.
    pub fn fallback_entries(&self) -> u32 {
        self.fallback_entries
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// `Disconnected → Connecting`.
    pub fn start(&mut self) -> Transition {
        if self.shut_down || self.state != ConnectionState::Disconnected {
            return Transition::ignored();
        }
        Transition::applied(vec![self.begin_connect()])
    }

    /// Feed one event from the connector.
    pub fn handle(&mut self, generation: u64, event: TransportEvent) -> Transition {
        if generation != self.generation {
            debug!(
                generation,
                current = self.generation,
                "Discarding event from superseded connection"
            );
            return Transition::stale();
        }
        if self.shut_down {
            return Transition::ignored();
        }

        match event {
            TransportEvent::Opened => self.on_opened(),
            TransportEvent::Message(tick) => {
                if self.state == ConnectionState::Connected {
                    Transition::applied(vec![TransportCommand::Publish(tick)])
                } else {
                    Transition::ignored()
                }
            }
            // Parse failures never change state.
            TransportEvent::Malformed(_) => Transition::applied(Vec::new()),
            TransportEvent::Errored(_) | TransportEvent::Closed { .. } => self.on_failure(),
        }
    }

    /// Retry delay finished: `Retrying → Connecting`.
    pub fn retry_elapsed(&mut self, generation: u64) -> Transition {
        if generation != self.generation {
            return Transition::stale();
        }
        if self.shut_down
            || self.state != ConnectionState::Retrying
            || self.attempts >= self.max_attempts
        {
            return Transition::ignored();
        }
        Transition::applied(vec![self.begin_connect()])
    }

    /// Probe timer fired while in synthetic fallback.
    ///
    /// Issues a single connection attempt; the state stays `SyntheticFallback`
    /// until that attempt opens.
    pub fn probe_elapsed(&mut self) -> Transition {
        if self.shut_down
            || self.probe_interval.is_none()
            || self.state != ConnectionState::SyntheticFallback
            || self.probing
        {
            return Transition::ignored();
        }
        self.generation += 1;
        self.probing = true;
        info!(generation = self.generation, "Probing live source");
        Transition::applied(vec![TransportCommand::Connect {
            generation: self.generation,
        }])
    }

    /// Tear down: any state → `Disconnected`. Idempotent.
    pub fn shutdown(&mut self) -> Transition {
        if self.shut_down {
            return Transition::ignored();
        }
        self.shut_down = true;
        // Invalidate anything still in flight.
        self.generation += 1;
        self.probing = false;
        self.set_state(ConnectionState::Disconnected);
        Transition::applied(vec![
            TransportCommand::CloseConnection,
            TransportCommand::StopSynthetic,
        ])
    }

    fn begin_connect(&mut self) -> TransportCommand {
        self.generation += 1;
        self.set_state(ConnectionState::Connecting);
        TransportCommand::Connect {
            generation: self.generation,
        }
    }

    fn on_opened(&mut self) -> Transition {
        let from_probe = self.state == ConnectionState::SyntheticFallback && self.probing;
        if self.state != ConnectionState::Connecting && !from_probe {
            return Transition::ignored();
        }
        if from_probe {
            info!("Live source reachable again, leaving synthetic fallback");
        }
        self.probing = false;
        self.attempts = 0;
        self.set_state(ConnectionState::Connected);
        Transition::applied(vec![TransportCommand::StopSynthetic])
    }

    fn on_failure(&mut self) -> Transition {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Connected => {}
            ConnectionState::SyntheticFallback if self.probing => {
                self.probing = false;
                debug!("Probe failed, staying on synthetic stream");
                return Transition::applied(self.probe_schedule().into_iter().collect());
            }
            _ => return Transition::ignored(),
        }

        self.attempts += 1;
        self.set_state(ConnectionState::Retrying);

        if self.attempts >= self.max_attempts {
            warn!(
                attempts = self.attempts,
                "Max connection attempts reached, switching to synthetic stream"
            );
            self.fallback_entries += 1;
            self.set_state(ConnectionState::SyntheticFallback);
            let mut commands = vec![TransportCommand::StartSynthetic];
            commands.extend(self.probe_schedule());
            return Transition::applied(commands);
        }

        warn!(
            attempt = self.attempts,
            max = self.max_attempts,
            delay_ms = self.retry_delay.as_millis() as u64,
            "Connection lost, retrying"
        );
        Transition::applied(vec![TransportCommand::ScheduleRetry {
            generation: self.generation,
            delay: self.retry_delay,
        }])
    }

    fn probe_schedule(&self) -> Option<TransportCommand> {
        self.probe_interval
            .map(|delay| TransportCommand::ScheduleProbe { delay })
    }

    fn set_state(&mut self, next: ConnectionState) {
        if self.state != next {
            info!(from = %self.state, to = %next, generation = self.generation, "Connection state changed");
            self.state = next;
        }
    }
}

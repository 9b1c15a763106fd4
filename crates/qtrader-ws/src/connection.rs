//! WebSocket connector.
//!
//! One spawned task per connection attempt. The task reports what happens on
//! the socket as [`TaggedEvent`]s; it never retries on its own. Retry policy
//! lives in [`TransportMachine`](crate::TransportMachine).

use crate::error::{WsError, WsResult};
use futures_util::{Sink, SinkExt, StreamExt};
use qtrader_core::Tick;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async_tls_with_config, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// WebSocket URL.
    pub url: String,
    /// Failed attempts before switching to the synthetic stream.
    pub max_attempts: u32,
    /// Fixed delay between attempts.
    pub retry_delay_ms: u64,
    /// Handshake timeout.
    pub connect_timeout_ms: u64,
    /// Live-source probe interval while on the synthetic stream (0 = never).
    pub failback_probe_interval_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_attempts: 3,
            retry_delay_ms: 3000,
            connect_timeout_ms: 5000,
            failback_probe_interval_ms: 0,
        }
    }
}

impl ConnectionConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn probe_interval(&self) -> Option<Duration> {
        (self.failback_probe_interval_ms > 0)
            .then(|| Duration::from_millis(self.failback_probe_interval_ms))
    }
}

/// What happened on a connection.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Opened,
    Message(Tick),
    /// A text frame that did not decode as a tick.
    Malformed(String),
    Errored(String),
    Closed { code: u16, reason: String },
}

/// A [`TransportEvent`] stamped with the generation of the connection that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedEvent {
    pub generation: u64,
    pub event: TransportEvent,
}

/// Opens connections to a single endpoint.
#[derive(Debug, Clone)]
pub struct Connector {
    url: String,
    connect_timeout: Duration,
}

impl Connector {
    pub fn new(url: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            connect_timeout,
        }
    }

    pub fn from_config(config: &ConnectionConfig) -> Self {
        Self::new(config.url.clone(), config.connect_timeout())
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Spawn a task that runs one connection tagged with `generation`.
    ///
    /// The task sends `Opened` once the handshake completes, then one event per
    /// text frame, and finally exactly one `Errored` or `Closed`. Cancelling
    /// `token` closes the socket without a terminal event.
    pub fn spawn<E>(
        &self,
        generation: u64,
        tx: mpsc::Sender<E>,
        token: CancellationToken,
    ) -> JoinHandle<()>
    where
        E: From<TaggedEvent> + Send + 'static,
    {
        let connector = self.clone();
        tokio::spawn(async move {
            let sink = EventSink {
                generation,
                tx,
                token: token.clone(),
            };

            match connector.connect(&sink, &token).await {
                Ok(None) => {
                    debug!(generation, "Connection task cancelled");
                }
                Ok(Some(event)) => {
                    sink.send(event).await;
                }
                Err(e) => {
                    error!(generation, error = %e, "WebSocket connection error");
                    sink.send(TransportEvent::Errored(e.to_string())).await;
                }
            }
        })
    }

    /// Run one connection. Returns the terminal event, or `None` if cancelled.
    async fn connect<E>(
        &self,
        sink: &EventSink<E>,
        token: &CancellationToken,
    ) -> WsResult<Option<TransportEvent>>
    where
        E: From<TaggedEvent> + Send + 'static,
    {
        info!(url = %self.url, generation = sink.generation, "Connecting to WebSocket");

        let handshake = tokio::time::timeout(
            self.connect_timeout,
            connect_async_tls_with_config(&self.url, None, true, None),
        );
        let (ws_stream, _response) = tokio::select! {
            biased;
            () = token.cancelled() => return Ok(None),
            result = handshake => result
                .map_err(|_| WsError::ConnectTimeout(self.connect_timeout.as_millis() as u64))??,
        };
        let (mut write, mut read) = ws_stream.split();

        info!(generation = sink.generation, "WebSocket connected");
        if !sink.send(TransportEvent::Opened).await {
            send_close(&mut write).await;
            return Ok(None);
        }

        loop {
            tokio::select! {
                biased;
                () = token.cancelled() => {
                    send_close(&mut write).await;
                    return Ok(None);
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            let event = match Tick::parse(&text) {
                                Ok(tick) => TransportEvent::Message(tick),
                                Err(e) => TransportEvent::Malformed(e.to_string()),
                            };
                            if !sink.send(event).await {
                                send_close(&mut write).await;
                                return Ok(None);
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            debug!("Received ping, sending pong");
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|f| (f.code.into(), f.reason.to_string()))
                                .unwrap_or((1000, "Normal close".to_string()));
                            warn!(code, %reason, "WebSocket closed by server");
                            return Ok(Some(TransportEvent::Closed { code, reason }));
                        }
                        Some(Err(e)) => return Err(e.into()),
                        None => {
                            warn!("WebSocket stream ended");
                            return Ok(Some(TransportEvent::Closed {
                                code: 1006,
                                reason: "Stream ended".to_string(),
                            }));
                        }
                        _ => {}
                    }
                }
            }
        }
    }
}

async fn send_close<S>(write: &mut S)
where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Debug,
{
    if let Err(e) = write.send(Message::Close(None)).await {
        warn!(?e, "Failed to send Close frame during shutdown");
    }
}

struct EventSink<E> {
    generation: u64,
    tx: mpsc::Sender<E>,
    token: CancellationToken,
}

impl<E: From<TaggedEvent>> EventSink<E> {
    /// Deliver one event. Returns false if the token was cancelled while
    /// waiting for channel capacity, or the receiver is gone.
    async fn send(&self, event: TransportEvent) -> bool {
        let tagged = TaggedEvent {
            generation: self.generation,
            event,
        };
        let delivered = tokio::select! {
            biased;
            () = self.token.cancelled() => false,
            result = self.tx.send(E::from(tagged)) => result.is_ok(),
        };
        if !delivered {
            debug!(generation = self.generation, "Event not delivered, stopping");
        }
        delivered
    }
}

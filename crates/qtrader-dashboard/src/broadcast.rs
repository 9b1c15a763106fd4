//! WebSocket broadcast.
//!
//! Polls the published state at a fixed interval and broadcasts an update to
//! all connected clients whenever its sequence has moved.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::state::DashboardState;
use crate::types::DashboardMessage;

/// Run the broadcaster until `token` is cancelled.
pub async fn run_broadcaster(
    state: DashboardState,
    tx: broadcast::Sender<String>,
    interval_ms: u64,
    token: CancellationToken,
) {
    let mut interval = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
    let mut last_sequence = 0;

    loop {
        tokio::select! {
            () = token.cancelled() => {
                debug!("Broadcaster stopped");
                return;
            }
            _ = interval.tick() => {}
        }

        let sequence = state.sequence();
        if sequence == last_sequence {
            continue;
        }
        last_sequence = sequence;

        let msg = DashboardMessage::Update(state.collect_snapshot());
        match serde_json::to_string(&msg) {
            Ok(json) => match tx.send(json) {
                Ok(n) => trace!(receivers = n, sequence, "Broadcast update sent"),
                Err(_) => trace!("No WebSocket receivers connected"),
            },
            Err(e) => debug!(error = %e, "Failed to serialize dashboard update"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qtrader_core::{SignalBundle, Tick};

    #[tokio::test]
    async fn test_update_sent_only_on_change() {
        let state = DashboardState::new();
        let (tx, mut rx) = broadcast::channel::<String>(16);
        let token = CancellationToken::new();
        let task = tokio::spawn(run_broadcaster(state.clone(), tx, 5, token.clone()));

        state.publish_tick(&Tick::new(61000.0, 1, SignalBundle::default()), None);
        let msg = rx.recv().await.unwrap();
        let json: serde_json::Value = serde_json::from_str(&msg).unwrap();
        assert_eq!(json["type"], "update");
        assert_eq!(json["ticks_processed"], 1);

        // nothing changed: no further message
        let quiet = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
        assert!(quiet.is_err());

        token.cancel();
        task.await.unwrap();
    }
}

//! Mock tick producer for integration tests.
//!
//! Accepts WebSocket clients on `/ws`, pushes a fixed list of text frames to
//! each one and counts connections.

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// What the server does after pushing its frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterFrames {
    /// Keep the socket open until the client leaves.
    Hold,
    /// Send a close frame.
    Close,
}

pub struct MockWsServer {
    addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
    connections: Arc<Mutex<u32>>,
}

impl MockWsServer {
    /// Start on an available port.
    pub async fn start(frames: Vec<String>, after: AfterFrames) -> Self {
        Self::start_on("127.0.0.1:0", frames, after).await
    }

    /// Start on a specific address.
    pub async fn start_on(addr: &str, frames: Vec<String>, after: AfterFrames) -> Self {
        let listener = TcpListener::bind(addr).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connections: Arc<Mutex<u32>> = Arc::new(Mutex::new(0));
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let frames = Arc::new(frames);
        let connections_clone = connections.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Ok((stream, _)) = listener.accept() => {
                        tokio::spawn(handle_connection(
                            stream,
                            frames.clone(),
                            after,
                            connections_clone.clone(),
                        ));
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }
        });

        Self {
            addr,
            shutdown_tx,
            connections,
        }
    }

    /// Page origin whose derived endpoint is this server.
    pub fn page_origin(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub async fn connection_count(&self) -> u32 {
        *self.connections.lock().await
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

async fn handle_connection(
    stream: TcpStream,
    frames: Arc<Vec<String>>,
    after: AfterFrames,
    connections: Arc<Mutex<u32>>,
) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            eprintln!("WebSocket handshake failed: {}", e);
            return;
        }
    };

    {
        let mut count = connections.lock().await;
        *count += 1;
    }

    let (mut write, mut read) = ws_stream.split();

    for frame in frames.iter() {
        if write.send(Message::Text(frame.clone())).await.is_err() {
            return;
        }
    }

    if after == AfterFrames::Close {
        let _ = write.send(Message::Close(None)).await;
    }

    while let Some(msg) = read.next().await {
        match msg {
            Ok(Message::Ping(data)) => {
                let _ = write.send(Message::Pong(data)).await;
            }
            Ok(Message::Close(_)) => break,
            Err(_) => break,
            _ => {}
        }
    }
}

/// A flat tick frame with the given signal types, in strategy order.
pub fn tick_frame(price: f64, buffer_index: u64, types: [&str; 4]) -> String {
    serde_json::json!({
        "price": price,
        "bufferIndex": buffer_index,
        "signals": {
            "meanReversion": {"type": types[0], "strength": 80, "reason": "mock"},
            "momentum": {"type": types[1], "strength": 70, "reason": "mock"},
            "breakout": {"type": types[2], "strength": 60, "reason": "mock"},
            "rsi": {"type": types[3], "strength": 50, "reason": "mock"}
        },
        "consensus": "NEUTRAL"
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_server_starts() {
        let server = MockWsServer::start(Vec::new(), AfterFrames::Hold).await;
        assert!(server.page_origin().starts_with("http://127.0.0.1:"));
        server.shutdown().await;
    }
}

//! Live tick transport for qtrader.
//!
//! Provides:
//! - Endpoint resolution (`/ws` on the page origin or an override, `http→ws`, `https→wss`)
//! - A pure connection state machine with bounded fixed-delay retry and synthetic fallback
//! - A socket connector that reports every lifecycle step as a generation-tagged event
//!
//! The state machine performs no I/O. The session that owns it executes the
//! `TransportCommand`s it returns, which keeps every transition testable without a socket.

pub mod connection;
pub mod endpoint;
pub mod error;
pub mod machine;

pub use connection::{ConnectionConfig, Connector, TaggedEvent, TransportEvent};
pub use endpoint::{resolve_endpoint, LOCAL_DEV_ALIAS, LOCAL_DEV_ENDPOINT};
pub use error::{WsError, WsResult};
pub use machine::{ConnectionState, Disposition, Transition, TransportCommand, TransportMachine};

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Initialize the TLS crypto provider.
/// Must be called before any WebSocket connections are made.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

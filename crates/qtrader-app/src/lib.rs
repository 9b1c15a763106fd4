//! qtrader session runtime.
//!
//! Wires the pieces into one session:
//! - Live transport with bounded retry (qtrader-ws)
//! - Synthetic fallback stream (qtrader-feed)
//! - Rolling statistics and metrics (qtrader-telemetry)
//! - Published state for display collaborators (qtrader-dashboard)
//!
//! Everything the session reacts to arrives on one ordered channel and is
//! handled by one task, so no two handlers ever interleave.

pub mod config;
pub mod error;
pub mod session;

pub use config::{AppConfig, TransportSection};
pub use error::{AppError, AppResult};
pub use session::{Session, SessionEvent, ShutdownHandle};

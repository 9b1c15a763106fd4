//! qtrader-dashboard - Published session state for display collaborators.
//!
//! The session writes the connection state, the latest tick, its consensus
//! and the rolling statistics into [`DashboardState`]. Collaborators read it
//! in-process or through the optional HTTP server:
//!
//! ```text
//!  GET /api/snapshot  → JSON snapshot
//!  GET /ws            → snapshot on connect, then an update per change
//!  GET /metrics       → Prometheus text exposition
//! ```

mod broadcast;
mod config;
mod error;
mod server;
mod state;
mod types;

pub use config::DashboardConfig;
pub use error::{DashboardError, DashboardResult};
pub use server::{bind, create_router, run_server, serve, AppState};
pub use state::DashboardState;
pub use types::{ConsensusView, DashboardMessage, DashboardSnapshot, TickView};

//! Rolling statistics, Prometheus metrics and structured logging for qtrader.
//!
//! - Rolling tick-rate and latency windows with percentile snapshots
//! - Prometheus metrics for the transport and the tick pipeline
//! - Structured logging with tracing

pub mod error;
pub mod logging;
pub mod metrics;
pub mod rolling;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::{gather_text, Metrics};
pub use rolling::{
    strategy_correlation, LatencyStats, RollingWindow, StatisticsEngine, StatsConfig,
    StatsSnapshot,
};

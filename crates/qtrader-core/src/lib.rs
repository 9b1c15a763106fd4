//! Core domain types for the qtrader signal stream.
//!
//! This crate provides the types every other crate exchanges:
//! - `Tick`: one streamed unit of price and strategy signals
//! - `SignalBundle`: the four strategy votes carried by each tick
//! - `ConsensusLabel` / `ConsensusResult`: the aggregated directional signal
//!
//! The wire codec in [`tick`] is deliberately lenient: unknown fields are
//! ignored and missing strategies default to neutral, so a partial payload
//! never takes a consumer down.

pub mod consensus;
pub mod error;
pub mod signal;
pub mod tick;

pub use consensus::{vote, weighted_share, ConsensusLabel, ConsensusResult};
pub use error::{CoreError, Result};
pub use signal::{SignalBundle, SignalType, Strategy, StrategySignal};
pub use tick::{Tick, BUFFER_SLOTS};

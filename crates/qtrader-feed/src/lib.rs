//! Synthetic tick stream for qtrader.
//!
//! Stands in for the live source once the transport has given up. Ticks are
//! built with the same types and consensus rule as live ticks, so downstream
//! consumers never branch on provenance.

pub mod error;
pub mod synthetic;

pub use error::{FeedError, FeedResult};
pub use synthetic::{SyntheticConfig, SyntheticFeed, SyntheticGenerator, SyntheticTick};

//! Consensus aggregation over the four strategy votes.
//!
//! The authoritative rule is a plain vote count:
//!
//! | condition              | label         |
//! |------------------------|---------------|
//! | buys >= 3              | `STRONG BUY`  |
//! | buys == 2              | `BUY`         |
//! | sells >= 3             | `STRONG SELL` |
//! | sells == 2             | `SELL`        |
//! | otherwise              | `NEUTRAL`     |
//!
//! Buy counts are checked before sell counts, so a 2/2 split reads as `BUY`.
//! The strength-weighted share is presentational only and never decides the label.

use crate::signal::{SignalBundle, SignalType};
use serde::Serialize;
use std::fmt;

/// Aggregated directional signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum ConsensusLabel {
    #[serde(rename = "STRONG BUY")]
    StrongBuy,
    #[serde(rename = "BUY")]
    Buy,
    #[default]
    #[serde(rename = "NEUTRAL")]
    Neutral,
    #[serde(rename = "SELL")]
    Sell,
    #[serde(rename = "STRONG SELL")]
    StrongSell,
}

impl ConsensusLabel {
    pub const ALL: [ConsensusLabel; 5] = [
        ConsensusLabel::StrongBuy,
        ConsensusLabel::Buy,
        ConsensusLabel::Neutral,
        ConsensusLabel::Sell,
        ConsensusLabel::StrongSell,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConsensusLabel::StrongBuy => "STRONG BUY",
            ConsensusLabel::Buy => "BUY",
            ConsensusLabel::Neutral => "NEUTRAL",
            ConsensusLabel::Sell => "SELL",
            ConsensusLabel::StrongSell => "STRONG SELL",
        }
    }

    /// Decode a wire label. Returns `None` for anything outside the five labels.
    pub fn from_wire(label: &str) -> Option<Self> {
        let normalized = label.trim().to_ascii_uppercase().replace('_', " ");
        Self::ALL.into_iter().find(|l| l.as_str() == normalized)
    }

    /// The vote direction this label leans toward (`Neutral` for `NEUTRAL`).
    pub fn direction(&self) -> SignalType {
        match self {
            ConsensusLabel::StrongBuy | ConsensusLabel::Buy => SignalType::Buy,
            ConsensusLabel::StrongSell | ConsensusLabel::Sell => SignalType::Sell,
            ConsensusLabel::Neutral => SignalType::Neutral,
        }
    }
}

impl fmt::Display for ConsensusLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Apply the vote-count rule.
pub fn vote(signals: &SignalBundle) -> ConsensusLabel {
    let buys = signals.count(SignalType::Buy);
    let sells = signals.count(SignalType::Sell);

    if buys >= 3 {
        ConsensusLabel::StrongBuy
    } else if buys == 2 {
        ConsensusLabel::Buy
    } else if sells >= 3 {
        ConsensusLabel::StrongSell
    } else if sells == 2 {
        ConsensusLabel::Sell
    } else {
        ConsensusLabel::Neutral
    }
}

/// Strength-weighted share of the label's direction.
///
/// `sum(strength of agreeing strategies) / sum(strength of all four)`.
/// Returns `None` for a neutral label or when every strength is zero.
pub fn weighted_share(signals: &SignalBundle, label: ConsensusLabel) -> Option<f64> {
    let direction = label.direction();
    if direction == SignalType::Neutral {
        return None;
    }

    let total = signals.total_strength();
    if total == 0 {
        return None;
    }

    let agreeing: u32 = signals
        .iter()
        .filter(|(_, sig)| sig.signal_type == direction)
        .map(|(_, sig)| u32::from(sig.strength))
        .sum();

    Some(f64::from(agreeing) / f64::from(total))
}

/// Consensus derived from one tick's signals. Never stored across ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConsensusResult {
    pub label: ConsensusLabel,
    /// Mean of the four strengths, rounded to the nearest integer.
    pub confidence: u8,
    /// Strategies voting in the label's direction (0 for `NEUTRAL`).
    pub agreement_count: u8,
}

impl ConsensusResult {
    pub fn from_signals(signals: &SignalBundle) -> Self {
        let label = vote(signals);

        let confidence = (f64::from(signals.total_strength()) / 4.0).round() as u8;

        let direction = label.direction();
        let agreement_count = if direction == SignalType::Neutral {
            0
        } else {
            signals.count(direction) as u8
        };

        Self {
            label,
            confidence,
            agreement_count,
        }
    }

    /// Agreement as shown to users, e.g. `"3/4"`.
    pub fn agreement_display(&self) -> String {
        format!("{}/4", self.agreement_count)
    }
}

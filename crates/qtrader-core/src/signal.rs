//! Strategy signal types.
//!
//! Every tick carries exactly four strategy votes. `SignalBundle` stores them
//! as named fields rather than a map, so a bundle can never be missing one.

use serde::Serialize;
use std::fmt;

/// Direction of a single strategy vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalType {
    Buy,
    Sell,
    #[default]
    Neutral,
}

impl SignalType {
    /// All vote directions, in wire order.
    pub const ALL: [SignalType; 3] = [SignalType::Buy, SignalType::Sell, SignalType::Neutral];

    /// Decode a wire label. Unknown labels are treated as neutral.
    pub fn from_wire(label: &str) -> Self {
        match label.trim().to_ascii_uppercase().as_str() {
            "BUY" => SignalType::Buy,
            "SELL" => SignalType::Sell,
            _ => SignalType::Neutral,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalType::Buy => "BUY",
            SignalType::Sell => "SELL",
            SignalType::Neutral => "NEUTRAL",
        }
    }

    /// Numeric vote used by the correlation estimate (BUY=+1, SELL=-1, NEUTRAL=0).
    pub fn as_vote(&self) -> f64 {
        match self {
            SignalType::Buy => 1.0,
            SignalType::Sell => -1.0,
            SignalType::Neutral => 0.0,
        }
    }
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The four strategies whose votes make up a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    MeanReversion,
    Momentum,
    Breakout,
    Rsi,
}

impl Strategy {
    /// Fixed iteration order.
    pub const ALL: [Strategy; 4] = [
        Strategy::MeanReversion,
        Strategy::Momentum,
        Strategy::Breakout,
        Strategy::Rsi,
    ];

    /// Key used for this strategy in the JSON wire format.
    pub fn wire_name(&self) -> &'static str {
        match self {
            Strategy::MeanReversion => "meanReversion",
            Strategy::Momentum => "momentum",
            Strategy::Breakout => "breakout",
            Strategy::Rsi => "rsi",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// One strategy's vote.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct StrategySignal {
    #[serde(rename = "type")]
    pub signal_type: SignalType,
    /// Conviction, 0-100.
    pub strength: u8,
    pub reason: String,
}

impl StrategySignal {
    pub fn new(signal_type: SignalType, strength: u8, reason: impl Into<String>) -> Self {
        Self {
            signal_type,
            strength: strength.min(100),
            reason: reason.into(),
        }
    }

    /// `{NEUTRAL, 0, ""}`, the value substituted for a missing strategy.
    pub fn neutral() -> Self {
        Self::default()
    }
}

/// The four strategy votes of a tick.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalBundle {
    pub mean_reversion: StrategySignal,
    pub momentum: StrategySignal,
    pub breakout: StrategySignal,
    pub rsi: StrategySignal,
}

impl SignalBundle {
    /// Build a bundle from four directions with zero strength (handy in tests).
    pub fn from_types(types: [SignalType; 4]) -> Self {
        let mut bundle = Self::default();
        for (strategy, signal_type) in Strategy::ALL.iter().zip(types) {
            bundle.get_mut(*strategy).signal_type = signal_type;
        }
        bundle
    }

    pub fn get(&self, strategy: Strategy) -> &StrategySignal {
        match strategy {
            Strategy::MeanReversion => &self.mean_reversion,
            Strategy::Momentum => &self.momentum,
            Strategy::Breakout => &self.breakout,
            Strategy::Rsi => &self.rsi,
        }
    }

    pub fn get_mut(&mut self, strategy: Strategy) -> &mut StrategySignal {
        match strategy {
            Strategy::MeanReversion => &mut self.mean_reversion,
            Strategy::Momentum => &mut self.momentum,
            Strategy::Breakout => &mut self.breakout,
            Strategy::Rsi => &mut self.rsi,
        }
    }

    pub fn set(&mut self, strategy: Strategy, signal: StrategySignal) {
        *self.get_mut(strategy) = signal;
    }

    /// Iterate `(strategy, signal)` pairs in fixed order.
    pub fn iter(&self) -> impl Iterator<Item = (Strategy, &StrategySignal)> {
        Strategy::ALL.into_iter().map(move |s| (s, self.get(s)))
    }

    /// Number of strategies voting `signal_type`.
    pub fn count(&self, signal_type: SignalType) -> usize {
        self.iter()
            .filter(|(_, sig)| sig.signal_type == signal_type)
            .count()
    }

    /// Sum of all four strengths.
    pub fn total_strength(&self) -> u32 {
        self.iter().map(|(_, sig)| u32::from(sig.strength)).sum()
    }
}

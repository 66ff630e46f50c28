use super::SignalProvider;
use crate::indicators::{calculate_rsi, calculate_sma, sma_crossover, Crossover};
use crate::models::{SignalDirection, SignalVote, Tick};

fn mids(window: &[Tick]) -> Vec<f64> {
    window.iter().map(Tick::mid).collect()
}

/// RSI mean-reversion vote: oversold buys, overbought sells, neutral holds
#[derive(Debug, Clone)]
pub struct RsiProvider {
    pub period: usize,
    pub oversold: f64,
    pub overbought: f64,
}

impl Default for RsiProvider {
    fn default() -> Self {
        Self {
            period: 14,
            oversold: 30.0,
            overbought: 70.0,
        }
    }
}

impl SignalProvider for RsiProvider {
    fn name(&self) -> &str {
        "RSI"
    }

    fn min_ticks_required(&self) -> usize {
        self.period + 1
    }

    fn evaluate(&self, symbol: &str, window: &[Tick]) -> anyhow::Result<SignalVote> {
        let Some(rsi) = calculate_rsi(&mids(window), self.period) else {
            return Ok(SignalVote::new(self.name(), SignalDirection::None));
        };

        let direction = if rsi < self.oversold {
            SignalDirection::Buy
        } else if rsi > self.overbought {
            SignalDirection::Sell
        } else {
            SignalDirection::Hold
        };

        tracing::debug!(symbol = %symbol, rsi, ?direction, "RSI vote");

        Ok(SignalVote::new(self.name(), direction)
            .with_feature("rsi", rsi)
            .with_feature("period", self.period as f64))
    }
}

/// Fast/slow SMA crossover vote. Emits only on the tick where the cross happens.
#[derive(Debug, Clone)]
pub struct MaCrossProvider {
    pub fast: usize,
    pub slow: usize,
}

impl Default for MaCrossProvider {
    fn default() -> Self {
        Self { fast: 10, slow: 30 }
    }
}

impl SignalProvider for MaCrossProvider {
    fn name(&self) -> &str {
        "MA_CROSS"
    }

    fn min_ticks_required(&self) -> usize {
        self.slow + 1
    }

    fn evaluate(&self, symbol: &str, window: &[Tick]) -> anyhow::Result<SignalVote> {
        if self.fast == 0 || self.fast >= self.slow {
            anyhow::bail!(
                "fast period {} must be positive and below slow period {}",
                self.fast,
                self.slow
            );
        }

        let prices = mids(window);
        let Some(cross) = sma_crossover(&prices, self.fast, self.slow) else {
            return Ok(SignalVote::new(self.name(), SignalDirection::None));
        };

        let direction = match cross {
            Crossover::Bullish => SignalDirection::Buy,
            Crossover::Bearish => SignalDirection::Sell,
            Crossover::None => SignalDirection::None,
        };

        let mut vote = SignalVote::new(self.name(), direction);
        if let (Some(fast), Some(slow)) = (
            calculate_sma(&prices, self.fast),
            calculate_sma(&prices, self.slow),
        ) {
            vote = vote.with_feature("sma_fast", fast).with_feature("sma_slow", slow);
        }

        if direction != SignalDirection::None {
            tracing::debug!(symbol = %symbol, ?direction, "MA crossover vote");
        }
        Ok(vote)
    }
}

/// Always votes the same direction. Handy for pinning a symbol's signal in
/// paper runs and tests.
#[derive(Debug, Clone)]
pub struct FixedProvider {
    pub name: String,
    pub direction: SignalDirection,
}

impl FixedProvider {
    pub fn new(name: &str, direction: SignalDirection) -> Self {
        Self {
            name: name.to_string(),
            direction,
        }
    }
}

impl SignalProvider for FixedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn min_ticks_required(&self) -> usize {
        0
    }

    fn evaluate(&self, _symbol: &str, _window: &[Tick]) -> anyhow::Result<SignalVote> {
        Ok(SignalVote::new(&self.name, self.direction))
    }
}

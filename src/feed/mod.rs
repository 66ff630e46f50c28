// Market data, position and volatility sources the engine pulls from
use crate::execution::TickBuffer;
use crate::indicators::calculate_atr;
use crate::models::{Position, Tick};
use async_trait::async_trait;

/// Pull-based tick source, one fetch per symbol per cycle
#[async_trait]
pub trait TickSource: Send + Sync {
    /// Latest tick for `symbol`; `Ok(None)` when no quote is available
    async fn latest_tick(&self, symbol: &str) -> anyhow::Result<Option<Tick>>;
}

/// Confirmed broker positions
#[async_trait]
pub trait PositionSource: Send + Sync {
    async fn positions(&self, symbol: &str) -> anyhow::Result<Vec<Position>>;
}

/// Current volatility (ATR, in price units) per symbol
pub trait VolatilitySource: Send + Sync {
    fn atr(&self, symbol: &str) -> Option<f64>;
}

/// ATR over bars built from buffered ticks
#[derive(Clone)]
pub struct TickAtr {
    buffer: TickBuffer,
    period: usize,
    bar_secs: i64,
}

impl TickAtr {
    pub fn new(buffer: TickBuffer, period: usize, bar_secs: i64) -> Self {
        Self {
            buffer,
            period,
            bar_secs,
        }
    }
}

impl VolatilitySource for TickAtr {
    fn atr(&self, symbol: &str) -> Option<f64> {
        let bars = self.buffer.bars(symbol, self.bar_secs);
        calculate_atr(&bars, self.period)
    }
}

/// Fixed ATR per symbol, for tests and manual runs
#[derive(Debug, Clone, Default)]
pub struct StaticVolatility {
    values: std::collections::HashMap<String, f64>,
}

impl StaticVolatility {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, symbol: &str, atr: f64) -> Self {
        self.values.insert(symbol.to_uppercase(), atr);
        self
    }
}

impl VolatilitySource for StaticVolatility {
    fn atr(&self, symbol: &str) -> Option<f64> {
        self.values.get(symbol).copied()
    }
}

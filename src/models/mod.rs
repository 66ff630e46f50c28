use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One observed market update for a symbol
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tick {
    pub symbol: String,
    pub bid: f64,
    pub ask: f64,
    pub last: f64,
    pub spread: f64,
    pub volume: f64,
    pub timestamp: DateTime<Utc>,
}

impl Tick {
    /// Build a tick from a bid/ask quote; `last` is the mid and `spread` is derived
    pub fn quote(symbol: &str, bid: f64, ask: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.to_uppercase(),
            bid,
            ask,
            last: (bid + ask) / 2.0,
            spread: ask - bid,
            volume: 0.0,
            timestamp,
        }
    }

    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }

    /// A tick is usable only if both sides are positive, finite and not crossed
    pub fn is_valid(&self) -> bool {
        self.bid.is_finite()
            && self.ask.is_finite()
            && self.bid > 0.0
            && self.ask > 0.0
            && self.ask >= self.bid
    }

    /// Price at which a position on `side` would be closed
    pub fn exit_price(&self, side: Side) -> f64 {
        match side {
            Side::Long => self.bid,
            Side::Short => self.ask,
        }
    }

    /// Price at which a new position on `side` would be opened
    pub fn entry_price(&self, side: Side) -> f64 {
        match side {
            Side::Long => self.ask,
            Side::Short => self.bid,
        }
    }
}

/// OHLC bar built from tick mids over a fixed time bucket
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bar {
    pub start: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub ticks: usize,
}

impl Bar {
    pub fn from_price(start: DateTime<Utc>, price: f64) -> Self {
        Self {
            start,
            open: price,
            high: price,
            low: price,
            close: price,
            ticks: 1,
        }
    }

    pub fn update(&mut self, price: f64) {
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
        self.ticks += 1;
    }
}

/// Position side. A BUY open creates a long position.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Long => "long",
            Side::Short => "short",
        }
    }
}

/// Direction reported by a signal provider (and emitted by aggregation)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalDirection {
    Buy,
    Sell,
    Hold,
    Close,
    None,
}

impl SignalDirection {
    /// Side a directional signal would open, if any
    pub fn open_side(self) -> Option<Side> {
        match self {
            SignalDirection::Buy => Some(Side::Long),
            SignalDirection::Sell => Some(Side::Short),
            _ => None,
        }
    }

    /// Swap BUY and SELL, leave everything else untouched
    pub fn inverted(self) -> Self {
        match self {
            SignalDirection::Buy => SignalDirection::Sell,
            SignalDirection::Sell => SignalDirection::Buy,
            other => other,
        }
    }
}

/// Output of one signal provider for one symbol
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SignalVote {
    pub indicator: String,
    pub direction: SignalDirection,
    pub features: BTreeMap<String, f64>,
}

impl SignalVote {
    pub fn new(indicator: &str, direction: SignalDirection) -> Self {
        Self {
            indicator: indicator.to_string(),
            direction,
            features: BTreeMap::new(),
        }
    }

    pub fn with_feature(mut self, name: &str, value: f64) -> Self {
        self.features.insert(name.to_string(), value);
        self
    }

    /// Malformed votes are excluded from voting and reported as data-quality issues
    pub fn is_well_formed(&self) -> bool {
        !self.indicator.trim().is_empty() && self.features.values().all(|v| v.is_finite())
    }
}

/// Confirmed broker position, mirrored locally
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub ticket: u64,
    pub symbol: String,
    pub side: Side,
    pub volume: f64,
    pub open_price: f64,
    pub current_sl: Option<f64>,
    pub take_profit: Option<f64>,
    pub open_time: DateTime<Utc>,
}

impl Position {
    /// Fractional profit at the current tick (negative when losing)
    pub fn profit_pct(&self, tick: &Tick) -> f64 {
        let price_now = tick.exit_price(self.side);
        match self.side {
            Side::Long => (price_now - self.open_price) / self.open_price,
            Side::Short => (self.open_price - price_now) / self.open_price,
        }
    }

    /// Floating profit in account currency
    pub fn profit_amount(&self, tick: &Tick, contract_size: f64) -> f64 {
        let price_now = tick.exit_price(self.side);
        let diff = match self.side {
            Side::Long => price_now - self.open_price,
            Side::Short => self.open_price - price_now,
        };
        diff * self.volume * contract_size
    }
}

/// New-position request sent to the order gateway
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: Side,
    pub volume: f64,
    pub price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
}

/// Status the gateway reports for an accepted open
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FillStatus {
    Filled,
    Placed,
}

/// Gateway acknowledgement of an open
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderFill {
    pub status: FillStatus,
    pub ticket: u64,
    pub fill_price: f64,
}

//! Rolling per-symbol tick windows.
//!
//! Signal providers read the raw window; the ATR source reads it bucketed into bars.
use crate::models::{Bar, Tick};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, PoisonError, RwLock};

/// Thread-safe, cheap to clone
#[derive(Clone)]
pub struct TickBuffer {
    data: Arc<RwLock<HashMap<String, VecDeque<Tick>>>>,
    max_ticks: usize,
}

impl TickBuffer {
    /// Keep at most `max_ticks` ticks per symbol (at least one)
    pub fn new(max_ticks: usize) -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
            max_ticks: max_ticks.max(1),
        }
    }

    /// Add a tick, evicting the oldest once the window is full.
    /// A tick identical to the newest one is ignored.
    pub fn push(&self, tick: Tick) {
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        let ticks = data.entry(tick.symbol.clone()).or_default();

        if ticks.back().is_some_and(|last| {
            last.timestamp == tick.timestamp && last.bid == tick.bid && last.ask == tick.ask
        }) {
            return;
        }
        ticks.push_back(tick);
        while ticks.len() > self.max_ticks {
            ticks.pop_front();
        }
    }

    /// All buffered ticks for a symbol, oldest first
    pub fn window(&self, symbol: &str) -> Vec<Tick> {
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        data.get(symbol)
            .map(|deque| deque.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// The N most recent ticks for a symbol
    pub fn recent(&self, symbol: &str, n: usize) -> Vec<Tick> {
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        data.get(symbol)
            .map(|deque| deque.iter().skip(deque.len().saturating_sub(n)).cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self, symbol: &str) -> usize {
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        data.get(symbol).map(VecDeque::len).unwrap_or(0)
    }

    pub fn is_empty(&self, symbol: &str) -> bool {
        self.len(symbol) == 0
    }

    /// Bucket the window's mids into bars of `bar_secs` seconds
    pub fn bars(&self, symbol: &str, bar_secs: i64) -> Vec<Bar> {
        build_bars(&self.window(symbol), bar_secs)
    }
}

/// Group ticks (oldest first) into time-aligned OHLC bars of mid prices
pub fn build_bars(ticks: &[Tick], bar_secs: i64) -> Vec<Bar> {
    let bar_secs = bar_secs.max(1);
    let mut bars: Vec<Bar> = Vec::new();
    let mut current_bucket: Option<i64> = None;

    for tick in ticks {
        let bucket = tick.timestamp.timestamp().div_euclid(bar_secs);
        let price = tick.mid();
        if current_bucket == Some(bucket) {
            if let Some(bar) = bars.last_mut() {
                bar.update(price);
                continue;
            }
        }

        let start = chrono::DateTime::<chrono::Utc>::from_timestamp(bucket * bar_secs, 0)
            .unwrap_or(tick.timestamp);
        bars.push(Bar::from_price(start, price));
        current_bucket = Some(bucket);
    }

    bars
}

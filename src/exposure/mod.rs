// Confirmed exposure per symbol
use crate::models::{Position, Side};
use serde::Serialize;
use std::collections::BTreeMap;

/// Aggregate view of confirmed positions on one symbol
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ExposureSnapshot {
    pub symbol: String,
    pub long_size: f64,
    pub short_size: f64,
    pub avg_long_price: f64,  // volume-weighted, 0 when flat
    pub avg_short_price: f64, // volume-weighted, 0 when flat
    pub long_count: usize,
    pub short_count: usize,
}

impl ExposureSnapshot {
    pub fn from_positions<'a>(symbol: &str, positions: impl IntoIterator<Item = &'a Position>) -> Self {
        let mut snap = ExposureSnapshot {
            symbol: symbol.to_string(),
            ..Default::default()
        };
        let mut long_notional = 0.0;
        let mut short_notional = 0.0;

        for pos in positions.into_iter().filter(|p| p.symbol == symbol) {
            match pos.side {
                Side::Long => {
                    snap.long_size += pos.volume;
                    snap.long_count += 1;
                    long_notional += pos.volume * pos.open_price;
                }
                Side::Short => {
                    snap.short_size += pos.volume;
                    snap.short_count += 1;
                    short_notional += pos.volume * pos.open_price;
                }
            }
        }

        if snap.long_size > 0.0 {
            snap.avg_long_price = long_notional / snap.long_size;
        }
        if snap.short_size > 0.0 {
            snap.avg_short_price = short_notional / snap.short_size;
        }
        snap
    }

    pub fn position_count(&self) -> usize {
        self.long_count + self.short_count
    }

    pub fn is_flat(&self) -> bool {
        self.position_count() == 0
    }

    pub fn size(&self, side: Side) -> f64 {
        match side {
            Side::Long => self.long_size,
            Side::Short => self.short_size,
        }
    }
}

/// Confirmed position mirror for one symbol, with its exposure recomputed
/// eagerly on every change.
///
/// Only confirmed broker state goes in here: a full position sync, a filled
/// open, or an acknowledged close. Submitted orders never touch it.
#[derive(Debug, Clone)]
pub struct ExposureCache {
    symbol: String,
    positions: BTreeMap<u64, Position>,
    snapshot: ExposureSnapshot,
}

impl ExposureCache {
    pub fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            positions: BTreeMap::new(),
            snapshot: ExposureSnapshot::from_positions(symbol, std::iter::empty()),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn snapshot(&self) -> &ExposureSnapshot {
        &self.snapshot
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn position(&self, ticket: u64) -> Option<&Position> {
        self.positions.get(&ticket)
    }

    /// Replace the mirror with the broker's authoritative set
    pub fn rebuild(&mut self, positions: &[Position]) {
        self.positions = positions
            .iter()
            .filter(|p| p.symbol == self.symbol)
            .map(|p| (p.ticket, p.clone()))
            .collect();
        self.recompute();
    }

    /// Record a confirmed fill
    pub fn apply_fill(&mut self, position: Position) {
        if position.symbol != self.symbol {
            tracing::warn!(
                symbol = %self.symbol,
                other = %position.symbol,
                ticket = position.ticket,
                "Ignoring fill for a different symbol"
            );
            return;
        }
        self.positions.insert(position.ticket, position);
        self.recompute();
    }

    /// Record an acknowledged close. Returns the removed position.
    pub fn apply_close(&mut self, ticket: u64) -> Option<Position> {
        let removed = self.positions.remove(&ticket);
        if removed.is_some() {
            self.recompute();
        }
        removed
    }

    /// Record an acknowledged stop change
    pub fn apply_stop(&mut self, ticket: u64, stop: f64) {
        if let Some(pos) = self.positions.get_mut(&ticket) {
            pos.current_sl = Some(stop);
        }
    }

    fn recompute(&mut self) {
        self.snapshot = ExposureSnapshot::from_positions(&self.symbol, self.positions.values());
    }
}

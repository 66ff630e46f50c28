// Volatility-driven trailing stop
use crate::config::SymbolConfig;
use crate::models::{Position, Side, Tick};
use serde::Serialize;
use std::collections::HashMap;

/// Last confirmed stop per ticket. Long stops only rise, short stops only fall.
#[derive(Debug, Clone, Default)]
pub struct TrailingState {
    confirmed: HashMap<u64, (Side, f64)>,
}

impl TrailingState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_confirmed(&self, ticket: u64) -> Option<f64> {
        self.confirmed.get(&ticket).map(|(_, stop)| *stop)
    }

    /// Record a stop the broker acknowledged. A less protective value is ignored.
    pub fn confirm(&mut self, ticket: u64, side: Side, stop: f64) {
        match self.confirmed.get(&ticket) {
            Some((_, prev)) if !is_improvement(side, Some(*prev), stop) => {}
            _ => {
                self.confirmed.insert(ticket, (side, stop));
            }
        }
    }

    pub fn forget(&mut self, ticket: u64) {
        self.confirmed.remove(&ticket);
    }

    /// Drop tickets that are no longer open
    pub fn retain(&mut self, open_tickets: &[u64]) {
        self.confirmed.retain(|ticket, _| open_tickets.contains(ticket));
    }
}

/// True if `new` is strictly more protective than `current`
pub fn is_improvement(side: Side, current: Option<f64>, new: f64) -> bool {
    match current {
        None => true,
        Some(current) => match side {
            Side::Long => new > current,
            Side::Short => new < current,
        },
    }
}

/// Output of one trailing evaluation
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StopRecommendation {
    /// Recommended stop; `None` only when the position has no stop and trailing did not trigger
    pub stop: Option<f64>,
    pub triggered: bool,
    pub profit_pct: f64,
    pub atr_effective: f64,
}

/// Computes a non-regressing stop from ATR and profit state
#[derive(Debug, Clone, Copy)]
pub struct TrailingStopEngine {
    pub atr_multiplier: f64,
    pub break_even_offset: f64,
    pub trailing_profit_threshold: f64,
    pub min_atr_pct: f64,
}

impl TrailingStopEngine {
    pub fn from_config(config: &SymbolConfig) -> Self {
        Self {
            atr_multiplier: config.atr_multiplier,
            break_even_offset: config.break_even_offset,
            trailing_profit_threshold: config.trailing_profit_threshold,
            min_atr_pct: config.min_atr_pct,
        }
    }

    /// ATR with the price-relative floor applied
    pub fn effective_atr(&self, atr: f64, price: f64) -> f64 {
        let floor = self.min_atr_pct * price;
        if atr.is_finite() {
            atr.max(floor)
        } else {
            floor
        }
    }

    /// Recommend a stop for `position` at `tick`.
    ///
    /// The result is clamped against both the position's current stop and the
    /// last confirmed stop, so it never regresses.
    pub fn recommend(
        &self,
        position: &Position,
        tick: &Tick,
        atr: f64,
        state: &TrailingState,
    ) -> StopRecommendation {
        let price_now = tick.exit_price(position.side);
        let profit_pct = position.profit_pct(tick);
        let atr_effective = self.effective_atr(atr, price_now);

        let current = most_protective(
            position.side,
            position.current_sl,
            state.last_confirmed(position.ticket),
        );

        if profit_pct < self.trailing_profit_threshold {
            return StopRecommendation {
                stop: current,
                triggered: false,
                profit_pct,
                atr_effective,
            };
        }

        let stop = match position.side {
            Side::Long => {
                let candidate = price_now - atr_effective * self.atr_multiplier;
                let breakeven = position.open_price + atr_effective * self.break_even_offset;
                let best = candidate.max(breakeven);
                current.map_or(best, |sl| best.max(sl))
            }
            Side::Short => {
                let candidate = price_now + atr_effective * self.atr_multiplier;
                let breakeven = position.open_price - atr_effective * self.break_even_offset;
                let best = candidate.min(breakeven);
                current.map_or(best, |sl| best.min(sl))
            }
        };

        StopRecommendation {
            stop: Some(stop),
            triggered: true,
            profit_pct,
            atr_effective,
        }
    }
}

fn most_protective(side: Side, a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(match side {
            Side::Long => a.max(b),
            Side::Short => a.min(b),
        }),
        (a, b) => a.or(b),
    }
}

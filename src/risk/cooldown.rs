use super::limits::{Clearance, Denial};
use crate::config::{CooldownScope, SymbolConfig};
use crate::models::{Position, Side};
use chrono::{DateTime, Duration, Utc};

/// Time-based throttle for one symbol.
///
/// `last_open` only moves forward and only from confirmed fills or the
/// confirmed position set. Also tracks the flat transition used by the
/// liquidation-cycle cooldown.
#[derive(Debug, Clone)]
pub struct CooldownState {
    pub symbol: String,
    last_long_open: Option<DateTime<Utc>>,
    last_short_open: Option<DateTime<Utc>>,
    flat_since: Option<DateTime<Utc>>,
    was_flat: bool,
}

impl CooldownState {
    pub fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            last_long_open: None,
            last_short_open: None,
            flat_since: None,
            was_flat: true,
        }
    }

    pub fn last_open(&self, side: Side) -> Option<DateTime<Utc>> {
        match side {
            Side::Long => self.last_long_open,
            Side::Short => self.last_short_open,
        }
    }

    /// Record a confirmed open
    pub fn record_open(&mut self, side: Side, at: DateTime<Utc>) {
        let slot = match side {
            Side::Long => &mut self.last_long_open,
            Side::Short => &mut self.last_short_open,
        };
        if slot.map_or(true, |prev| at > prev) {
            *slot = Some(at);
        }
    }

    /// Fold the latest confirmed open time per side into the state
    pub fn reconcile(&mut self, positions: &[Position]) {
        let opens: Vec<(Side, DateTime<Utc>)> = positions
            .iter()
            .filter(|p| p.symbol == self.symbol)
            .map(|p| (p.side, p.open_time))
            .collect();

        for (side, at) in opens {
            self.record_open(side, at);
        }
    }

    /// Track the flat/non-flat transition. Going flat starts the liquidation cycle.
    pub fn observe_exposure(&mut self, is_flat: bool, at: DateTime<Utc>) {
        if is_flat && !self.was_flat {
            self.flat_since = Some(at);
        }
        self.was_flat = is_flat;
    }

    /// Cooldown check for one direction at `now`
    pub fn check(&self, side: Side, now: DateTime<Utc>, config: &SymbolConfig) -> Result<(), Denial> {
        if config.liquidation_cycle_seconds > 0 {
            if let Some(flat_since) = self.flat_since {
                let remaining = remaining(flat_since, now, config.liquidation_cycle_seconds);
                if remaining > 0 {
                    return Err(Denial::LiquidationCycle {
                        remaining_secs: remaining,
                    });
                }
            }
        }

        let last = match config.cooldown_scope {
            CooldownScope::PerDirection => self.last_open(side),
            CooldownScope::PerSymbol => self.last_long_open.max(self.last_short_open),
        };

        if let Some(last) = last {
            let remaining = remaining(last, now, config.cooldown_seconds);
            if remaining > 0 {
                return Err(Denial::Cooldown {
                    remaining_secs: remaining,
                });
            }
        }

        Ok(())
    }

    pub fn clearance(&self, now: DateTime<Utc>, config: &SymbolConfig) -> Clearance {
        Clearance {
            allow_buy: self.check(Side::Long, now, config).is_ok(),
            allow_sell: self.check(Side::Short, now, config).is_ok(),
        }
    }
}

/// Whole seconds left in a window of `window_secs` starting at `since`, rounded up.
///
/// A window too large for chrono never elapses.
fn remaining(since: DateTime<Utc>, now: DateTime<Utc>, window_secs: u64) -> i64 {
    let Some(window) = i64::try_from(window_secs).ok().and_then(Duration::try_seconds) else {
        return i64::MAX;
    };
    let Some(left) = window.checked_sub(&(now - since)) else {
        return i64::MAX;
    };
    if left <= Duration::zero() {
        0
    } else {
        let millis = left.num_milliseconds();
        millis.saturating_add(999) / 1000
    }
}

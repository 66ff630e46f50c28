use super::cooldown::CooldownState;
use super::limits::{check_limit, Clearance, Denial};
use crate::config::SymbolConfig;
use crate::exposure::ExposureSnapshot;
use crate::models::Side;
use chrono::{DateTime, Utc};

/// Combined limit + cooldown clearance for one symbol
pub struct RiskGate<'a> {
    pub config: &'a SymbolConfig,
    pub exposure: &'a ExposureSnapshot,
    pub cooldown: &'a CooldownState,
}

impl<'a> RiskGate<'a> {
    pub fn new(
        config: &'a SymbolConfig,
        exposure: &'a ExposureSnapshot,
        cooldown: &'a CooldownState,
    ) -> Self {
        Self {
            config,
            exposure,
            cooldown,
        }
    }

    /// Limits first, then cooldown. The first denial wins.
    pub fn check(&self, side: Side, now: DateTime<Utc>) -> Result<(), Denial> {
        check_limit(side, self.exposure, self.config)?;
        self.cooldown.check(side, now, self.config)
    }

    pub fn clearance(&self, now: DateTime<Utc>) -> Clearance {
        Clearance {
            allow_buy: self.check(Side::Long, now).is_ok(),
            allow_sell: self.check(Side::Short, now).is_ok(),
        }
    }
}

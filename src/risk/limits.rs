use crate::config::SymbolConfig;
use crate::exposure::ExposureSnapshot;
use crate::models::Side;
use serde::Serialize;

// Lot sizes are decimal; sums drift
const SIZE_EPSILON: f64 = 1e-9;

/// Per-direction permission to open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Clearance {
    pub allow_buy: bool,
    pub allow_sell: bool,
}

impl Clearance {
    pub fn allows(&self, side: Side) -> bool {
        match side {
            Side::Long => self.allow_buy,
            Side::Short => self.allow_sell,
        }
    }
}

/// Why an open was blocked. Flow control, not an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Denial {
    MaxLong { size: f64, max: f64 },
    MaxShort { size: f64, max: f64 },
    MaxOrders { count: usize, max: usize },
    Cooldown { remaining_secs: i64 },
    LiquidationCycle { remaining_secs: i64 },
}

impl std::fmt::Display for Denial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Denial::MaxLong { size, max } => write!(f, "long size {} at limit {}", size, max),
            Denial::MaxShort { size, max } => write!(f, "short size {} at limit {}", size, max),
            Denial::MaxOrders { count, max } => write!(f, "{} open positions, max {}", count, max),
            Denial::Cooldown { remaining_secs } => write!(f, "cooldown, {}s remaining", remaining_secs),
            Denial::LiquidationCycle { remaining_secs } => {
                write!(f, "liquidation cycle, {}s remaining", remaining_secs)
            }
        }
    }
}

/// Position-count and size bounds for one direction. Pure function of the
/// confirmed exposure and the config.
pub fn check_limit(side: Side, exposure: &ExposureSnapshot, config: &SymbolConfig) -> Result<(), Denial> {
    let count = exposure.position_count();
    if count >= config.max_orders {
        return Err(Denial::MaxOrders {
            count,
            max: config.max_orders,
        });
    }

    let size = exposure.size(side);
    let max = match side {
        Side::Long => config.max_long,
        Side::Short => config.max_short,
    };
    if size + config.lot_size > max + SIZE_EPSILON {
        return Err(match side {
            Side::Long => Denial::MaxLong { size, max },
            Side::Short => Denial::MaxShort { size, max },
        });
    }

    Ok(())
}

/// Limit clearance for both directions
pub fn limit_clearance(exposure: &ExposureSnapshot, config: &SymbolConfig) -> Clearance {
    Clearance {
        allow_buy: check_limit(Side::Long, exposure, config).is_ok(),
        allow_sell: check_limit(Side::Short, exposure, config).is_ok(),
    }
}

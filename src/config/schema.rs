use serde::{Deserialize, Serialize};

/// Upper bound for any configured waiting period: 10 years
pub const MAX_WINDOW_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Directional preference for a symbol
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Bias {
    #[default]
    None,
    Long,
    Short,
}

/// Whether the cooldown timer is kept per direction or shared by both
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CooldownScope {
    #[default]
    PerDirection,
    PerSymbol,
}

/// Fully resolved rule set for one symbol
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SymbolConfig {
    pub max_long: f64,
    pub max_short: f64,
    pub max_orders: usize,
    pub lot_size: f64,
    pub cooldown_seconds: u64,
    pub atr_multiplier: f64,
    pub break_even_offset: f64,
    pub trailing_profit_threshold: f64,
    pub abort_loss_threshold: f64,
    pub close_profit_threshold: f64,
    pub bias: Bias,
    pub min_atr_pct: f64,
    pub default_volatility: f64,
    pub take_profit_ratio: f64,
    pub close_profit_dollar_threshold: Option<f64>,
    pub contract_size: f64,
    pub min_votes: usize,
    pub max_spread_atr_ratio: f64,
    pub invert_signals: bool,
    pub pause_open: bool,
    pub liquidation_cycle_seconds: u64,
    pub cooldown_scope: CooldownScope,
}

impl Default for SymbolConfig {
    fn default() -> Self {
        Self {
            max_long: 1.0,
            max_short: 1.0,
            max_orders: 100,
            lot_size: 0.01,
            cooldown_seconds: 120,
            atr_multiplier: 2.0,
            break_even_offset: 0.1,
            trailing_profit_threshold: 0.0012,
            abort_loss_threshold: -0.0015, // -0.15%
            close_profit_threshold: 0.0555, // +5.55%
            bias: Bias::None,
            min_atr_pct: 0.0005,
            default_volatility: 0.03,
            take_profit_ratio: 2.0,
            close_profit_dollar_threshold: None,
            contract_size: 1.0,
            min_votes: 1,
            max_spread_atr_ratio: 1.0,
            invert_signals: false,
            pause_open: false,
            liquidation_cycle_seconds: 0,
            cooldown_scope: CooldownScope::PerDirection,
        }
    }
}

/// Partial rule set: only the keys present replace the base values
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SymbolOverride {
    pub max_long: Option<f64>,
    pub max_short: Option<f64>,
    pub max_orders: Option<usize>,
    pub lot_size: Option<f64>,
    pub cooldown_seconds: Option<u64>,
    pub atr_multiplier: Option<f64>,
    pub break_even_offset: Option<f64>,
    pub trailing_profit_threshold: Option<f64>,
    pub abort_loss_threshold: Option<f64>,
    pub close_profit_threshold: Option<f64>,
    pub bias: Option<Bias>,
    pub min_atr_pct: Option<f64>,
    pub default_volatility: Option<f64>,
    pub take_profit_ratio: Option<f64>,
    pub close_profit_dollar_threshold: Option<f64>,
    pub contract_size: Option<f64>,
    pub min_votes: Option<usize>,
    pub max_spread_atr_ratio: Option<f64>,
    pub invert_signals: Option<bool>,
    pub pause_open: Option<bool>,
    pub liquidation_cycle_seconds: Option<u64>,
    pub cooldown_scope: Option<CooldownScope>,
}

/// Merge `over` on top of `base`. Keys absent from the override are inherited.
pub fn merge(base: &SymbolConfig, over: &SymbolOverride) -> SymbolConfig {
    SymbolConfig {
        max_long: over.max_long.unwrap_or(base.max_long),
        max_short: over.max_short.unwrap_or(base.max_short),
        max_orders: over.max_orders.unwrap_or(base.max_orders),
        lot_size: over.lot_size.unwrap_or(base.lot_size),
        cooldown_seconds: over.cooldown_seconds.unwrap_or(base.cooldown_seconds),
        atr_multiplier: over.atr_multiplier.unwrap_or(base.atr_multiplier),
        break_even_offset: over.break_even_offset.unwrap_or(base.break_even_offset),
        trailing_profit_threshold: over
            .trailing_profit_threshold
            .unwrap_or(base.trailing_profit_threshold),
        abort_loss_threshold: over.abort_loss_threshold.unwrap_or(base.abort_loss_threshold),
        close_profit_threshold: over
            .close_profit_threshold
            .unwrap_or(base.close_profit_threshold),
        bias: over.bias.unwrap_or(base.bias),
        min_atr_pct: over.min_atr_pct.unwrap_or(base.min_atr_pct),
        default_volatility: over.default_volatility.unwrap_or(base.default_volatility),
        take_profit_ratio: over.take_profit_ratio.unwrap_or(base.take_profit_ratio),
        close_profit_dollar_threshold: over
            .close_profit_dollar_threshold
            .or(base.close_profit_dollar_threshold),
        contract_size: over.contract_size.unwrap_or(base.contract_size),
        min_votes: over.min_votes.unwrap_or(base.min_votes),
        max_spread_atr_ratio: over.max_spread_atr_ratio.unwrap_or(base.max_spread_atr_ratio),
        invert_signals: over.invert_signals.unwrap_or(base.invert_signals),
        pause_open: over.pause_open.unwrap_or(base.pause_open),
        liquidation_cycle_seconds: over
            .liquidation_cycle_seconds
            .unwrap_or(base.liquidation_cycle_seconds),
        cooldown_scope: over.cooldown_scope.unwrap_or(base.cooldown_scope),
    }
}

impl SymbolConfig {
    /// Check every field against the schema. Returns the first violation found.
    pub fn validate(&self) -> Result<(), String> {
        let finite = [
            ("max_long", self.max_long),
            ("max_short", self.max_short),
            ("lot_size", self.lot_size),
            ("atr_multiplier", self.atr_multiplier),
            ("break_even_offset", self.break_even_offset),
            ("trailing_profit_threshold", self.trailing_profit_threshold),
            ("abort_loss_threshold", self.abort_loss_threshold),
            ("close_profit_threshold", self.close_profit_threshold),
            ("min_atr_pct", self.min_atr_pct),
            ("default_volatility", self.default_volatility),
            ("take_profit_ratio", self.take_profit_ratio),
            ("contract_size", self.contract_size),
            ("max_spread_atr_ratio", self.max_spread_atr_ratio),
        ];
        if let Some((name, _)) = finite.iter().find(|(_, v)| !v.is_finite()) {
            return Err(format!("{} must be a finite number", name));
        }

        if self.max_long < 0.0 || self.max_short < 0.0 {
            return Err("max_long and max_short must be >= 0".to_string());
        }
        if self.max_orders == 0 {
            return Err("max_orders must be >= 1".to_string());
        }
        if self.lot_size <= 0.0 {
            return Err(format!("lot_size must be > 0 (got {})", self.lot_size));
        }
        if self.atr_multiplier <= 0.0 {
            return Err(format!(
                "atr_multiplier must be > 0 (got {})",
                self.atr_multiplier
            ));
        }
        if self.break_even_offset < 0.0 {
            return Err("break_even_offset must be >= 0".to_string());
        }
        if self.trailing_profit_threshold < 0.0 {
            return Err("trailing_profit_threshold must be >= 0".to_string());
        }
        if self.abort_loss_threshold >= 0.0 {
            return Err(format!(
                "abort_loss_threshold must be negative (got {})",
                self.abort_loss_threshold
            ));
        }
        if self.close_profit_threshold <= 0.0 {
            return Err("close_profit_threshold must be > 0".to_string());
        }
        if self.min_atr_pct < 0.0 {
            return Err("min_atr_pct must be >= 0".to_string());
        }
        if self.default_volatility <= 0.0 || self.default_volatility >= 1.0 {
            return Err(format!(
                "default_volatility must be in (0, 1) (got {})",
                self.default_volatility
            ));
        }
        if self.take_profit_ratio <= 0.0 {
            return Err("take_profit_ratio must be > 0".to_string());
        }
        if let Some(dollars) = self.close_profit_dollar_threshold {
            if !dollars.is_finite() || dollars <= 0.0 {
                return Err("close_profit_dollar_threshold must be > 0".to_string());
            }
        }
        if self.contract_size <= 0.0 {
            return Err("contract_size must be > 0".to_string());
        }
        if self.min_votes == 0 {
            return Err("min_votes must be >= 1".to_string());
        }
        if self.max_spread_atr_ratio <= 0.0 {
            return Err("max_spread_atr_ratio must be > 0".to_string());
        }
        if self.cooldown_seconds > MAX_WINDOW_SECS {
            return Err(format!(
                "cooldown_seconds must be <= {} (got {})",
                MAX_WINDOW_SECS, self.cooldown_seconds
            ));
        }
        if self.liquidation_cycle_seconds > MAX_WINDOW_SECS {
            return Err(format!(
                "liquidation_cycle_seconds must be <= {} (got {})",
                MAX_WINDOW_SECS, self.liquidation_cycle_seconds
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(SymbolConfig::default().validate().is_ok());
    }

    #[test]
    fn test_override_replaces_only_specified_keys() {
        let base = SymbolConfig::default();
        let over = SymbolOverride {
            max_long: Some(0.05),
            cooldown_seconds: Some(300),
            ..Default::default()
        };

        let merged = merge(&base, &over);

        assert_eq!(merged.max_long, 0.05);
        assert_eq!(merged.cooldown_seconds, 300);
        assert_eq!(merged.max_short, base.max_short);
        assert_eq!(merged.atr_multiplier, base.atr_multiplier);
        assert_eq!(merged.bias, Bias::None);
    }

    #[test]
    fn test_positive_abort_threshold_rejected() {
        let config = SymbolConfig {
            abort_loss_threshold: 0.01,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.contains("abort_loss_threshold"));
    }

    #[test]
    fn test_nan_field_rejected() {
        let config = SymbolConfig {
            atr_multiplier: f64::NAN,
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().contains("atr_multiplier"));
    }

    #[test]
    fn test_oversized_windows_rejected() {
        let cooldown = SymbolConfig {
            cooldown_seconds: 10_000_000_000_000_000,
            ..Default::default()
        };
        assert!(cooldown.validate().unwrap_err().contains("cooldown_seconds"));

        let cycle = SymbolConfig {
            liquidation_cycle_seconds: MAX_WINDOW_SECS + 1,
            ..Default::default()
        };
        assert!(cycle
            .validate()
            .unwrap_err()
            .contains("liquidation_cycle_seconds"));

        let edge = SymbolConfig {
            cooldown_seconds: MAX_WINDOW_SECS,
            ..Default::default()
        };
        assert!(edge.validate().is_ok());
    }

    #[test]
    fn test_zero_lot_size_rejected() {
        let config = SymbolConfig {
            lot_size: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_override_key_fails_to_parse() {
        let parsed: Result<SymbolOverride, _> =
            serde_json::from_str(r#"{"max_long": 1.0, "max_lnog": 2.0}"#);
        assert!(parsed.is_err());
    }
}

// Pure per-tick decision rules. No I/O, no locks.
use crate::config::{Bias, SymbolConfig};
use crate::exposure::ExposureSnapshot;
use crate::models::{OrderRequest, Position, Side, SignalDirection, Tick};
use crate::risk::{CooldownState, Denial, RiskGate};
use crate::trailing::{is_improvement, TrailingState, TrailingStopEngine};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    ProfitTarget,
    DollarTarget,
    Signal,
}

impl CloseReason {
    pub fn as_str(self) -> &'static str {
        match self {
            CloseReason::ProfitTarget => "profit_target",
            CloseReason::DollarTarget => "dollar_target",
            CloseReason::Signal => "close_signal",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Open { request: OrderRequest },
    InitialSl { ticket: u64, stop: f64 },
    ModifySl { ticket: u64, stop: f64 },
    Close { ticket: u64, reason: CloseReason },
    Abort { ticket: u64, loss_pct: f64 },
    Skip,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Open { .. } => "OPEN",
            Action::InitialSl { .. } => "INITIAL_SL",
            Action::ModifySl { .. } => "MODIFY_SL",
            Action::Close { .. } => "CLOSE",
            Action::Abort { .. } => "ABORT",
            Action::Skip => "SKIP",
        }
    }

    pub fn ticket(&self) -> Option<u64> {
        match self {
            Action::InitialSl { ticket, .. }
            | Action::ModifySl { ticket, .. }
            | Action::Close { ticket, .. }
            | Action::Abort { ticket, .. } => Some(*ticket),
            Action::Open { .. } | Action::Skip => None,
        }
    }

    pub fn is_exit(&self) -> bool {
        matches!(self, Action::Close { .. } | Action::Abort { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub action: Action,
    pub reason: String,
}

impl Decision {
    fn skip(reason: impl Into<String>) -> Self {
        Self {
            action: Action::Skip,
            reason: reason.into(),
        }
    }
}

/// Abort and close checks for one position, abort first.
///
/// Abort ignores the signal and every other gate.
pub fn evaluate_exit(
    position: &Position,
    tick: &Tick,
    config: &SymbolConfig,
    signal: SignalDirection,
) -> Option<Decision> {
    let profit_pct = position.profit_pct(tick);

    if profit_pct <= config.abort_loss_threshold {
        return Some(Decision {
            action: Action::Abort {
                ticket: position.ticket,
                loss_pct: profit_pct,
            },
            reason: format!(
                "loss {:.4}% at or beyond abort threshold {:.4}%",
                profit_pct * 100.0,
                config.abort_loss_threshold * 100.0
            ),
        });
    }

    if profit_pct >= config.close_profit_threshold {
        return Some(Decision {
            action: Action::Close {
                ticket: position.ticket,
                reason: CloseReason::ProfitTarget,
            },
            reason: format!(
                "profit {:.4}% reached target {:.4}%",
                profit_pct * 100.0,
                config.close_profit_threshold * 100.0
            ),
        });
    }

    if let Some(target) = config.close_profit_dollar_threshold {
        let amount = position.profit_amount(tick, config.contract_size);
        if amount >= target {
            return Some(Decision {
                action: Action::Close {
                    ticket: position.ticket,
                    reason: CloseReason::DollarTarget,
                },
                reason: format!("profit {:.2} reached {:.2}", amount, target),
            });
        }
    }

    if signal == SignalDirection::Close {
        return Some(Decision {
            action: Action::Close {
                ticket: position.ticket,
                reason: CloseReason::Signal,
            },
            reason: "aggregated CLOSE signal".to_string(),
        });
    }

    None
}

/// Initial stop for positions without one, otherwise the trailing stop.
///
/// Returns `None` when nothing more protective is available. `atr` of `None`
/// skips trailing for this tick.
pub fn evaluate_manage(
    position: &Position,
    tick: &Tick,
    atr: Option<f64>,
    config: &SymbolConfig,
    trailing: &TrailingState,
) -> Option<Decision> {
    if position.current_sl.is_none() && trailing.last_confirmed(position.ticket).is_none() {
        let stop = match position.side {
            Side::Long => position.open_price * (1.0 - config.default_volatility),
            Side::Short => position.open_price * (1.0 + config.default_volatility),
        };
        return Some(Decision {
            action: Action::InitialSl {
                ticket: position.ticket,
                stop,
            },
            reason: format!(
                "no stop set, initial at {:.2}% from open",
                config.default_volatility * 100.0
            ),
        });
    }

    let atr = atr?;
    let engine = TrailingStopEngine::from_config(config);
    let rec = engine.recommend(position, tick, atr, trailing);
    if !rec.triggered {
        return None;
    }

    let stop = rec.stop?;
    let current = match (position.current_sl, trailing.last_confirmed(position.ticket)) {
        (Some(a), Some(b)) => Some(match position.side {
            Side::Long => a.max(b),
            Side::Short => a.min(b),
        }),
        (a, b) => a.or(b),
    };
    if !is_improvement(position.side, current, stop) {
        return None;
    }

    Some(Decision {
        action: Action::ModifySl {
            ticket: position.ticket,
            stop,
        },
        reason: format!(
            "trailing at profit {:.4}%, atr {:.6}",
            rec.profit_pct * 100.0,
            rec.atr_effective
        ),
    })
}

/// Inputs for the open step
pub struct OpenContext<'a> {
    pub symbol: &'a str,
    pub tick: &'a Tick,
    pub atr: Option<f64>,
    pub signal: SignalDirection,
    pub config: &'a SymbolConfig,
    pub tradable: bool,
    pub exposure: &'a ExposureSnapshot,
    pub positions: &'a [Position],
    pub cooldown: &'a CooldownState,
}

/// Open step. `None` means there was no directional signal to act on.
pub fn evaluate_open(ctx: &OpenContext<'_>) -> Option<Decision> {
    let config = ctx.config;
    let direction = if config.invert_signals {
        ctx.signal.inverted()
    } else {
        ctx.signal
    };
    let side = direction.open_side()?;

    if !ctx.tradable {
        return Some(Decision::skip("symbol quarantined by config validation"));
    }
    if config.pause_open {
        return Some(Decision::skip("opens paused"));
    }
    match (config.bias, side) {
        (Bias::Long, Side::Short) => return Some(Decision::skip("long bias blocks SELL")),
        (Bias::Short, Side::Long) => return Some(Decision::skip("short bias blocks BUY")),
        _ => {}
    }

    let Some(atr) = ctx.atr else {
        return Some(Decision::skip("volatility unavailable"));
    };
    let atr_effective = TrailingStopEngine::from_config(config).effective_atr(atr, ctx.tick.mid());
    let max_spread = atr_effective * config.max_spread_atr_ratio;
    if ctx.tick.spread > max_spread {
        return Some(Decision::skip(format!(
            "spread {:.6} above {:.6}",
            ctx.tick.spread, max_spread
        )));
    }

    if ctx.positions.iter().any(|p| p.side == side.opposite()) {
        return Some(Decision::skip(format!(
            "{} position open",
            side.opposite().as_str()
        )));
    }

    let gate = RiskGate::new(config, ctx.exposure, ctx.cooldown);
    if let Err(denial) = gate.check(side, ctx.tick.timestamp) {
        return Some(Decision::skip(denial_reason(&denial)));
    }

    let price = ctx.tick.entry_price(side);
    let vol = config.default_volatility;
    let (stop_loss, take_profit) = match side {
        Side::Long => (
            price * (1.0 - vol),
            price * (1.0 + vol * config.take_profit_ratio),
        ),
        Side::Short => (
            price * (1.0 + vol),
            price * (1.0 - vol * config.take_profit_ratio),
        ),
    };

    Some(Decision {
        action: Action::Open {
            request: OrderRequest {
                symbol: ctx.symbol.to_string(),
                side,
                volume: config.lot_size,
                price,
                stop_loss,
                take_profit,
            },
        },
        reason: if config.invert_signals {
            format!("{:?} signal inverted", ctx.signal)
        } else {
            format!("{:?} signal", ctx.signal)
        },
    })
}

fn denial_reason(denial: &Denial) -> String {
    format!("risk gate: {}", denial)
}

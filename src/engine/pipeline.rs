use super::decision::{evaluate_exit, evaluate_manage, evaluate_open, Action, Decision, OpenContext};
use super::state::{EngineState, SymbolSlot, SymbolState};
use crate::config::{ConfigSnapshot, ConfigStore, SymbolConfig};
use crate::error::{EngineError, GatewayError};
use crate::execution::{GatewayClient, SubmitOutcome, TickBuffer};
use crate::feed::{PositionSource, TickSource, VolatilitySource};
use crate::journal::{DecisionJournal, DecisionRecord, InputSnapshot, PositionContext};
use crate::models::{FillStatus, Position, Tick};
use crate::signals::{AggregatedSignal, SignalAggregator};
use futures_util::future::join_all;
use std::sync::Arc;
use uuid::Uuid;

/// Collaborators the engine is wired to
pub struct EngineParts {
    pub config: Arc<ConfigStore>,
    pub ticks: Arc<dyn TickSource>,
    pub positions: Arc<dyn PositionSource>,
    pub volatility: Arc<dyn VolatilitySource>,
    pub signals: SignalAggregator,
    pub gateway: GatewayClient,
    pub journal: Arc<dyn DecisionJournal>,
    pub buffer: TickBuffer,
}

/// What happened to one symbol in one cycle
#[derive(Debug, Clone, PartialEq)]
pub enum SymbolOutcome {
    /// Quote unchanged since the last processed tick
    Duplicate,
    /// Previous pipeline for this symbol still running
    Busy,
    /// Gateway actions submitted, by name
    Processed { actions: Vec<&'static str> },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub config_version: u64,
    pub processed: usize,
    pub duplicates: usize,
    pub skipped: usize,
    pub failed: usize,
    pub actions: usize,
}

/// Per-symbol, per-tick orchestrator.
///
/// Each cycle reads exactly one config snapshot. Symbols run concurrently;
/// a failure in one never stops the others.
pub struct DecisionEngine {
    config: Arc<ConfigStore>,
    ticks: Arc<dyn TickSource>,
    positions: Arc<dyn PositionSource>,
    volatility: Arc<dyn VolatilitySource>,
    signals: SignalAggregator,
    gateway: GatewayClient,
    journal: Arc<dyn DecisionJournal>,
    buffer: TickBuffer,
    state: EngineState,
}

impl DecisionEngine {
    pub fn new(parts: EngineParts) -> Self {
        Self {
            config: parts.config,
            ticks: parts.ticks,
            positions: parts.positions,
            volatility: parts.volatility,
            signals: parts.signals,
            gateway: parts.gateway,
            journal: parts.journal,
            buffer: parts.buffer,
            state: EngineState::new(),
        }
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    /// Run every configured symbol once against a single snapshot
    pub async fn run_cycle(&self) -> CycleReport {
        let snapshot = self.config.snapshot();
        self.run_cycle_with(&snapshot).await
    }

    pub async fn run_cycle_with(&self, snapshot: &ConfigSnapshot) -> CycleReport {
        let symbols: Vec<String> = snapshot.symbols().map(str::to_string).collect();
        let results = join_all(
            symbols
                .iter()
                .map(|symbol| self.process_symbol(snapshot, symbol)),
        )
        .await;

        let mut report = CycleReport {
            config_version: snapshot.version,
            ..Default::default()
        };

        for (symbol, result) in symbols.iter().zip(results) {
            match result {
                Ok(SymbolOutcome::Processed { actions }) => {
                    report.processed += 1;
                    report.actions += actions.len();
                }
                Ok(SymbolOutcome::Duplicate) => report.duplicates += 1,
                Ok(SymbolOutcome::Busy) => report.skipped += 1,
                Err(e @ EngineError::DataUnavailable { .. }) => {
                    tracing::debug!(symbol = %symbol, error = %e, "Skipping symbol this cycle");
                    report.skipped += 1;
                }
                Err(e @ EngineError::ConfigInvalid { .. }) => {
                    tracing::warn!(symbol = %symbol, error = %e, "Symbol not tradable");
                    report.skipped += 1;
                }
                Err(e) => {
                    tracing::error!(symbol = %symbol, error = %e, "Symbol pipeline failed");
                    report.failed += 1;
                }
            }
        }

        report
    }

    /// Full pipeline for one symbol: dedupe, sync, abort, close, manage, open
    pub async fn process_symbol(
        &self,
        snapshot: &ConfigSnapshot,
        symbol: &str,
    ) -> Result<SymbolOutcome, EngineError> {
        let entry = snapshot.entry(symbol).ok_or_else(|| EngineError::ConfigInvalid {
            symbol: symbol.to_string(),
            reason: snapshot
                .excluded()
                .get(symbol)
                .cloned()
                .unwrap_or_else(|| "not configured".to_string()),
        })?;
        let config = Arc::clone(&entry.config);
        let tradable = entry.is_active();

        let slot = self.state.slot(symbol);
        let Some(claim) = slot.try_claim() else {
            return Ok(SymbolOutcome::Busy);
        };
        let slot = claim.slot();

        let tick = self
            .ticks
            .latest_tick(symbol)
            .await
            .map_err(|e| unavailable(symbol, format!("tick source: {}", e)))?
            .ok_or_else(|| unavailable(symbol, "no tick".to_string()))?;
        if !tick.is_valid() {
            return Err(unavailable(
                symbol,
                format!("invalid quote bid={} ask={}", tick.bid, tick.ask),
            ));
        }

        if slot.lock().is_duplicate(&tick) {
            return Ok(SymbolOutcome::Duplicate);
        }
        self.buffer.push(tick.clone());

        let positions = match self.positions.positions(symbol).await {
            Ok(positions) => positions,
            Err(e) => {
                slot.lock().forget_quote();
                return Err(unavailable(symbol, format!("position source: {}", e)));
            }
        };
        slot.lock().sync_positions(&positions, tick.timestamp);

        let window = self.buffer.window(symbol);
        let atr = self.volatility.atr(symbol);
        let signal = self.signals.evaluate(symbol, &window, config.min_votes);

        let planned = {
            let mut state = slot.lock();
            self.plan(snapshot, &tick, atr, &signal, &config, tradable, &mut state)
        };

        let mut actions = Vec::new();
        for (decision, record) in planned {
            self.journal.record(&record);
            if decision.action == Action::Skip {
                continue;
            }
            if slot.lock().in_flight {
                tracing::info!(
                    symbol = %symbol,
                    action = decision.action.name(),
                    "Outcome pending, holding further orders until next position sync"
                );
                break;
            }
            let settled = self.execute(symbol, &tick, &config, &decision, slot).await;
            actions.push(decision.action.name());
            if !settled {
                // Rejected or unconfirmed: evaluate again next cycle even on the same quote
                slot.lock().forget_quote();
            }
        }

        Ok(SymbolOutcome::Processed { actions })
    }

    /// Decide everything for this tick under the state lock
    #[allow(clippy::too_many_arguments)]
    fn plan(
        &self,
        snapshot: &ConfigSnapshot,
        tick: &Tick,
        atr: Option<f64>,
        signal: &AggregatedSignal,
        config: &SymbolConfig,
        tradable: bool,
        state: &mut SymbolState,
    ) -> Vec<(Decision, DecisionRecord)> {
        let positions: Vec<Position> = state.exposure.positions().cloned().collect();
        let mut decisions = Vec::new();
        let mut exiting = false;

        for pos in &positions {
            state.journal.track(pos.ticket, pos.profit_pct(tick));

            if let Some(decision) = evaluate_exit(pos, tick, config, signal.direction) {
                exiting |= decision.action.is_exit();
                decisions.push(decision);
                continue;
            }
            if let Some(decision) = evaluate_manage(pos, tick, atr, config, &state.trailing) {
                decisions.push(decision);
            }
        }

        if !exiting && !state.in_flight {
            let ctx = OpenContext {
                symbol: &state.symbol,
                tick,
                atr,
                signal: signal.direction,
                config,
                tradable,
                exposure: state.exposure.snapshot(),
                positions: &positions,
                cooldown: &state.cooldown,
            };
            if let Some(decision) = evaluate_open(&ctx) {
                decisions.push(decision);
            }
        }

        // Aborts go out before anything else
        decisions.sort_by_key(|d| priority(&d.action));

        decisions
            .into_iter()
            .map(|decision| {
                let position = decision
                    .action
                    .ticket()
                    .and_then(|t| positions.iter().find(|p| p.ticket == t))
                    .map(|p| PositionContext {
                        ticket: p.ticket,
                        side: p.side,
                        open_price: p.open_price,
                        profit_pct: p.profit_pct(tick),
                        stop: p.current_sl,
                        peak_profit: state.journal.peak_profit(p.ticket),
                    });
                let record = DecisionRecord {
                    id: Uuid::new_v4(),
                    symbol: state.symbol.clone(),
                    timestamp: tick.timestamp,
                    action: decision.action.name().to_string(),
                    reason: decision.reason.clone(),
                    input_snapshot: InputSnapshot {
                        config_version: snapshot.version,
                        bid: tick.bid,
                        ask: tick.ask,
                        spread: tick.spread,
                        atr,
                        signal: Some(signal.direction),
                        exposure: Some(state.exposure.snapshot().clone()),
                        position,
                    },
                };
                (decision, record)
            })
            .collect()
    }

    /// Submit one action and fold the confirmed result into state.
    /// No state lock is held while waiting on the gateway.
    ///
    /// Returns false when the broker rejected the action or its outcome is unknown.
    async fn execute(
        &self,
        symbol: &str,
        tick: &Tick,
        config: &SymbolConfig,
        decision: &Decision,
        slot: &SymbolSlot,
    ) -> bool {
        match &decision.action {
            Action::Open { request } => match self.gateway.open(request).await {
                SubmitOutcome::Confirmed(fill) => {
                    let mut state = slot.lock();
                    match fill.status {
                        FillStatus::Filled => {
                            let position = Position {
                                ticket: fill.ticket,
                                symbol: symbol.to_string(),
                                side: request.side,
                                volume: request.volume,
                                open_price: fill.fill_price,
                                current_sl: Some(request.stop_loss),
                                take_profit: Some(request.take_profit),
                                open_time: tick.timestamp,
                            };
                            state.exposure.apply_fill(position);
                            state.cooldown.record_open(request.side, tick.timestamp);
                            state.cooldown.observe_exposure(false, tick.timestamp);
                            state
                                .trailing
                                .confirm(fill.ticket, request.side, request.stop_loss);
                            state.lifecycle.opened(fill.ticket);
                            state.journal.log_open(
                                fill.ticket,
                                symbol,
                                request.side,
                                request.volume,
                                fill.fill_price,
                                tick.timestamp,
                                Vec::new(),
                                &decision.reason,
                            );
                        }
                        FillStatus::Placed => {
                            tracing::info!(symbol = %symbol, ticket = fill.ticket, "Order placed, waiting for fill");
                            state.in_flight = true;
                        }
                    }
                    true
                }
                SubmitOutcome::Rejected(e) => {
                    log_rejection(symbol, e);
                    false
                }
                SubmitOutcome::Unknown => {
                    slot.lock().in_flight = true;
                    false
                }
            },

            Action::InitialSl { ticket, stop } | Action::ModifySl { ticket, stop } => {
                let Some(side) = slot.lock().exposure.position(*ticket).map(|p| p.side) else {
                    return true;
                };
                match self.gateway.modify_sl(symbol, *ticket, *stop).await {
                    SubmitOutcome::Confirmed(()) => {
                        let mut state = slot.lock();
                        state.exposure.apply_stop(*ticket, *stop);
                        state.trailing.confirm(*ticket, side, *stop);
                        state.lifecycle.managed(*ticket);
                        true
                    }
                    SubmitOutcome::Rejected(e) => {
                        log_rejection(symbol, e);
                        false
                    }
                    SubmitOutcome::Unknown => {
                        slot.lock().in_flight = true;
                        false
                    }
                }
            }

            Action::Close { ticket, reason } => {
                slot.lock().lifecycle.begin_close(*ticket);
                match self.gateway.close(symbol, *ticket).await {
                    SubmitOutcome::Confirmed(()) => {
                        self.finish_exit(slot, *ticket, tick, config, reason.as_str(), false);
                        true
                    }
                    SubmitOutcome::Rejected(e) => {
                        slot.lock().lifecycle.close_failed(*ticket);
                        log_rejection(symbol, e);
                        false
                    }
                    SubmitOutcome::Unknown => {
                        slot.lock().in_flight = true;
                        false
                    }
                }
            }

            Action::Abort { ticket, loss_pct } => {
                tracing::warn!(
                    symbol = %symbol,
                    ticket,
                    loss_pct = loss_pct * 100.0,
                    threshold_pct = config.abort_loss_threshold * 100.0,
                    "Abort threshold hit, forcing close"
                );
                match self.gateway.close(symbol, *ticket).await {
                    SubmitOutcome::Confirmed(()) => {
                        self.finish_exit(slot, *ticket, tick, config, "abort", true);
                        true
                    }
                    SubmitOutcome::Rejected(e) => {
                        tracing::error!(symbol = %symbol, ticket, error = %e, "Abort close rejected, retrying next cycle");
                        false
                    }
                    SubmitOutcome::Unknown => {
                        let mut state = slot.lock();
                        state.lifecycle.abort_pending(*ticket);
                        state.in_flight = true;
                        false
                    }
                }
            }

            Action::Skip => true,
        }
    }

    fn finish_exit(
        &self,
        slot: &SymbolSlot,
        ticket: u64,
        tick: &Tick,
        config: &SymbolConfig,
        reason: &str,
        aborted: bool,
    ) {
        let mut state = slot.lock();
        let removed = state.exposure.apply_close(ticket);
        state.trailing.forget(ticket);
        if aborted {
            state.lifecycle.aborted(ticket);
        } else {
            state.lifecycle.closed(ticket);
        }
        if let Some(pos) = removed {
            let final_profit = pos.profit_amount(tick, config.contract_size);
            state.journal.log_close(ticket, reason, final_profit, tick.timestamp);
        }
        let flat = state.exposure.snapshot().is_flat();
        state.cooldown.observe_exposure(flat, tick.timestamp);
    }
}

fn priority(action: &Action) -> u8 {
    match action {
        Action::Abort { .. } => 0,
        Action::Close { .. } => 1,
        Action::InitialSl { .. } | Action::ModifySl { .. } => 2,
        Action::Open { .. } => 3,
        Action::Skip => 4,
    }
}

fn unavailable(symbol: &str, what: String) -> EngineError {
    EngineError::DataUnavailable {
        symbol: symbol.to_string(),
        what,
    }
}

fn log_rejection(symbol: &str, source: GatewayError) {
    let err = EngineError::OrderRejected {
        symbol: symbol.to_string(),
        source,
    };
    tracing::warn!(error = %err, "Order not executed, state unchanged");
}

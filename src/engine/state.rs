use super::lifecycle::Lifecycle;
use crate::exposure::ExposureCache;
use crate::journal::PositionJournal;
use crate::models::{Position, Tick};
use crate::risk::CooldownState;
use crate::trailing::TrailingState;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Everything the engine remembers about one symbol between ticks
#[derive(Debug)]
pub struct SymbolState {
    pub symbol: String,
    /// Last processed (bid, ask), for dedupe
    pub last_quote: Option<(f64, f64)>,
    pub exposure: ExposureCache,
    pub cooldown: CooldownState,
    pub trailing: TrailingState,
    pub lifecycle: Lifecycle,
    pub journal: PositionJournal,
    /// Set when a submission's outcome is unknown; cleared by the next position sync
    pub in_flight: bool,
}

impl SymbolState {
    pub fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            last_quote: None,
            exposure: ExposureCache::new(symbol),
            cooldown: CooldownState::new(symbol),
            trailing: TrailingState::new(),
            lifecycle: Lifecycle::new(),
            journal: PositionJournal::new(),
            in_flight: false,
        }
    }

    /// True if this tick's quote equals the last processed one. Records it otherwise.
    pub fn is_duplicate(&mut self, tick: &Tick) -> bool {
        let quote = (tick.bid, tick.ask);
        if self.last_quote == Some(quote) {
            return true;
        }
        self.last_quote = Some(quote);
        false
    }

    /// Make the next tick eligible for evaluation even if its quote is unchanged
    pub fn forget_quote(&mut self) {
        self.last_quote = None;
    }

    /// Apply the broker's confirmed position set
    pub fn sync_positions(&mut self, positions: &[Position], now: chrono::DateTime<chrono::Utc>) {
        self.exposure.rebuild(positions);
        self.cooldown.reconcile(positions);
        self.cooldown
            .observe_exposure(self.exposure.snapshot().is_flat(), now);

        let tickets: Vec<u64> = self.exposure.positions().map(|p| p.ticket).collect();
        self.trailing.retain(&tickets);
        self.lifecycle.reconcile(&tickets);
        self.lifecycle.prune();
        self.journal.close_missing(&tickets, now);
        self.journal.prune_closed();

        if self.in_flight {
            tracing::info!(symbol = %self.symbol, "Position sync cleared in-flight flag");
        }
        self.in_flight = false;
    }
}

/// One symbol's state plus a flag that keeps its pipeline single-flight
#[derive(Debug)]
pub struct SymbolSlot {
    state: Mutex<SymbolState>,
    running: AtomicBool,
}

impl SymbolSlot {
    fn new(symbol: &str) -> Self {
        Self {
            state: Mutex::new(SymbolState::new(symbol)),
            running: AtomicBool::new(false),
        }
    }

    /// Short critical section. Never hold across an await.
    pub fn lock(&self) -> MutexGuard<'_, SymbolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim the pipeline for this symbol. `None` if it is already running.
    pub fn try_claim(self: &Arc<Self>) -> Option<PipelineClaim> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| PipelineClaim {
                slot: Arc::clone(self),
            })
    }
}

/// Releases the pipeline claim on drop
pub struct PipelineClaim {
    slot: Arc<SymbolSlot>,
}

impl PipelineClaim {
    pub fn slot(&self) -> &SymbolSlot {
        &self.slot
    }
}

impl Drop for PipelineClaim {
    fn drop(&mut self) {
        self.slot.running.store(false, Ordering::Release);
    }
}

/// Explicit engine state threaded through the pipeline
#[derive(Debug, Default)]
pub struct EngineState {
    symbols: Mutex<HashMap<String, Arc<SymbolSlot>>>,
}

impl EngineState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slot(&self, symbol: &str) -> Arc<SymbolSlot> {
        let mut symbols = self.symbols.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            symbols
                .entry(symbol.to_string())
                .or_insert_with(|| Arc::new(SymbolSlot::new(symbol))),
        )
    }

    pub fn symbols(&self) -> Vec<String> {
        let symbols = self.symbols.lock().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = symbols.keys().cloned().collect();
        names.sort();
        names
    }
}

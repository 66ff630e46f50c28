use crate::models::Side;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};

// Samples kept per ticket
const MAX_PROFIT_CHAIN: usize = 512;

/// Lifetime record of one trade
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TradeEntry {
    pub ticket: u64,
    pub symbol: String,
    pub side: Side,
    pub volume: f64,
    pub entry_price: f64,
    pub open_time: DateTime<Utc>,
    pub indicators: Vec<String>,
    pub rationale: String,
    pub profit_chain: VecDeque<f64>, // profit_pct per managed tick
    pub peak_profit: f64,
    pub closed: bool,
    pub close_time: Option<DateTime<Utc>>,
    pub close_reason: Option<String>,
    pub final_profit: Option<f64>,
}

/// Per-ticket profit history, kept in memory for the life of the process
#[derive(Debug, Clone, Default)]
pub struct PositionJournal {
    entries: HashMap<u64, TradeEntry>,
}

impl PositionJournal {
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(clippy::too_many_arguments)]
    pub fn log_open(
        &mut self,
        ticket: u64,
        symbol: &str,
        side: Side,
        volume: f64,
        entry_price: f64,
        open_time: DateTime<Utc>,
        indicators: Vec<String>,
        rationale: &str,
    ) {
        self.entries.insert(
            ticket,
            TradeEntry {
                ticket,
                symbol: symbol.to_string(),
                side,
                volume,
                entry_price,
                open_time,
                indicators,
                rationale: rationale.to_string(),
                profit_chain: VecDeque::new(),
                peak_profit: 0.0,
                closed: false,
                close_time: None,
                close_reason: None,
                final_profit: None,
            },
        );
        tracing::info!(ticket, symbol = %symbol, side = side.as_str(), "Trade opened");
    }

    /// Append a profit sample. Unknown tickets (opened before this process) are ignored.
    pub fn track(&mut self, ticket: u64, profit_pct: f64) -> Option<&TradeEntry> {
        let Some(entry) = self.entries.get_mut(&ticket) else {
            tracing::debug!(ticket, "Tracking sample for unknown ticket");
            return None;
        };
        if entry.closed {
            return Some(entry);
        }
        if entry.profit_chain.len() >= MAX_PROFIT_CHAIN {
            entry.profit_chain.pop_front();
        }
        entry.profit_chain.push_back(profit_pct);
        entry.peak_profit = entry.peak_profit.max(profit_pct);
        Some(entry)
    }

    pub fn log_close(&mut self, ticket: u64, reason: &str, final_profit: f64, at: DateTime<Utc>) {
        match self.entries.get_mut(&ticket) {
            Some(entry) => {
                entry.closed = true;
                entry.close_time = Some(at);
                entry.close_reason = Some(reason.to_string());
                entry.final_profit = Some(final_profit);
                tracing::info!(ticket, reason = %reason, final_profit, "Trade closed");
            }
            None => tracing::debug!(ticket, "Close for unknown ticket"),
        }
    }

    pub fn entry(&self, ticket: u64) -> Option<&TradeEntry> {
        self.entries.get(&ticket)
    }

    pub fn peak_profit(&self, ticket: u64) -> Option<f64> {
        self.entries.get(&ticket).map(|e| e.peak_profit)
    }

    /// Mark every open entry whose ticket the broker no longer reports as closed.
    /// The final profit of such trades is unknown.
    pub fn close_missing(&mut self, open_tickets: &[u64], at: DateTime<Utc>) -> usize {
        let mut closed = 0;
        for entry in self.entries.values_mut() {
            if entry.closed || open_tickets.contains(&entry.ticket) {
                continue;
            }
            entry.closed = true;
            entry.close_time = Some(at);
            entry.close_reason = Some("broker_closed".to_string());
            tracing::info!(ticket = entry.ticket, symbol = %entry.symbol, "Trade closed outside the engine");
            closed += 1;
        }
        closed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop closed entries
    pub fn prune_closed(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| !e.closed);
        before - self.entries.len()
    }
}

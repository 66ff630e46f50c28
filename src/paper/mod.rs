// In-process broker and quote feed for paper trading and tests
pub mod synthetic;

pub use synthetic::{SyntheticFeed, WalkParams};

use crate::error::GatewayError;
use crate::execution::OrderGateway;
use crate::feed::{PositionSource, TickSource};
use crate::models::{FillStatus, OrderFill, OrderRequest, Position, Side, Tick};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Failure injected into the next gateway call
#[derive(Debug, Clone)]
pub enum PaperFault {
    Reject { code: i32, retryable: bool },
    Transport,
    /// Sleep before answering. With `apply` the call still takes effect.
    Hang { delay: Duration, apply: bool },
    /// Acknowledge an open as placed without creating a position
    Placed,
}

// Closed positions remembered for inspection
const MAX_CLOSED: usize = 1024;

#[derive(Debug, Default)]
struct Book {
    positions: HashMap<String, Vec<Position>>,
    closed: VecDeque<(Position, String)>,
}

impl Book {
    fn record_closed(&mut self, position: Position, reason: &str) {
        if self.closed.len() >= MAX_CLOSED {
            self.closed.pop_front();
        }
        self.closed.push_back((position, reason.to_string()));
    }
}

/// Simulated order gateway and position source
#[derive(Debug)]
pub struct PaperBroker {
    book: Mutex<Book>,
    faults: Mutex<VecDeque<PaperFault>>,
    next_ticket: AtomicU64,
    calls: AtomicU64,
}

impl Default for PaperBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl PaperBroker {
    pub fn new() -> Self {
        Self {
            book: Mutex::new(Book::default()),
            faults: Mutex::new(VecDeque::new()),
            next_ticket: AtomicU64::new(1000),
            calls: AtomicU64::new(0),
        }
    }

    /// Queue a fault for the next gateway call
    pub fn inject(&self, fault: PaperFault) {
        self.faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(fault);
    }

    /// Seed a position as if it were opened elsewhere
    pub fn insert_position(&self, position: Position) {
        let mut book = self.lock_book();
        book.positions
            .entry(position.symbol.clone())
            .or_default()
            .push(position);
    }

    /// Remove a position behind the engine's back
    pub fn remove_position(&self, ticket: u64) -> Option<Position> {
        self.take(ticket)
    }

    pub fn open_positions(&self, symbol: &str) -> Vec<Position> {
        self.lock_book()
            .positions
            .get(symbol)
            .cloned()
            .unwrap_or_default()
    }

    pub fn position(&self, ticket: u64) -> Option<Position> {
        self.lock_book()
            .positions
            .values()
            .flatten()
            .find(|p| p.ticket == ticket)
            .cloned()
    }

    /// Most recently closed positions, oldest first, with the reason they went away
    pub fn closed(&self) -> Vec<(Position, String)> {
        self.lock_book().closed.iter().cloned().collect()
    }

    /// Gateway calls received, including failed ones
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Close positions whose stop or target the quote has crossed
    pub fn mark(&self, tick: &Tick) -> Vec<u64> {
        let mut book = self.lock_book();
        let Some(open) = book.positions.get_mut(&tick.symbol) else {
            return Vec::new();
        };

        let mut hit = Vec::new();
        open.retain(|p| {
            let price = tick.exit_price(p.side);
            let stopped = p.current_sl.is_some_and(|sl| match p.side {
                Side::Long => price <= sl,
                Side::Short => price >= sl,
            });
            let target = p.take_profit.is_some_and(|tp| match p.side {
                Side::Long => price >= tp,
                Side::Short => price <= tp,
            });
            if stopped || target {
                hit.push((p.clone(), if stopped { "stop_loss" } else { "take_profit" }));
                false
            } else {
                true
            }
        });

        let tickets = hit.iter().map(|(p, _)| p.ticket).collect();
        for (position, reason) in hit {
            tracing::info!(
                symbol = %position.symbol,
                ticket = position.ticket,
                reason,
                "Paper position closed by broker"
            );
            book.record_closed(position, reason);
        }
        tickets
    }

    fn lock_book(&self) -> std::sync::MutexGuard<'_, Book> {
        self.book.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take(&self, ticket: u64) -> Option<Position> {
        let mut book = self.lock_book();
        for open in book.positions.values_mut() {
            if let Some(idx) = open.iter().position(|p| p.ticket == ticket) {
                return Some(open.remove(idx));
            }
        }
        None
    }

    /// Pop the next fault. Returns `(apply, placed)` when the call is answered.
    async fn before_call(&self) -> Result<(bool, bool), GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let fault = self
            .faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();

        match fault {
            None => Ok((true, false)),
            Some(PaperFault::Reject { code, retryable }) => Err(GatewayError::Rejected {
                code,
                message: "paper rejection".to_string(),
                retryable,
            }),
            Some(PaperFault::Transport) => {
                Err(GatewayError::Transport("paper connection reset".to_string()))
            }
            Some(PaperFault::Hang { delay, apply }) => {
                tokio::time::sleep(delay).await;
                Ok((apply, false))
            }
            Some(PaperFault::Placed) => Ok((false, true)),
        }
    }
}

#[async_trait]
impl OrderGateway for PaperBroker {
    async fn open(&self, request: &OrderRequest) -> Result<OrderFill, GatewayError> {
        let (apply, placed) = self.before_call().await?;
        let ticket = self.next_ticket.fetch_add(1, Ordering::SeqCst);

        if placed {
            return Ok(OrderFill {
                status: FillStatus::Placed,
                ticket,
                fill_price: request.price,
            });
        }
        if apply {
            self.insert_position(Position {
                ticket,
                symbol: request.symbol.clone(),
                side: request.side,
                volume: request.volume,
                open_price: request.price,
                current_sl: Some(request.stop_loss),
                take_profit: Some(request.take_profit),
                open_time: Utc::now(),
            });
        }
        Ok(OrderFill {
            status: FillStatus::Filled,
            ticket,
            fill_price: request.price,
        })
    }

    async fn modify_sl(&self, ticket: u64, new_sl: f64) -> Result<(), GatewayError> {
        let (apply, _) = self.before_call().await?;
        if !apply {
            return Ok(());
        }
        let mut book = self.lock_book();
        let position = book
            .positions
            .values_mut()
            .flatten()
            .find(|p| p.ticket == ticket)
            .ok_or_else(|| GatewayError::Rejected {
                code: 10013,
                message: format!("unknown ticket {}", ticket),
                retryable: false,
            })?;
        position.current_sl = Some(new_sl);
        Ok(())
    }

    async fn close(&self, ticket: u64) -> Result<(), GatewayError> {
        let (apply, _) = self.before_call().await?;
        if !apply {
            return Ok(());
        }
        let position = self.take(ticket).ok_or_else(|| GatewayError::Rejected {
            code: 10013,
            message: format!("unknown ticket {}", ticket),
            retryable: false,
        })?;
        self.lock_book().record_closed(position, "requested");
        Ok(())
    }
}

#[async_trait]
impl PositionSource for PaperBroker {
    async fn positions(&self, symbol: &str) -> anyhow::Result<Vec<Position>> {
        Ok(self.open_positions(symbol))
    }
}

/// Synthetic quotes marked against the paper book before they reach the engine
pub struct PaperMarket {
    feed: SyntheticFeed,
    broker: Arc<PaperBroker>,
}

impl PaperMarket {
    pub fn new(feed: SyntheticFeed, broker: Arc<PaperBroker>) -> Self {
        Self { feed, broker }
    }
}

#[async_trait]
impl TickSource for PaperMarket {
    async fn latest_tick(&self, symbol: &str) -> anyhow::Result<Option<Tick>> {
        let tick = self.feed.next_tick(symbol);
        if let Some(tick) = &tick {
            self.broker.mark(tick);
        }
        Ok(tick)
    }
}

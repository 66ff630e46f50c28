use crate::feed::TickSource;
use crate::models::Tick;
use async_trait::async_trait;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Random-walk parameters for one symbol
#[derive(Debug, Clone, Copy)]
pub struct WalkParams {
    pub start_price: f64,
    pub spread: f64,
    /// Fractional drift per step (0.0 for a sideways market)
    pub drift: f64,
    /// Maximum fractional move per step
    pub noise: f64,
}

impl WalkParams {
    pub fn sideways(start_price: f64, spread: f64) -> Self {
        Self {
            start_price,
            spread,
            drift: 0.0,
            noise: 0.0005,
        }
    }
}

#[derive(Debug)]
struct Walk {
    params: WalkParams,
    mid: f64,
}

/// Seeded random-walk quotes, one step per fetch
pub struct SyntheticFeed {
    rng: Mutex<StdRng>,
    walks: Mutex<HashMap<String, Walk>>,
    /// Walk started for symbols first seen after construction
    fallback: Option<WalkParams>,
}

impl SyntheticFeed {
    /// Same seed, same sequence of quotes
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            walks: Mutex::new(HashMap::new()),
            fallback: None,
        }
    }

    /// Quote any symbol on request, starting a walk with `params` the first time
    pub fn with_default(mut self, params: WalkParams) -> Self {
        self.fallback = Some(params);
        self
    }

    pub fn with_symbol(self, symbol: &str, params: WalkParams) -> Self {
        self.walks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                symbol.to_uppercase(),
                Walk {
                    params,
                    mid: params.start_price,
                },
            );
        self
    }

    /// Advance `symbol` by one step
    pub fn next_tick(&self, symbol: &str) -> Option<Tick> {
        let mut walks = self.walks.lock().unwrap_or_else(PoisonError::into_inner);
        if !walks.contains_key(symbol) {
            let params = self.fallback?;
            tracing::info!(symbol = %symbol, start_price = params.start_price, "Starting synthetic quotes");
            walks.insert(
                symbol.to_string(),
                Walk {
                    params,
                    mid: params.start_price,
                },
            );
        }
        let walk = walks.get_mut(symbol)?;

        let shock = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            if walk.params.noise > 0.0 {
                rng.gen_range(-walk.params.noise..walk.params.noise)
            } else {
                0.0
            }
        };
        walk.mid *= 1.0 + walk.params.drift + shock;
        // Keep the walk strictly positive
        walk.mid = walk.mid.max(walk.params.spread * 2.0);

        let half = walk.params.spread / 2.0;
        Some(Tick::quote(
            symbol,
            walk.mid - half,
            walk.mid + half,
            Utc::now(),
        ))
    }
}

#[async_trait]
impl TickSource for SyntheticFeed {
    async fn latest_tick(&self, symbol: &str) -> anyhow::Result<Option<Tick>> {
        Ok(self.next_tick(symbol))
    }
}

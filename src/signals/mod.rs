// Directional signal providers and voting
pub mod aggregator;
pub mod providers;

pub use aggregator::{aggregate, AggregatedSignal};
pub use providers::{FixedProvider, MaCrossProvider, RsiProvider};

use crate::models::{SignalDirection, SignalVote, Tick};
use std::sync::Arc;

/// Pluggable directional signal source
pub trait SignalProvider: Send + Sync {
    /// Indicator name used in votes and journal records
    fn name(&self) -> &str;

    /// Evaluate the recent market window for `symbol`.
    /// Should return a NONE vote rather than an error when the window is too short.
    fn evaluate(&self, symbol: &str, window: &[Tick]) -> anyhow::Result<SignalVote>;

    /// Ticks needed before the provider can vote. Shorter windows get a NONE vote
    /// without calling `evaluate`.
    fn min_ticks_required(&self) -> usize;
}

/// Runs every registered provider and folds their votes
#[derive(Clone, Default)]
pub struct SignalAggregator {
    providers: Vec<Arc<dyn SignalProvider>>,
}

impl SignalAggregator {
    pub fn new(providers: Vec<Arc<dyn SignalProvider>>) -> Self {
        Self { providers }
    }

    pub fn with_provider(mut self, provider: Arc<dyn SignalProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    /// Collect votes and aggregate. Provider errors count as malformed output.
    pub fn evaluate(&self, symbol: &str, window: &[Tick], min_votes: usize) -> AggregatedSignal {
        let mut votes = Vec::with_capacity(self.providers.len());
        let mut failed = Vec::new();

        for provider in &self.providers {
            if window.len() < provider.min_ticks_required() {
                tracing::debug!(
                    symbol = %symbol,
                    indicator = provider.name(),
                    have = window.len(),
                    need = provider.min_ticks_required(),
                    "Warming up"
                );
                votes.push(SignalVote::new(provider.name(), SignalDirection::None));
                continue;
            }
            match provider.evaluate(symbol, window) {
                Ok(vote) => votes.push(vote),
                Err(e) => {
                    tracing::warn!(
                        symbol = %symbol,
                        indicator = provider.name(),
                        error = %e,
                        "Signal provider failed"
                    );
                    failed.push(provider.name().to_string());
                }
            }
        }

        let mut result = aggregate(&votes, min_votes);
        if !failed.is_empty() {
            result.malformed.extend(failed);
            result.malformed.sort();
        }
        if result.has_data_quality_issue() {
            tracing::warn!(symbol = %symbol, malformed = ?result.malformed, "Malformed indicator output ignored");
        }
        result
    }
}

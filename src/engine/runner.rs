use super::pipeline::{CycleReport, DecisionEngine};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval, Duration, MissedTickBehavior};

/// Drives the engine on a fixed poll interval until shutdown
pub struct EngineRunner {
    engine: Arc<DecisionEngine>,
    poll: Duration,
    max_cycles: Option<u64>,
}

impl EngineRunner {
    pub fn new(engine: Arc<DecisionEngine>, poll: Duration) -> Self {
        Self {
            engine,
            poll,
            max_cycles: None,
        }
    }

    /// Stop after `cycles` cycles
    pub fn with_max_cycles(mut self, cycles: u64) -> Self {
        self.max_cycles = Some(cycles);
        self
    }

    /// Returns the totals over all completed cycles
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> CycleReport {
        let mut ticker = interval(self.poll);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut totals = CycleReport::default();
        let mut cycles = 0u64;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.engine.run_cycle().await;
                    cycles += 1;

                    if report.actions > 0 || report.failed > 0 {
                        tracing::info!(
                            cycle = cycles,
                            config_version = report.config_version,
                            processed = report.processed,
                            actions = report.actions,
                            failed = report.failed,
                            "Cycle complete"
                        );
                    } else {
                        tracing::debug!(
                            cycle = cycles,
                            processed = report.processed,
                            duplicates = report.duplicates,
                            skipped = report.skipped,
                            "Cycle complete"
                        );
                    }

                    totals.config_version = report.config_version;
                    totals.processed += report.processed;
                    totals.duplicates += report.duplicates;
                    totals.skipped += report.skipped;
                    totals.failed += report.failed;
                    totals.actions += report.actions;

                    if self.max_cycles.is_some_and(|max| cycles >= max) {
                        tracing::info!(cycles, "Cycle limit reached");
                        break;
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!(cycles, "Engine loop stopping");
                        break;
                    }
                }
            }
        }

        totals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigDocument, ConfigStore};
    use crate::engine::EngineParts;
    use crate::execution::{GatewayClient, RetryPolicy, TickBuffer};
    use crate::feed::StaticVolatility;
    use crate::journal::MemoryJournal;
    use crate::models::SignalDirection;
    use crate::paper::{PaperBroker, SyntheticFeed, WalkParams};
    use crate::signals::{FixedProvider, SignalAggregator};

    fn engine() -> Arc<DecisionEngine> {
        let doc = ConfigDocument::from_toml("[symbols.EURUSD]\nlot_size = 0.01\n").unwrap();
        let broker = Arc::new(PaperBroker::new());
        let feed = SyntheticFeed::new(3).with_symbol(
            "EURUSD",
            WalkParams {
                start_price: 1.1,
                spread: 0.0002,
                drift: 0.0001,
                noise: 0.0,
            },
        );

        Arc::new(DecisionEngine::new(EngineParts {
            config: Arc::new(ConfigStore::from_document(doc)),
            ticks: Arc::new(feed),
            positions: broker.clone(),
            volatility: Arc::new(StaticVolatility::new().with("EURUSD", 0.001)),
            signals: SignalAggregator::default()
                .with_provider(Arc::new(FixedProvider::new("fixed", SignalDirection::Hold))),
            gateway: GatewayClient::new(broker, RetryPolicy::default()),
            journal: Arc::new(MemoryJournal::new()),
            buffer: TickBuffer::new(32),
        }))
    }

    #[tokio::test]
    async fn test_stops_after_max_cycles() {
        let (_tx, rx) = watch::channel(false);
        let totals = EngineRunner::new(engine(), Duration::from_millis(1))
            .with_max_cycles(3)
            .run(rx)
            .await;

        assert_eq!(totals.processed, 3);
        assert_eq!(totals.actions, 0);
    }

    #[tokio::test]
    async fn test_stops_on_shutdown() {
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(EngineRunner::new(engine(), Duration::from_millis(5)).run(rx));

        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send_replace(true);

        let totals = handle.await.unwrap();
        assert!(totals.processed >= 1);
    }
}

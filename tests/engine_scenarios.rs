use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use ticktrader::config::{ConfigDocument, ConfigStore, SymbolStatus};
use ticktrader::engine::{DecisionEngine, EngineParts, PositionPhase, SymbolOutcome};
use ticktrader::execution::{GatewayClient, RetryPolicy, TickBuffer};
use ticktrader::feed::{PositionSource, StaticVolatility, TickSource};
use ticktrader::journal::MemoryJournal;
use ticktrader::models::{Position, Side, SignalDirection, Tick};
use ticktrader::paper::{PaperBroker, PaperFault};
use ticktrader::signals::{FixedProvider, SignalAggregator};

/// Quotes set by the test, one per symbol
#[derive(Default)]
struct ScriptedTicks {
    quotes: Mutex<HashMap<String, Tick>>,
    broken: Mutex<Vec<String>>,
}

impl ScriptedTicks {
    fn set(&self, symbol: &str, bid: f64, ask: f64, at: DateTime<Utc>) {
        self.quotes
            .lock()
            .unwrap()
            .insert(symbol.to_string(), Tick::quote(symbol, bid, ask, at));
    }

    fn break_symbol(&self, symbol: &str) {
        self.broken.lock().unwrap().push(symbol.to_string());
    }
}

#[async_trait]
impl TickSource for ScriptedTicks {
    async fn latest_tick(&self, symbol: &str) -> anyhow::Result<Option<Tick>> {
        if self.broken.lock().unwrap().iter().any(|s| s == symbol) {
            anyhow::bail!("feed disconnected");
        }
        Ok(self.quotes.lock().unwrap().get(symbol).cloned())
    }
}

/// Broker positions, unless switched off
struct SwitchablePositions {
    broker: Arc<PaperBroker>,
    down: AtomicBool,
}

#[async_trait]
impl PositionSource for SwitchablePositions {
    async fn positions(&self, symbol: &str) -> anyhow::Result<Vec<Position>> {
        if self.down.load(Ordering::SeqCst) {
            anyhow::bail!("position query timed out");
        }
        self.broker.positions(symbol).await
    }
}

struct Harness {
    engine: DecisionEngine,
    store: Arc<ConfigStore>,
    ticks: Arc<ScriptedTicks>,
    broker: Arc<PaperBroker>,
    positions: Arc<SwitchablePositions>,
    journal: Arc<MemoryJournal>,
}

fn harness(toml: &str, signal: SignalDirection, atr: f64, policy: RetryPolicy) -> Harness {
    let store = Arc::new(ConfigStore::from_document(
        ConfigDocument::from_toml(toml).unwrap(),
    ));
    let ticks = Arc::new(ScriptedTicks::default());
    let broker = Arc::new(PaperBroker::new());
    let positions = Arc::new(SwitchablePositions {
        broker: broker.clone(),
        down: AtomicBool::new(false),
    });
    let journal = Arc::new(MemoryJournal::new());

    let mut volatility = StaticVolatility::new();
    for symbol in store.snapshot().symbols() {
        volatility = volatility.with(symbol, atr);
    }

    let engine = DecisionEngine::new(EngineParts {
        config: Arc::clone(&store),
        ticks: ticks.clone(),
        positions: positions.clone(),
        volatility: Arc::new(volatility),
        signals: SignalAggregator::default().with_provider(Arc::new(FixedProvider::new("fixed", signal))),
        gateway: GatewayClient::new(broker.clone(), policy),
        journal: journal.clone(),
        buffer: TickBuffer::new(64),
    });

    Harness {
        engine,
        store,
        ticks,
        broker,
        positions,
        journal,
    }
}

fn long_position(ticket: u64, open_price: f64, current_sl: Option<f64>) -> Position {
    Position {
        ticket,
        symbol: "EURUSD".to_string(),
        side: Side::Long,
        volume: 0.01,
        open_price,
        current_sl,
        take_profit: None,
        open_time: Utc::now() - Duration::minutes(10),
    }
}

const TRAILING: &str = r#"
    [defaults]
    trailing_profit_threshold = 0.0022
    atr_multiplier = 2.0
    break_even_offset = 0.1
    min_atr_pct = 0.0005

    [symbols.EURUSD]
    lot_size = 0.01
"#;

#[tokio::test]
async fn test_trailing_stop_moves_once_and_never_regresses() {
    let h = harness(TRAILING, SignalDirection::Hold, 0.0005, RetryPolicy::default());
    h.broker.insert_position(long_position(1, 1.1, Some(1.0)));
    let t0 = Utc::now();

    // Below the trailing threshold
    h.ticks.set("EURUSD", 1.1011, 1.1012, t0);
    h.engine.run_cycle().await;
    assert_eq!(h.broker.position(1).unwrap().current_sl, Some(1.0));

    // profit 0.27%: candidate 1.1030 - 2 * 0.0005515 beats breakeven
    h.ticks.set("EURUSD", 1.1030, 1.1031, t0 + Duration::seconds(1));
    h.engine.run_cycle().await;
    let first = h.broker.position(1).unwrap().current_sl.unwrap();
    let expected = 1.1030 - 2.0 * (0.0005 * 1.1030);
    assert!((first - expected).abs() < 1e-9, "stop {} != {}", first, expected);

    // Lower profit, still above threshold: stop stays put
    h.ticks.set("EURUSD", 1.1026, 1.1027, t0 + Duration::seconds(2));
    h.engine.run_cycle().await;
    assert_eq!(h.broker.position(1).unwrap().current_sl, Some(first));

    let modifies = h
        .journal
        .actions_for("EURUSD")
        .into_iter()
        .filter(|a| a == "MODIFY_SL")
        .count();
    assert_eq!(modifies, 1);
}

#[tokio::test]
async fn test_buy_signal_at_max_long_opens_nothing() {
    let toml = r#"
        [defaults]
        max_long = 0.02
        lot_size = 0.01
        cooldown_seconds = 0

        [symbols.EURUSD]
        lot_size = 0.01
    "#;
    let h = harness(toml, SignalDirection::Buy, 0.001, RetryPolicy::default());
    h.broker.insert_position(long_position(1, 1.1, Some(1.05)));
    h.broker.insert_position(long_position(2, 1.1, Some(1.05)));

    h.ticks.set("EURUSD", 1.1000, 1.1002, Utc::now());
    h.engine.run_cycle().await;

    assert_eq!(h.broker.call_count(), 0);
    assert_eq!(h.broker.open_positions("EURUSD").len(), 2);

    let records = h.journal.records();
    assert!(records.iter().all(|r| r.action != "OPEN"));
    let skip = records.iter().find(|r| r.action == "SKIP").unwrap();
    assert!(skip.reason.contains("risk gate"));
}

#[tokio::test]
async fn test_malformed_reload_stops_only_that_symbol() {
    let good = r#"
        [defaults]
        cooldown_seconds = 0

        [symbols.EURUSD]
        lot_size = 0.01

        [symbols.GBPUSD]
        lot_size = 0.01
    "#;
    let bad = r#"
        [defaults]
        cooldown_seconds = 0

        [symbols.EURUSD]
        lot_size = 0.01

        [symbols.GBPUSD]
        lot_size = 0.01
        max_lng = 1.0
    "#;
    let h = harness(good, SignalDirection::Buy, 0.001, RetryPolicy::default());
    let t0 = Utc::now();

    h.ticks.set("EURUSD", 1.1000, 1.1002, t0);
    h.ticks.set("GBPUSD", 1.2700, 1.2702, t0);
    h.engine.run_cycle().await;
    assert_eq!(h.broker.open_positions("EURUSD").len(), 1);
    assert_eq!(h.broker.open_positions("GBPUSD").len(), 1);

    let report = h.store.apply(ConfigDocument::from_toml(bad).unwrap());
    assert_eq!(report.quarantined, 1);
    let snapshot = h.store.snapshot();
    assert!(matches!(
        snapshot.entry("GBPUSD").unwrap().status,
        SymbolStatus::Quarantined { .. }
    ));

    h.ticks.set("EURUSD", 1.1001, 1.1003, t0 + Duration::seconds(1));
    h.ticks.set("GBPUSD", 1.2701, 1.2703, t0 + Duration::seconds(1));
    let cycle = h.engine.run_cycle().await;
    assert_eq!(cycle.config_version, 2);

    assert_eq!(h.broker.open_positions("EURUSD").len(), 2);
    assert_eq!(h.broker.open_positions("GBPUSD").len(), 1);
    assert!(h
        .journal
        .records()
        .iter()
        .any(|r| r.symbol == "GBPUSD" && r.action == "SKIP" && r.reason.contains("quarantined")));
}

#[tokio::test]
async fn test_abort_fires_without_close_signal() {
    let h = harness(TRAILING, SignalDirection::Buy, 0.001, RetryPolicy::default());
    h.broker.insert_position(long_position(7, 1.1, Some(1.0)));

    // (1.0983 - 1.1) / 1.1 = -0.155%
    h.ticks.set("EURUSD", 1.0983, 1.0985, Utc::now());
    let report = h.engine.run_cycle().await;

    assert_eq!(report.actions, 1);
    assert!(h.broker.open_positions("EURUSD").is_empty());
    assert_eq!(h.journal.actions_for("EURUSD"), vec!["ABORT".to_string()]);

    let slot = h.engine.state().slot("EURUSD");
    assert_eq!(slot.lock().lifecycle.phase(7), Some(PositionPhase::Aborted));
}

#[tokio::test]
async fn test_rejected_abort_is_retried_on_unchanged_quote() {
    let h = harness(TRAILING, SignalDirection::Hold, 0.001, RetryPolicy::default());
    h.broker.insert_position(long_position(7, 1.1, Some(1.0)));
    h.broker.inject(PaperFault::Reject {
        code: 10018,
        retryable: false,
    });
    let at = Utc::now();

    h.ticks.set("EURUSD", 1.0983, 1.0985, at);
    h.engine.run_cycle().await;
    assert_eq!(h.broker.open_positions("EURUSD").len(), 1);

    // Same quote again: the loss is still past the threshold
    h.ticks.set("EURUSD", 1.0983, 1.0985, at + Duration::seconds(1));
    let report = h.engine.run_cycle().await;

    assert_eq!(report.duplicates, 0);
    assert_eq!(h.broker.call_count(), 2);
    assert!(h.broker.open_positions("EURUSD").is_empty());
    assert_eq!(
        h.journal.actions_for("EURUSD"),
        vec!["ABORT".to_string(), "ABORT".to_string()]
    );

    // Settled now, so the same quote is a duplicate again
    let third = h.engine.run_cycle().await;
    assert_eq!(third.duplicates, 1);
}

#[tokio::test]
async fn test_failed_position_fetch_does_not_swallow_quote() {
    let h = harness(TRAILING, SignalDirection::Hold, 0.001, RetryPolicy::default());
    h.broker.insert_position(long_position(7, 1.1, Some(1.0)));
    let at = Utc::now();

    h.positions.down.store(true, Ordering::SeqCst);
    h.ticks.set("EURUSD", 1.0983, 1.0985, at);
    let first = h.engine.run_cycle().await;
    assert_eq!(first.skipped, 1);
    assert_eq!(h.broker.call_count(), 0);

    h.positions.down.store(false, Ordering::SeqCst);
    let second = h.engine.run_cycle().await;
    assert_eq!(second.duplicates, 0);
    assert_eq!(second.processed, 1);
    assert!(h.broker.open_positions("EURUSD").is_empty());
}

#[tokio::test]
async fn test_broker_side_close_drops_trade_journal_entry() {
    let toml = r#"
        [defaults]
        cooldown_seconds = 0
        liquidation_cycle_seconds = 600

        [symbols.EURUSD]
        lot_size = 0.01
    "#;
    let h = harness(toml, SignalDirection::Buy, 0.001, RetryPolicy::default());
    let t0 = Utc::now();

    h.ticks.set("EURUSD", 1.1000, 1.1002, t0);
    h.engine.run_cycle().await;
    let ticket = h.broker.open_positions("EURUSD")[0].ticket;
    let slot = h.engine.state().slot("EURUSD");
    assert!(slot.lock().journal.entry(ticket).is_some());

    // Stopped out at the broker, never seen as an engine exit
    h.broker.remove_position(ticket).unwrap();
    h.ticks.set("EURUSD", 1.1001, 1.1003, t0 + Duration::seconds(1));
    h.engine.run_cycle().await;

    let state = slot.lock();
    assert!(state.journal.entry(ticket).is_none());
    assert!(state.journal.is_empty());
}

#[tokio::test]
async fn test_timeout_marks_symbol_in_flight_until_sync() {
    let policy = RetryPolicy {
        timeout: std::time::Duration::from_millis(20),
        max_retries: 2,
        backoff: std::time::Duration::from_millis(1),
    };
    let toml = r#"
        [defaults]
        cooldown_seconds = 0

        [symbols.EURUSD]
        lot_size = 0.01
    "#;
    let h = harness(toml, SignalDirection::Buy, 0.001, policy);
    h.broker.inject(PaperFault::Hang {
        delay: std::time::Duration::from_millis(100),
        apply: true,
    });
    let t0 = Utc::now();

    h.ticks.set("EURUSD", 1.1000, 1.1002, t0);
    h.engine.run_cycle().await;
    assert!(h.engine.state().slot("EURUSD").lock().in_flight);
    // Never retried after a timeout
    assert_eq!(h.broker.call_count(), 1);

    // The timed-out call was dropped; the next sync clears the flag and
    // the open goes out again against fresh state
    h.ticks.set("EURUSD", 1.1001, 1.1003, t0 + Duration::seconds(1));
    h.engine.run_cycle().await;

    assert_eq!(h.broker.call_count(), 2);
    let slot = h.engine.state().slot("EURUSD");
    let state = slot.lock();
    assert!(!state.in_flight);
    assert_eq!(state.exposure.snapshot().long_count, 1);
}

#[tokio::test]
async fn test_rejected_open_leaves_state_unchanged() {
    let toml = r#"
        [symbols.EURUSD]
        lot_size = 0.01
    "#;
    let h = harness(toml, SignalDirection::Sell, 0.001, RetryPolicy::default());
    h.broker.inject(PaperFault::Reject {
        code: 10019,
        retryable: false,
    });

    h.ticks.set("EURUSD", 1.1000, 1.1002, Utc::now());
    h.engine.run_cycle().await;

    assert!(h.broker.open_positions("EURUSD").is_empty());
    let slot = h.engine.state().slot("EURUSD");
    let state = slot.lock();
    assert!(state.exposure.snapshot().is_flat());
    assert!(state.cooldown.last_open(Side::Short).is_none());
    assert!(!state.in_flight);
}

#[tokio::test]
async fn test_duplicate_quote_is_skipped() {
    let h = harness(TRAILING, SignalDirection::Hold, 0.001, RetryPolicy::default());
    let snapshot = h.store.snapshot();
    let at = Utc::now();

    h.ticks.set("EURUSD", 1.1, 1.1002, at);
    let first = h.engine.process_symbol(&snapshot, "EURUSD").await.unwrap();
    assert!(matches!(first, SymbolOutcome::Processed { .. }));

    h.ticks.set("EURUSD", 1.1, 1.1002, at + Duration::seconds(1));
    let second = h.engine.process_symbol(&snapshot, "EURUSD").await.unwrap();
    assert_eq!(second, SymbolOutcome::Duplicate);
}

#[tokio::test]
async fn test_failing_symbol_does_not_stop_others() {
    let toml = r#"
        [defaults]
        cooldown_seconds = 0

        [symbols.EURUSD]
        lot_size = 0.01

        [symbols.GBPUSD]
        lot_size = 0.01
    "#;
    let h = harness(toml, SignalDirection::Buy, 0.001, RetryPolicy::default());
    h.ticks.set("EURUSD", 1.1000, 1.1002, Utc::now());
    h.ticks.break_symbol("GBPUSD");

    let report = h.engine.run_cycle().await;

    assert_eq!(report.processed, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(h.broker.open_positions("EURUSD").len(), 1);
}

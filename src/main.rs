use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use ticktrader::config::{ConfigStore, ConfigWatcher};
use ticktrader::engine::{DecisionEngine, EngineParts, EngineRunner};
use ticktrader::execution::{GatewayClient, RetryPolicy, TickBuffer};
use ticktrader::feed::TickAtr;
use ticktrader::journal::{CompositeJournal, DecisionJournal, JsonlJournal, TracingJournal};
use ticktrader::paper::{PaperBroker, PaperMarket, SyntheticFeed, WalkParams};
use ticktrader::signals::providers::{MaCrossProvider, RsiProvider};
use ticktrader::signals::SignalAggregator;
use tokio::sync::watch;
use tokio::time::Duration;

/// Per-tick trading decision engine, run against a paper broker
#[derive(Debug, Parser)]
#[command(name = "ticktrader", version)]
struct Cli {
    /// Configuration file (TOML, JSON or YAML)
    #[arg(short, long, default_value = "ticktrader.toml")]
    config: PathBuf,

    /// Stop after this many cycles
    #[arg(long)]
    cycles: Option<u64>,

    /// Seed for the synthetic quote feed
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Append decision records to this JSON-lines file
    #[arg(long)]
    journal: Option<PathBuf>,

    /// Starting mid price for every synthetic symbol
    #[arg(long, default_value_t = 100.0)]
    start_price: f64,

    /// Fixed synthetic spread
    #[arg(long, default_value_t = 0.02)]
    spread: f64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    tracing::info!(config = %cli.config.display(), "ticktrader starting (paper mode)");

    let store = Arc::new(
        ConfigStore::load(&cli.config)
            .with_context(|| format!("loading {}", cli.config.display()))?,
    );
    let snapshot = store.snapshot();
    let settings = snapshot.engine.clone();

    tracing::info!(
        version = snapshot.version,
        active = snapshot.active_count(),
        excluded = snapshot.excluded().len(),
        poll_ms = settings.poll_interval_ms,
        "Configuration loaded"
    );
    for (symbol, reason) in snapshot.excluded() {
        tracing::warn!(symbol = %symbol, reason = %reason, "Symbol excluded from trading");
    }

    // Paper collaborators
    let broker = Arc::new(PaperBroker::new());
    // Symbols added by a later reload get quotes too
    let feed = SyntheticFeed::new(cli.seed).with_default(WalkParams::sideways(cli.start_price, cli.spread));
    let market = Arc::new(PaperMarket::new(feed, Arc::clone(&broker)));

    let buffer = TickBuffer::new(settings.tick_window);
    let volatility = Arc::new(TickAtr::new(
        buffer.clone(),
        settings.atr_period,
        settings.atr_bar_secs,
    ));

    let signals = SignalAggregator::new(vec![
        Arc::new(RsiProvider::default()),
        Arc::new(MaCrossProvider::default()),
    ]);

    let mut sinks: Vec<Arc<dyn DecisionJournal>> = vec![Arc::new(TracingJournal)];
    if let Some(path) = &cli.journal {
        let jsonl = JsonlJournal::create(path)
            .with_context(|| format!("opening journal {}", path.display()))?;
        sinks.push(Arc::new(jsonl));
    }

    let engine = Arc::new(DecisionEngine::new(EngineParts {
        config: Arc::clone(&store),
        ticks: market,
        positions: broker.clone(),
        volatility,
        signals,
        gateway: GatewayClient::new(broker, RetryPolicy::from_settings(&settings)),
        journal: Arc::new(CompositeJournal::new(sinks)),
        buffer,
    }));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let watcher_task = {
        let watcher = ConfigWatcher::new(
            Arc::clone(&store),
            Duration::from_secs(settings.config_poll_secs.max(1)),
        )
        .with_context(|| format!("watching {}", cli.config.display()))?;
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { watcher.run(shutdown).await })
    };

    let mut runner = EngineRunner::new(
        engine,
        Duration::from_millis(settings.poll_interval_ms.max(1)),
    );
    if let Some(cycles) = cli.cycles {
        runner = runner.with_max_cycles(cycles);
    }
    let mut engine_task = tokio::spawn(runner.run(shutdown_rx));

    tracing::info!("Press Ctrl+C to stop");

    let totals = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl+C, shutting down");
            shutdown_tx.send_replace(true);
            (&mut engine_task).await.context("engine task failed")?
        }
        result = &mut engine_task => result.context("engine task failed")?,
    };

    shutdown_tx.send_replace(true);
    if let Err(e) = watcher_task.await {
        tracing::error!(error = %e, "Config watcher task failed");
    }

    tracing::info!(
        processed = totals.processed,
        actions = totals.actions,
        failed = totals.failed,
        "ticktrader stopped"
    );
    Ok(())
}

fn setup_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("ticktrader=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

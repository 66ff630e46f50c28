use super::schema::{merge, SymbolConfig, SymbolOverride};
use crate::error::ConfigError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;

/// Process-level settings from the `[engine]` table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineSettings {
    pub poll_interval_ms: u64,
    pub config_poll_secs: u64,
    pub gateway_timeout_ms: u64,
    pub order_max_retries: u32,
    pub retry_backoff_ms: u64,
    pub tick_window: usize,
    pub atr_period: usize,
    pub atr_bar_secs: i64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            config_poll_secs: 2,
            gateway_timeout_ms: 2000,
            order_max_retries: 2,
            retry_backoff_ms: 200,
            tick_window: 256,
            atr_period: 14,
            atr_bar_secs: 60,
        }
    }
}

/// Parsed configuration source before it is folded into a snapshot.
/// Each symbol carries its own merge/validation outcome.
#[derive(Debug, Clone)]
pub struct ConfigDocument {
    pub engine: EngineSettings,
    pub defaults: SymbolConfig,
    pub symbols: BTreeMap<String, Result<SymbolConfig, String>>,
}

impl ConfigDocument {
    /// Read `[engine]`, `[defaults]` and `[symbols.*]` from a built `config::Config`.
    ///
    /// A broken `[engine]` or `[defaults]` table fails the whole document. A broken
    /// symbol entry only marks that symbol.
    pub fn from_config(cfg: &config::Config) -> Result<Self, ConfigError> {
        let engine = match cfg.get::<EngineSettings>("engine") {
            Ok(engine) => engine,
            Err(config::ConfigError::NotFound(_)) => EngineSettings::default(),
            Err(e) => return Err(e.into()),
        };

        let default_override = match cfg.get::<SymbolOverride>("defaults") {
            Ok(over) => over,
            Err(config::ConfigError::NotFound(_)) => SymbolOverride::default(),
            Err(e) => return Err(e.into()),
        };
        let defaults = merge(&SymbolConfig::default(), &default_override);
        defaults.validate().map_err(|reason| ConfigError::Invalid {
            symbol: "defaults".to_string(),
            reason,
        })?;

        let table = match cfg.get_table("symbols") {
            Ok(table) => table,
            Err(config::ConfigError::NotFound(_)) => Default::default(),
            Err(e) => return Err(e.into()),
        };

        let mut symbols = BTreeMap::new();
        for (name, value) in table {
            let parsed = value
                .try_deserialize::<SymbolOverride>()
                .map_err(|e| e.to_string())
                .and_then(|over| {
                    let merged = merge(&defaults, &over);
                    merged.validate().map(|_| merged)
                });
            symbols.insert(name.to_uppercase(), parsed);
        }

        Ok(Self {
            engine,
            defaults,
            symbols,
        })
    }

    /// Load a document from a file; format follows the extension.
    /// `TICKTRADER__ENGINE__*` environment variables override the engine table.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let cfg = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(
                config::Environment::with_prefix("TICKTRADER")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;
        Self::from_config(&cfg)
    }

    /// Parse a TOML string. Mostly useful for tests and embedded defaults.
    pub fn from_toml(source: &str) -> Result<Self, ConfigError> {
        let cfg = config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?;
        Self::from_config(&cfg)
    }
}

/// Trading status of a symbol inside a snapshot
#[derive(Debug, Clone, PartialEq)]
pub enum SymbolStatus {
    Active,
    /// Latest entry failed validation; the last good config is kept for
    /// protective management but no new positions are opened.
    Quarantined { reason: String },
}

#[derive(Debug, Clone)]
pub struct SymbolEntry {
    pub config: Arc<SymbolConfig>,
    pub status: SymbolStatus,
}

impl SymbolEntry {
    pub fn is_active(&self) -> bool {
        matches!(self.status, SymbolStatus::Active)
    }
}

/// Immutable configuration view. Never mutated after publication.
#[derive(Debug, Clone)]
pub struct ConfigSnapshot {
    pub version: u64,
    pub loaded_at: DateTime<Utc>,
    pub engine: EngineSettings,
    pub defaults: Arc<SymbolConfig>,
    symbols: BTreeMap<String, SymbolEntry>,
    excluded: BTreeMap<String, String>,
}

impl ConfigSnapshot {
    /// Fold a document into a snapshot, using `previous` to retain last good
    /// entries for symbols that fail validation this time.
    pub fn build(doc: ConfigDocument, previous: Option<&ConfigSnapshot>, version: u64) -> Self {
        let mut symbols = BTreeMap::new();
        let mut excluded = BTreeMap::new();

        for (name, parsed) in doc.symbols {
            match parsed {
                Ok(config) => {
                    symbols.insert(
                        name,
                        SymbolEntry {
                            config: Arc::new(config),
                            status: SymbolStatus::Active,
                        },
                    );
                }
                Err(reason) => {
                    tracing::warn!(symbol = %name, %reason, "Invalid symbol configuration");
                    match previous.and_then(|prev| prev.symbols.get(&name)) {
                        Some(prior) => {
                            symbols.insert(
                                name,
                                SymbolEntry {
                                    config: Arc::clone(&prior.config),
                                    status: SymbolStatus::Quarantined { reason },
                                },
                            );
                        }
                        None => {
                            excluded.insert(name, reason);
                        }
                    }
                }
            }
        }

        Self {
            version,
            loaded_at: Utc::now(),
            engine: doc.engine,
            defaults: Arc::new(doc.defaults),
            symbols,
            excluded,
        }
    }

    pub fn entry(&self, symbol: &str) -> Option<&SymbolEntry> {
        self.symbols.get(symbol)
    }

    /// Config of a symbol only if it may open new positions
    pub fn tradable(&self, symbol: &str) -> Option<&Arc<SymbolConfig>> {
        self.symbols
            .get(symbol)
            .filter(|entry| entry.is_active())
            .map(|entry| &entry.config)
    }

    /// All symbols the engine should process, active or quarantined
    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.symbols.keys().map(String::as_str)
    }

    pub fn active_count(&self) -> usize {
        self.symbols.values().filter(|e| e.is_active()).count()
    }

    /// Symbols that never had a valid entry, with the reason
    pub fn excluded(&self) -> &BTreeMap<String, String> {
        &self.excluded
    }

    pub fn quarantined(&self) -> Vec<(&str, &str)> {
        self.symbols
            .iter()
            .filter_map(|(name, entry)| match &entry.status {
                SymbolStatus::Quarantined { reason } => Some((name.as_str(), reason.as_str())),
                SymbolStatus::Active => None,
            })
            .collect()
    }
}

/// Summary of one reload, for logging
#[derive(Debug, Clone)]
pub struct ReloadReport {
    pub version: u64,
    pub active: usize,
    pub quarantined: usize,
    pub excluded: usize,
}

/// Single-writer holder of the active snapshot.
///
/// Readers take an `Arc<ConfigSnapshot>` once per decision cycle and keep using
/// it even if a reload lands mid-cycle.
pub struct ConfigStore {
    tx: watch::Sender<Arc<ConfigSnapshot>>,
    path: Option<PathBuf>,
    write_lock: Mutex<()>,
}

impl ConfigStore {
    pub fn new(initial: ConfigSnapshot) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(initial));
        Self {
            tx,
            path: None,
            write_lock: Mutex::new(()),
        }
    }

    pub fn from_document(doc: ConfigDocument) -> Self {
        Self::new(ConfigSnapshot::build(doc, None, 1))
    }

    /// Initial load from disk. Fails if the file is unreadable or the global
    /// tables are broken; bad symbol entries are only excluded.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let doc = ConfigDocument::from_path(&path)?;
        let mut store = Self::from_document(doc);
        store.path = Some(path);

        let snapshot = store.snapshot();
        tracing::info!(
            version = snapshot.version,
            active = snapshot.active_count(),
            excluded = snapshot.excluded().len(),
            "Configuration loaded"
        );
        Ok(store)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Current snapshot. Cheap: one Arc clone.
    pub fn snapshot(&self) -> Arc<ConfigSnapshot> {
        Arc::clone(&self.tx.borrow())
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<ConfigSnapshot>> {
        self.tx.subscribe()
    }

    /// Build a new snapshot from `doc` and swap it in atomically
    pub fn apply(&self, doc: ConfigDocument) -> ReloadReport {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let previous = self.snapshot();
        let next = ConfigSnapshot::build(doc, Some(&previous), previous.version + 1);
        let report = ReloadReport {
            version: next.version,
            active: next.active_count(),
            quarantined: next.quarantined().len(),
            excluded: next.excluded().len(),
        };
        self.tx.send_replace(Arc::new(next));
        report
    }

    /// Re-read the backing file. On a global parse failure the current
    /// snapshot stays in place.
    pub fn reload(&self) -> Result<ReloadReport, ConfigError> {
        let path = self.path.as_ref().ok_or(ConfigError::NoBackingFile)?;
        let doc = ConfigDocument::from_path(path)?;
        Ok(self.apply(doc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = r#"
        [engine]
        poll_interval_ms = 500

        [defaults]
        max_long = 2.0
        cooldown_seconds = 60

        [symbols.EURUSD]
        max_long = 0.5

        [symbols.GBPUSD]
        bias = "long"
    "#;

    #[test]
    fn test_document_merges_defaults_and_overrides() {
        let doc = ConfigDocument::from_toml(BASE).unwrap();
        assert_eq!(doc.engine.poll_interval_ms, 500);
        assert_eq!(doc.engine.gateway_timeout_ms, 2000);

        let eurusd = doc.symbols["EURUSD"].as_ref().unwrap();
        assert_eq!(eurusd.max_long, 0.5);
        assert_eq!(eurusd.cooldown_seconds, 60);

        let gbpusd = doc.symbols["GBPUSD"].as_ref().unwrap();
        assert_eq!(gbpusd.max_long, 2.0);
        assert_eq!(gbpusd.bias, super::super::schema::Bias::Long);
    }

    #[test]
    fn test_bad_symbol_does_not_fail_document() {
        let source = r#"
            [symbols.EURUSD]
            max_long = 0.5

            [symbols.USDJPY]
            abort_loss_threshold = 0.02
        "#;
        let doc = ConfigDocument::from_toml(source).unwrap();
        assert!(doc.symbols["EURUSD"].is_ok());
        assert!(doc.symbols["USDJPY"].is_err());

        let snapshot = ConfigSnapshot::build(doc, None, 1);
        assert!(snapshot.tradable("EURUSD").is_some());
        assert!(snapshot.entry("USDJPY").is_none());
        assert!(snapshot.excluded().contains_key("USDJPY"));
    }

    #[test]
    fn test_unknown_key_excludes_only_that_symbol() {
        let source = r#"
            [symbols.EURUSD]
            max_lnog = 0.5

            [symbols.GBPUSD]
            max_long = 0.5
        "#;
        let doc = ConfigDocument::from_toml(source).unwrap();
        assert!(doc.symbols["EURUSD"].is_err());
        assert!(doc.symbols["GBPUSD"].is_ok());
    }

    #[test]
    fn test_invalid_defaults_fail_document() {
        let source = r#"
            [defaults]
            lot_size = -1.0
        "#;
        assert!(ConfigDocument::from_toml(source).is_err());
    }

    #[test]
    fn test_reload_quarantines_symbol_with_prior_entry() {
        let store = ConfigStore::from_document(ConfigDocument::from_toml(BASE).unwrap());
        let before = store.snapshot();

        let broken = r#"
            [symbols.EURUSD]
            lot_size = 0.0

            [symbols.GBPUSD]
            max_long = 3.0
        "#;
        let report = store.apply(ConfigDocument::from_toml(broken).unwrap());
        assert_eq!(report.version, before.version + 1);
        assert_eq!(report.quarantined, 1);

        let after = store.snapshot();
        let eurusd = after.entry("EURUSD").unwrap();
        assert!(!eurusd.is_active());
        assert_eq!(eurusd.config.max_long, 0.5);
        assert!(after.tradable("EURUSD").is_none());
        assert_eq!(after.tradable("GBPUSD").unwrap().max_long, 3.0);
    }

    #[test]
    fn test_snapshot_held_across_reload_is_unchanged() {
        let store = ConfigStore::from_document(ConfigDocument::from_toml(BASE).unwrap());
        let held = store.snapshot();

        let changed = r#"
            [symbols.EURUSD]
            max_long = 9.0
        "#;
        store.apply(ConfigDocument::from_toml(changed).unwrap());

        assert_eq!(held.tradable("EURUSD").unwrap().max_long, 0.5);
        assert!(held.tradable("GBPUSD").is_some());
        assert_eq!(store.snapshot().tradable("EURUSD").unwrap().max_long, 9.0);
        assert!(store.snapshot().entry("GBPUSD").is_none());
    }

    #[test]
    fn test_subscribers_see_new_version() {
        let store = ConfigStore::from_document(ConfigDocument::from_toml(BASE).unwrap());
        let rx = store.subscribe();
        store.apply(ConfigDocument::from_toml(BASE).unwrap());
        assert_eq!(rx.borrow().version, 2);
    }

    #[test]
    fn test_in_memory_store_cannot_reload() {
        let store = ConfigStore::from_document(ConfigDocument::from_toml(BASE).unwrap());
        assert!(store.path().is_none());
        assert!(matches!(store.reload(), Err(ConfigError::NoBackingFile)));
        assert_eq!(store.snapshot().version, 1);
    }
}

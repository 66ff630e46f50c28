// Decision records and the sinks they are written to
pub mod positions;

pub use positions::{PositionJournal, TradeEntry};

use crate::exposure::ExposureSnapshot;
use crate::models::{Side, SignalDirection};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

/// Position involved in a decision
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PositionContext {
    pub ticket: u64,
    pub side: Side,
    pub open_price: f64,
    pub profit_pct: f64,
    pub stop: Option<f64>,
    pub peak_profit: Option<f64>,
}

/// Inputs a decision was computed from
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct InputSnapshot {
    pub config_version: u64,
    pub bid: f64,
    pub ask: f64,
    pub spread: f64,
    pub atr: Option<f64>,
    pub signal: Option<SignalDirection>,
    pub exposure: Option<ExposureSnapshot>,
    pub position: Option<PositionContext>,
}

/// One journaled decision
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DecisionRecord {
    pub id: Uuid,
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub reason: String,
    pub input_snapshot: InputSnapshot,
}

/// Sink for decision records. Implementations must not fail the caller.
pub trait DecisionJournal: Send + Sync {
    fn record(&self, record: &DecisionRecord);
}

/// Emits each record as a structured tracing event
#[derive(Debug, Clone, Default)]
pub struct TracingJournal;

impl DecisionJournal for TracingJournal {
    fn record(&self, record: &DecisionRecord) {
        match record.action.as_str() {
            "ABORT" => tracing::warn!(
                symbol = %record.symbol,
                action = %record.action,
                reason = %record.reason,
                bid = record.input_snapshot.bid,
                ask = record.input_snapshot.ask,
                "Decision"
            ),
            "SKIP" => tracing::debug!(
                symbol = %record.symbol,
                action = %record.action,
                reason = %record.reason,
                "Decision"
            ),
            _ => tracing::info!(
                symbol = %record.symbol,
                action = %record.action,
                reason = %record.reason,
                bid = record.input_snapshot.bid,
                ask = record.input_snapshot.ask,
                "Decision"
            ),
        }
    }
}

/// Appends records as JSON lines
pub struct JsonlJournal {
    writer: Mutex<BufWriter<File>>,
}

impl JsonlJournal {
    pub fn create(path: &Path) -> anyhow::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }
}

impl DecisionJournal for JsonlJournal {
    fn record(&self, record: &DecisionRecord) {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let written = serde_json::to_writer(&mut *writer, record)
            .map_err(std::io::Error::from)
            .and_then(|_| writer.write_all(b"\n"))
            .and_then(|_| writer.flush());
        if let Err(e) = written {
            tracing::error!(symbol = %record.symbol, error = %e, "Failed to write decision record");
        }
    }
}

/// Keeps records in memory
#[derive(Debug, Default)]
pub struct MemoryJournal {
    records: Mutex<Vec<DecisionRecord>>,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<DecisionRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn actions_for(&self, symbol: &str) -> Vec<String> {
        self.records()
            .into_iter()
            .filter(|r| r.symbol == symbol)
            .map(|r| r.action)
            .collect()
    }
}

impl DecisionJournal for MemoryJournal {
    fn record(&self, record: &DecisionRecord) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
    }
}

/// Fans a record out to several sinks
#[derive(Clone, Default)]
pub struct CompositeJournal {
    sinks: Vec<Arc<dyn DecisionJournal>>,
}

impl CompositeJournal {
    pub fn new(sinks: Vec<Arc<dyn DecisionJournal>>) -> Self {
        Self { sinks }
    }
}

impl DecisionJournal for CompositeJournal {
    fn record(&self, record: &DecisionRecord) {
        for sink in &self.sinks {
            sink.record(record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader};

    fn record(action: &str) -> DecisionRecord {
        DecisionRecord {
            id: Uuid::new_v4(),
            symbol: "EURUSD".to_string(),
            timestamp: Utc::now(),
            action: action.to_string(),
            reason: "test".to_string(),
            input_snapshot: InputSnapshot {
                bid: 1.1,
                ask: 1.1002,
                spread: 0.0002,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_memory_journal_keeps_order() {
        let journal = MemoryJournal::new();
        journal.record(&record("OPEN"));
        journal.record(&record("MODIFY_SL"));
        assert_eq!(journal.actions_for("EURUSD"), vec!["OPEN", "MODIFY_SL"]);
        assert!(journal.actions_for("GBPUSD").is_empty());
    }

    #[test]
    fn test_jsonl_journal_writes_one_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("decisions.jsonl");
        let journal = JsonlJournal::create(&path).unwrap();
        journal.record(&record("OPEN"));
        journal.record(&record("CLOSE"));

        let lines: Vec<String> = BufReader::new(File::open(&path).unwrap())
            .lines()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(first["action"], "OPEN");
        assert_eq!(first["input_snapshot"]["bid"], 1.1);
    }

    #[test]
    fn test_composite_fans_out() {
        let a = Arc::new(MemoryJournal::new());
        let b = Arc::new(MemoryJournal::new());
        let composite = CompositeJournal::new(vec![a.clone() as Arc<dyn DecisionJournal>, b.clone()]);
        composite.record(&record("ABORT"));
        assert_eq!(a.records().len(), 1);
        assert_eq!(b.records().len(), 1);
    }
}

// Core modules
pub mod config;
pub mod engine;
pub mod error;
pub mod execution;
pub mod exposure;
pub mod feed;
pub mod indicators;
pub mod journal;
pub mod models;
pub mod paper;
pub mod risk;
pub mod signals;
pub mod trailing;

// Re-export commonly used types
pub use config::{ConfigSnapshot, ConfigStore, SymbolConfig};
pub use engine::{DecisionEngine, EngineParts, EngineRunner};
pub use error::{ConfigError, EngineError, GatewayError};
pub use models::*;

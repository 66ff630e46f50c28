// Symbol rule sets, immutable snapshots and hot reload
pub mod schema;
pub mod store;
pub mod watcher;

pub use schema::{merge, Bias, CooldownScope, SymbolConfig, SymbolOverride};
pub use store::{
    ConfigDocument, ConfigSnapshot, ConfigStore, EngineSettings, ReloadReport, SymbolEntry,
    SymbolStatus,
};
pub use watcher::ConfigWatcher;

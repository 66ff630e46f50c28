// Per-symbol decision pipeline and the loop that drives it
pub mod decision;
pub mod lifecycle;
pub mod pipeline;
pub mod runner;
pub mod state;

pub use decision::{
    evaluate_exit, evaluate_manage, evaluate_open, Action, CloseReason, Decision, OpenContext,
};
pub use lifecycle::{Lifecycle, PositionPhase};
pub use pipeline::{CycleReport, DecisionEngine, EngineParts, SymbolOutcome};
pub use runner::EngineRunner;
pub use state::{EngineState, PipelineClaim, SymbolSlot, SymbolState};

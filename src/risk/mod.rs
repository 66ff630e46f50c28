// Risk management module
pub mod cooldown;
pub mod gate;
pub mod limits;

pub use cooldown::CooldownState;
pub use gate::RiskGate;
pub use limits::{check_limit, limit_clearance, Clearance, Denial};

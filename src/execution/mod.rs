// Order submission and market data windows
pub mod executor;
pub mod gateway;
pub mod tick_buffer;

pub use executor::{GatewayClient, RetryPolicy, SubmitOutcome};
pub use gateway::OrderGateway;
pub use tick_buffer::{build_bars, TickBuffer};

// Technical indicators module
// RSI, SMA/EMA and ATR over tick-derived prices and bars

pub mod atr;
pub mod moving_average;
pub mod rsi;

pub use atr::{calculate_atr, calculate_atr_series};
pub use moving_average::{calculate_ema, calculate_sma, sma_crossover, Crossover};
pub use rsi::calculate_rsi;

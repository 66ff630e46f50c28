//! Average True Range over mid-price bars built from ticks.
//!
//! True Range is the greatest of:
//! - High - Low
//! - |High - previous Close|
//! - |Low - previous Close|
//!
//! Smoothed with Wilder's moving average.
use crate::models::Bar;

fn true_ranges(bars: &[Bar]) -> Vec<f64> {
    bars.windows(2)
        .map(|pair| {
            let (prev, bar) = (&pair[0], &pair[1]);
            (bar.high - bar.low)
                .max((bar.high - prev.close).abs())
                .max((bar.low - prev.close).abs())
        })
        .collect()
}

/// ATR of the latest bar, in price units.
///
/// `None` until there are `period + 1` bars.
pub fn calculate_atr(bars: &[Bar], period: usize) -> Option<f64> {
    calculate_atr_series(bars, period).last().copied()
}

/// Every ATR value, the first one at bar index `period`
pub fn calculate_atr_series(bars: &[Bar], period: usize) -> Vec<f64> {
    if period == 0 || bars.len() < period + 1 {
        return Vec::new();
    }

    let ranges = true_ranges(bars);

    // First ATR is simple average of first 'period' true ranges
    let first_atr: f64 = ranges.iter().take(period).sum::<f64>() / period as f64;

    let mut series = Vec::with_capacity(ranges.len() - period + 1);
    series.push(first_atr);

    let mut atr = first_atr;
    for tr in &ranges[period..] {
        atr = (atr * (period as f64 - 1.0) + tr) / period as f64;
        series.push(atr);
    }

    series
}

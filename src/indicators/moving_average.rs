/// Calculate Simple Moving Average (SMA) of the last `period` prices
pub fn calculate_sma(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period {
        return None;
    }

    let sum: f64 = prices.iter().rev().take(period).sum();
    Some(sum / period as f64)
}

/// Calculate Exponential Moving Average (EMA), seeded with the SMA of the first `period` prices
pub fn calculate_ema(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period {
        return None;
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let seed = calculate_sma(&prices[..period], period)?;

    Some(
        prices[period..]
            .iter()
            .fold(seed, |ema, price| (price - ema) * multiplier + ema),
    )
}

/// Direction of a fast/slow moving-average cross between the previous and
/// the latest price
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Crossover {
    Bullish,
    Bearish,
    None,
}

/// Compare fast and slow SMAs with and without the latest price
pub fn sma_crossover(prices: &[f64], fast: usize, slow: usize) -> Option<Crossover> {
    if fast == 0 || fast >= slow || prices.len() < slow + 1 {
        return None;
    }

    let prev = &prices[..prices.len() - 1];
    let fast_prev = calculate_sma(prev, fast)?;
    let slow_prev = calculate_sma(prev, slow)?;
    let fast_now = calculate_sma(prices, fast)?;
    let slow_now = calculate_sma(prices, slow)?;

    let cross = if fast_prev <= slow_prev && fast_now > slow_now {
        Crossover::Bullish
    } else if fast_prev >= slow_prev && fast_now < slow_now {
        Crossover::Bearish
    } else {
        Crossover::None
    };
    Some(cross)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sma() {
        let prices = vec![100.0, 102.0, 104.0, 106.0, 108.0];
        assert_eq!(calculate_sma(&prices, 5), Some(104.0));
    }

    #[test]
    fn test_sma_insufficient_data() {
        let prices = vec![100.0, 102.0];
        assert!(calculate_sma(&prices, 5).is_none());
    }

    #[test]
    fn test_ema() {
        let prices = vec![100.0, 102.0, 104.0, 106.0, 108.0, 110.0];
        let ema = calculate_ema(&prices, 5).unwrap();
        assert!(ema > 104.0); // EMA should be above initial SMA
    }

    #[test]
    fn test_bullish_crossover() {
        // Fast (2) dips below slow (4) then the last price pulls it above
        let prices = vec![10.0, 10.0, 10.0, 9.0, 9.0, 12.0];
        assert_eq!(sma_crossover(&prices, 2, 4), Some(Crossover::Bullish));
    }

    #[test]
    fn test_no_crossover_on_steady_trend() {
        let prices = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        assert_eq!(sma_crossover(&prices, 2, 4), Some(Crossover::None));
    }
}

use super::moving_average::calculate_sma_series;
use crate::models::Candle;

/// Stochastic oscillator %K and %D, aligned with the candles
#[derive(Debug, Clone, Default)]
pub struct StochasticSeries {
    pub k: Vec<Option<f64>>,
    pub d: Vec<Option<f64>>,
}

/// Calculate the stochastic oscillator
///
/// %K = 100 * (close - lowest low) / (highest high - lowest low) over `k_period`
/// candles; undefined when that range is zero. %D is the `d_period` SMA of %K.
pub fn calculate_stochastic_series(
    candles: &[Candle],
    k_period: usize,
    d_period: usize,
) -> StochasticSeries {
    let mut k = Vec::with_capacity(candles.len());

    for i in 0..candles.len() {
        if k_period == 0 || i + 1 < k_period {
            k.push(None);
            continue;
        }

        let window = &candles[i + 1 - k_period..=i];
        let highest = window.iter().map(|c| c.high).fold(f64::MIN, f64::max);
        let lowest = window.iter().map(|c| c.low).fold(f64::MAX, f64::min);
        let range = highest - lowest;

        if range > 0.0 {
            k.push(Some(100.0 * (candles[i].close - lowest) / range));
        } else {
            k.push(None);
        }
    }

    let d = calculate_sma_series(&k, d_period);
    StochasticSeries { k, d }
}

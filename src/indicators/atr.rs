//! Average True Range (ATR) indicator
//!
//! Measures market volatility by calculating the average of true ranges over a period.
//! True Range is the greatest of:
//! - Current High - Current Low
//! - Abs(Current High - Previous Close)
//! - Abs(Current Low - Previous Close)
//!
//! Uses Wilder's smoothing (same as RSI) for the moving average.

use crate::models::Candle;

/// True ranges for candles[1..], one per consecutive pair
fn true_ranges(candles: &[Candle]) -> Vec<f64> {
    candles
        .windows(2)
        .map(|pair| {
            let high = pair[1].high;
            let low = pair[1].low;
            let prev_close = pair[0].close;

            (high - low)
                .max((high - prev_close).abs())
                .max((low - prev_close).abs())
        })
        .collect()
}

/// Calculate ATR aligned with the candles
///
/// The first ATR is the simple average of the first `period` true ranges and
/// lands on index `period`; later values apply Wilder's smoothing.
pub fn calculate_atr_series(candles: &[Candle], period: usize) -> Vec<Option<f64>> {
    let mut series = vec![None; candles.len()];
    if period == 0 || candles.len() < period + 1 {
        return series;
    }

    let ranges = true_ranges(candles);
    let p = period as f64;

    let mut atr = ranges[..period].iter().sum::<f64>() / p;
    series[period] = Some(atr);

    for i in period + 1..candles.len() {
        atr = (atr * (p - 1.0) + ranges[i - 1]) / p;
        series[i] = Some(atr);
    }

    series
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn create_test_candles(prices: &[(f64, f64, f64, f64)]) -> Vec<Candle> {
        prices
            .iter()
            .enumerate()
            .map(|(i, &(open, high, low, close))| Candle {
                timestamp: Utc::now() + chrono::Duration::minutes(5 * i as i64),
                open,
                high,
                low,
                close,
                volume: 1000.0,
            })
            .collect()
    }

    #[test]
    fn test_calculate_atr() {
        // Low volatility market
        let candles = create_test_candles(&[(100.0, 101.0, 99.0, 100.0); 15]);
        let atr = calculate_atr_series(&candles, 14);

        assert!(atr[13].is_none());
        // ATR equals the constant high-low range
        assert_eq!(atr[14], Some(2.0));
    }

    #[test]
    fn test_calculate_atr_high_volatility() {
        // High volatility market with gaps
        let high_vol_prices = vec![
            (100.0, 105.0, 95.0, 102.0),
            (102.0, 110.0, 98.0, 105.0),
            (105.0, 108.0, 92.0, 95.0),
            (95.0, 103.0, 88.0, 100.0),
            (100.0, 115.0, 97.0, 110.0),
            (110.0, 112.0, 95.0, 98.0),
            (98.0, 108.0, 90.0, 105.0),
            (105.0, 120.0, 100.0, 115.0),
            (115.0, 118.0, 105.0, 110.0),
            (110.0, 125.0, 108.0, 120.0),
            (120.0, 130.0, 115.0, 125.0),
            (125.0, 128.0, 110.0, 115.0),
            (115.0, 122.0, 105.0, 118.0),
            (118.0, 130.0, 115.0, 125.0),
            (125.0, 135.0, 120.0, 130.0),
        ];

        let candles = create_test_candles(&high_vol_prices);
        let atr = calculate_atr_series(&candles, 14);

        // ATR should be higher for volatile market
        assert!(atr[14].unwrap() > 10.0);
    }

    #[test]
    fn test_wilder_smoothing_after_seed() {
        let mut prices = vec![(100.0, 101.0, 99.0, 100.0); 3];
        prices.push((100.0, 108.0, 100.0, 104.0)); // True range 8
        let candles = create_test_candles(&prices);
        let atr = calculate_atr_series(&candles, 2);

        assert_eq!(atr[2], Some(2.0));
        assert_eq!(atr[3], Some(5.0)); // (2 * 1 + 8) / 2
    }

    #[test]
    fn test_insufficient_data() {
        let candles = create_test_candles(&[(100.0, 101.0, 99.0, 100.0); 2]);
        let atr = calculate_atr_series(&candles, 14);

        assert!(atr.iter().all(|v| v.is_none()));
    }
}

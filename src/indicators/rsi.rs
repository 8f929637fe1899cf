/// RSI below this level is oversold
pub const RSI_OVERSOLD: f64 = 30.0;

/// RSI above this level is overbought
pub const RSI_OVERBOUGHT: f64 = 70.0;

/// Calculate a Relative Strength Index (RSI) series aligned with `prices`
///
/// RSI measures the magnitude of recent price changes to evaluate
/// overbought or oversold conditions.
///
/// Values:
/// - RSI > 70: Overbought
/// - RSI < 30: Oversold
///
/// Average gain and loss start as the simple average of the first `period`
/// changes and are then Wilder-smoothed, so the first defined entry sits at
/// index `period`.
pub fn calculate_rsi_series(prices: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut series = vec![None; prices.len()];
    if period == 0 || prices.len() < period + 1 {
        return series;
    }

    let changes: Vec<f64> = prices.windows(2).map(|w| w[1] - w[0]).collect();
    let gain = |change: f64| change.max(0.0);
    let loss = |change: f64| (-change).max(0.0);
    let p = period as f64;

    let mut avg_gain = changes[..period].iter().map(|&c| gain(c)).sum::<f64>() / p;
    let mut avg_loss = changes[..period].iter().map(|&c| loss(c)).sum::<f64>() / p;
    series[period] = Some(rsi_from_averages(avg_gain, avg_loss));

    for i in period + 1..prices.len() {
        let change = changes[i - 1];
        avg_gain = (avg_gain * (p - 1.0) + gain(change)) / p;
        avg_loss = (avg_loss * (p - 1.0) + loss(change)) / p;
        series[i] = Some(rsi_from_averages(avg_gain, avg_loss));
    }

    series
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }

    let rs = avg_gain / avg_loss;
    100.0 - (100.0 / (1.0 + rs))
}

/// `Some(true)` when RSI is below the oversold level
pub fn is_oversold(rsi: Option<f64>) -> Option<bool> {
    rsi.map(|v| v < RSI_OVERSOLD)
}

/// `Some(true)` when RSI is above the overbought level
pub fn is_overbought(rsi: Option<f64>) -> Option<bool> {
    rsi.map(|v| v > RSI_OVERBOUGHT)
}

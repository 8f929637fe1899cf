use super::moving_average::calculate_ema_series;

/// MACD line, signal line and histogram, aligned with the input prices
#[derive(Debug, Clone, Default)]
pub struct MacdSeries {
    pub macd: Vec<Option<f64>>,
    pub signal: Vec<Option<f64>>,
    pub diff: Vec<Option<f64>>,
}

impl MacdSeries {
    /// Whether the MACD line is above its signal line at `index`
    ///
    /// This is a level, not an edge; crossovers are detected by comparing
    /// two consecutive values.
    pub fn cross_state(&self, index: usize) -> Option<bool> {
        match (self.macd.get(index)?, self.signal.get(index)?) {
            (Some(macd), Some(signal)) => Some(macd > signal),
            _ => None,
        }
    }
}

/// Calculate MACD: EMA(fast) - EMA(slow), with an EMA(signal) of that line
pub fn calculate_macd_series(
    prices: &[f64],
    fast: usize,
    slow: usize,
    signal: usize,
) -> MacdSeries {
    let closes: Vec<Option<f64>> = prices.iter().copied().map(Some).collect();
    let ema_fast = calculate_ema_series(&closes, fast);
    let ema_slow = calculate_ema_series(&closes, slow);

    let macd: Vec<Option<f64>> = ema_fast
        .iter()
        .zip(&ema_slow)
        .map(|(f, s)| Some((*f)? - (*s)?))
        .collect();
    let signal_line = calculate_ema_series(&macd, signal);
    let diff = macd
        .iter()
        .zip(&signal_line)
        .map(|(m, s)| Some((*m)? - (*s)?))
        .collect();

    MacdSeries {
        macd,
        signal: signal_line,
        diff,
    }
}

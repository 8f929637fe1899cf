/// Calculate a Simple Moving Average (SMA) series aligned with the input
///
/// An entry is defined once `period` consecutive defined inputs end at it.
/// Any undefined input inside the window leaves that entry undefined.
pub fn calculate_sma_series(values: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    let mut series = Vec::with_capacity(values.len());

    for i in 0..values.len() {
        if period == 0 || i + 1 < period {
            series.push(None);
            continue;
        }

        let sum: Option<f64> = values[i + 1 - period..=i].iter().copied().sum();
        series.push(sum.map(|s| s / period as f64));
    }

    series
}

/// Calculate an Exponential Moving Average (EMA) series aligned with the input
///
/// Starts from the first defined value and smooths with multiplier
/// `2 / (period + 1)` (no bias adjustment). Entries stay undefined until `period`
/// values have been seen. An undefined input restarts the average.
pub fn calculate_ema_series(values: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    if period == 0 {
        return vec![None; values.len()];
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let mut series = Vec::with_capacity(values.len());
    let mut ema: Option<f64> = None;
    let mut seen = 0;

    for value in values {
        match *value {
            None => {
                ema = None;
                seen = 0;
                series.push(None);
            }
            Some(price) => {
                let next = match ema {
                    Some(prev) => (price - prev) * multiplier + prev,
                    None => price,
                };
                ema = Some(next);
                seen += 1;
                series.push(if seen >= period { ema } else { None });
            }
        }
    }

    series
}

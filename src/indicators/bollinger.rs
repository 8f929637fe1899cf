/// Bollinger Bands at one candle
///
/// Rolling SMA of closes +/- `num_std` population standard deviations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BollingerBand {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
    /// upper - lower
    pub width: f64,
    /// Position of the close inside the band; undefined when the band is flat
    pub pct: Option<f64>,
}

/// Calculate Bollinger Bands aligned with `prices`
pub fn calculate_bollinger_series(
    prices: &[f64],
    period: usize,
    num_std: f64,
) -> Vec<Option<BollingerBand>> {
    let mut series = Vec::with_capacity(prices.len());

    for i in 0..prices.len() {
        if period == 0 || i + 1 < period {
            series.push(None);
            continue;
        }

        let window = &prices[i + 1 - period..=i];
        let middle = window.iter().sum::<f64>() / period as f64;
        let variance = window.iter().map(|p| (p - middle).powi(2)).sum::<f64>() / period as f64;
        let std_dev = variance.sqrt();

        let upper = middle + num_std * std_dev;
        let lower = middle - num_std * std_dev;
        let width = upper - lower;
        let pct = if upper > lower {
            Some((prices[i] - lower) / width)
        } else {
            None
        };

        series.push(Some(BollingerBand {
            upper,
            middle,
            lower,
            width,
            pct,
        }));
    }

    series
}

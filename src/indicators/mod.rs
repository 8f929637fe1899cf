// Technical indicators module
// Computes MA/EMA, RSI, Bollinger Bands, MACD, Stochastic and ATR per candle

pub mod atr;
pub mod bollinger;
pub mod macd;
pub mod moving_average;
pub mod rsi;
pub mod stochastic;

pub use atr::calculate_atr_series;
pub use bollinger::{calculate_bollinger_series, BollingerBand};
pub use macd::{calculate_macd_series, MacdSeries};
pub use moving_average::{calculate_ema_series, calculate_sma_series};
pub use rsi::{calculate_rsi_series, RSI_OVERBOUGHT, RSI_OVERSOLD};
pub use stochastic::{calculate_stochastic_series, StochasticSeries};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Candle;

/// Indicator window parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorParams {
    pub ma_fast: usize,
    pub ma_slow: usize,
    pub ma_long: usize,
    pub ema_fast: usize,
    pub ema_slow: usize,
    pub macd_signal: usize,
    pub rsi_period: usize,
    pub bb_period: usize,
    pub bb_std_dev: f64,
    pub stoch_k: usize,
    pub stoch_d: usize,
    pub atr_period: usize,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        Self {
            ma_fast: 9,
            ma_slow: 21,
            ma_long: 50,
            ema_fast: 12,
            ema_slow: 26,
            macd_signal: 9,
            rsi_period: 14,
            bb_period: 20,
            bb_std_dev: 2.0,
            stoch_k: 14,
            stoch_d: 3,
            atr_period: 14,
        }
    }
}

impl IndicatorParams {
    /// Candles needed before every indicator has a value (50 with defaults)
    pub fn min_warmup(&self) -> usize {
        [
            self.ma_long,
            self.ma_slow,
            (self.ema_slow + self.macd_signal).saturating_sub(1),
            self.rsi_period + 1,
            self.bb_period,
            (self.stoch_k + self.stoch_d).saturating_sub(1),
            self.atr_period + 1,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
    }
}

/// Indicator values at one candle
///
/// `None` means "not yet available": the lookback window is not filled, or the
/// value is mathematically undefined (flat Bollinger band, flat stochastic range).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub timestamp: DateTime<Utc>,
    pub close: f64,
    pub ma_fast: Option<f64>, // MA_9
    pub ma_slow: Option<f64>, // MA_21
    pub ma_long: Option<f64>, // MA_50
    pub ema_fast: Option<f64>,
    pub ema_slow: Option<f64>,
    pub rsi: Option<f64>,
    pub bb_upper: Option<f64>,
    pub bb_middle: Option<f64>,
    pub bb_lower: Option<f64>,
    pub bb_width: Option<f64>,
    pub bb_pct: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub macd_diff: Option<f64>,
    pub macd_cross: Option<bool>,
    pub stoch_k: Option<f64>,
    pub stoch_d: Option<f64>,
    pub atr: Option<f64>,
}

impl IndicatorSnapshot {
    /// Snapshot with every indicator undefined
    pub fn empty(timestamp: DateTime<Utc>, close: f64) -> Self {
        Self {
            timestamp,
            close,
            ma_fast: None,
            ma_slow: None,
            ma_long: None,
            ema_fast: None,
            ema_slow: None,
            rsi: None,
            bb_upper: None,
            bb_middle: None,
            bb_lower: None,
            bb_width: None,
            bb_pct: None,
            macd: None,
            macd_signal: None,
            macd_diff: None,
            macd_cross: None,
            stoch_k: None,
            stoch_d: None,
            atr: None,
        }
    }

    pub fn rsi_oversold(&self) -> Option<bool> {
        rsi::is_oversold(self.rsi)
    }

    pub fn rsi_overbought(&self) -> Option<bool> {
        rsi::is_overbought(self.rsi)
    }
}

/// Computes the full indicator series over a candle window
///
/// Recomputes from scratch on every call; output is a pure function of the
/// candles and parameters.
#[derive(Debug, Clone, Default)]
pub struct IndicatorEngine {
    params: IndicatorParams,
}

impl IndicatorEngine {
    pub fn new(params: IndicatorParams) -> Self {
        Self { params }
    }

    pub fn min_warmup(&self) -> usize {
        self.params.min_warmup()
    }

    /// One snapshot per candle, same order and length as `candles`
    pub fn compute(&self, candles: &[Candle]) -> Vec<IndicatorSnapshot> {
        let p = &self.params;
        let prices: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let closes: Vec<Option<f64>> = prices.iter().copied().map(Some).collect();

        let ma_fast = calculate_sma_series(&closes, p.ma_fast);
        let ma_slow = calculate_sma_series(&closes, p.ma_slow);
        let ma_long = calculate_sma_series(&closes, p.ma_long);
        let ema_fast = calculate_ema_series(&closes, p.ema_fast);
        let ema_slow = calculate_ema_series(&closes, p.ema_slow);
        let rsi = calculate_rsi_series(&prices, p.rsi_period);
        let bands = calculate_bollinger_series(&prices, p.bb_period, p.bb_std_dev);
        let macd = calculate_macd_series(&prices, p.ema_fast, p.ema_slow, p.macd_signal);
        let stoch = calculate_stochastic_series(candles, p.stoch_k, p.stoch_d);
        let atr = calculate_atr_series(candles, p.atr_period);

        candles
            .iter()
            .enumerate()
            .map(|(i, candle)| {
                let band = bands[i];
                IndicatorSnapshot {
                    timestamp: candle.timestamp,
                    close: candle.close,
                    ma_fast: ma_fast[i],
                    ma_slow: ma_slow[i],
                    ma_long: ma_long[i],
                    ema_fast: ema_fast[i],
                    ema_slow: ema_slow[i],
                    rsi: rsi[i],
                    bb_upper: band.map(|b| b.upper),
                    bb_middle: band.map(|b| b.middle),
                    bb_lower: band.map(|b| b.lower),
                    bb_width: band.map(|b| b.width),
                    bb_pct: band.and_then(|b| b.pct),
                    macd: macd.macd[i],
                    macd_signal: macd.signal[i],
                    macd_diff: macd.diff[i],
                    macd_cross: macd.cross_state(i),
                    stoch_k: stoch.k[i],
                    stoch_d: stoch.d[i],
                    atr: atr[i],
                }
            })
            .collect()
    }
}

use crate::error::{BotError, ExchangeError};
use crate::indicators::IndicatorSnapshot;
use crate::models::{Candle, Signal};
use crate::Result;

/// Both %K and %D below this level vote BUY
pub const STOCH_OVERSOLD: f64 = 20.0;

/// Both %K and %D above this level vote SELL
pub const STOCH_OVERBOUGHT: f64 = 80.0;

/// Agreeing votes needed for a BUY or SELL
const MIN_AGREEING_VOTES: usize = 3;

/// Opposing votes that veto a decision
const MAX_OPPOSING_VOTES: usize = 2;

/// The five sub-votes behind one aggregated signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteBreakdown {
    pub rsi: Signal,
    pub macd: Signal,
    pub ma_cross: Signal,
    pub bollinger: Signal,
    pub stochastic: Signal,
}

impl VoteBreakdown {
    pub fn votes(&self) -> [Signal; 5] {
        [
            self.rsi,
            self.macd,
            self.ma_cross,
            self.bollinger,
            self.stochastic,
        ]
    }

    pub fn buy_votes(&self) -> usize {
        self.votes().iter().filter(|&&v| v == Signal::Buy).count()
    }

    pub fn sell_votes(&self) -> usize {
        self.votes().iter().filter(|&&v| v == Signal::Sell).count()
    }

    /// Aggregated decision
    pub fn signal(&self) -> Signal {
        combine_votes(self.buy_votes(), self.sell_votes())
    }
}

/// Turn vote counts into a signal
///
/// Deliberately asymmetric: 3 BUY with 2 SELL is HOLD. There is no fallback
/// comparison of the two counts.
pub fn combine_votes(buy_votes: usize, sell_votes: usize) -> Signal {
    if buy_votes >= MIN_AGREEING_VOTES && sell_votes < MAX_OPPOSING_VOTES {
        Signal::Buy
    } else if sell_votes >= MIN_AGREEING_VOTES && buy_votes < MAX_OPPOSING_VOTES {
        Signal::Sell
    } else {
        Signal::Hold
    }
}

/// RSI crossing into oversold (BUY) or overbought (SELL) on this candle
pub fn rsi_vote(latest: &IndicatorSnapshot, previous: &IndicatorSnapshot) -> Signal {
    if let (Some(true), Some(false)) = (latest.rsi_oversold(), previous.rsi_oversold()) {
        Signal::Buy
    } else if let (Some(true), Some(false)) = (latest.rsi_overbought(), previous.rsi_overbought()) {
        Signal::Sell
    } else {
        Signal::Hold
    }
}

/// MACD line newly above (BUY) or below (SELL) its signal line
pub fn macd_vote(latest: &IndicatorSnapshot, previous: &IndicatorSnapshot) -> Signal {
    match (latest.macd_cross, previous.macd_cross) {
        (Some(true), Some(false)) => Signal::Buy,
        (Some(false), Some(true)) => Signal::Sell,
        _ => Signal::Hold,
    }
}

/// Fast MA newly above (BUY) or below (SELL) the slow MA
pub fn ma_cross_vote(latest: &IndicatorSnapshot, previous: &IndicatorSnapshot) -> Signal {
    let (Some(fast), Some(slow), Some(prev_fast), Some(prev_slow)) = (
        latest.ma_fast,
        latest.ma_slow,
        previous.ma_fast,
        previous.ma_slow,
    ) else {
        return Signal::Hold;
    };

    if fast > slow && prev_fast <= prev_slow {
        Signal::Buy
    } else if fast < slow && prev_fast >= prev_slow {
        Signal::Sell
    } else {
        Signal::Hold
    }
}

/// Close outside the Bollinger envelope (level, not edge)
pub fn bollinger_vote(latest: &IndicatorSnapshot) -> Signal {
    match (latest.bb_lower, latest.bb_upper) {
        (Some(lower), _) if latest.close < lower => Signal::Buy,
        (_, Some(upper)) if latest.close > upper => Signal::Sell,
        _ => Signal::Hold,
    }
}

/// %K and %D both oversold or both overbought (level, not edge)
pub fn stochastic_vote(latest: &IndicatorSnapshot) -> Signal {
    match (latest.stoch_k, latest.stoch_d) {
        (Some(k), Some(d)) if k < STOCH_OVERSOLD && d < STOCH_OVERSOLD => Signal::Buy,
        (Some(k), Some(d)) if k > STOCH_OVERBOUGHT && d > STOCH_OVERBOUGHT => Signal::Sell,
        _ => Signal::Hold,
    }
}

/// First indicator the aggregator needs that is still undefined
fn missing_field(snapshot: &IndicatorSnapshot) -> Option<&'static str> {
    if snapshot.rsi.is_none() {
        Some("RSI")
    } else if snapshot.macd_cross.is_none() {
        Some("MACD cross")
    } else if snapshot.ma_fast.is_none() || snapshot.ma_slow.is_none() {
        Some("moving averages")
    } else if snapshot.bb_lower.is_none() || snapshot.bb_upper.is_none() {
        Some("Bollinger Bands")
    } else if snapshot.stoch_k.is_none() || snapshot.stoch_d.is_none() {
        Some("stochastic")
    } else {
        None
    }
}

/// Multi-indicator vote over the two most recent snapshots
#[derive(Debug, Clone)]
pub struct SignalAggregator {
    min_candles: usize,
}

impl SignalAggregator {
    /// `min_candles` is the indicator warm-up; shorter series never vote
    pub fn new(min_candles: usize) -> Self {
        Self {
            min_candles: min_candles.max(2),
        }
    }

    pub fn min_candles(&self) -> usize {
        self.min_candles
    }

    /// Collect the five sub-votes for `latest` against `previous`
    ///
    /// Fails with `InsufficientData` if either snapshot lacks a field a vote reads.
    pub fn aggregate(
        &self,
        latest: &IndicatorSnapshot,
        previous: &IndicatorSnapshot,
    ) -> Result<VoteBreakdown> {
        for (label, snapshot) in [("latest", latest), ("previous", previous)] {
            if let Some(field) = missing_field(snapshot) {
                return Err(BotError::InsufficientData(format!(
                    "{} snapshot has no {} value",
                    label, field
                )));
            }
        }

        Ok(VoteBreakdown {
            rsi: rsi_vote(latest, previous),
            macd: macd_vote(latest, previous),
            ma_cross: ma_cross_vote(latest, previous),
            bollinger: bollinger_vote(latest),
            stochastic: stochastic_vote(latest),
        })
    }

    /// Aggregate the last two snapshots of a full series, enforcing warm-up
    pub fn evaluate(&self, snapshots: &[IndicatorSnapshot]) -> Result<VoteBreakdown> {
        if snapshots.len() < self.min_candles {
            return Err(BotError::InsufficientData(format!(
                "{} candles, need {}",
                snapshots.len(),
                self.min_candles
            )));
        }

        let latest = &snapshots[snapshots.len() - 1];
        let previous = &snapshots[snapshots.len() - 2];
        self.aggregate(latest, previous)
    }
}

/// Validate that candles are strictly ascending by timestamp
///
/// # Returns
/// * `Ok(())` if every candle is later than the one before it
/// * `Err` (as a data fetch failure) on unsorted or duplicate timestamps
pub fn validate_candle_order(candles: &[Candle]) -> Result<()> {
    for window in candles.windows(2) {
        if window[1].timestamp <= window[0].timestamp {
            return Err(BotError::DataFetch(ExchangeError::Payload(format!(
                "Candles out of order: {} followed by {}",
                window[0].timestamp.format("%Y-%m-%d %H:%M:%S"),
                window[1].timestamp.format("%Y-%m-%d %H:%M:%S")
            ))));
        }
    }

    Ok(())
}

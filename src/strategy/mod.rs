// Signal generation module
pub mod signals;

pub use signals::{
    combine_votes, validate_candle_order, SignalAggregator, VoteBreakdown, STOCH_OVERBOUGHT,
    STOCH_OVERSOLD,
};

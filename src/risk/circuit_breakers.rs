use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Daily-loss guard on new entries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakers {
    pub max_daily_loss_pct: f64,
}

impl Default for CircuitBreakers {
    fn default() -> Self {
        Self {
            max_daily_loss_pct: 0.05, // -5% daily
        }
    }
}

/// Realized results for the current UTC day
#[derive(Debug, Clone, PartialEq)]
pub struct TradingState {
    pub day: NaiveDate,
    pub day_start_balance: f64,
    pub daily_pnl: f64,
    pub daily_trades: u32,
}

impl TradingState {
    pub fn new(balance: f64, now: DateTime<Utc>) -> Self {
        Self {
            day: now.date_naive(),
            day_start_balance: balance,
            daily_pnl: 0.0,
            daily_trades: 0,
        }
    }

    /// Reset the counters when `now` falls on a later day; returns true if it did
    pub fn roll_day(&mut self, now: DateTime<Utc>, balance: f64) -> bool {
        let today = now.date_naive();
        if today <= self.day {
            return false;
        }

        tracing::info!(
            "New trading day {} (previous day P&L: {:.2} over {} trades)",
            today,
            self.daily_pnl,
            self.daily_trades
        );
        *self = Self::new(balance, now);
        true
    }

    /// Count an executed trade; exits also carry their realized P&L
    pub fn record_trade(&mut self, realized_pnl: Option<f64>) {
        self.daily_trades += 1;
        if let Some(pnl) = realized_pnl {
            self.daily_pnl += pnl;
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CircuitBreakerTrip {
    DailyLoss,
}

impl CircuitBreakers {
    pub fn new(max_daily_loss_pct: f64) -> Self {
        Self { max_daily_loss_pct }
    }

    pub fn check(&self, state: &TradingState) -> Result<(), CircuitBreakerTrip> {
        if state.day_start_balance <= 0.0 {
            return Ok(());
        }

        let daily_loss_pct = state.daily_pnl / state.day_start_balance;
        if daily_loss_pct < -self.max_daily_loss_pct {
            return Err(CircuitBreakerTrip::DailyLoss);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_circuit_breaker_daily_loss() {
        let breakers = CircuitBreakers::default();
        let mut state = TradingState::new(10000.0, noon());

        // Simulate -6% daily loss
        state.record_trade(Some(-600.0));

        let result = breakers.check(&state);
        assert_eq!(result, Err(CircuitBreakerTrip::DailyLoss));
    }

    #[test]
    fn test_circuit_breaker_ok_at_limit() {
        let breakers = CircuitBreakers::default();
        let mut state = TradingState::new(10000.0, noon());

        // Exactly -5% does not trip
        state.record_trade(Some(-500.0));
        assert!(breakers.check(&state).is_ok());
    }

    #[test]
    fn test_circuit_breaker_ok() {
        let breakers = CircuitBreakers::default();
        let state = TradingState::new(10000.0, noon());

        let result = breakers.check(&state);
        assert!(result.is_ok());
    }

    #[test]
    fn test_entries_do_not_move_pnl() {
        let mut state = TradingState::new(10000.0, noon());
        state.record_trade(None);
        state.record_trade(Some(25.0));

        assert_eq!(state.daily_trades, 2);
        assert_eq!(state.daily_pnl, 25.0);
    }

    #[test]
    fn test_roll_day_resets_at_utc_midnight() {
        let mut state = TradingState::new(10000.0, noon());
        state.record_trade(Some(-800.0));

        // Same day: nothing changes
        assert!(!state.roll_day(noon() + Duration::hours(11), 9200.0));
        assert_eq!(state.daily_pnl, -800.0);

        // Next day: fresh counters from the current balance
        assert!(state.roll_day(noon() + Duration::hours(12), 9200.0));
        assert_eq!(state.daily_pnl, 0.0);
        assert_eq!(state.daily_trades, 0);
        assert_eq!(state.day_start_balance, 9200.0);
        assert!(CircuitBreakers::default().check(&state).is_ok());
    }
}

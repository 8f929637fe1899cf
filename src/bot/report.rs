use std::fmt;

use chrono::{DateTime, Utc};

use crate::config::TradingMode;
use crate::models::{Signal, TradeAction};

/// Human-readable summary printed after every completed tick
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub time: DateTime<Utc>,
    pub pair: String,
    pub quote: String,
    pub mode: TradingMode,
    pub price: f64,
    pub signal: Signal,
    pub action: TradeAction,
    pub position: &'static str,
    pub balance: f64,
    pub rsi: Option<f64>,
    pub macd: Option<f64>,
}

impl StatusReport {
    /// One-line form for the log
    pub fn summary(&self) -> String {
        format!(
            "{} {} price={} signal={} action={} position={} balance={} rsi={} macd={}",
            self.mode,
            self.pair,
            format_amount(self.price),
            self.signal,
            self.action,
            self.position,
            format_amount(self.balance),
            format_optional(self.rsi, 2),
            format_optional(self.macd, 6)
        )
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(50);
        writeln!(f, "{}", rule)?;
        writeln!(f, "Time: {}", self.time.format("%Y-%m-%d %H:%M:%S"))?;
        writeln!(f, "Pair: {} [{}]", self.pair, self.mode)?;
        writeln!(f, "Price: {} {}", format_amount(self.price), self.quote)?;
        writeln!(f, "Signal: {}", self.signal)?;
        writeln!(f, "Action: {}", self.action)?;
        writeln!(f, "Position: {}", self.position)?;
        writeln!(f, "Balance: {} {}", format_amount(self.balance), self.quote)?;
        writeln!(f, "RSI: {}", format_optional(self.rsi, 2))?;
        writeln!(f, "MACD: {}", format_optional(self.macd, 6))?;
        write!(f, "{}", rule)
    }
}

fn format_optional(value: Option<f64>, decimals: usize) -> String {
    match value {
        Some(v) => format!("{:.*}", decimals, v),
        None => "n/a".to_string(),
    }
}

/// Whole units with thousands separators, e.g. `1,250,000`
pub fn format_amount(value: f64) -> String {
    let rounded = format!("{:.0}", value);
    let (sign, digits) = match rounded.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", rounded.as_str()),
    };

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    format!("{}{}", sign, grouped)
}

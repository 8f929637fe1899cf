use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use config::builder::DefaultState;
use config::ConfigBuilder;
use serde::{Deserialize, Serialize};

use crate::api::indodax::INDODAX_API_BASE;
use crate::api::split_pair;
use crate::error::BotError;
use crate::indicators::IndicatorParams;
use crate::Result;

pub const DEFAULT_CONFIG_PATH: &str = "config/bot.toml";
const ENV_PREFIX: &str = "SCALPER";
const API_KEY_VAR: &str = "INDODAX_API_KEY";
const SECRET_KEY_VAR: &str = "INDODAX_SECRET_KEY";

/// Position sizing and exit thresholds, as fractions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub max_position_size: f64, // of balance per entry
    pub stop_loss: f64,         // below entry
    pub take_profit: f64,       // above entry
    pub max_daily_loss: f64,    // of the day's starting balance
    /// When set, entries place the stop `ATR × multiplier` below the entry price
    pub atr_stop_multiplier: Option<f64>,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_position_size: 0.1,
            stop_loss: 0.02,
            take_profit: 0.015,
            max_daily_loss: 0.05,
            atr_stop_multiplier: None,
        }
    }
}

/// Raw settings as read from the config file and `SCALPER_*` variables
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub pair: String,
    pub timeframe: String,
    pub paper_trading: bool,
    pub initial_balance: f64,
    pub candle_limit: usize,
    pub error_backoff_secs: u64,
    pub database_url: String,
    pub log_file: Option<String>,
    pub api_base_url: String,
    pub risk: RiskConfig,
    pub indicators: IndicatorParams,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            pair: "btc_idr".to_string(),
            timeframe: "5m".to_string(),
            paper_trading: true,
            initial_balance: 1_000_000.0,
            candle_limit: 100,
            error_backoff_secs: 60,
            database_url: "sqlite://trades.db".to_string(),
            log_file: Some("trading_log.log".to_string()),
            api_base_url: INDODAX_API_BASE.to_string(),
            risk: RiskConfig::default(),
            indicators: IndicatorParams::default(),
        }
    }
}

impl Settings {
    /// Load settings from `path` (required) or the optional default file,
    /// then overlay `SCALPER_*` environment variables
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(p) => config::File::from(p),
            None => config::File::from(Path::new(DEFAULT_CONFIG_PATH)).required(false),
        };

        let builder = config::Config::builder()
            .add_source(file)
            .add_source(environment());

        Self::from_builder(builder)
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let settings = builder.build()?;
        Ok(settings.try_deserialize()?)
    }
}

/// `SCALPER_PAIR`, `SCALPER_RISK__STOP_LOSS`: one `_` after the prefix, `__` between levels
fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradingMode {
    Paper,
    Live,
}

impl fmt::Display for TradingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradingMode::Paper => f.write_str("PAPER"),
            TradingMode::Live => f.write_str("LIVE"),
        }
    }
}

/// Candle interval such as `5m`, `1h` or `1d`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeframe {
    seconds: u64,
}

impl Timeframe {
    pub fn from_seconds(seconds: u64) -> Self {
        Self { seconds }
    }

    pub fn seconds(&self) -> u64 {
        self.seconds
    }

    /// Exchange chart resolution: minutes, or `<n>D` for whole days
    pub fn resolution(&self) -> String {
        resolution_for(self.seconds)
    }
}

/// Chart resolution for an interval in seconds
pub fn resolution_for(seconds: u64) -> String {
    if seconds >= 86_400 && seconds % 86_400 == 0 {
        format!("{}D", seconds / 86_400)
    } else {
        (seconds / 60).to_string()
    }
}

impl FromStr for Timeframe {
    type Err = BotError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let invalid = || BotError::Config(format!("Invalid timeframe: {:?}", s));

        let unit = s.chars().last().ok_or_else(invalid)?;
        let count: u64 = s[..s.len() - unit.len_utf8()].parse().map_err(|_| invalid())?;
        let unit_secs = match unit {
            'm' => 60,
            'h' => 3_600,
            'd' => 86_400,
            _ => return Err(invalid()),
        };

        match count.checked_mul(unit_secs) {
            Some(seconds) if seconds > 0 => Ok(Self::from_seconds(seconds)),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.seconds {
            s if s % 86_400 == 0 => write!(f, "{}d", s / 86_400),
            s if s % 3_600 == 0 => write!(f, "{}h", s / 3_600),
            s => write!(f, "{}m", s / 60),
        }
    }
}

/// Exchange API credentials
#[derive(Clone, PartialEq)]
pub struct Credentials {
    pub api_key: String,
    pub secret_key: String,
}

impl Credentials {
    /// Read `INDODAX_API_KEY` / `INDODAX_SECRET_KEY`; `None` unless both are set
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var(API_KEY_VAR).ok().filter(|v| !v.is_empty())?;
        let secret_key = std::env::var(SECRET_KEY_VAR).ok().filter(|v| !v.is_empty())?;
        Some(Self {
            api_key,
            secret_key,
        })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// Validated, immutable bot configuration
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub pair: String,
    pub timeframe: Timeframe,
    pub mode: TradingMode,
    pub risk: RiskConfig,
    pub indicators: IndicatorParams,
    pub initial_balance: f64,
    pub candle_limit: usize,
    pub error_backoff_secs: u64,
    pub database_url: String,
    pub log_file: Option<PathBuf>,
    pub api_base_url: String,
    pub credentials: Option<Credentials>,
}

impl BotConfig {
    pub fn from_settings(settings: Settings, credentials: Option<Credentials>) -> Result<Self> {
        let pair = settings.pair.trim().to_lowercase();
        if split_pair(&pair).is_none() {
            return Err(BotError::Config(format!(
                "Pair must look like base_quote, got {:?}",
                settings.pair
            )));
        }

        let timeframe: Timeframe = settings.timeframe.parse()?;

        let mode = if settings.paper_trading {
            TradingMode::Paper
        } else {
            TradingMode::Live
        };
        if mode == TradingMode::Live && credentials.is_none() {
            return Err(BotError::Config(format!(
                "Live trading requires {} and {}",
                API_KEY_VAR, SECRET_KEY_VAR
            )));
        }

        validate_risk(&settings.risk)?;
        validate_indicators(&settings.indicators)?;

        if !settings.initial_balance.is_finite() || settings.initial_balance < 0.0 {
            return Err(BotError::Config(format!(
                "initial_balance must be a non-negative number, got {}",
                settings.initial_balance
            )));
        }

        let warmup = settings.indicators.min_warmup();
        if settings.candle_limit < warmup {
            return Err(BotError::Config(format!(
                "candle_limit {} is below the indicator warm-up of {} candles",
                settings.candle_limit, warmup
            )));
        }

        Ok(Self {
            pair,
            timeframe,
            mode,
            risk: settings.risk,
            indicators: settings.indicators,
            initial_balance: settings.initial_balance,
            candle_limit: settings.candle_limit,
            error_backoff_secs: settings.error_backoff_secs,
            database_url: settings.database_url,
            log_file: settings.log_file.filter(|f| !f.is_empty()).map(PathBuf::from),
            api_base_url: settings.api_base_url.trim_end_matches('/').to_string(),
            credentials,
        })
    }
}

fn validate_risk(risk: &RiskConfig) -> Result<()> {
    let fractions = [
        ("max_position_size", risk.max_position_size),
        ("stop_loss", risk.stop_loss),
        ("take_profit", risk.take_profit),
        ("max_daily_loss", risk.max_daily_loss),
    ];

    for (name, value) in fractions {
        if !(value > 0.0 && value < 1.0) {
            return Err(BotError::Config(format!(
                "risk.{} must be in (0, 1), got {}",
                name, value
            )));
        }
    }

    if let Some(multiplier) = risk.atr_stop_multiplier {
        if !(multiplier > 0.0 && multiplier.is_finite()) {
            return Err(BotError::Config(format!(
                "risk.atr_stop_multiplier must be positive, got {}",
                multiplier
            )));
        }
    }

    Ok(())
}

fn validate_indicators(params: &IndicatorParams) -> Result<()> {
    let windows = [
        ("ma_fast", params.ma_fast),
        ("ma_slow", params.ma_slow),
        ("ma_long", params.ma_long),
        ("ema_fast", params.ema_fast),
        ("ema_slow", params.ema_slow),
        ("macd_signal", params.macd_signal),
        ("rsi_period", params.rsi_period),
        ("bb_period", params.bb_period),
        ("stoch_k", params.stoch_k),
        ("stoch_d", params.stoch_d),
        ("atr_period", params.atr_period),
    ];

    if let Some((name, _)) = windows.iter().find(|(_, w)| *w == 0) {
        return Err(BotError::Config(format!("indicators.{} must be at least 1", name)));
    }
    if params.ma_fast >= params.ma_slow {
        return Err(BotError::Config("indicators.ma_fast must be below ma_slow".into()));
    }
    if params.ema_fast >= params.ema_slow {
        return Err(BotError::Config("indicators.ema_fast must be below ema_slow".into()));
    }
    if !(params.bb_std_dev > 0.0) {
        return Err(BotError::Config("indicators.bb_std_dev must be positive".into()));
    }

    Ok(())
}

use thiserror::Error;

/// Wire-level failures of the exchange client
#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Malformed payload: {0}")]
    Payload(String),

    #[error("Exchange rejected request: {0}")]
    Rejected(String),

    #[error("Credentials are required for private endpoints")]
    MissingCredentials,
}

/// Error kinds surfaced by the trading core
///
/// The orchestrator recovers from every kind except `Config` and `Unexpected`
/// within the tick that raised it.
#[derive(Error, Debug)]
pub enum BotError {
    #[error("Market data fetch failed: {0}")]
    DataFetch(#[source] ExchangeError),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Order execution failed: {0}")]
    OrderExecution(#[source] ExchangeError),

    #[error("Persistence failed: {0}")]
    Persistence(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl From<config::ConfigError> for BotError {
    fn from(e: config::ConfigError) -> Self {
        BotError::Config(e.to_string())
    }
}

impl BotError {
    pub fn is_data_fetch(&self) -> bool {
        matches!(self, BotError::DataFetch(_))
    }
}

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use governor::{Quota, RateLimiter};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha512;
use tokio::time::{sleep, Duration};

use super::{
    split_pair, BalanceSnapshot, MarketDataFeed, OrderAck, OrderGateway, OrderRequest, OrderSide,
};
use crate::config::{resolution_for, Credentials};
use crate::error::{BotError, ExchangeError};
use crate::models::Candle;
use crate::Result;

pub const INDODAX_API_BASE: &str = "https://indodax.com";
const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 2000; // 2s, then 4s
const REQUEST_TIMEOUT_SECS: u64 = 30;

// Public and private endpoints share one budget
const RATE_LIMIT_RPM: NonZeroU32 = match NonZeroU32::new(180) {
    Some(n) => n,
    None => panic!("rate limit must be non-zero"),
};

type HmacSha512 = Hmac<Sha512>;

type IndodaxRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

type ExchangeResult<T> = std::result::Result<T, ExchangeError>;

/// Indodax REST client for candles, tickers, orders and balances
///
/// Cloneable; clones share the rate limiter.
#[derive(Clone)]
pub struct IndodaxClient {
    client: Client,
    base_url: String,
    credentials: Option<Credentials>,
    rate_limiter: Arc<IndodaxRateLimiter>,
    initial_backoff: Duration,
}

/// The exchange sends numbers either bare or quoted
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Numeric {
    Number(f64),
    Text(String),
}

impl Numeric {
    fn value(&self, field: &str) -> ExchangeResult<f64> {
        let value = match self {
            Numeric::Number(n) => *n,
            Numeric::Text(s) => s.trim().parse().map_err(|_| {
                ExchangeError::Payload(format!("{} is not a number: {:?}", field, s))
            })?,
        };

        if value.is_finite() {
            Ok(value)
        } else {
            Err(ExchangeError::Payload(format!("{} is not finite", field)))
        }
    }
}

/// One row of `/tradingview/history_v2`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HistoryRow {
    time: Numeric,
    open: Numeric,
    high: Numeric,
    low: Numeric,
    close: Numeric,
    volume: Numeric,
}

impl HistoryRow {
    fn to_candle(&self) -> ExchangeResult<Candle> {
        let secs = self.time.value("Time")? as i64;
        let timestamp = DateTime::from_timestamp(secs, 0)
            .ok_or_else(|| ExchangeError::Payload(format!("Time out of range: {}", secs)))?;

        Ok(Candle {
            timestamp,
            open: self.open.value("Open")?,
            high: self.high.value("High")?,
            low: self.low.value("Low")?,
            close: self.close.value("Close")?,
            volume: self.volume.value("Volume")?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct TickerResponse {
    ticker: TickerData,
}

#[derive(Debug, Deserialize)]
struct TickerData {
    last: Numeric,
}

impl IndodaxClient {
    pub fn new(base_url: &str, credentials: Option<Credentials>) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| BotError::DataFetch(ExchangeError::Http(e)))?;

        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_minute(RATE_LIMIT_RPM)));

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            rate_limiter,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
        })
    }

    /// Override the first retry delay (doubles per attempt)
    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    /// Rate-limited GET with retry on network errors, 429 and 5xx
    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> ExchangeResult<T> {
        let mut last_error = ExchangeError::Payload("no attempt made".to_string());

        for attempt in 1..=MAX_RETRIES {
            self.rate_limiter.until_ready().await;

            match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let body = response.text().await?;
                        return serde_json::from_str(&body).map_err(|e| {
                            ExchangeError::Payload(format!("Failed to parse response: {}", e))
                        });
                    }

                    let error_text = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Unknown error".to_string());
                    last_error =
                        ExchangeError::Payload(format!("HTTP {}: {}", status, error_text));

                    // Other 4xx errors won't improve on retry
                    if status.as_u16() != 429 && !status.is_server_error() {
                        return Err(last_error);
                    }
                }
                Err(e) => last_error = ExchangeError::Http(e),
            }

            if attempt < MAX_RETRIES {
                let backoff = self.initial_backoff * 2u32.pow(attempt - 1);
                tracing::warn!(
                    "Indodax request failed ({}), retrying in {:?} (attempt {}/{})",
                    last_error,
                    backoff,
                    attempt,
                    MAX_RETRIES
                );
                sleep(backoff).await;
            }
        }

        Err(last_error)
    }

    /// Signed POST to `/tapi`; never retried
    async fn private_request(
        &self,
        method: &str,
        mut params: Vec<(&str, String)>,
    ) -> ExchangeResult<Value> {
        let credentials = self
            .credentials
            .as_ref()
            .ok_or(ExchangeError::MissingCredentials)?;

        params.push(("method", method.to_string()));
        params.push(("nonce", Utc::now().timestamp_millis().to_string()));

        let body = form_body(&params)?;
        let signature = sign(&credentials.secret_key, &body)?;

        self.rate_limiter.until_ready().await;

        let response = self
            .client
            .post(format!("{}/tapi", self.base_url))
            .header("Key", &credentials.api_key)
            .header("Sign", signature)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(ExchangeError::Payload(format!("HTTP {}: {}", status, text)));
        }

        serde_json::from_str(&text)
            .map_err(|e| ExchangeError::Payload(format!("Failed to parse response: {}", e)))
    }

    async fn candles(
        &self,
        pair: &str,
        interval_secs: u64,
        limit: usize,
    ) -> ExchangeResult<Vec<Candle>> {
        let to = Utc::now().timestamp();
        let span = interval_secs.saturating_mul(limit as u64) as i64;
        let url = format!(
            "{}/tradingview/history_v2?symbol={}&tf={}&from={}&to={}",
            self.base_url,
            pair_symbol(pair),
            resolution_for(interval_secs),
            to.saturating_sub(span),
            to
        );

        let rows: Vec<HistoryRow> = self.get_json(&url).await?;
        let mut candles = rows
            .iter()
            .map(HistoryRow::to_candle)
            .collect::<ExchangeResult<Vec<_>>>()?;

        candles.sort_by_key(|c| c.timestamp);
        candles.dedup_by_key(|c| c.timestamp);
        if candles.len() > limit {
            candles.drain(..candles.len() - limit);
        }

        tracing::debug!("Fetched {} candles for {}", candles.len(), pair);
        Ok(candles)
    }

    async fn last_price(&self, pair: &str) -> ExchangeResult<f64> {
        let url = format!("{}/api/ticker/{}", self.base_url, pair_id(pair));
        let response: TickerResponse = self.get_json(&url).await?;

        let price = response.ticker.last.value("ticker.last")?;
        if price <= 0.0 {
            return Err(ExchangeError::Payload(format!("Non-positive price {}", price)));
        }
        Ok(price)
    }

    async fn trade(&self, order: &OrderRequest) -> ExchangeResult<OrderAck> {
        let (base, quote) = split_pair(&order.pair)
            .ok_or_else(|| ExchangeError::Payload(format!("Invalid pair {}", order.pair)))?;

        // Buys are sized in the quote currency, sells in the base currency
        let mut params = vec![
            ("pair", order.pair.clone()),
            ("type", order.side.as_str().to_string()),
            ("price", format_number(order.price)),
        ];
        match order.side {
            OrderSide::Buy => params.push((quote, format_number(order.price * order.amount))),
            OrderSide::Sell => params.push((base, format_number(order.amount))),
        }

        let response = self.private_request("trade", params).await?;
        let result = expect_success(&response)?;

        let order_id = match result.get("order_id") {
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::String(s)) => s.clone(),
            _ => {
                return Err(ExchangeError::Payload(format!(
                    "Acknowledgement without order_id: {}",
                    response
                )))
            }
        };

        Ok(OrderAck { order_id })
    }

    async fn balances(&self) -> ExchangeResult<BalanceSnapshot> {
        let response = self.private_request("getInfo", Vec::new()).await?;
        let result = expect_success(&response)?;

        let Some(Value::Object(entries)) = result.get("balance") else {
            return Err(ExchangeError::Payload(
                "getInfo response has no balance".to_string(),
            ));
        };

        let mut balances = HashMap::new();
        for (currency, raw) in entries {
            let amount = match raw {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            };
            match amount {
                Some(amount) => {
                    balances.insert(currency.to_lowercase(), amount);
                }
                None => tracing::debug!("Skipping non-numeric balance for {}", currency),
            }
        }

        Ok(BalanceSnapshot { balances })
    }
}

#[async_trait]
impl MarketDataFeed for IndodaxClient {
    async fn fetch_candles(
        &self,
        pair: &str,
        interval_secs: u64,
        limit: usize,
    ) -> Result<Vec<Candle>> {
        self.candles(pair, interval_secs, limit)
            .await
            .map_err(BotError::DataFetch)
    }

    async fn fetch_last_price(&self, pair: &str) -> Result<f64> {
        self.last_price(pair).await.map_err(BotError::DataFetch)
    }
}

#[async_trait]
impl OrderGateway for IndodaxClient {
    async fn submit_order(&self, order: &OrderRequest) -> Result<OrderAck> {
        self.trade(order).await.map_err(BotError::OrderExecution)
    }

    async fn query_balance(&self) -> Result<BalanceSnapshot> {
        self.balances().await.map_err(BotError::DataFetch)
    }
}

/// `{"success": 1, "return": {...}}` → the `return` object
///
/// `success: 0` is an explicit rejection; anything else is ambiguous.
fn expect_success(response: &Value) -> ExchangeResult<&Value> {
    match response.get("success").and_then(Value::as_i64) {
        Some(1) => response
            .get("return")
            .ok_or_else(|| ExchangeError::Payload(format!("Missing return: {}", response))),
        Some(0) => Err(ExchangeError::Rejected(
            response
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string(),
        )),
        _ => Err(ExchangeError::Payload(format!(
            "Ambiguous exchange response: {}",
            response
        ))),
    }
}

/// Lowercase hex HMAC-SHA512 of `body`
fn sign(secret: &str, body: &str) -> ExchangeResult<String> {
    let mut mac = HmacSha512::new_from_slice(secret.as_bytes())
        .map_err(|e| ExchangeError::Payload(format!("HMAC error: {}", e)))?;
    mac.update(body.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// The exact form body that is signed and sent
fn form_body(params: &[(&str, String)]) -> ExchangeResult<String> {
    serde_urlencoded::to_string(params)
        .map_err(|e| ExchangeError::Payload(format!("Failed to encode form: {}", e)))
}

/// Decimal string without exponent or trailing zeros, at most 8 places
fn format_number(value: f64) -> String {
    let s = format!("{:.8}", value);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s.is_empty() || s == "-" {
        "0".to_string()
    } else {
        s.to_string()
    }
}

/// `btc_idr` → `BTCIDR`
fn pair_symbol(pair: &str) -> String {
    pair.replace('_', "").to_uppercase()
}

/// `btc_idr` → `btcidr`
fn pair_id(pair: &str) -> String {
    pair.replace('_', "").to_lowercase()
}

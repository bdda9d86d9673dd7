use crate::analysis::Snapshot;
use crate::candles::{PriceSeries, decode_klines, deserialize_f64_lenient};
use crate::error::{Result, ScreenerError};
use crate::storage_utils::AppConfig;
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Where a screening run gets its data from. Calls are awaited one at a time.
pub trait MarketDataSource {
    /// Current price, 24h change and 24h quote volume for `pair`.
    fn fetch_snapshot(&self, pair: &str) -> impl Future<Output = Result<Snapshot>>;

    /// Most recent `limit` candles for `pair`, oldest first.
    fn fetch_candles(
        &self,
        pair: &str,
        interval: &str,
        limit: u32,
    ) -> impl Future<Output = Result<PriceSeries>>;
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Ticker24h {
    #[serde(deserialize_with = "deserialize_f64_lenient", default)]
    last_price: Option<f64>,
    #[serde(deserialize_with = "deserialize_f64_lenient", default)]
    price_change_percent: Option<f64>,
    #[serde(deserialize_with = "deserialize_f64_lenient", default)]
    quote_volume: Option<f64>,
}

impl Ticker24h {
    fn into_snapshot(self) -> Result<Snapshot> {
        let last_price = self
            .last_price
            .ok_or_else(|| ScreenerError::Decode("ticker has no lastPrice".to_string()))?;
        Ok(Snapshot {
            last_price,
            change_24h: self.price_change_percent,
            volume_24h: self.quote_volume,
        })
    }
}

fn calculate_request_weight(limit: u32) -> u32 {
    match limit {
        0..=99 => 1,
        100..=499 => 2,
        500..=1000 => 5,
        _ => 10,
    }
}

/// Extracts the ban expiry (ms since epoch) from a Binance `-1003` body.
fn parse_ban_until(body: &str) -> Option<u64> {
    if !body.contains("-1003") {
        return None;
    }
    let re = Regex::new(r"until\s+(\d+)").ok()?;
    re.captures(body)?.get(1)?.as_str().parse().ok()
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

fn rate_limit_error(status: StatusCode, body: String) -> ScreenerError {
    match parse_ban_until(&body) {
        Some(ban_until) => ScreenerError::RateLimited {
            retry_after_ms: ban_until.saturating_sub(now_millis()),
        },
        None => ScreenerError::Status {
            status: status.as_u16(),
            body,
        },
    }
}

/// Public Binance spot REST endpoints; no API key needed.
pub struct BinanceClient {
    client: Client,
    base_url: String,
}

impl BinanceClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Self::new(&config.base_url, Duration::from_secs(config.timeout_secs))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.get(&url).query(query).send().await?;
        let status = response.status();

        if status == StatusCode::IM_A_TEAPOT || status == StatusCode::TOO_MANY_REQUESTS {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, "exchange is throttling requests");
            return Err(rate_limit_error(status, body));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ScreenerError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json::<T>().await?)
    }
}

impl MarketDataSource for BinanceClient {
    async fn fetch_snapshot(&self, pair: &str) -> Result<Snapshot> {
        let ticker: Ticker24h = self
            .get_json("/api/v3/ticker/24hr", &[("symbol", pair.to_string())])
            .await?;
        ticker.into_snapshot()
    }

    async fn fetch_candles(&self, pair: &str, interval: &str, limit: u32) -> Result<PriceSeries> {
        debug!(pair, weight = calculate_request_weight(limit), "fetching klines");
        let params = [
            ("symbol", pair.to_string()),
            ("interval", interval.to_string()),
            ("limit", limit.to_string()),
        ];
        let raw_klines: Vec<Vec<Value>> = self.get_json("/api/v3/klines", &params).await?;
        decode_klines(raw_klines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_weight_by_limit() {
        assert_eq!(calculate_request_weight(60), 1);
        assert_eq!(calculate_request_weight(100), 2);
        assert_eq!(calculate_request_weight(1000), 5);
        assert_eq!(calculate_request_weight(1500), 10);
    }

    #[test]
    fn ban_expiry_is_parsed() {
        let body = r#"{"code":-1003,"msg":"Way too many requests; IP banned until 1700000000000. Please use the websocket for live updates to avoid bans."}"#;
        assert_eq!(parse_ban_until(body), Some(1_700_000_000_000));
        assert_eq!(parse_ban_until(r#"{"code":-1121,"msg":"Invalid symbol."}"#), None);
        assert_eq!(parse_ban_until(r#"{"code":-1003,"msg":"Too many requests."}"#), None);
    }

    #[test]
    fn past_ban_has_no_wait() {
        let body = r#"{"code":-1003,"msg":"IP banned until 1000."}"#.to_string();
        match rate_limit_error(StatusCode::IM_A_TEAPOT, body) {
            ScreenerError::RateLimited { retry_after_ms } => assert_eq!(retry_after_ms, 0),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unparseable_throttle_is_a_status_error() {
        let err = rate_limit_error(StatusCode::TOO_MANY_REQUESTS, "slow down".to_string());
        assert!(matches!(err, ScreenerError::Status { status: 429, .. }));
    }

    #[test]
    fn ticker_decodes_into_snapshot() {
        let ticker: Ticker24h = serde_json::from_str(
            r#"{"symbol":"BTCUSDT","lastPrice":"64250.10","priceChangePercent":"-1.234","quoteVolume":"1523456789.5"}"#,
        )
        .unwrap();
        assert_eq!(
            ticker.into_snapshot().unwrap(),
            Snapshot {
                last_price: 64250.10,
                change_24h: Some(-1.234),
                volume_24h: Some(1523456789.5),
            }
        );
    }

    #[test]
    fn ticker_without_price_is_rejected() {
        let ticker: Ticker24h = serde_json::from_str(r#"{"symbol":"BTCUSDT","priceChangePercent":"1.0"}"#).unwrap();
        let snapshot = ticker.into_snapshot();
        assert!(matches!(snapshot, Err(ScreenerError::Decode(_))));
    }

    #[test]
    fn base_url_is_normalized() {
        let client = BinanceClient::new("https://api.binance.com/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.base_url, "https://api.binance.com");
    }
}

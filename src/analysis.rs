//! Per-asset analysis and the batch screening pipeline.

use crate::candles::PriceSeries;
use crate::error::ScreenerError;
use crate::indicators::{
    BollingerBands, MacdParams, MacdResult, calculate_atr, calculate_bollinger, calculate_macd,
    calculate_rsi, calculate_sma,
};
use crate::market_data::MarketDataSource;
use crate::screening::{Alert, screen_coin};
use crate::storage_utils::AppConfig;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Minimum number of candles for an asset to be analyzed at all.
pub const MIN_HISTORY: usize = 50;

const RSI_PERIOD: usize = 14;
const SMA_SHORT: usize = 20;
const SMA_LONG: usize = 50;
const VOLUME_AVG_PERIOD: usize = 20;
const BOLLINGER_PERIOD: usize = 20;
const BOLLINGER_STD_DEV: f64 = 2.0;
const ATR_PERIOD: usize = 14;

/// Extra wait on top of an exchange-imposed ban.
const BAN_GRACE: Duration = Duration::from_secs(5);

/// Current market state of an asset as reported by the exchange.
#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct Snapshot {
    pub last_price: f64,
    pub change_24h: Option<f64>,
    pub volume_24h: Option<f64>,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RsiTrend {
    Up,
    Down,
    Flat,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct CoinAnalysis {
    pub symbol: String,
    pub price: f64,
    pub change_24h: Option<f64>,
    pub volume_24h: Option<f64>,
    pub sma20: Option<f64>,
    pub sma50: Option<f64>,
    pub rsi14: Option<f64>,
    pub rsi_trend: Option<RsiTrend>,
    pub macd: Option<MacdResult>,
    pub volume_ratio: Option<f64>,
    pub avg_volume_20d: Option<f64>,
    pub bollinger: Option<BollingerBands>,
    pub atr14: Option<f64>,
}

/// Builds the analysis record for one asset, or `None` when the series is
/// shorter than [`MIN_HISTORY`].
pub fn analyze_coin(symbol: &str, snapshot: Snapshot, series: &PriceSeries) -> Option<CoinAnalysis> {
    if series.len() < MIN_HISTORY {
        debug!(symbol, candles = series.len(), "not enough history");
        return None;
    }

    let closes = series.closes();
    let volumes = series.volumes();

    let rsi14 = calculate_rsi(&closes, RSI_PERIOD);
    let avg_volume_20d = calculate_sma(&volumes, VOLUME_AVG_PERIOD);
    let volume_ratio = match (snapshot.volume_24h, avg_volume_20d) {
        (Some(volume), Some(avg)) if avg > 0.0 => Some(volume / avg),
        _ => None,
    };

    Some(CoinAnalysis {
        symbol: symbol.to_string(),
        price: snapshot.last_price,
        change_24h: snapshot.change_24h,
        volume_24h: snapshot.volume_24h,
        sma20: calculate_sma(&closes, SMA_SHORT),
        sma50: calculate_sma(&closes, SMA_LONG),
        rsi14,
        rsi_trend: rsi_trend(&closes, rsi14),
        macd: calculate_macd(&closes, MacdParams::default()),
        volume_ratio,
        avg_volume_20d,
        bollinger: calculate_bollinger(&closes, BOLLINGER_PERIOD, BOLLINGER_STD_DEV),
        atr14: calculate_atr(series.candles(), ATR_PERIOD),
    })
}

/// Compares the current RSI with the RSI of the series minus its latest
/// candle. The shorter series shifts the whole lookback window by one.
fn rsi_trend(closes: &[f64], current: Option<f64>) -> Option<RsiTrend> {
    if closes.len() < RSI_PERIOD + 1 {
        return None;
    }
    let current = current?;
    let previous = calculate_rsi(&closes[..closes.len() - 1], RSI_PERIOD)?;

    Some(if current < previous {
        RsiTrend::Down
    } else if current > previous {
        RsiTrend::Up
    } else {
        RsiTrend::Flat
    })
}

/// One batch entry. `analysis` is `None` when the data could not be fetched
/// or was too short; such entries never carry alerts.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ScreenedCoin {
    pub symbol: String,
    pub analysis: Option<CoinAnalysis>,
    pub alerts: Vec<Alert>,
}

#[derive(Serialize, Debug, Clone)]
pub struct ScreeningReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub coins: Vec<ScreenedCoin>,
}

impl ScreeningReport {
    pub fn has_alerts(&self) -> bool {
        self.coins.iter().any(|coin| !coin.alerts.is_empty())
    }
}

async fn fetch_and_analyze<S: MarketDataSource>(
    source: &S,
    coin: &str,
    config: &AppConfig,
) -> Result<Option<CoinAnalysis>, ScreenerError> {
    let pair = config.pair_symbol(coin);
    let snapshot = source.fetch_snapshot(&pair).await?;
    let series = source
        .fetch_candles(&pair, &config.klines.interval, config.klines.limit)
        .await?;
    Ok(analyze_coin(coin, snapshot, &series))
}

/// Wait before the next coin after a ban. Nothing to wait for once the ban
/// has expired or when no coin is left.
fn ban_backoff(retry_after_ms: u64, is_last: bool) -> Option<Duration> {
    if retry_after_ms == 0 || is_last {
        return None;
    }
    Some(Duration::from_millis(retry_after_ms) + BAN_GRACE)
}

/// Screens every configured coin strictly one after another. A failure for
/// one coin is logged and recorded as "no analysis"; the batch always
/// completes with one entry per coin, in configuration order.
pub async fn run_screener<S: MarketDataSource>(source: &S, config: &AppConfig) -> ScreeningReport {
    let started_at = Utc::now();
    let total = config.coins.len();
    let mut coins = Vec::with_capacity(total);

    for (i, coin) in config.coins.iter().enumerate() {
        info!("[{}/{}] analyzing {}", i + 1, total, coin);

        let analysis = match fetch_and_analyze(source, coin, config).await {
            Ok(analysis) => analysis,
            Err(ScreenerError::RateLimited { retry_after_ms }) => {
                match ban_backoff(retry_after_ms, i + 1 == total) {
                    Some(wait) => {
                        warn!(coin = %coin, wait_secs = wait.as_secs(), "rate limited, backing off");
                        tokio::time::sleep(wait).await;
                    }
                    None => warn!(coin = %coin, "rate limited"),
                }
                None
            }
            Err(e) => {
                warn!(coin = %coin, error = %e, "failed to fetch market data");
                None
            }
        };

        let alerts = analysis
            .as_ref()
            .map(|a| screen_coin(a, &config.thresholds))
            .unwrap_or_default();

        match &analysis {
            Some(_) => debug!(coin = %coin, alerts = alerts.len(), "done"),
            None => info!(coin = %coin, "no analysis"),
        }

        coins.push(ScreenedCoin {
            symbol: coin.clone(),
            analysis,
            alerts,
        });

        if i + 1 < total && config.request_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(config.request_delay_ms)).await;
        }
    }

    ScreeningReport {
        started_at,
        finished_at: Utc::now(),
        coins,
    }
}

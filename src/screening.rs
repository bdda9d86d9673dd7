use crate::analysis::{CoinAnalysis, RsiTrend};
use crate::indicators::MacdTrend;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Alert {
    Oversold,
    Overbought,
    VolumeSpike,
    BullishSetup,
    BreakdownRisk,
}

impl Alert {
    pub fn label(self) -> &'static str {
        match self {
            Alert::Oversold => "OVERSOLD",
            Alert::Overbought => "OVERBOUGHT",
            Alert::VolumeSpike => "VOLUME SPIKE",
            Alert::BullishSetup => "BULLISH SETUP",
            Alert::BreakdownRisk => "BREAKDOWN RISK",
        }
    }
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct ScreeningThresholds {
    pub oversold_rsi: f64,   // strictly below
    pub overbought_rsi: f64, // strictly above
    pub volume_spike_ratio: f64,
    pub bullish_rsi_min: f64, // inclusive
    pub bullish_rsi_max: f64, // inclusive
}

impl Default for ScreeningThresholds {
    fn default() -> Self {
        Self {
            oversold_rsi: 30.0,
            overbought_rsi: 70.0,
            volume_spike_ratio: 2.0,
            bullish_rsi_min: 40.0,
            bullish_rsi_max: 60.0,
        }
    }
}

impl ScreeningThresholds {
    /// Rejects bands that would let OVERSOLD and OVERBOUGHT fire together or
    /// leave the bullish RSI range empty.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(self.oversold_rsi <= self.overbought_rsi) {
            anyhow::bail!(
                "oversold_rsi ({}) must not exceed overbought_rsi ({})",
                self.oversold_rsi,
                self.overbought_rsi
            );
        }
        if !(self.bullish_rsi_min <= self.bullish_rsi_max) {
            anyhow::bail!(
                "bullish_rsi_min ({}) must not exceed bullish_rsi_max ({})",
                self.bullish_rsi_min,
                self.bullish_rsi_max
            );
        }
        Ok(())
    }
}

/// Evaluates every rule against the same analysis. Alerts come back in rule
/// declaration order and no rule suppresses another.
pub fn screen_coin(coin: &CoinAnalysis, thresholds: &ScreeningThresholds) -> Vec<Alert> {
    let mut alerts = Vec::new();

    if coin.rsi14.is_some_and(|rsi| rsi < thresholds.oversold_rsi) {
        alerts.push(Alert::Oversold);
    }

    if coin.rsi14.is_some_and(|rsi| rsi > thresholds.overbought_rsi) {
        alerts.push(Alert::Overbought);
    }

    if coin
        .volume_ratio
        .is_some_and(|ratio| ratio > thresholds.volume_spike_ratio)
    {
        alerts.push(Alert::VolumeSpike);
    }

    if is_bullish_setup(coin, thresholds) {
        alerts.push(Alert::BullishSetup);
    }

    if is_breakdown_risk(coin) {
        alerts.push(Alert::BreakdownRisk);
    }

    alerts
}

fn is_bullish_setup(coin: &CoinAnalysis, thresholds: &ScreeningThresholds) -> bool {
    let (Some(sma20), Some(sma50), Some(macd), Some(rsi)) =
        (coin.sma20, coin.sma50, coin.macd, coin.rsi14)
    else {
        return false;
    };

    coin.price > sma20
        && coin.price > sma50
        && macd.trend == MacdTrend::Bullish
        && (thresholds.bullish_rsi_min..=thresholds.bullish_rsi_max).contains(&rsi)
}

fn is_breakdown_risk(coin: &CoinAnalysis) -> bool {
    let (Some(sma20), Some(sma50), Some(macd), Some(_), Some(rsi_trend)) =
        (coin.sma20, coin.sma50, coin.macd, coin.rsi14, coin.rsi_trend)
    else {
        return false;
    };

    coin.price < sma20
        && coin.price < sma50
        && macd.trend == MacdTrend::Bearish
        && rsi_trend == RsiTrend::Down
}

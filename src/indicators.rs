//! Technical indicators computed over closing prices or candles.
//!
//! Every function is pure. A series shorter than an indicator's minimum
//! history yields `None`, never a numeric placeholder.

use crate::candles::Candle;
use serde::Serialize;
use ta::Next;
use ta::indicators::TrueRange;

/// Arithmetic mean of the last `period` values.
pub fn calculate_sma(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    let window = &values[values.len() - period..];
    Some(window.iter().sum::<f64>() / period as f64)
}

/// Exponential moving average seeded with the SMA of the *first* `period`
/// values, then `ema = price * k + ema * (1 - k)` with `k = 2 / (period + 1)`
/// over the remaining values in order.
pub fn calculate_ema(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    let multiplier = 2.0 / (period as f64 + 1.0);
    let seed = values[..period].iter().sum::<f64>() / period as f64;

    Some(
        values[period..]
            .iter()
            .fold(seed, |ema, &price| price * multiplier + ema * (1.0 - multiplier)),
    )
}

/// Relative Strength Index from simple averages of the last `period` deltas.
/// Saturates at 100 when there were no losses in the window.
pub fn calculate_rsi(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period + 1 {
        return None;
    }

    let window = &closes[closes.len() - period - 1..];
    let (gains, losses) = window
        .windows(2)
        .map(|pair| pair[1] - pair[0])
        .fold((0.0, 0.0), |(gains, losses), delta| {
            if delta > 0.0 {
                (gains + delta, losses)
            } else if delta < 0.0 {
                (gains, losses - delta)
            } else {
                (gains, losses)
            }
        });

    let avg_gain = gains / period as f64;
    let avg_loss = losses / period as f64;

    if avg_loss == 0.0 {
        return Some(100.0);
    }

    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MacdTrend {
    Bullish,
    Bearish,
}

impl MacdTrend {
    /// Bullish only when the MACD line is strictly above the signal line.
    pub fn from_lines(macd_line: f64, signal_line: f64) -> Self {
        if macd_line > signal_line {
            MacdTrend::Bullish
        } else {
            MacdTrend::Bearish
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MacdTrend::Bullish => "Bullish",
            MacdTrend::Bearish => "Bearish",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacdParams {
    pub fast: usize,
    pub slow: usize,
    pub signal: usize,
}

impl Default for MacdParams {
    fn default() -> Self {
        Self {
            fast: 12,
            slow: 26,
            signal: 9,
        }
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct MacdResult {
    pub macd_line: f64,
    pub signal_line: f64,
    pub histogram: f64,
    pub trend: MacdTrend,
}

/// MACD line history: for every prefix of `closes` ending at index
/// `slow - 1` or later, the fast EMA minus the slow EMA of that prefix.
///
/// Each prefix is recomputed from scratch, which is quadratic in the series
/// length. The values differ from an incremental EMA and callers rely on them.
fn macd_history(closes: &[f64], params: MacdParams) -> Vec<f64> {
    (params.slow.saturating_sub(1)..closes.len())
        .filter_map(|end| {
            let window = &closes[..=end];
            Some(calculate_ema(window, params.fast)? - calculate_ema(window, params.slow)?)
        })
        .collect()
}

pub fn calculate_macd(closes: &[f64], params: MacdParams) -> Option<MacdResult> {
    if closes.len() < params.slow + params.signal {
        return None;
    }

    let history = macd_history(closes, params);
    if history.len() < params.signal {
        return None;
    }

    let macd_line = *history.last()?;
    let signal_line = calculate_ema(&history, params.signal)?;
    Some(MacdResult {
        macd_line,
        signal_line,
        histogram: macd_line - signal_line,
        trend: MacdTrend::from_lines(macd_line, signal_line),
    })
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BandPosition {
    NearUpper,
    NearLower,
    AboveUpper,
    BelowLower,
    Between,
}

impl BandPosition {
    pub fn label(self) -> &'static str {
        match self {
            BandPosition::NearUpper => "near upper (overbought)",
            BandPosition::NearLower => "near lower (oversold)",
            BandPosition::AboveUpper => "above upper (strong overbought)",
            BandPosition::BelowLower => "below lower (strong oversold)",
            BandPosition::Between => "between bands (normal)",
        }
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct BollingerBands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
    pub position: BandPosition,
}

/// Fraction of the band width treated as "near" a band.
const BAND_PROXIMITY: f64 = 0.05;

/// Bollinger Bands over the last `period` closes using the population
/// standard deviation. The position is classified against the latest close.
pub fn calculate_bollinger(
    closes: &[f64],
    period: usize,
    std_dev_multiplier: f64,
) -> Option<BollingerBands> {
    let middle = calculate_sma(closes, period)?;
    let window = &closes[closes.len() - period..];

    let variance = window.iter().map(|p| (p - middle).powi(2)).sum::<f64>() / period as f64;
    let std_dev = variance.sqrt();

    let upper = middle + std_dev_multiplier * std_dev;
    let lower = middle - std_dev_multiplier * std_dev;
    let price = *closes.last()?;

    Some(BollingerBands {
        upper,
        middle,
        lower,
        position: classify_band_position(price, upper, lower),
    })
}

/// Proximity checks run before the strict above/below checks, upper first.
fn classify_band_position(price: f64, upper: f64, lower: f64) -> BandPosition {
    let band_width = upper - lower;
    let (from_upper, from_lower) = if band_width > 0.0 {
        ((upper - price) / band_width, (price - lower) / band_width)
    } else {
        (0.0, 0.0)
    };

    if from_upper < BAND_PROXIMITY {
        BandPosition::NearUpper
    } else if from_lower < BAND_PROXIMITY {
        BandPosition::NearLower
    } else if price > upper {
        BandPosition::AboveUpper
    } else if price < lower {
        BandPosition::BelowLower
    } else {
        BandPosition::Between
    }
}

/// Average True Range: plain mean of the last `period` true ranges. The
/// first candle only provides the previous close for the second.
pub fn calculate_atr(candles: &[Candle], period: usize) -> Option<f64> {
    if period == 0 || candles.len() < period + 1 {
        return None;
    }

    let mut true_range = TrueRange::default();
    let ranges: Vec<f64> = candles
        .iter()
        .map(|candle| true_range.next(candle))
        .skip(1)
        .collect();

    let window = &ranges[ranges.len() - period..];
    Some(window.iter().sum::<f64>() / period as f64)
}

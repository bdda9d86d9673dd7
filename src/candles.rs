use crate::error::Result;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Positional layout of a Binance kline row.
pub const KLINE_KEYS: &[&str] = &[
    "openTime",
    "open",
    "high",
    "low",
    "close",
    "volume",
    "closeTime",
    "quoteAssetVolume",
    "numberOfTrades",
    "takerBuyBaseAssetVolume",
    "takerBuyQuoteAssetVolume",
    "ignore",
];

/// One period's OHLCV summary. `open_time` is informational; only the
/// position of a candle inside a [`PriceSeries`] carries meaning.
#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct Candle {
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn new(open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            open_time: 0,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

impl ta::Open for Candle {
    fn open(&self) -> f64 {
        self.open
    }
}

impl ta::High for Candle {
    fn high(&self) -> f64 {
        self.high
    }
}

impl ta::Low for Candle {
    fn low(&self) -> f64 {
        self.low
    }
}

impl ta::Close for Candle {
    fn close(&self) -> f64 {
        self.close
    }
}

impl ta::Volume for Candle {
    fn volume(&self) -> f64 {
        self.volume
    }
}

/// Candles for a single asset, oldest first. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceSeries {
    candles: Vec<Candle>,
}

impl PriceSeries {
    pub fn new(candles: Vec<Candle>) -> Self {
        Self { candles }
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }

    pub fn volumes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.volume).collect()
    }
}

impl FromIterator<Candle> for PriceSeries {
    fn from_iter<I: IntoIterator<Item = Candle>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

// --- Lenient decoding of exchange rows ---

#[derive(Deserialize, Debug)]
struct InputKline {
    #[serde(rename = "openTime", default)]
    open_time: Option<i64>,
    #[serde(deserialize_with = "deserialize_f64_lenient", default)]
    open: Option<f64>,
    #[serde(deserialize_with = "deserialize_f64_lenient", default)]
    high: Option<f64>,
    #[serde(deserialize_with = "deserialize_f64_lenient", default)]
    low: Option<f64>,
    #[serde(deserialize_with = "deserialize_f64_lenient", default)]
    close: Option<f64>,
    #[serde(deserialize_with = "deserialize_f64_lenient", default)]
    volume: Option<f64>,
}

impl InputKline {
    fn into_candle(self) -> Option<Candle> {
        Some(Candle {
            open_time: self.open_time.unwrap_or_default(),
            open: self.open?,
            high: self.high?,
            low: self.low?,
            close: self.close?,
            volume: self.volume?,
        })
    }
}

struct LenientF64Visitor;

impl<'de> Visitor<'de> for LenientF64Visitor {
    type Value = Option<f64>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a float, an integer, or a string representing a number")
    }

    fn visit_f64<E>(self, v: f64) -> std::result::Result<Self::Value, E> {
        Ok(Some(v))
    }

    fn visit_i64<E>(self, v: i64) -> std::result::Result<Self::Value, E> {
        Ok(Some(v as f64))
    }

    fn visit_u64<E>(self, v: u64) -> std::result::Result<Self::Value, E> {
        Ok(Some(v as f64))
    }

    fn visit_str<E>(self, v: &str) -> std::result::Result<Self::Value, E>
    where
        E: de::Error,
    {
        if v.trim().is_empty() {
            Ok(None)
        } else {
            v.parse::<f64>().map(Some).map_err(E::custom)
        }
    }

    fn visit_unit<E>(self) -> std::result::Result<Self::Value, E> {
        Ok(None)
    }
}

/// Accepts numbers, numeric strings, blank strings and null.
pub fn deserialize_f64_lenient<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(LenientF64Visitor)
}

/// Builds a series from raw kline rows. Rows missing any OHLCV value are
/// dropped; a row with a malformed number fails the whole decode.
pub fn decode_klines(raw_klines: Vec<Vec<Value>>) -> Result<PriceSeries> {
    let mut candles = Vec::with_capacity(raw_klines.len());

    for row in raw_klines {
        let keyed: Map<String, Value> = KLINE_KEYS
            .iter()
            .zip(row)
            .map(|(&key, val)| (key.to_string(), val))
            .collect();

        let kline: InputKline = serde_json::from_value(Value::Object(keyed))?;
        match kline.into_candle() {
            Some(candle) => candles.push(candle),
            None => tracing::debug!("skipping incomplete kline row"),
        }
    }

    Ok(PriceSeries::new(candles))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(values: Value) -> Vec<Value> {
        values.as_array().cloned().unwrap()
    }

    #[test]
    fn decodes_binance_rows_with_string_prices() {
        let raw = vec![
            row(json!([1700000000000i64, "100.5", "110.0", "95.25", "105.0", "1234.5", 1700086399999i64, "0", 10, "0", "0", "0"])),
            row(json!([1700086400000i64, "105.0", "108.0", "101.0", "102.0", "900", 1700172799999i64, "0", 8, "0", "0", "0"])),
        ];

        let series = decode_klines(raw).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(
            series.candles()[0],
            Candle {
                open_time: 1700000000000,
                open: 100.5,
                high: 110.0,
                low: 95.25,
                close: 105.0,
                volume: 1234.5,
            }
        );
        assert_eq!(series.closes(), vec![105.0, 102.0]);
        assert_eq!(series.volumes(), vec![1234.5, 900.0]);
    }

    #[test]
    fn accepts_plain_numbers_and_short_rows() {
        let raw = vec![row(json!([0, 1, 2.5, 0.5, 2, 10]))];
        let series = decode_klines(raw).unwrap();
        assert_eq!(series.candles()[0], Candle::new(1.0, 2.5, 0.5, 2.0, 10.0));
    }

    #[test]
    fn skips_rows_with_missing_values() {
        let raw = vec![
            row(json!([0, "1", "2", "0.5", "", "10"])),
            row(json!([0, "1", "2", "0.5", null, "10"])),
            row(json!([0, "1", "2"])),
            row(json!([0, "1", "2", "0.5", "1.5", "10"])),
        ];
        let series = decode_klines(raw).unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series.closes(), vec![1.5]);
    }

    #[test]
    fn rejects_malformed_numbers() {
        let raw = vec![row(json!([0, "abc", "2", "0.5", "1.5", "10"]))];
        assert!(decode_klines(raw).is_err());
    }

    #[test]
    fn series_collects_from_iterator() {
        let series: PriceSeries = (1..=3)
            .map(|i| Candle::new(i as f64, i as f64, i as f64, i as f64, 0.0))
            .collect();
        assert_eq!(series.len(), 3);
        assert!(!series.is_empty());
        assert!(PriceSeries::default().is_empty());
    }
}

//! Crypto market screener: technical indicators, screening rules and
//! report rendering over exchange candle data.

pub mod analysis;
pub mod candles;
pub mod error;
pub mod indicators;
pub mod market_data;
pub mod report;
pub mod screening;
pub mod storage_utils;

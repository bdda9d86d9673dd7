//! Text rendering of a screening run.

use crate::analysis::{CoinAnalysis, ScreenedCoin, ScreeningReport};
use crate::indicators::MacdTrend;
use chrono::{DateTime, Utc};
use comfy_table::{
    Attribute, Cell, CellAlignment, Color, ContentArrangement, Table,
    modifiers::UTF8_ROUND_CORNERS, presets::UTF8_BORDERS_ONLY,
};
use std::fmt::Write;

pub const NOT_AVAILABLE: &str = "N/A";

const RULE_WIDTH: usize = 100;
const OVERSOLD_RSI: f64 = 30.0;
const OVERBOUGHT_RSI: f64 = 70.0;

/// Dollar amount with a B/M/K suffix for large magnitudes.
pub fn format_number(num: Option<f64>, decimals: usize) -> String {
    let Some(num) = num else {
        return NOT_AVAILABLE.to_string();
    };
    if num >= 1_000_000_000.0 {
        format!("${:.2}B", num / 1_000_000_000.0)
    } else if num >= 1_000_000.0 {
        format!("${:.2}M", num / 1_000_000.0)
    } else if num >= 1_000.0 {
        format!("${:.2}K", num / 1_000.0)
    } else {
        format!("${:.*}", decimals, num)
    }
}

/// 4 decimals below 1, 2 decimals below 1000, thousands separators above.
pub fn format_price(price: Option<f64>) -> String {
    match price {
        None => NOT_AVAILABLE.to_string(),
        Some(p) if p >= 1000.0 => format!("${}", with_thousands_separator(p)),
        Some(p) if p >= 1.0 => format!("${:.2}", p),
        Some(p) => format!("${:.4}", p),
    }
}

fn with_thousands_separator(value: f64) -> String {
    let fixed = format!("{:.2}", value);
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("{}.{}", grouped, frac_part)
}

pub fn format_change(change: Option<f64>) -> String {
    change.map_or_else(|| NOT_AVAILABLE.to_string(), |c| format!("{:+.2}%", c))
}

pub fn format_rsi(rsi: Option<f64>) -> String {
    rsi.map_or_else(|| NOT_AVAILABLE.to_string(), |r| format!("{:.1}", r))
}

pub fn format_volume_ratio(ratio: Option<f64>) -> String {
    ratio.map_or_else(|| NOT_AVAILABLE.to_string(), |r| format!("{:.2}x", r))
}

/// Single-indicator status derived from RSI alone.
pub fn rsi_status(rsi: Option<f64>) -> &'static str {
    match rsi {
        None => NOT_AVAILABLE,
        Some(r) if r < OVERSOLD_RSI => "Oversold",
        Some(r) if r > OVERBOUGHT_RSI => "Overbought",
        Some(_) => "Normal",
    }
}

fn format_time(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

fn status_color(status: &str) -> Color {
    match status {
        "Oversold" => Color::Green,
        "Overbought" => Color::Red,
        "Normal" => Color::Grey,
        _ => Color::DarkGrey,
    }
}

fn macd_cell(analysis: Option<&CoinAnalysis>) -> Cell {
    match analysis.and_then(|a| a.macd) {
        Some(macd) => {
            let color = match macd.trend {
                MacdTrend::Bullish => Color::Green,
                MacdTrend::Bearish => Color::Red,
            };
            Cell::new(macd.trend.label()).fg(color)
        }
        None => Cell::new(NOT_AVAILABLE).fg(Color::DarkGrey),
    }
}

fn summary_row(coin: &ScreenedCoin) -> Vec<Cell> {
    let analysis = coin.analysis.as_ref();
    let rsi = analysis.and_then(|a| a.rsi14);
    let status = rsi_status(rsi);

    vec![
        Cell::new(&coin.symbol).fg(Color::Cyan),
        Cell::new(format_price(analysis.map(|a| a.price))).set_alignment(CellAlignment::Right),
        Cell::new(format_change(analysis.and_then(|a| a.change_24h)))
            .set_alignment(CellAlignment::Right),
        Cell::new(format_rsi(rsi)).set_alignment(CellAlignment::Right),
        macd_cell(analysis),
        Cell::new(format_volume_ratio(analysis.and_then(|a| a.volume_ratio)))
            .set_alignment(CellAlignment::Right),
        Cell::new(status).fg(status_color(status)),
    ]
}

/// One row per coin in batch order; coins without analysis show `N/A`.
pub fn summary_table(report: &ScreeningReport) -> Table {
    let header = ["Coin", "Price", "24h %", "RSI", "MACD", "Vol Ratio", "Status"];

    let mut table = Table::new();
    table
        .load_preset(UTF8_BORDERS_ONLY)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            header
                .iter()
                .map(|title| Cell::new(title).add_attribute(Attribute::Bold)),
        );

    for coin in &report.coins {
        table.add_row(summary_row(coin));
    }

    table
}

/// Snapshot line and fired alerts for every coin with at least one alert.
pub fn render_alerts(report: &ScreeningReport) -> String {
    let mut out = String::new();

    for coin in report.coins.iter().filter(|c| !c.alerts.is_empty()) {
        let analysis = coin.analysis.as_ref();
        let _ = writeln!(
            out,
            "\n{} ({}, {}, RSI: {})",
            coin.symbol,
            format_price(analysis.map(|a| a.price)),
            format_change(analysis.and_then(|a| a.change_24h)),
            format_rsi(analysis.and_then(|a| a.rsi14)),
        );
        for alert in &coin.alerts {
            let _ = writeln!(out, "  → {}", alert);
        }
    }

    if out.is_empty() {
        out.push_str("\nNo coins matching screening conditions at this time.\n");
        out.push_str("   All coins are within normal parameters.\n");
    }

    out
}

pub fn render_report(report: &ScreeningReport) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    let mut out = String::new();

    let _ = writeln!(out, "{rule}\n  CRYPTO SCREENER - MULTI-COIN ANALYSIS\n{rule}");
    let _ = writeln!(out, "Analyzed {} coins", report.coins.len());
    let _ = writeln!(out, "Started at: {}\n", format_time(report.started_at));

    let _ = writeln!(out, "{rule}\n  COIN SCREENER SUMMARY\n{rule}");
    let _ = writeln!(out, "{}", summary_table(report));

    let _ = writeln!(out, "\n{rule}\n  ALERTS - COINS MATCHING SCREENING CONDITIONS\n{rule}");
    out.push_str(&render_alerts(report));

    let _ = writeln!(out, "\n{rule}");
    let _ = writeln!(out, "Screening completed at: {}", format_time(report.finished_at));
    out
}

pub fn render_json(report: &ScreeningReport) -> serde_json::Result<String> {
    serde_json::to_string_pretty(report)
}

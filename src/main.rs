use anyhow::Context;
use crypto_screener::analysis::run_screener;
use crypto_screener::market_data::BinanceClient;
use crypto_screener::report::{render_json, render_report};
use crypto_screener::storage_utils::{AppConfig, AsyncStorageManager, OutputFormat};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout carries only the report.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let storage = AsyncStorageManager::new_relative("storage").await?;
    let mut config = storage
        .load_or_init_config()
        .await
        .context("failed to load storage/config.json")?;
    config.apply_env_overrides()?;

    let client = BinanceClient::from_config(&config).context("failed to build HTTP client")?;

    let Some(interval) = config.watch_interval_secs else {
        return run_once(&client, &config, false).await;
    };

    info!(interval_secs = interval, "watch mode, press Ctrl+C to stop");
    loop {
        run_once(&client, &config, true).await?;

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(interval)) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("stopping");
                return Ok(());
            }
        }
    }
}

async fn run_once(client: &BinanceClient, config: &AppConfig, clear: bool) -> anyhow::Result<()> {
    info!(
        coins = config.coins.len(),
        interval = %config.klines.interval,
        "screening against {}",
        config.base_url
    );
    let report = run_screener(client, config).await;

    let output = match config.output {
        OutputFormat::Table => render_report(&report),
        OutputFormat::Json => render_json(&report)?,
    };

    if clear {
        if let Err(e) = clearscreen::clear() {
            warn!(error = %e, "could not clear terminal");
        }
    }
    println!("{}", output);
    Ok(())
}

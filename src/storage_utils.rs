use crate::screening::ScreeningThresholds;
use anyhow::Context;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

// CONFIGURATION STRUCTS
// Every field has a default so a partial config.json still loads.

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct KlineConfig {
    pub interval: String, // e.g., "1d", "4h"
    pub limit: u32,       // candles per request
}

impl Default for KlineConfig {
    fn default() -> Self {
        Self {
            interval: "1d".to_string(),
            limit: 60,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            other => Err(anyhow::anyhow!("unknown output format: {other}")),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub coins: Vec<String>,  // base assets, e.g. "BTC"
    pub quote_asset: String, // e.g., "USDT"
    pub klines: KlineConfig,
    pub request_delay_ms: u64, // pause between assets
    pub base_url: String,
    pub timeout_secs: u64,
    pub thresholds: ScreeningThresholds,
    pub output: OutputFormat,
    pub watch_interval_secs: Option<u64>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            coins: ["BTC", "ETH", "SOL", "XRP", "HYPE", "AAVE", "PUMP", "STABLE", "ENA", "BNB"]
                .into_iter()
                .map(String::from)
                .collect(),
            quote_asset: "USDT".to_string(),
            klines: KlineConfig::default(),
            request_delay_ms: 500,
            base_url: "https://api.binance.com".to_string(),
            timeout_secs: 10,
            thresholds: ScreeningThresholds::default(),
            output: OutputFormat::Table,
            watch_interval_secs: None,
        }
    }
}

impl AppConfig {
    /// Exchange pair for a base asset, e.g. "BTC" -> "BTCUSDT".
    pub fn pair_symbol(&self, coin: &str) -> String {
        format!("{}{}", coin, self.quote_asset)
    }

    /// Applies `SCREENER_COINS` and `SCREENER_OUTPUT` on top of the file values.
    pub fn apply_env_overrides(&mut self) -> anyhow::Result<()> {
        if let Ok(coins) = std::env::var("SCREENER_COINS") {
            self.coins = parse_coin_list(&coins);
        }
        if let Ok(output) = std::env::var("SCREENER_OUTPUT") {
            self.output = output.parse().context("invalid SCREENER_OUTPUT")?;
        }
        Ok(())
    }
}

/// Splits a comma separated list, trimming and upper-casing entries.
pub fn parse_coin_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

// STORAGE MANAGER

pub struct AsyncStorageManager {
    // Absolute path to the storage directory (e.g., ".../target/debug/storage")
    pub base_dir: PathBuf,
}

impl AsyncStorageManager {
    /// Creates a manager rooted at `relative_path` next to the running binary.
    pub async fn new_relative<P: AsRef<Path>>(relative_path: P) -> anyhow::Result<Self> {
        let exe_path = std::env::current_exe()?;

        let base_dir = exe_path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Could not find binary directory"))?
            .join(relative_path);

        Self::new(base_dir).await
    }

    /// Creates a manager rooted at `base_dir`, creating the directory up front
    /// so later saves never have to check for it.
    pub async fn new<P: Into<PathBuf>>(base_dir: P) -> anyhow::Result<Self> {
        let base_dir = base_dir.into();
        if !base_dir.exists() {
            fs::create_dir_all(&base_dir).await?;
        }
        Ok(Self { base_dir })
    }

    /// Serializes `data` to `<filename>.json`. Writes go to a `.tmp` file
    /// first and are renamed into place.
    pub async fn save<T: Serialize>(&self, filename: &str, data: &T) -> anyhow::Result<()> {
        let file_name = format!("{}.json", filename);
        let final_path = self.base_dir.join(&file_name);
        let tmp_path = self.base_dir.join(format!("{}.tmp", file_name));

        let json_bytes = serde_json::to_vec_pretty(data)?;

        fs::write(&tmp_path, json_bytes).await?;
        fs::rename(tmp_path, final_path).await?;

        Ok(())
    }

    pub async fn load<T: DeserializeOwned>(&self, filename: &str) -> anyhow::Result<T> {
        let path = self.base_dir.join(format!("{}.json", filename));

        // serde_json validates UTF-8 while parsing, so read raw bytes.
        let content = fs::read(&path).await?;

        let data = serde_json::from_slice(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(data)
    }

    pub fn exists(&self, filename: &str) -> bool {
        self.base_dir.join(format!("{}.json", filename)).exists()
    }

    /// Loads the config, writing the defaults first when no file exists yet.
    pub async fn load_or_init_config(&self) -> anyhow::Result<AppConfig> {
        if !self.exists("config") {
            let config = AppConfig::default();
            self.save("config", &config).await?;
            info!(path = %self.base_dir.join("config.json").display(), "wrote default config");
            return Ok(config);
        }
        let config: AppConfig = self.load("config").await?;
        config
            .thresholds
            .validate()
            .context("invalid screening thresholds in config.json")?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coin_list_is_normalized() {
        assert_eq!(parse_coin_list(" btc, eth ,,sol "), vec!["BTC", "ETH", "SOL"]);
        assert!(parse_coin_list(" , ").is_empty());
    }

    #[test]
    fn output_format_parses() {
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!(" table ".parse::<OutputFormat>().unwrap(), OutputFormat::Table);
        assert!("csv".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn partial_config_falls_back_to_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{ "coins": ["DOGE"], "klines": { "limit": 100 } }"#).unwrap();
        assert_eq!(config.coins, vec!["DOGE"]);
        assert_eq!(config.klines.limit, 100);
        assert_eq!(config.klines.interval, "1d");
        assert_eq!(config.quote_asset, "USDT");
        assert_eq!(config.thresholds, ScreeningThresholds::default());
        assert_eq!(config.pair_symbol("DOGE"), "DOGEUSDT");
    }

    #[tokio::test]
    async fn config_is_initialized_then_reloaded() {
        let dir = tempfile::tempdir().unwrap();
        let storage = AsyncStorageManager::new(dir.path().join("storage")).await.unwrap();

        assert!(!storage.exists("config"));
        let first = storage.load_or_init_config().await.unwrap();
        assert_eq!(first, AppConfig::default());
        assert!(storage.exists("config"));
        assert!(!storage.base_dir.join("config.json.tmp").exists());

        let edited = AppConfig {
            coins: vec!["ADA".to_string()],
            output: OutputFormat::Json,
            ..first
        };
        storage.save("config", &edited).await.unwrap();
        assert_eq!(storage.load_or_init_config().await.unwrap(), edited);
    }

    #[tokio::test]
    async fn inverted_thresholds_fail_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let storage = AsyncStorageManager::new(dir.path()).await.unwrap();
        tokio::fs::write(
            dir.path().join("config.json"),
            br#"{ "thresholds": { "oversold_rsi": 80, "overbought_rsi": 20 } }"#,
        )
        .await
        .unwrap();

        let err = storage.load_or_init_config().await.unwrap_err();
        assert!(format!("{err:#}").contains("oversold_rsi"));
    }

    #[tokio::test]
    async fn malformed_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let storage = AsyncStorageManager::new(dir.path()).await.unwrap();
        tokio::fs::write(dir.path().join("config.json"), b"{ not json").await.unwrap();
        assert!(storage.load_or_init_config().await.is_err());
    }
}

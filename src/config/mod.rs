//! Configuration management for the price feed
//!
//! Loads from TOML/YAML/JSON files + environment variables via .env

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::time::Duration;

use crate::oracle::MAX_DECIMALS;
use crate::types::{AssetDescriptor, TradeAggregationParams};

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub feed: FeedConfig,
    pub scan: ScanConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Captured ledger data (JSON) to replay
    pub fixture_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// Oracle contract (`C…` strkey)
    pub contract: String,
    /// Quote asset, e.g. `{ type = 1, code = "XLM" }`
    pub base_asset: AssetDescriptor,
    /// Tracked assets
    pub assets: Vec<AssetDescriptor>,
    /// Fractional digits of published prices
    pub decimals: u32,
    /// Window length in seconds
    pub timeframe_secs: u64,
    /// Window start (unix seconds); defaults to the current timeframe
    pub from: Option<u64>,
    /// Keep aggregating every timeframe instead of running once
    pub follow: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScanConfig {
    /// Deadline for streaming one window in milliseconds
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Emit JSON log lines
    pub json: bool,
    /// Default filter when RUST_LOG is unset
    pub filter: String,
}

impl ScanConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl FeedConfig {
    /// Request for the window starting at `from`
    pub fn params(&self, from: u64) -> TradeAggregationParams {
        TradeAggregationParams {
            contract: self.contract.clone(),
            base_asset: self.base_asset.clone(),
            assets: self.assets.clone(),
            decimals: self.decimals,
            from,
            period: self.timeframe_secs,
        }
    }
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let builder = Self::defaults(Config::builder())?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (PRICE_FEED__*)
            .add_source(
                Environment::with_prefix("PRICE_FEED")
                    .prefix_separator("__")
                    .separator("__"),
            );

        let app_config: AppConfig = builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        app_config.validate()?;
        Ok(app_config)
    }

    /// Load from a single file, still applying defaults
    pub fn load_from(path: &str) -> Result<Self> {
        let app_config: AppConfig = Self::defaults(Config::builder())?
            .add_source(File::with_name(path))
            .build()
            .with_context(|| format!("Failed to read configuration {}", path))?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        app_config.validate()?;
        Ok(app_config)
    }

    fn defaults(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
        Ok(builder
            // Store defaults
            .set_default("store.fixture_path", "./data/ledger.json")?
            // Feed defaults
            .set_default("feed.decimals", 14)?
            .set_default("feed.timeframe_secs", 300)?
            .set_default("feed.follow", false)?
            // Scan defaults
            .set_default("scan.timeout_ms", 60_000)?
            // Logging defaults
            .set_default("logging.json", false)?
            .set_default("logging.filter", "info")?)
    }

    /// Reject settings the oracle would refuse anyway, before touching the store
    pub fn validate(&self) -> Result<()> {
        if self.feed.timeframe_secs == 0 {
            bail!("feed.timeframe_secs must be positive");
        }
        if self.feed.decimals > MAX_DECIMALS {
            bail!(
                "feed.decimals {} exceeds maximum {}",
                self.feed.decimals,
                MAX_DECIMALS
            );
        }
        if self.feed.assets.is_empty() {
            bail!("feed.assets must list at least one asset");
        }
        if self.scan.timeout_ms == 0 {
            bail!("scan.timeout_ms must be positive");
        }
        Ok(())
    }

    /// Generate a digest of the config for logging
    pub fn digest(&self) -> String {
        format!(
            "contract={} assets={} decimals={} timeframe={}s follow={} fixture={}",
            self.feed.contract,
            self.feed.assets.len(),
            self.feed.decimals,
            self.feed.timeframe_secs,
            self.feed.follow,
            self.store.fixture_path
        )
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}

/// Floor a unix timestamp to the start of its timeframe
pub fn normalize_timestamp(timestamp: u64, timeframe_secs: u64) -> u64 {
    if timeframe_secs == 0 {
        return timestamp;
    }
    timestamp / timeframe_secs * timeframe_secs
}

/// Starts of the windows from `from` on that have fully closed by `now`
pub fn completed_windows(from: u64, timeframe_secs: u64, now: u64) -> impl Iterator<Item = u64> {
    std::iter::successors(Some(from), move |start| start.checked_add(timeframe_secs))
        .take_while(move |start| timeframe_secs > 0 && start.saturating_add(timeframe_secs) <= now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_normalize_timestamp() {
        assert_eq!(normalize_timestamp(1_700_000_123, 300), 1_700_000_100);
        assert_eq!(normalize_timestamp(600, 300), 600);
        assert_eq!(normalize_timestamp(42, 0), 42);
    }

    #[test]
    fn test_completed_windows_catch_up() {
        // Three ticks missed: every closed window is due, the open one is not
        let due: Vec<u64> = completed_windows(900, 300, 1_850).collect();
        assert_eq!(due, vec![900, 1_200, 1_500]);

        assert_eq!(completed_windows(900, 300, 1_199).count(), 0);
        assert_eq!(completed_windows(900, 300, 1_200).collect::<Vec<_>>(), vec![900]);
        assert_eq!(completed_windows(900, 0, 5_000).count(), 0);
    }

    #[test]
    fn test_load_from_file_with_defaults() {
        let dir = std::env::temp_dir().join(format!("price-feed-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("feed.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[feed]
contract = "CAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAABSC4"
base_asset = {{ type = 1, code = "XLM" }}
assets = [{{ type = 1, code = "XLM" }}]
"#
        )
        .unwrap();

        let cfg = AppConfig::load_from(path.to_str().unwrap()).unwrap();
        assert_eq!(cfg.feed.decimals, 14);
        assert_eq!(cfg.feed.timeframe_secs, 300);
        assert_eq!(cfg.feed.from, None);
        assert_eq!(cfg.scan.timeout(), Duration::from_secs(60));
        assert_eq!(cfg.feed.params(600).period, 300);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_unsupported_asset_type_rejected() {
        let dir = std::env::temp_dir().join(format!("price-feed-config-bad-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("feed.toml");
        std::fs::write(
            &path,
            r#"
[feed]
contract = "C"
base_asset = { type = 2, code = "X" }
assets = []
"#,
        )
        .unwrap();
        assert!(AppConfig::load_from(path.to_str().unwrap()).is_err());
        std::fs::remove_dir_all(&dir).ok();
    }
}

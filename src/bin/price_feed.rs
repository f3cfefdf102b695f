//! Price feed runner
//!
//! Usage: cargo run --bin price-feed
//!
//! Replays captured ledger data through the oracle and prints the merged
//! price table as JSON, once or every timeframe with `feed.follow = true`.

use anyhow::Context;
use dex_price_feed::config::{completed_windows, normalize_timestamp, AppConfig, LoggingConfig};
use dex_price_feed::{FixtureStore, PriceOracle};
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_logging(cfg: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.filter));
    if cfg.json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn now_secs() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

async fn run_window(
    oracle: &PriceOracle<FixtureStore>,
    cfg: &AppConfig,
    from: u64,
) -> anyhow::Result<()> {
    let result = oracle
        .aggregate_trades(&cfg.feed.params(from))
        .await
        .with_context(|| format!("aggregation of window starting at {}", from))?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

/// Run every completed window from `from` on; returns the next pending start
///
/// Stops early on a retryable failure so that window is tried again on the
/// next tick.
async fn catch_up(oracle: &PriceOracle<FixtureStore>, cfg: &AppConfig, from: u64) -> u64 {
    let timeframe = cfg.feed.timeframe_secs;
    let mut next = from;
    for start in completed_windows(from, timeframe, now_secs()) {
        if let Err(e) = run_window(oracle, cfg, start).await {
            let retry = e
                .downcast_ref::<dex_price_feed::OracleError>()
                .map(|oe| oe.is_retryable())
                .unwrap_or(false);
            if retry {
                warn!(from = start, error = %e, "Aggregation failed, retrying next tick");
                return start;
            }
            error!(from = start, error = %e, "Aggregation failed, skipping window");
        }
        next = start + timeframe;
    }
    next
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = AppConfig::load()?;
    init_logging(&cfg.logging);

    info!("🚀 Starting price feed");
    info!(config = %cfg.digest(), "Configuration loaded");

    let store = FixtureStore::from_json_file(&cfg.store.fixture_path)
        .with_context(|| format!("loading {}", cfg.store.fixture_path))?;
    let oracle = PriceOracle::new(store).with_scan_timeout(cfg.scan.timeout());
    let timeframe = cfg.feed.timeframe_secs;

    // Default to the last completed timeframe
    let mut from = cfg.feed.from.map_or_else(
        || normalize_timestamp(now_secs(), timeframe).saturating_sub(timeframe),
        |ts| normalize_timestamp(ts, timeframe),
    );

    if !cfg.feed.follow {
        let outcome = run_window(&oracle, &cfg, from).await;
        oracle.close().await?;
        return outcome;
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(timeframe));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                from = catch_up(&oracle, &cfg, from).await;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("🛑 Shutdown requested");
                break;
            }
        }
    }

    oracle.close().await?;
    info!("👋 Price feed stopped");
    Ok(())
}

//! Demo: multi-source OHLCV fetching with automatic fallback.
//!
//! Registers all seven connectors (keyed ones from environment
//! variables), then runs a couple of fetches and prints the results.

use std::env;
use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use quantforge_market_data::{
    AlphaVantageConnector, Connector, FallbackOrchestrator, FetchError, FetchRequest,
    FinnhubConnector, FmpConnector, IexCloudConnector, Interval, PolygonConnector,
    TwelveDataConnector, YahooConnector,
};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn env_key(name: &str) -> String {
    env::var(name).unwrap_or_default()
}

/// Register every connector. Keyed connectors with no key configured
/// stay registered so their absence shows up in the attempt trail.
fn build_connectors() -> Vec<Arc<dyn Connector>> {
    let mut connectors: Vec<Arc<dyn Connector>> = Vec::new();

    match YahooConnector::new() {
        Ok(yahoo) => connectors.push(Arc::new(yahoo)),
        Err(e) => tracing::warn!("Yahoo connector unavailable: {}", e),
    }

    connectors.push(Arc::new(FinnhubConnector::new(env_key("FINNHUB_API_KEY"))));
    connectors.push(Arc::new(TwelveDataConnector::new(env_key(
        "TWELVE_DATA_API_KEY",
    ))));
    connectors.push(Arc::new(IexCloudConnector::new(env_key(
        "IEX_CLOUD_API_KEY",
    ))));
    connectors.push(Arc::new(FmpConnector::new(env_key("FMP_API_KEY"))));
    connectors.push(Arc::new(PolygonConnector::new(env_key("POLYGON_API_KEY"))));
    connectors.push(Arc::new(AlphaVantageConnector::new(env_key(
        "ALPHA_VANTAGE_API_KEY",
    ))));

    connectors
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let orchestrator = FallbackOrchestrator::new(build_connectors());

    println!("QuantForge Demo: Multi-Source Data Pipeline");
    println!("===========================================");

    let available = orchestrator
        .connectors()
        .iter()
        .filter(|c| c.is_available())
        .count();
    println!("\nRegistered connectors ({} available):", available);
    for connector in orchestrator.connectors() {
        println!(
            "  - {} (priority {}, quota {}{})",
            connector.id(),
            connector.priority(),
            connector.quota(),
            if connector.is_available() {
                ""
            } else {
                ", no key"
            }
        );
    }

    println!("\nFetching AAPL (1d bars, last 7 days) with auto-fallback...");
    let request = FetchRequest::new("AAPL", Interval::D1, 7);
    match orchestrator.fetch(&request).await {
        Ok(bars) => {
            println!("Got {} bars", bars.len());
            for bar in bars.iter().rev().take(5).rev() {
                println!(
                    "  {}: O={} H={} L={} C={} Vol={}",
                    bar.timestamp.format("%Y-%m-%d"),
                    bar.open,
                    bar.high,
                    bar.low,
                    bar.close,
                    bar.volume
                );
            }
        }
        Err(FetchError::AllSourcesExhausted { trail }) => {
            println!("All connectors failed:");
            println!("  {}", trail);
        }
        Err(e) => println!("Fetch failed: {}", e),
    }

    println!("\nFetching TSLA (1d bars, last 5 days)...");
    let request = FetchRequest::new("TSLA", Interval::D1, 5);
    match orchestrator.fetch(&request).await {
        Ok(bars) => match bars.last() {
            Some(latest) => {
                println!("Got {} bars", bars.len());
                println!("Latest close: {} (volume {})", latest.close, latest.volume);
            }
            None => println!("No bars for the requested range"),
        },
        Err(e) => println!("Fetch failed: {}", e),
    }

    Ok(())
}

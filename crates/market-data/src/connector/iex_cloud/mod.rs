//! IEX Cloud connector.
//!
//! Daily bars via the /stock/{symbol}/chart/{range} endpoint. IEX serves
//! fixed chart ranges rather than arbitrary windows, so the lookback is
//! bucketed into the smallest range that covers it and the result is
//! trimmed by cutoff.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

use crate::connector::{Connector, Quota};
use crate::errors::FetchError;
use crate::models::{Bar, FetchRequest, Interval};

const BASE_URL: &str = "https://cloud.iexapis.com/stable";
const CONNECTOR_ID: &str = "IEX_CLOUD";

/// One entry of a /chart response.
#[derive(Debug, Deserialize)]
struct ChartEntry {
    date: String,
    open: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    close: Option<f64>,
    #[serde(default)]
    volume: Option<f64>,
}

/// IEX Cloud connector. Daily bars only.
pub struct IexCloudConnector {
    client: Client,
    api_key: String,
}

impl IexCloudConnector {
    /// Create a new IEX Cloud connector with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            api_key: api_key.into(),
        }
    }

    /// Smallest chart range covering the lookback window.
    fn range_param(lookback_days: u32) -> &'static str {
        match lookback_days {
            0..=5 => "5d",
            6..=30 => "1m",
            31..=90 => "3m",
            91..=180 => "6m",
            _ => "1y",
        }
    }

    fn parse_date(date: &str) -> Option<DateTime<Utc>> {
        NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| Utc.from_utc_datetime(&dt))
    }

    fn entry_to_bar(entry: &ChartEntry) -> Option<Bar> {
        Some(Bar {
            timestamp: Self::parse_date(&entry.date)?,
            open: Decimal::from_f64_retain(entry.open?)?,
            high: Decimal::from_f64_retain(entry.high?)?,
            low: Decimal::from_f64_retain(entry.low?)?,
            close: Decimal::from_f64_retain(entry.close?)?,
            volume: entry.volume.unwrap_or(0.0).max(0.0) as u64,
        })
    }
}

#[async_trait]
impl Connector for IexCloudConnector {
    fn id(&self) -> &'static str {
        CONNECTOR_ID
    }

    fn priority(&self) -> u8 {
        4
    }

    fn quota(&self) -> Quota {
        Quota {
            per_minute: Some(100),
            per_day: None,
        }
    }

    fn supported_intervals(&self) -> &'static [Interval] {
        &[Interval::D1]
    }

    fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn fetch_ohlcv(&self, request: &FetchRequest) -> Result<Vec<Bar>, FetchError> {
        let url = format!(
            "{}/stock/{}/chart/{}",
            BASE_URL,
            request.symbol,
            Self::range_param(request.lookback_days)
        );

        debug!("fetching {} from IEX Cloud", request.symbol);

        let response = self
            .client
            .get(&url)
            .query(&[("token", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| FetchError::Transport {
                connector: CONNECTOR_ID.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::RateLimited {
                connector: CONNECTOR_ID.to_string(),
            });
        }
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(FetchError::Auth {
                connector: CONNECTOR_ID.to_string(),
            });
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::NoData {
                connector: CONNECTOR_ID.to_string(),
            });
        }
        if !status.is_success() {
            return Err(FetchError::Transport {
                connector: CONNECTOR_ID.to_string(),
                message: format!("HTTP {}", status),
            });
        }

        let entries: Vec<ChartEntry> =
            response.json().await.map_err(|e| FetchError::Parse {
                connector: CONNECTOR_ID.to_string(),
                message: format!("failed to parse chart response: {}", e),
            })?;

        let cutoff = request.window_start();
        let mut bars: Vec<Bar> = entries
            .iter()
            .filter_map(Self::entry_to_bar)
            .filter(|bar| bar.timestamp >= cutoff)
            .collect();

        if bars.is_empty() {
            return Err(FetchError::NoData {
                connector: CONNECTOR_ID.to_string(),
            });
        }

        bars.sort_by_key(|bar| bar.timestamp);
        Ok(bars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connector_metadata() {
        let connector = IexCloudConnector::new("test_key");
        assert_eq!(connector.id(), "IEX_CLOUD");
        assert_eq!(connector.priority(), 4);
        assert_eq!(connector.supported_intervals(), &[Interval::D1]);
    }

    #[test]
    fn test_unavailable_without_key() {
        assert!(!IexCloudConnector::new("").is_available());
    }

    #[test]
    fn test_range_bucketing() {
        assert_eq!(IexCloudConnector::range_param(3), "5d");
        assert_eq!(IexCloudConnector::range_param(7), "1m");
        assert_eq!(IexCloudConnector::range_param(60), "3m");
        assert_eq!(IexCloudConnector::range_param(120), "6m");
        assert_eq!(IexCloudConnector::range_param(365), "1y");
    }

    #[test]
    fn test_entry_to_bar() {
        let json = r#"{
            "date": "2024-01-15",
            "open": 185.0,
            "high": 187.2,
            "low": 184.1,
            "close": 186.4,
            "volume": 52164500
        }"#;

        let entry: ChartEntry = serde_json::from_str(json).unwrap();
        let bar = IexCloudConnector::entry_to_bar(&entry).unwrap();
        assert_eq!(bar.close.to_string(), "186.4");
        assert_eq!(bar.volume, 52_164_500);
    }

    #[test]
    fn test_entry_missing_prices_skipped() {
        let json = r#"{"date": "2024-01-15", "close": 186.4}"#;
        let entry: ChartEntry = serde_json::from_str(json).unwrap();
        assert!(IexCloudConnector::entry_to_bar(&entry).is_none());
    }
}

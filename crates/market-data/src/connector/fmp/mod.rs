//! Financial Modeling Prep connector.
//!
//! Daily bars come from /historical-price-full/{symbol} wrapped in a
//! `historical` array; intraday bars come from
//! /historical-chart/{interval}/{symbol} as a bare array. Both are
//! newest first.
//!
//! FMP free tier is limited to 250 API calls per day.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

use crate::connector::{Connector, Quota};
use crate::errors::FetchError;
use crate::models::{Bar, FetchRequest, Interval};

const BASE_URL: &str = "https://financialmodelingprep.com/api/v3";
const CONNECTOR_ID: &str = "FMP";

/// Wrapper around the daily endpoint's response.
#[derive(Debug, Deserialize)]
struct HistoricalResponse {
    #[serde(default)]
    historical: Vec<PriceRow>,
}

/// One price row, shared by the daily and intraday endpoints.
#[derive(Debug, Deserialize)]
struct PriceRow {
    date: String,
    open: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    close: Option<f64>,
    #[serde(default)]
    volume: Option<f64>,
}

/// Financial Modeling Prep connector.
pub struct FmpConnector {
    client: Client,
    api_key: String,
}

impl FmpConnector {
    /// Create a new FMP connector with the given API key.
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

    /// Map our interval to FMP's chart path segment.
    fn fmp_interval(interval: Interval) -> &'static str {
        match interval {
            Interval::M1 => "1min",
            Interval::M5 => "5min",
            Interval::M15 => "15min",
            Interval::M30 => "30min",
            Interval::H1 => "1hour",
            Interval::H4 => "4hour",
            // Daily goes through the historical-price-full endpoint instead
            Interval::D1 | Interval::W1 => "1day",
        }
    }

    /// Parse FMP's date, which is date-only for daily rows and
    /// date+time for intraday rows.
    fn parse_date(s: &str) -> Option<DateTime<Utc>> {
        let naive = if s.contains(' ') {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").ok()?
        } else {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()?
                .and_hms_opt(0, 0, 0)?
        };
        Some(Utc.from_utc_datetime(&naive))
    }

    fn row_to_bar(row: &PriceRow) -> Option<Bar> {
        Some(Bar {
            timestamp: Self::parse_date(&row.date)?,
            open: Decimal::from_f64_retain(row.open?)?,
            high: Decimal::from_f64_retain(row.high?)?,
            low: Decimal::from_f64_retain(row.low?)?,
            close: Decimal::from_f64_retain(row.close?)?,
            volume: row.volume.unwrap_or(0.0).max(0.0) as u64,
        })
    }

    /// Make a GET request, mapping HTTP status to typed errors.
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .query(&[("apikey", self.api_key.as_str())])
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
        if !status.is_success() {
            return Err(FetchError::Transport {
                connector: CONNECTOR_ID.to_string(),
                message: format!("HTTP {}", status),
            });
        }

        response
            .text()
            .await
            .map_err(|e| FetchError::Transport {
                connector: CONNECTOR_ID.to_string(),
                message: format!("failed to read response: {}", e),
            })
    }
}

#[async_trait]
impl Connector for FmpConnector {
    fn id(&self) -> &'static str {
        CONNECTOR_ID
    }

    fn priority(&self) -> u8 {
        5
    }

    fn quota(&self) -> Quota {
        Quota {
            per_minute: Some(5),
            per_day: Some(250),
        }
    }

    fn supported_intervals(&self) -> &'static [Interval] {
        &[
            Interval::M1,
            Interval::M5,
            Interval::M15,
            Interval::M30,
            Interval::H1,
            Interval::H4,
            Interval::D1,
        ]
    }

    fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn fetch_ohlcv(&self, request: &FetchRequest) -> Result<Vec<Bar>, FetchError> {
        debug!("fetching {} from FMP", request.symbol);

        let rows = if request.interval == Interval::D1 {
            let url = format!("{}/historical-price-full/{}", BASE_URL, request.symbol);
            let text = self.fetch(&url).await?;
            let parsed: HistoricalResponse =
                serde_json::from_str(&text).map_err(|e| FetchError::Parse {
                    connector: CONNECTOR_ID.to_string(),
                    message: format!("failed to parse daily response: {}", e),
                })?;
            parsed.historical
        } else {
            let url = format!(
                "{}/historical-chart/{}/{}",
                BASE_URL,
                Self::fmp_interval(request.interval),
                request.symbol
            );
            let text = self.fetch(&url).await?;
            serde_json::from_str::<Vec<PriceRow>>(&text).map_err(|e| FetchError::Parse {
                connector: CONNECTOR_ID.to_string(),
                message: format!("failed to parse intraday response: {}", e),
            })?
        };

        let cutoff = request.window_start();
        let mut bars: Vec<Bar> = rows
            .iter()
            .filter_map(Self::row_to_bar)
            .filter(|bar| bar.timestamp >= cutoff)
            .collect();

        if bars.is_empty() {
            return Err(FetchError::NoData {
                connector: CONNECTOR_ID.to_string(),
            });
        }

        // FMP returns newest first
        bars.sort_by_key(|bar| bar.timestamp);
        Ok(bars)
    }
}

//! Twelve Data connector.
//!
//! Multi-asset time series via the /time_series endpoint. The response
//! is an array of objects under a "values" key, newest first, with all
//! prices encoded as strings.
//!
//! Twelve Data free tier is limited to 8 calls per minute and 800 per day.

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

const BASE_URL: &str = "https://api.twelvedata.com";
const CONNECTOR_ID: &str = "TWELVE_DATA";

/// Response from /time_series endpoint.
///
/// Errors come back as a 200 with `status: "error"` and a numeric code.
#[derive(Debug, Deserialize)]
struct TimeSeriesResponse {
    values: Option<Vec<ValueRow>>,
    status: Option<String>,
    code: Option<i64>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ValueRow {
    datetime: String,
    open: String,
    high: String,
    low: String,
    close: String,
    #[serde(default)]
    volume: Option<String>,
}

/// Twelve Data connector.
pub struct TwelveDataConnector {
    client: Client,
    api_key: String,
}

impl TwelveDataConnector {
    /// Create a new Twelve Data connector with the given API key.
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

    /// Map our interval to Twelve Data's interval string.
    fn td_interval(interval: Interval) -> &'static str {
        match interval {
            Interval::M1 => "1min",
            Interval::M5 => "5min",
            Interval::M15 => "15min",
            Interval::M30 => "30min",
            Interval::H1 => "1h",
            Interval::H4 => "4h",
            Interval::D1 => "1day",
            Interval::W1 => "1week",
        }
    }

    /// Parse Twelve Data's datetime, which is date-only for daily series
    /// and date+time for intraday.
    fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
        let naive = if s.contains(' ') {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").ok()?
        } else {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()?
                .and_hms_opt(0, 0, 0)?
        };
        Some(Utc.from_utc_datetime(&naive))
    }

    fn row_to_bar(row: &ValueRow) -> Option<Bar> {
        Some(Bar {
            timestamp: Self::parse_datetime(&row.datetime)?,
            open: row.open.parse::<Decimal>().ok()?,
            high: row.high.parse::<Decimal>().ok()?,
            low: row.low.parse::<Decimal>().ok()?,
            close: row.close.parse::<Decimal>().ok()?,
            volume: row
                .volume
                .as_deref()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(0),
        })
    }

    /// Map an API-level error payload to a typed error.
    fn check_api_error(response: &TimeSeriesResponse) -> Result<(), FetchError> {
        if response.status.as_deref() != Some("error") {
            return Ok(());
        }

        let message = response.message.clone().unwrap_or_default();
        match response.code {
            Some(401) | Some(403) => Err(FetchError::Auth {
                connector: CONNECTOR_ID.to_string(),
            }),
            Some(429) => Err(FetchError::RateLimited {
                connector: CONNECTOR_ID.to_string(),
            }),
            Some(404) => Err(FetchError::NoData {
                connector: CONNECTOR_ID.to_string(),
            }),
            _ => Err(FetchError::Transport {
                connector: CONNECTOR_ID.to_string(),
                message,
            }),
        }
    }
}

#[async_trait]
impl Connector for TwelveDataConnector {
    fn id(&self) -> &'static str {
        CONNECTOR_ID
    }

    fn priority(&self) -> u8 {
        3
    }

    fn quota(&self) -> Quota {
        Quota {
            per_minute: Some(8),
            per_day: Some(800),
        }
    }

    fn supported_intervals(&self) -> &'static [Interval] {
        &[
            Interval::M1,
            Interval::M5,
            Interval::M15,
            Interval::M30,
            Interval::H1,
            Interval::D1,
            Interval::W1,
        ]
    }

    fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn fetch_ohlcv(&self, request: &FetchRequest) -> Result<Vec<Bar>, FetchError> {
        // Outputsize is in rows, not days; over-request and trim by cutoff
        let outputsize = (request.lookback_days as u64 * 7).min(5000).to_string();

        debug!("fetching {} from Twelve Data", request.symbol);

        let response = self
            .client
            .get(format!("{}/time_series", BASE_URL))
            .query(&[
                ("symbol", request.symbol.as_str()),
                ("interval", Self::td_interval(request.interval)),
                ("outputsize", outputsize.as_str()),
                ("apikey", self.api_key.as_str()),
            ])
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

        let text = response
            .text()
            .await
            .map_err(|e| FetchError::Transport {
                connector: CONNECTOR_ID.to_string(),
                message: format!("failed to read response: {}", e),
            })?;

        let parsed: TimeSeriesResponse =
            serde_json::from_str(&text).map_err(|e| FetchError::Parse {
                connector: CONNECTOR_ID.to_string(),
                message: format!("failed to parse response: {}", e),
            })?;

        Self::check_api_error(&parsed)?;

        let values = parsed.values.ok_or_else(|| FetchError::NoData {
            connector: CONNECTOR_ID.to_string(),
        })?;

        let cutoff = request.window_start();
        let mut bars: Vec<Bar> = values
            .iter()
            .filter_map(Self::row_to_bar)
            .filter(|bar| bar.timestamp >= cutoff)
            .collect();

        if bars.is_empty() {
            return Err(FetchError::NoData {
                connector: CONNECTOR_ID.to_string(),
            });
        }

        // Twelve Data returns newest first
        bars.sort_by_key(|bar| bar.timestamp);
        Ok(bars)
    }
}

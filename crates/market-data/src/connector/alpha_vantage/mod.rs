//! Alpha Vantage connector.
//!
//! Equities via TIME_SERIES_DAILY and TIME_SERIES_INTRADAY. The time
//! series comes back as a JSON object keyed by date string, under a key
//! whose name depends on the function ("Time Series (Daily)",
//! "Time Series (5min)", ...), with positional field names like
//! "1. open".
//!
//! Note: Alpha Vantage free tier is limited to 25 API calls per day.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use log::{debug, warn};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::connector::{Connector, Quota};
use crate::errors::FetchError;
use crate::models::{Bar, FetchRequest, Interval};

const BASE_URL: &str = "https://www.alphavantage.co/query";
const CONNECTOR_ID: &str = "ALPHA_VANTAGE";

/// Envelope shared by the daily and intraday functions.
///
/// The series itself sits under a function-dependent key, so it is
/// captured through the flattened remainder and located by prefix.
#[derive(Debug, Deserialize)]
struct TimeSeriesResponse {
    #[serde(rename = "Error Message")]
    error_message: Option<String>,
    #[serde(rename = "Note")]
    note: Option<String>,
    #[serde(rename = "Information")]
    information: Option<String>,
    #[serde(flatten)]
    rest: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct SeriesRow {
    #[serde(rename = "1. open")]
    open: String,
    #[serde(rename = "2. high")]
    high: String,
    #[serde(rename = "3. low")]
    low: String,
    #[serde(rename = "4. close")]
    close: String,
    #[serde(rename = "5. volume")]
    volume: Option<String>,
}

impl TimeSeriesResponse {
    /// Locate and decode the series map regardless of the exact key name.
    fn series(self) -> Option<HashMap<String, SeriesRow>> {
        self.rest
            .into_iter()
            .find(|(key, _)| key.starts_with("Time Series"))
            .and_then(|(_, value)| serde_json::from_value(value).ok())
    }
}

/// Alpha Vantage connector.
///
/// Free tier is limited to 5 API calls per minute and 25 per day, which
/// puts it last in the fallback order despite its data quality.
pub struct AlphaVantageConnector {
    client: Client,
    api_key: String,
}

impl AlphaVantageConnector {
    /// Create a new Alpha Vantage connector with the given API key.
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

    /// Intraday interval parameter; daily and weekly use TIME_SERIES_DAILY.
    fn av_interval(interval: Interval) -> &'static str {
        match interval {
            Interval::M1 => "1min",
            Interval::M5 => "5min",
            Interval::M15 => "15min",
            Interval::M30 => "30min",
            _ => "60min",
        }
    }

    /// Make a request to the Alpha Vantage API.
    async fn fetch(&self, params: &[(&str, &str)]) -> Result<String, FetchError> {
        let mut all_params: Vec<(&str, &str)> = params.to_vec();
        all_params.push(("apikey", &self.api_key));

        let url = reqwest::Url::parse_with_params(BASE_URL, &all_params).map_err(|e| {
            FetchError::Transport {
                connector: CONNECTOR_ID.to_string(),
                message: format!("failed to build URL: {}", e),
            }
        })?;

        debug!(
            "Alpha Vantage request: {}",
            url.as_str().replace(&self.api_key, "***")
        );

        let response = self.client.get(url).send().await.map_err(|e| {
            FetchError::Transport {
                connector: CONNECTOR_ID.to_string(),
                message: e.to_string(),
            }
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
                message: e.to_string(),
            })
    }

    /// Check for API-level errors smuggled inside a 200 response.
    fn check_api_error(response: &TimeSeriesResponse) -> Result<(), FetchError> {
        if let Some(ref msg) = response.error_message {
            // "Invalid API call" is how Alpha Vantage reports unknown symbols
            if msg.contains("Invalid API call") {
                return Err(FetchError::NoData {
                    connector: CONNECTOR_ID.to_string(),
                });
            }
            if msg.contains("apikey") || msg.contains("API key") {
                return Err(FetchError::Auth {
                    connector: CONNECTOR_ID.to_string(),
                });
            }
            return Err(FetchError::Transport {
                connector: CONNECTOR_ID.to_string(),
                message: msg.clone(),
            });
        }

        // "Note" and "Information" usually indicate throttling
        for msg in [&response.note, &response.information].into_iter().flatten() {
            if msg.contains("API call frequency") || msg.contains("rate limit") {
                return Err(FetchError::RateLimited {
                    connector: CONNECTOR_ID.to_string(),
                });
            }
            warn!("Alpha Vantage note: {}", msg);
        }

        Ok(())
    }

    /// Parse a series timestamp: date-only for daily, date+time intraday.
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

    fn row_to_bar(date: &str, row: &SeriesRow) -> Option<Bar> {
        Some(Bar {
            timestamp: Self::parse_date(date)?,
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
}

#[async_trait]
impl Connector for AlphaVantageConnector {
    fn id(&self) -> &'static str {
        CONNECTOR_ID
    }

    fn priority(&self) -> u8 {
        7
    }

    fn quota(&self) -> Quota {
        Quota {
            per_minute: Some(5),
            per_day: Some(25),
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
        let daily = matches!(request.interval, Interval::D1 | Interval::W1);
        let outputsize = if request.lookback_days <= 100 {
            "compact"
        } else {
            "full"
        };

        debug!("fetching {} from Alpha Vantage", request.symbol);

        let text = if daily {
            self.fetch(&[
                ("function", "TIME_SERIES_DAILY"),
                ("symbol", request.symbol.as_str()),
                ("outputsize", outputsize),
            ])
            .await?
        } else {
            self.fetch(&[
                ("function", "TIME_SERIES_INTRADAY"),
                ("symbol", request.symbol.as_str()),
                ("interval", Self::av_interval(request.interval)),
                ("outputsize", outputsize),
            ])
            .await?
        };

        let response: TimeSeriesResponse =
            serde_json::from_str(&text).map_err(|e| FetchError::Parse {
                connector: CONNECTOR_ID.to_string(),
                message: format!("failed to parse response: {}", e),
            })?;

        Self::check_api_error(&response)?;

        let series = response.series().ok_or_else(|| FetchError::Parse {
            connector: CONNECTOR_ID.to_string(),
            message: "response has no time series key".to_string(),
        })?;

        let cutoff = request.window_start();
        let mut bars: Vec<Bar> = series
            .iter()
            .filter_map(|(date, row)| Self::row_to_bar(date, row))
            .filter(|bar| bar.timestamp >= cutoff)
            .collect();

        if bars.is_empty() {
            return Err(FetchError::NoData {
                connector: CONNECTOR_ID.to_string(),
            });
        }

        // The series map has no inherent order
        bars.sort_by_key(|bar| bar.timestamp);
        Ok(bars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connector_metadata() {
        let connector = AlphaVantageConnector::new("test_key");
        assert_eq!(connector.id(), "ALPHA_VANTAGE");
        assert_eq!(connector.priority(), 7);
        assert_eq!(connector.quota().per_day, Some(25));
    }

    #[test]
    fn test_unavailable_without_key() {
        assert!(!AlphaVantageConnector::new("").is_available());
    }

    #[test]
    fn test_parse_date() {
        let ts = AlphaVantageConnector::parse_date("2024-01-15").unwrap();
        assert_eq!(ts.date_naive().to_string(), "2024-01-15");

        assert!(AlphaVantageConnector::parse_date("invalid").is_none());
        assert!(AlphaVantageConnector::parse_date("01-15-2024").is_none());
    }

    #[test]
    fn test_daily_series_located_and_parsed() {
        let json = r#"{
            "Meta Data": {"2. Symbol": "AAPL"},
            "Time Series (Daily)": {
                "2024-01-16": {
                    "1. open": "186.50",
                    "2. high": "188.00",
                    "3. low": "185.90",
                    "4. close": "187.10",
                    "5. volume": "48210300"
                },
                "2024-01-15": {
                    "1. open": "185.00",
                    "2. high": "187.20",
                    "3. low": "184.10",
                    "4. close": "186.40",
                    "5. volume": "52164500"
                }
            }
        }"#;

        let response: TimeSeriesResponse = serde_json::from_str(json).unwrap();
        assert!(AlphaVantageConnector::check_api_error(&response).is_ok());

        let series = response.series().unwrap();
        assert_eq!(series.len(), 2);

        let bar = AlphaVantageConnector::row_to_bar("2024-01-15", &series["2024-01-15"]).unwrap();
        assert_eq!(bar.close.to_string(), "186.40");
        assert_eq!(bar.volume, 52_164_500);
    }

    #[test]
    fn test_intraday_series_key_located() {
        let json = r#"{
            "Time Series (5min)": {
                "2024-01-15 14:30:00": {
                    "1. open": "185.00",
                    "2. high": "185.40",
                    "3. low": "184.90",
                    "4. close": "185.20",
                    "5. volume": "120500"
                }
            }
        }"#;

        let response: TimeSeriesResponse = serde_json::from_str(json).unwrap();
        let series = response.series().unwrap();
        assert_eq!(series.len(), 1);
    }

    #[test]
    fn test_throttle_note_classified() {
        let json = r#"{"Note": "Thank you! Our standard API call frequency is 25 requests per day."}"#;
        let response: TimeSeriesResponse = serde_json::from_str(json).unwrap();

        assert!(matches!(
            AlphaVantageConnector::check_api_error(&response),
            Err(FetchError::RateLimited { .. })
        ));
    }

    #[test]
    fn test_unknown_symbol_is_no_data() {
        let json = r#"{"Error Message": "Invalid API call. Please retry or visit the documentation."}"#;
        let response: TimeSeriesResponse = serde_json::from_str(json).unwrap();

        assert!(matches!(
            AlphaVantageConnector::check_api_error(&response),
            Err(FetchError::NoData { .. })
        ));
    }

    #[test]
    fn test_missing_series_is_parse_error() {
        let json = r#"{"Meta Data": {"2. Symbol": "AAPL"}}"#;
        let response: TimeSeriesResponse = serde_json::from_str(json).unwrap();
        assert!(response.series().is_none());
    }
}

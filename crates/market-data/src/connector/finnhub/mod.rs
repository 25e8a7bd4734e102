//! Finnhub connector.
//!
//! Equities via the /stock/candle endpoint. The response is
//! column-oriented: parallel arrays of timestamps, opens, highs, lows,
//! closes, and volumes.
//!
//! Finnhub free tier is limited to 60 API calls per minute.
//! API documentation: https://finnhub.io/docs/api

use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

use crate::connector::{Connector, Quota};
use crate::errors::FetchError;
use crate::models::{Bar, FetchRequest, Interval};

const BASE_URL: &str = "https://finnhub.io/api/v1";
const CONNECTOR_ID: &str = "FINNHUB";

/// Response from /stock/candle endpoint
#[derive(Debug, Deserialize)]
struct CandleResponse {
    /// Status: "ok" or "no_data"
    s: String,
    /// Close prices
    #[serde(default)]
    c: Vec<f64>,
    /// High prices
    #[serde(default)]
    h: Vec<f64>,
    /// Low prices
    #[serde(default)]
    l: Vec<f64>,
    /// Open prices
    #[serde(default)]
    o: Vec<f64>,
    /// Volume
    #[serde(default)]
    v: Vec<f64>,
    /// Timestamps (Unix)
    #[serde(default)]
    t: Vec<i64>,
}

/// Finnhub connector.
///
/// Free tier is limited to 60 API calls per minute.
pub struct FinnhubConnector {
    client: Client,
    api_key: String,
}

impl FinnhubConnector {
    /// Create a new Finnhub connector with the given API key.
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

    /// Map our interval to Finnhub's candle resolution.
    fn resolution(interval: Interval) -> &'static str {
        match interval {
            Interval::M1 => "1",
            Interval::M5 => "5",
            Interval::M15 => "15",
            Interval::M30 => "30",
            Interval::H1 => "60",
            Interval::H4 => "240",
            Interval::D1 => "D",
            Interval::W1 => "W",
        }
    }

    /// Make a GET request to the Finnhub API.
    async fn fetch(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<String, FetchError> {
        let url = format!("{}{}", BASE_URL, endpoint);

        let mut request = self.client.get(&url);

        // API key goes in a header, not the query string
        request = request.header("X-Finnhub-Token", &self.api_key);

        for (key, value) in params {
            request = request.query(&[(key, value)]);
        }

        debug!("Finnhub request: {} with {} params", endpoint, params.len());

        let response = request.send().await.map_err(|e| FetchError::Transport {
            connector: CONNECTOR_ID.to_string(),
            message: e.to_string(),
        })?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::RateLimited {
                connector: CONNECTOR_ID.to_string(),
            });
        }

        // 401: invalid key; 403: key quota exceeded
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(FetchError::Auth {
                connector: CONNECTOR_ID.to_string(),
            });
        }

        if status == reqwest::StatusCode::FORBIDDEN {
            return Err(FetchError::RateLimited {
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

    /// Convert a parsed candle response into bars.
    fn candles_to_bars(response: CandleResponse) -> Result<Vec<Bar>, FetchError> {
        if response.s == "no_data" {
            return Err(FetchError::NoData {
                connector: CONNECTOR_ID.to_string(),
            });
        }

        if response.s != "ok" {
            return Err(FetchError::Parse {
                connector: CONNECTOR_ID.to_string(),
                message: format!("unexpected candle status: {}", response.s),
            });
        }

        let n = response.t.len();
        if response.o.len() != n
            || response.h.len() != n
            || response.l.len() != n
            || response.c.len() != n
            || response.v.len() != n
        {
            return Err(FetchError::Parse {
                connector: CONNECTOR_ID.to_string(),
                message: "candle arrays have mismatched lengths".to_string(),
            });
        }

        let mut bars = Vec::with_capacity(n);
        for i in 0..n {
            let timestamp = match Utc.timestamp_opt(response.t[i], 0).single() {
                Some(ts) => ts,
                None => continue,
            };
            let (open, high, low, close) = match (
                Decimal::from_f64_retain(response.o[i]),
                Decimal::from_f64_retain(response.h[i]),
                Decimal::from_f64_retain(response.l[i]),
                Decimal::from_f64_retain(response.c[i]),
            ) {
                (Some(o), Some(h), Some(l), Some(c)) => (o, h, l, c),
                _ => continue,
            };

            bars.push(Bar {
                timestamp,
                open,
                high,
                low,
                close,
                volume: response.v[i].max(0.0) as u64,
            });
        }

        if bars.is_empty() {
            return Err(FetchError::NoData {
                connector: CONNECTOR_ID.to_string(),
            });
        }

        Ok(bars)
    }
}

#[async_trait]
impl Connector for FinnhubConnector {
    fn id(&self) -> &'static str {
        CONNECTOR_ID
    }

    fn priority(&self) -> u8 {
        2
    }

    fn quota(&self) -> Quota {
        Quota {
            per_minute: Some(60),
            per_day: None,
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
        let end = Utc::now().timestamp();
        let start = request.window_start().timestamp();
        let from = start.to_string();
        let to = end.to_string();

        debug!("fetching {} from Finnhub", request.symbol);

        let text = self
            .fetch(
                "/stock/candle",
                &[
                    ("symbol", request.symbol.as_str()),
                    ("resolution", Self::resolution(request.interval)),
                    ("from", from.as_str()),
                    ("to", to.as_str()),
                ],
            )
            .await?;

        let response: CandleResponse =
            serde_json::from_str(&text).map_err(|e| FetchError::Parse {
                connector: CONNECTOR_ID.to_string(),
                message: format!("failed to parse candle response: {}", e),
            })?;

        Self::candles_to_bars(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connector_metadata() {
        let connector = FinnhubConnector::new("test_key");
        assert_eq!(connector.id(), "FINNHUB");
        assert_eq!(connector.priority(), 2);
        assert!(connector.is_available());
    }

    #[test]
    fn test_unavailable_without_key() {
        let connector = FinnhubConnector::new("");
        assert!(!connector.is_available());
    }

    #[test]
    fn test_resolution_mapping() {
        assert_eq!(FinnhubConnector::resolution(Interval::M5), "5");
        assert_eq!(FinnhubConnector::resolution(Interval::H1), "60");
        assert_eq!(FinnhubConnector::resolution(Interval::D1), "D");
    }

    #[test]
    fn test_candles_parsed_column_wise() {
        let json = r#"{
            "s": "ok",
            "t": [1704067200, 1704153600],
            "o": [185.0, 186.5],
            "h": [187.2, 188.0],
            "l": [184.1, 185.9],
            "c": [186.4, 187.1],
            "v": [52164500.0, 48210300.0]
        }"#;

        let response: CandleResponse = serde_json::from_str(json).unwrap();
        let bars = FinnhubConnector::candles_to_bars(response).unwrap();

        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].close.to_string(), "186.4");
        assert_eq!(bars[0].volume, 52_164_500);
        assert!(bars[0].timestamp < bars[1].timestamp);
    }

    #[test]
    fn test_no_data_status() {
        let json = r#"{"s": "no_data"}"#;
        let response: CandleResponse = serde_json::from_str(json).unwrap();

        assert!(matches!(
            FinnhubConnector::candles_to_bars(response),
            Err(FetchError::NoData { .. })
        ));
    }

    #[test]
    fn test_mismatched_arrays_rejected() {
        let json = r#"{
            "s": "ok",
            "t": [1704067200, 1704153600],
            "o": [185.0],
            "h": [187.2, 188.0],
            "l": [184.1, 185.9],
            "c": [186.4, 187.1],
            "v": [52164500.0, 48210300.0]
        }"#;

        let response: CandleResponse = serde_json::from_str(json).unwrap();
        assert!(matches!(
            FinnhubConnector::candles_to_bars(response),
            Err(FetchError::Parse { .. })
        ));
    }
}

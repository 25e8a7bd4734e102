//! Polygon.io connector.
//!
//! Aggregate bars via /v2/aggs/ticker/{symbol}/range/{mult}/{span}/{from}/{to}.
//! Timestamps come back as epoch milliseconds.
//!
//! Polygon free tier is limited to 5 API calls per minute.

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

const BASE_URL: &str = "https://api.polygon.io";
const CONNECTOR_ID: &str = "POLYGON";

/// Response from the aggregates endpoint.
#[derive(Debug, Deserialize)]
struct AggsResponse {
    #[serde(default)]
    results: Option<Vec<Agg>>,
}

/// One aggregate bar.
#[derive(Debug, Deserialize)]
struct Agg {
    /// Window start, epoch milliseconds
    t: i64,
    o: Option<f64>,
    h: Option<f64>,
    l: Option<f64>,
    c: Option<f64>,
    #[serde(default)]
    v: Option<f64>,
}

/// Polygon.io connector.
pub struct PolygonConnector {
    client: Client,
    api_key: String,
}

impl PolygonConnector {
    /// Create a new Polygon connector with the given API key.
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

    /// Map our interval to Polygon's (multiplier, timespan) pair.
    fn timespan(interval: Interval) -> (&'static str, &'static str) {
        match interval {
            Interval::M1 => ("1", "minute"),
            Interval::M5 => ("5", "minute"),
            Interval::M15 => ("15", "minute"),
            Interval::M30 => ("30", "minute"),
            Interval::H1 => ("1", "hour"),
            Interval::H4 => ("4", "hour"),
            Interval::D1 => ("1", "day"),
            Interval::W1 => ("1", "week"),
        }
    }

    fn agg_to_bar(agg: &Agg) -> Option<Bar> {
        let timestamp = Utc.timestamp_millis_opt(agg.t).single()?;
        Some(Bar {
            timestamp,
            open: Decimal::from_f64_retain(agg.o?)?,
            high: Decimal::from_f64_retain(agg.h?)?,
            low: Decimal::from_f64_retain(agg.l?)?,
            close: Decimal::from_f64_retain(agg.c?)?,
            volume: agg.v.unwrap_or(0.0).max(0.0) as u64,
        })
    }
}

#[async_trait]
impl Connector for PolygonConnector {
    fn id(&self) -> &'static str {
        CONNECTOR_ID
    }

    fn priority(&self) -> u8 {
        6
    }

    fn quota(&self) -> Quota {
        Quota {
            per_minute: Some(5),
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
        let (multiplier, timespan) = Self::timespan(request.interval);
        let start = request.window_start().format("%Y-%m-%d").to_string();
        let end = Utc::now().format("%Y-%m-%d").to_string();

        let url = format!(
            "{}/v2/aggs/ticker/{}/range/{}/{}/{}/{}",
            BASE_URL, request.symbol, multiplier, timespan, start, end
        );

        debug!("fetching {} from Polygon", request.symbol);

        let response = self
            .client
            .get(&url)
            .query(&[("adjusted", "true"), ("apiKey", self.api_key.as_str())])
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

        let parsed: AggsResponse = response.json().await.map_err(|e| FetchError::Parse {
            connector: CONNECTOR_ID.to_string(),
            message: format!("failed to parse aggregates response: {}", e),
        })?;

        let results = parsed.results.unwrap_or_default();
        let mut bars: Vec<Bar> = results.iter().filter_map(Self::agg_to_bar).collect();

        if bars.is_empty() {
            return Err(FetchError::NoData {
                connector: CONNECTOR_ID.to_string(),
            });
        }

        bars.sort_by_key(|bar| bar.timestamp);
        Ok(bars)
    }
}

//! Yahoo Finance connector.
//!
//! The universal baseline: no API key required, generous limits, and
//! coverage for equities, ETFs, and crypto symbols. Always tried first.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use time::OffsetDateTime;
use tracing::{debug, warn};
use yahoo_finance_api as yahoo;

use crate::connector::{Connector, Quota};
use crate::errors::FetchError;
use crate::models::{Bar, FetchRequest, Interval};

const CONNECTOR_ID: &str = "YAHOO";

/// Yahoo Finance connector.
///
/// Wraps the `yahoo_finance_api` client for historical chart data.
pub struct YahooConnector {
    client: yahoo::YahooConnector,
}

impl YahooConnector {
    /// Create a new Yahoo Finance connector.
    pub fn new() -> Result<Self, FetchError> {
        let client = yahoo::YahooConnector::new().map_err(|e| FetchError::Transport {
            connector: CONNECTOR_ID.to_string(),
            message: format!("failed to initialize Yahoo client: {}", e),
        })?;
        Ok(Self { client })
    }

    /// Map our interval to Yahoo's chart interval string.
    fn yahoo_interval(interval: Interval) -> &'static str {
        match interval {
            Interval::M1 => "1m",
            Interval::M5 => "5m",
            Interval::M15 => "15m",
            Interval::M30 => "30m",
            Interval::H1 => "60m",
            // 4h is not served by Yahoo and is excluded from supported_intervals
            Interval::H4 => "60m",
            Interval::D1 => "1d",
            Interval::W1 => "1wk",
        }
    }

    /// Convert chrono DateTime<Utc> to time::OffsetDateTime for the Yahoo API.
    fn chrono_to_offset_datetime(dt: DateTime<Utc>) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(dt.timestamp())
            .unwrap_or_else(|_| OffsetDateTime::now_utc())
    }

    /// Convert a Yahoo quote into a Bar. Quotes with unrepresentable
    /// prices or timestamps are rejected.
    fn yahoo_quote_to_bar(quote: yahoo::Quote) -> Option<Bar> {
        let timestamp = Utc.timestamp_opt(quote.timestamp as i64, 0).single()?;
        Some(Bar {
            timestamp,
            open: Decimal::from_f64_retain(quote.open)?,
            high: Decimal::from_f64_retain(quote.high)?,
            low: Decimal::from_f64_retain(quote.low)?,
            close: Decimal::from_f64_retain(quote.close)?,
            volume: quote.volume,
        })
    }
}

#[async_trait]
impl Connector for YahooConnector {
    fn id(&self) -> &'static str {
        CONNECTOR_ID
    }

    fn priority(&self) -> u8 {
        1
    }

    fn quota(&self) -> Quota {
        Quota {
            per_minute: Some(100),
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

    async fn fetch_ohlcv(&self, request: &FetchRequest) -> Result<Vec<Bar>, FetchError> {
        let start = Self::chrono_to_offset_datetime(request.window_start());
        let end = Self::chrono_to_offset_datetime(Utc::now());

        debug!(
            "fetching {} from Yahoo ({}, {} days)",
            request.symbol, request.interval, request.lookback_days
        );

        let response = self
            .client
            .get_quote_history_interval(
                &request.symbol,
                start,
                end,
                Self::yahoo_interval(request.interval),
            )
            .await
            .map_err(|e| {
                if matches!(e, yahoo::YahooError::NoQuotes | yahoo::YahooError::NoResult) {
                    FetchError::NoData {
                        connector: CONNECTOR_ID.to_string(),
                    }
                } else {
                    FetchError::Transport {
                        connector: CONNECTOR_ID.to_string(),
                        message: e.to_string(),
                    }
                }
            })?;

        let quotes = match response.quotes() {
            Ok(quotes) => quotes,
            Err(yahoo::YahooError::NoQuotes) => {
                return Err(FetchError::NoData {
                    connector: CONNECTOR_ID.to_string(),
                })
            }
            Err(e) => {
                return Err(FetchError::Parse {
                    connector: CONNECTOR_ID.to_string(),
                    message: e.to_string(),
                })
            }
        };

        let bars: Vec<Bar> = quotes
            .into_iter()
            .filter_map(|q| match Self::yahoo_quote_to_bar(q) {
                Some(bar) => Some(bar),
                None => {
                    warn!("skipping Yahoo quote with unrepresentable values");
                    None
                }
            })
            .collect();

        if bars.is_empty() {
            return Err(FetchError::NoData {
                connector: CONNECTOR_ID.to_string(),
            });
        }

        Ok(bars)
    }
}

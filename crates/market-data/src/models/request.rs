//! Fetch request surface: the bar interval enum and the validated request.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::FetchError;

/// Longest symbol accepted by request validation.
pub const MAX_SYMBOL_LEN: usize = 12;

/// Largest lookback window accepted by request validation (10 years).
pub const MAX_LOOKBACK_DAYS: u32 = 3650;

/// Bar interval.
///
/// Canonical string forms match the provider-facing convention:
/// `1m 5m 15m 30m 1h 4h 1d 1w`. Connectors declare which of these
/// they serve; the orchestrator skips connectors that do not.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
    #[serde(rename = "1w")]
    W1,
}

impl Interval {
    /// All intervals, in ascending duration order.
    pub const ALL: [Interval; 8] = [
        Interval::M1,
        Interval::M5,
        Interval::M15,
        Interval::M30,
        Interval::H1,
        Interval::H4,
        Interval::D1,
        Interval::W1,
    ];

    /// Canonical string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::M1 => "1m",
            Interval::M5 => "5m",
            Interval::M15 => "15m",
            Interval::M30 => "30m",
            Interval::H1 => "1h",
            Interval::H4 => "4h",
            Interval::D1 => "1d",
            Interval::W1 => "1w",
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = FetchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Interval::ALL
            .iter()
            .copied()
            .find(|i| i.as_str() == s)
            .ok_or_else(|| FetchError::Validation {
                message: format!("unknown interval: {}", s),
            })
    }
}

/// A request for historical bars: the sole call surface of the orchestrator.
#[derive(Clone, Debug)]
pub struct FetchRequest {
    /// Uppercase ticker symbol (e.g., "AAPL", "BRK.B")
    pub symbol: String,

    /// Bar interval
    pub interval: Interval,

    /// How many days back from now to fetch
    pub lookback_days: u32,
}

impl FetchRequest {
    /// Create a request. The symbol is trimmed and uppercased.
    pub fn new(symbol: impl Into<String>, interval: Interval, lookback_days: u32) -> Self {
        Self {
            symbol: symbol.into().trim().to_uppercase(),
            interval,
            lookback_days,
        }
    }

    /// Validate the request before any connector is touched.
    ///
    /// Rejects empty or over-long symbols, symbols with characters outside
    /// `[A-Z0-9.-]`, and lookback windows outside `1..=MAX_LOOKBACK_DAYS`.
    pub fn validate(&self) -> Result<(), FetchError> {
        if self.symbol.is_empty() {
            return Err(FetchError::Validation {
                message: "symbol is empty".to_string(),
            });
        }

        if self.symbol.len() > MAX_SYMBOL_LEN {
            return Err(FetchError::Validation {
                message: format!(
                    "symbol '{}' exceeds {} characters",
                    self.symbol, MAX_SYMBOL_LEN
                ),
            });
        }

        if !self
            .symbol
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '.' || c == '-')
        {
            return Err(FetchError::Validation {
                message: format!("symbol '{}' contains invalid characters", self.symbol),
            });
        }

        if self.lookback_days == 0 {
            return Err(FetchError::Validation {
                message: "lookback_days must be positive".to_string(),
            });
        }

        if self.lookback_days > MAX_LOOKBACK_DAYS {
            return Err(FetchError::Validation {
                message: format!(
                    "lookback_days {} exceeds maximum {}",
                    self.lookback_days, MAX_LOOKBACK_DAYS
                ),
            });
        }

        Ok(())
    }

    /// Start of the requested window, measured back from now.
    pub fn window_start(&self) -> DateTime<Utc> {
        Utc::now() - Duration::days(i64::from(self.lookback_days))
    }
}

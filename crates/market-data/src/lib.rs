//! QuantForge Market Data Crate
//!
//! This crate fetches historical OHLCV bars for a ticker symbol from
//! one of several independent data providers, transparently falling
//! back to the next provider when one fails, is rate-limited, or has no
//! API key configured.
//!
//! # Overview
//!
//! Seven connectors are built in, tried in a fixed preference order:
//! the no-key Yahoo baseline first, then keyed providers ordered by
//! free-tier quota generosity. The caller always receives either a
//! normalized, ascending series of bars from exactly one provider, or a
//! single aggregate failure carrying the per-connector attempt trail.
//!
//! # Architecture
//!
//! ```text
//! +------------------+
//! |   FetchRequest   |  (symbol, interval, lookback)
//! +------------------+
//!          |
//!          v
//! +----------------------+
//! | FallbackOrchestrator |  (priority order, rate limit, retry)
//! +----------------------+
//!          |
//!          v
//! +------------------+
//! |    Connector     |  (Yahoo, Finnhub, Twelve Data, ...)
//! +------------------+
//!          |
//!          v
//! +------------------+
//! |       Bar        |  (normalized OHLCV)
//! +------------------+
//! ```
//!
//! # Core Types
//!
//! - [`FetchRequest`] - Validated request: symbol, interval, lookback
//! - [`Bar`] - Normalized OHLCV record
//! - [`Connector`] - Capability trait implemented once per provider
//! - [`FallbackOrchestrator`] - The fetch entry point
//! - [`FetchError`] - Typed failure taxonomy with retry classification
//! - [`AttemptTrail`] - Per-connector diagnosis of one fetch call

pub mod connector;
pub mod errors;
pub mod models;
pub mod orchestrator;

// Re-export all public types from models
pub use models::{Bar, ConnectorId, FetchRequest, Interval};

// Re-export error types
pub use errors::{ErrorKind, FetchError, RetryClass};

// Re-export connector types
pub use connector::alpha_vantage::AlphaVantageConnector;
pub use connector::finnhub::FinnhubConnector;
pub use connector::fmp::FmpConnector;
pub use connector::iex_cloud::IexCloudConnector;
pub use connector::polygon::PolygonConnector;
pub use connector::twelve_data::TwelveDataConnector;
pub use connector::yahoo::YahooConnector;
pub use connector::{Connector, Quota};

// Re-export orchestrator types
pub use orchestrator::{
    AttemptTrail, BarValidator, ConnectorAttempt, FallbackOrchestrator, RateLimiter, RetryPolicy,
    SkipReason, ValidatorConfig,
};

//! Market data models
//!
//! This module contains the core data types for OHLCV fetching:
//! - `types` - Type aliases for common identifiers (ConnectorId)
//! - `bar` - The normalized OHLCV record (Bar)
//! - `request` - The fetch request surface (FetchRequest, Interval)

mod bar;
mod request;
mod types;

pub use bar::Bar;
pub use request::{FetchRequest, Interval, MAX_LOOKBACK_DAYS, MAX_SYMBOL_LEN};
pub use types::ConnectorId;

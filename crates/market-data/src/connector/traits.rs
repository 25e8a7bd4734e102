//! Market data connector trait definition.
//!
//! This module defines the core `Connector` trait that all data
//! connectors must implement.

use async_trait::async_trait;

use crate::errors::FetchError;
use crate::models::{Bar, FetchRequest, Interval};

use super::quota::Quota;

/// Trait for market data connectors.
///
/// Implement this trait to add support for a new data provider.
/// The orchestrator uses the connector's availability, priority, and
/// quota declarations to decide when and how to call it.
///
/// A connector is a pure transport+parse adapter: it performs no
/// retrying and no rate-limit bookkeeping - both are injected
/// responsibilities of the orchestrator. Business-as-usual "no data for
/// this symbol" is reported as [`FetchError::NoData`], never as a
/// transport or auth failure, so the orchestrator can treat it as a
/// valid empty outcome.
///
/// # Example
///
/// ```ignore
/// use async_trait::async_trait;
/// use quantforge_market_data::connector::{Connector, Quota};
///
/// struct MyConnector {
///     api_key: String,
/// }
///
/// #[async_trait]
/// impl Connector for MyConnector {
///     fn id(&self) -> &'static str {
///         "MY_PROVIDER"
///     }
///
///     fn is_available(&self) -> bool {
///         !self.api_key.is_empty()
///     }
///
///     // ... implement fetch_ohlcv
/// }
/// ```
#[async_trait]
pub trait Connector: Send + Sync {
    /// Unique identifier for this connector.
    ///
    /// Should be a constant string like "YAHOO", "FINNHUB", etc.
    /// Used for logging, rate-limiter state, and the attempt trail.
    fn id(&self) -> &'static str;

    /// Connector priority for fallback ordering.
    ///
    /// Lower values = tried first. Default is 10. The built-in no-key
    /// connector sits at priority 1; keyed connectors follow in an order
    /// favoring higher free-tier quotas.
    fn priority(&self) -> u8 {
        10
    }

    /// The provider's free-tier call quota.
    fn quota(&self) -> Quota {
        Quota::default()
    }

    /// Bar intervals this connector can serve.
    fn supported_intervals(&self) -> &'static [Interval];

    /// Whether this connector can be used at all.
    ///
    /// True iff no API key is required, or a key is configured.
    /// Key format is never inspected here - a rejected key surfaces as
    /// [`FetchError::Auth`] from `fetch_ohlcv`.
    fn is_available(&self) -> bool {
        true
    }

    /// Fetch historical bars for the request.
    ///
    /// # Returns
    ///
    /// Bars for the requested window, sorted by timestamp ascending,
    /// or a `FetchError` describing the failure.
    async fn fetch_ohlcv(&self, request: &FetchRequest) -> Result<Vec<Bar>, FetchError>;
}

//! Connector call quota declarations.
//!
//! Each connector declares the free-tier quota its provider enforces.
//! The orchestrator's rate limiter uses these declarations to decide
//! whether a call is currently permitted.

use std::fmt;

/// Call quota for a connector.
///
/// Up to two rolling windows may be active at once (per-minute and
/// per-day); permission requires every active window to be under quota.
#[derive(Clone, Copy, Debug)]
pub struct Quota {
    /// Maximum calls per rolling minute, if the provider limits per minute.
    pub per_minute: Option<u32>,

    /// Maximum calls per rolling day, if the provider limits per day.
    pub per_day: Option<u32>,
}

impl Default for Quota {
    fn default() -> Self {
        Self {
            per_minute: Some(60),
            per_day: None,
        }
    }
}

impl fmt::Display for Quota {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.per_minute, self.per_day) {
            (Some(m), Some(d)) => write!(f, "{}/min, {}/day", m, d),
            (Some(m), None) => write!(f, "{}/min", m),
            (None, Some(d)) => write!(f, "{}/day", d),
            (None, None) => f.write_str("unlimited"),
        }
    }
}

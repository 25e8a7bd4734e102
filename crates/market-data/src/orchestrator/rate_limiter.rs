//! Rolling-window rate limiter for market data connectors.
//!
//! Tracks call timestamps per connector against up to two rolling quota
//! windows (per-minute and per-day). The limiter never blocks or sleeps;
//! it only answers yes/no, leaving skip-vs-wait to the caller. An
//! attempt is recorded at permission time, not on call completion, so
//! the count matches conservative provider-side accounting.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::connector::Quota;
use crate::models::ConnectorId;

const MINUTE_WINDOW: Duration = Duration::from_secs(60);
const DAY_WINDOW: Duration = Duration::from_secs(86_400);

/// Recorded call instants for one connector, one deque per window.
#[derive(Debug, Default)]
struct CallLog {
    minute: VecDeque<Instant>,
    day: VecDeque<Instant>,
}

impl CallLog {
    /// Drop entries that have aged out of their window.
    fn prune(&mut self, now: Instant) {
        while let Some(front) = self.minute.front() {
            if now.saturating_duration_since(*front) >= MINUTE_WINDOW {
                self.minute.pop_front();
            } else {
                break;
            }
        }
        while let Some(front) = self.day.front() {
            if now.saturating_duration_since(*front) >= DAY_WINDOW {
                self.day.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Rolling-window rate limiter for multiple connectors.
///
/// Thread-safe: one limiter is shared by every concurrent `fetch` call,
/// and all state updates happen under a single lock so concurrent calls
/// cannot overrun a quota. Logs are created on demand; connectors
/// without a configured quota get a default of 60 calls per minute.
pub struct RateLimiter {
    /// Per-connector call logs.
    logs: Mutex<HashMap<String, CallLog>>,
    /// Per-connector quota overrides.
    quotas: Mutex<HashMap<String, Quota>>,
}

impl RateLimiter {
    /// Create a new rate limiter with default settings.
    pub fn new() -> Self {
        Self {
            logs: Mutex::new(HashMap::new()),
            quotas: Mutex::new(HashMap::new()),
        }
    }

    /// Lock the logs mutex, recovering from poison if necessary.
    ///
    /// For rate limiting it is safe to recover from a poisoned mutex:
    /// the worst case is slightly incorrect accounting, which beats
    /// panicking.
    fn lock_logs(&self) -> MutexGuard<'_, HashMap<String, CallLog>> {
        self.logs.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter logs mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Lock the quotas mutex, recovering from poison if necessary.
    fn lock_quotas(&self) -> MutexGuard<'_, HashMap<String, Quota>> {
        self.quotas.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter quotas mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Configure the quota for a specific connector.
    ///
    /// Resets any call history already recorded for it.
    pub fn configure(&self, connector: &ConnectorId, quota: Quota) {
        let mut quotas = self.lock_quotas();
        quotas.insert(connector.to_string(), quota);
        drop(quotas); // Release quotas lock before acquiring logs lock

        let mut logs = self.lock_logs();
        logs.remove(connector.as_ref());
    }

    /// Ask for permission to call the connector now.
    ///
    /// Returns true and records the attempt if every active window is
    /// under quota; returns false without recording anything otherwise.
    pub fn permit(&self, connector: &ConnectorId) -> bool {
        self.permit_at(connector, Instant::now())
    }

    /// [`permit`](Self::permit) with an explicit clock reading, so tests
    /// can drive the windows deterministically.
    pub fn permit_at(&self, connector: &ConnectorId, now: Instant) -> bool {
        let quota = {
            let quotas = self.lock_quotas();
            quotas.get(connector.as_ref()).copied().unwrap_or_default()
        };

        let mut logs = self.lock_logs();
        let log = logs.entry(connector.to_string()).or_default();
        log.prune(now);

        if let Some(max) = quota.per_minute {
            if log.minute.len() >= max as usize {
                debug!("Rate limiter: '{}' over per-minute quota", connector);
                return false;
            }
        }

        if let Some(max) = quota.per_day {
            if log.day.len() >= max as usize {
                debug!("Rate limiter: '{}' over per-day quota", connector);
                return false;
            }
        }

        if quota.per_minute.is_some() {
            log.minute.push_back(now);
        }
        if quota.per_day.is_some() {
            log.day.push_back(now);
        }

        true
    }

    /// Calls recorded in the per-minute window for a connector.
    pub fn recorded_in_minute(&self, connector: &ConnectorId) -> usize {
        let mut logs = self.lock_logs();
        match logs.get_mut(connector.as_ref()) {
            Some(log) => {
                log.prune(Instant::now());
                log.minute.len()
            }
            None => 0,
        }
    }

    /// Reset the call history for a connector.
    pub fn reset(&self, connector: &ConnectorId) {
        let mut logs = self.lock_logs();
        logs.remove(connector.as_ref());
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

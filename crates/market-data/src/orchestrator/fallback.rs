//! Fallback orchestration across market data connectors.
//!
//! The orchestrator is the sole entry point of the crate: given a
//! validated request it walks the registered connectors in priority
//! order, applying the rate limiter and retry policy to each, until one
//! succeeds or every candidate is exhausted.
//!
//! Connectors are tried strictly sequentially, never in parallel - the
//! preference order exists to minimize quota consumption, and
//! speculative parallel calls would defeat that economy.

use std::borrow::Cow;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, info, warn};

use crate::connector::Connector;
use crate::errors::{ErrorKind, FetchError};
use crate::models::{Bar, ConnectorId, FetchRequest};

use super::rate_limiter::RateLimiter;
use super::retry::RetryPolicy;
use super::trail::{AttemptTrail, SkipReason};
use super::validator::BarValidator;

/// Fallback orchestrator for OHLCV fetching.
///
/// Holds the one piece of state shared across calls: the rate limiter's
/// rolling windows and the set of connectors whose credentials were
/// rejected (those are skipped for the remainder of the process
/// lifetime). Everything else is per-call.
pub struct FallbackOrchestrator {
    connectors: Vec<Arc<dyn Connector>>,
    rate_limiter: RateLimiter,
    retry_policy: RetryPolicy,
    validator: BarValidator,
    /// Connectors whose credential was rejected.
    auth_failed: Mutex<HashSet<String>>,
    /// Overall deadline applied to each `fetch` call.
    fetch_timeout: Option<Duration>,
}

impl FallbackOrchestrator {
    /// Create an orchestrator over the given connectors.
    ///
    /// The rate limiter is configured from each connector's declared
    /// quota.
    pub fn new(connectors: Vec<Arc<dyn Connector>>) -> Self {
        let rate_limiter = RateLimiter::new();
        for connector in &connectors {
            let id: ConnectorId = Cow::Borrowed(connector.id());
            rate_limiter.configure(&id, connector.quota());
        }

        Self {
            connectors,
            rate_limiter,
            retry_policy: RetryPolicy::default(),
            validator: BarValidator::new(),
            auth_failed: Mutex::new(HashSet::new()),
            fetch_timeout: None,
        }
    }

    /// Create an orchestrator with custom components.
    ///
    /// The rate limiter is taken as-is; quotas are not re-derived from
    /// the connectors.
    pub fn with_config(
        connectors: Vec<Arc<dyn Connector>>,
        rate_limiter: RateLimiter,
        retry_policy: RetryPolicy,
        validator: BarValidator,
    ) -> Self {
        Self {
            connectors,
            rate_limiter,
            retry_policy,
            validator,
            auth_failed: Mutex::new(HashSet::new()),
            fetch_timeout: None,
        }
    }

    /// Replace the retry policy.
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Bound every `fetch` call by an overall deadline.
    ///
    /// When the deadline passes, the in-flight attempt is abandoned and
    /// recorded as a transport failure; untried connectors are recorded
    /// as skipped.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }

    /// The registered connectors.
    pub fn connectors(&self) -> &[Arc<dyn Connector>] {
        &self.connectors
    }

    /// Lock the auth-failure set, recovering from poison if necessary.
    fn lock_auth_failed(&self) -> MutexGuard<'_, HashSet<String>> {
        self.auth_failed.lock().unwrap_or_else(|poisoned| {
            warn!("Auth-failure set mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn is_auth_latched(&self, connector: &str) -> bool {
        self.lock_auth_failed().contains(connector)
    }

    fn latch_auth_failure(&self, connector: &str) {
        warn!(
            "connector '{}' failed authentication, skipping for process lifetime",
            connector
        );
        self.lock_auth_failed().insert(connector.to_string());
    }

    /// Registered connectors in fallback order (ascending priority).
    fn ordered_connectors(&self) -> Vec<&Arc<dyn Connector>> {
        let mut ordered: Vec<_> = self.connectors.iter().collect();
        ordered.sort_by_key(|c| c.priority());
        ordered
    }

    /// Sort, deduplicate, and validate a fetched series.
    ///
    /// Returns the original length alongside the surviving bars so the
    /// caller can distinguish "empty because the connector had nothing"
    /// from "empty because everything failed validation".
    fn normalize(&self, mut bars: Vec<Bar>, connector: &str) -> (usize, Vec<Bar>) {
        let original = bars.len();
        bars.sort_by_key(|bar| bar.timestamp);
        bars.dedup_by_key(|bar| bar.timestamp);
        bars.retain(|bar| match self.validator.validate(bar) {
            Ok(()) => true,
            Err(violation) => {
                warn!(
                    "dropping bar {} from '{}': {}",
                    bar.timestamp, connector, violation
                );
                false
            }
        });
        (original, bars)
    }

    /// Fetch bars for the request, falling back across connectors.
    ///
    /// Returns the series from the first connector that succeeds
    /// (including a well-formed empty result), or
    /// [`FetchError::AllSourcesExhausted`] carrying the full attempt
    /// trail. Data is never merged across connectors.
    pub async fn fetch(&self, request: &FetchRequest) -> Result<Vec<Bar>, FetchError> {
        self.fetch_with_trail(request).await.0
    }

    /// [`fetch`](Self::fetch), additionally returning the attempt trail.
    ///
    /// Useful for diagnosing which connectors were skipped or failed
    /// even when the fetch ultimately succeeded.
    pub async fn fetch_with_trail(
        &self,
        request: &FetchRequest,
    ) -> (Result<Vec<Bar>, FetchError>, AttemptTrail) {
        let mut trail = AttemptTrail::new();

        if let Err(e) = request.validate() {
            return (Err(e), trail);
        }

        let deadline = self
            .fetch_timeout
            .map(|t| tokio::time::Instant::now() + t);
        let mut deadline_hit = false;

        for connector in self.ordered_connectors() {
            let id: ConnectorId = Cow::Borrowed(connector.id());

            if deadline_hit {
                trail.record_skip(id, SkipReason::DeadlineExceeded);
                continue;
            }

            if !connector.is_available() {
                debug!("connector '{}' has no API key, skipping", id);
                trail.record_skip(id, SkipReason::MissingApiKey);
                continue;
            }

            if self.is_auth_latched(connector.id()) {
                trail.record_skip(id, SkipReason::AuthFailed);
                continue;
            }

            if !connector.supported_intervals().contains(&request.interval) {
                debug!(
                    "connector '{}' does not serve interval {}, skipping",
                    id, request.interval
                );
                trail.record_skip(id, SkipReason::UnsupportedInterval);
                continue;
            }

            // Quota check happens before any network attempt; denial is
            // recorded as a rate-limit failure for this call
            if !self.rate_limiter.permit(&id) {
                debug!("connector '{}' is over local quota, skipping", id);
                trail.record_error(
                    id,
                    &FetchError::RateLimited {
                        connector: connector.id().to_string(),
                    },
                );
                continue;
            }

            debug!("fetching {} via '{}'", request.symbol, id);

            let attempt = self.retry_policy.attempt(|| connector.fetch_ohlcv(request));
            let outcome = match deadline {
                Some(at) => match tokio::time::timeout_at(at, attempt).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        warn!("fetch deadline exceeded while trying '{}'", id);
                        trail.record_error(
                            id,
                            &FetchError::Transport {
                                connector: connector.id().to_string(),
                                message: "fetch deadline exceeded".to_string(),
                            },
                        );
                        deadline_hit = true;
                        continue;
                    }
                },
                None => attempt.await,
            };

            match outcome {
                Ok(bars) => {
                    let (original, series) = self.normalize(bars, connector.id());

                    if series.is_empty() && original > 0 {
                        warn!("all {} bars from '{}' failed validation", original, id);
                        trail.record_error(
                            id,
                            &FetchError::Parse {
                                connector: connector.id().to_string(),
                                message: "all bars failed validation".to_string(),
                            },
                        );
                        continue;
                    }

                    info!("fetched {} bars for {} from '{}'", series.len(), request.symbol, id);
                    trail.record_success(id);
                    return (Ok(series), trail);
                }
                Err(e) => {
                    // A well-formed "no data" is a terminal, success-shaped
                    // outcome: return an empty series instead of falling
                    // through to lower-priority connectors
                    if e.kind() == ErrorKind::NoData {
                        info!("'{}' reported no data for {}", id, request.symbol);
                        trail.record_success(id);
                        return (Ok(Vec::new()), trail);
                    }

                    if e.kind() == ErrorKind::Auth {
                        self.latch_auth_failure(connector.id());
                    }

                    debug!("connector '{}' failed: {}, trying next", id, e);
                    trail.record_error(id, &e);
                }
            }
        }

        warn!("all sources exhausted: {}", trail);
        let error = FetchError::AllSourcesExhausted {
            trail: trail.clone(),
        };
        (Err(error), trail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::Quota;
    use crate::models::Interval;

    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static ALL_INTERVALS: [Interval; 8] = Interval::ALL;

    enum MockResult {
        Bars(Vec<Bar>),
        Transport,
        Auth,
        NoData,
        Hang,
    }

    struct MockConnector {
        id: &'static str,
        priority: u8,
        available: bool,
        quota: Quota,
        calls: AtomicUsize,
        result: MockResult,
    }

    impl MockConnector {
        fn new(id: &'static str, priority: u8, result: MockResult) -> Self {
            Self {
                id,
                priority,
                available: true,
                quota: Quota::default(),
                calls: AtomicUsize::new(0),
                result,
            }
        }

        fn unavailable(id: &'static str, priority: u8) -> Self {
            Self {
                available: false,
                ..Self::new(id, priority, MockResult::Transport)
            }
        }

        fn with_quota(mut self, quota: Quota) -> Self {
            self.quota = quota;
            self
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Connector for MockConnector {
        fn id(&self) -> &'static str {
            self.id
        }

        fn priority(&self) -> u8 {
            self.priority
        }

        fn quota(&self) -> Quota {
            self.quota
        }

        fn supported_intervals(&self) -> &'static [Interval] {
            &ALL_INTERVALS
        }

        fn is_available(&self) -> bool {
            self.available
        }

        async fn fetch_ohlcv(&self, _request: &FetchRequest) -> Result<Vec<Bar>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);

            match &self.result {
                MockResult::Bars(bars) => Ok(bars.clone()),
                MockResult::Transport => Err(FetchError::Transport {
                    connector: self.id.to_string(),
                    message: "mock transport failure".to_string(),
                }),
                MockResult::Auth => Err(FetchError::Auth {
                    connector: self.id.to_string(),
                }),
                MockResult::NoData => Err(FetchError::NoData {
                    connector: self.id.to_string(),
                }),
                MockResult::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Err(FetchError::NoData {
                        connector: self.id.to_string(),
                    })
                }
            }
        }
    }

    fn day_bar(day: u32, close: rust_decimal::Decimal) -> Bar {
        Bar::new(
            Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
            close - dec!(1),
            close + dec!(2),
            close - dec!(2),
            close,
            1000,
        )
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            backoff_multiplier: 2.0,
        }
    }

    fn request() -> FetchRequest {
        FetchRequest::new("AAPL", Interval::D1, 7)
    }

    #[tokio::test]
    async fn test_lower_priority_rank_wins() {
        let primary = Arc::new(MockConnector::new(
            "PRIMARY",
            1,
            MockResult::Bars(vec![day_bar(2, dec!(100))]),
        ));
        let secondary = Arc::new(MockConnector::new(
            "SECONDARY",
            5,
            MockResult::Bars(vec![day_bar(2, dec!(999))]),
        ));

        // Register out of order; priority decides
        let orchestrator =
            FallbackOrchestrator::new(vec![secondary.clone(), primary.clone()]);

        let bars = orchestrator.fetch(&request()).await.unwrap();
        assert_eq!(bars[0].close, dec!(100));
        assert_eq!(primary.call_count(), 1);
        assert_eq!(secondary.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_falls_back_after_exhausted_retries() {
        let primary = Arc::new(MockConnector::new("PRIMARY", 1, MockResult::Transport));
        let secondary = Arc::new(MockConnector::new(
            "SECONDARY",
            5,
            MockResult::Bars(vec![day_bar(2, dec!(42))]),
        ));

        let orchestrator =
            FallbackOrchestrator::new(vec![primary.clone(), secondary.clone()])
                .with_retry_policy(fast_retry());

        let (result, trail) = orchestrator.fetch_with_trail(&request()).await;

        let bars = result.unwrap();
        assert_eq!(bars[0].close, dec!(42));

        // The primary burned its full retry budget before fallback
        assert_eq!(primary.call_count(), 3);
        assert_eq!(secondary.call_count(), 1);

        let errors = trail.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0.as_ref(), "PRIMARY");
        assert_eq!(errors[0].1, ErrorKind::Transport);
        assert!(trail.has_success());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_trails_every_registered_connector() {
        let a = Arc::new(MockConnector::unavailable("A", 1));
        let b = Arc::new(MockConnector::unavailable("B", 2));
        let c = Arc::new(MockConnector::new("C", 3, MockResult::Transport));

        let orchestrator = FallbackOrchestrator::new(vec![a, b, c]).with_retry_policy(fast_retry());

        let result = orchestrator.fetch(&request()).await;
        match result {
            Err(FetchError::AllSourcesExhausted { trail }) => {
                assert_eq!(trail.attempts.len(), 3);
                assert_eq!(
                    trail.attempts[0].skipped,
                    Some(SkipReason::MissingApiKey)
                );
                assert_eq!(
                    trail.attempts[1].skipped,
                    Some(SkipReason::MissingApiKey)
                );
                assert_eq!(
                    trail.attempts[2].error.as_ref().unwrap().kind,
                    ErrorKind::Transport
                );
            }
            other => panic!("expected AllSourcesExhausted, got {:?}", other.map(|b| b.len())),
        }
    }

    #[tokio::test]
    async fn test_rate_limited_candidate_skipped_without_network_call() {
        let throttled = Arc::new(
            MockConnector::new("THROTTLED", 1, MockResult::Bars(vec![day_bar(2, dec!(10))]))
                .with_quota(Quota {
                    per_minute: Some(0),
                    per_day: None,
                }),
        );
        let fallback = Arc::new(MockConnector::new(
            "FALLBACK",
            5,
            MockResult::Bars(vec![day_bar(2, dec!(7))]),
        ));

        let orchestrator = FallbackOrchestrator::new(vec![throttled.clone(), fallback.clone()]);

        let (result, trail) = orchestrator.fetch_with_trail(&request()).await;
        assert_eq!(result.unwrap()[0].close, dec!(7));

        assert_eq!(throttled.call_count(), 0);
        let errors = trail.errors();
        assert_eq!(errors[0].1, ErrorKind::RateLimit);
    }

    #[tokio::test]
    async fn test_invalid_request_fails_before_any_connector() {
        let connector = Arc::new(MockConnector::new(
            "PRIMARY",
            1,
            MockResult::Bars(vec![day_bar(2, dec!(10))]),
        ));
        let orchestrator = FallbackOrchestrator::new(vec![connector.clone()]);

        let bad = FetchRequest::new("", Interval::D1, 7);
        let result = orchestrator.fetch(&bad).await;

        assert!(matches!(result, Err(FetchError::Validation { .. })));
        assert_eq!(connector.call_count(), 0);
    }

    #[tokio::test]
    async fn test_no_data_is_success_shaped() {
        let primary = Arc::new(MockConnector::new("PRIMARY", 1, MockResult::NoData));
        let secondary = Arc::new(MockConnector::new(
            "SECONDARY",
            5,
            MockResult::Bars(vec![day_bar(2, dec!(10))]),
        ));

        let orchestrator = FallbackOrchestrator::new(vec![primary.clone(), secondary.clone()]);

        let bars = orchestrator.fetch(&request()).await.unwrap();
        assert!(bars.is_empty());

        // No fallback happened: "no data" is a valid outcome
        assert_eq!(primary.call_count(), 1);
        assert_eq!(secondary.call_count(), 0);
    }

    #[tokio::test]
    async fn test_auth_failure_latches_for_process_lifetime() {
        let keyed = Arc::new(MockConnector::new("KEYED", 1, MockResult::Auth));
        let fallback = Arc::new(MockConnector::new(
            "FALLBACK",
            5,
            MockResult::Bars(vec![day_bar(2, dec!(10))]),
        ));

        let orchestrator = FallbackOrchestrator::new(vec![keyed.clone(), fallback.clone()]);

        orchestrator.fetch(&request()).await.unwrap();
        assert_eq!(keyed.call_count(), 1);

        // Second fetch must not touch the latched connector again
        let (result, trail) = orchestrator.fetch_with_trail(&request()).await;
        assert!(result.is_ok());
        assert_eq!(keyed.call_count(), 1);
        assert_eq!(trail.attempts[0].skipped, Some(SkipReason::AuthFailed));
    }

    #[tokio::test]
    async fn test_series_normalized_and_validated() {
        // Out of order, duplicated, and one incoherent bar
        let bars = vec![
            day_bar(3, dec!(103)),
            day_bar(1, dec!(101)),
            day_bar(3, dec!(103)),
            Bar::new(
                Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
                dec!(100),
                dec!(90), // high below low
                dec!(95),
                dec!(92),
                1000,
            ),
        ];
        let connector = Arc::new(MockConnector::new("PRIMARY", 1, MockResult::Bars(bars)));
        let orchestrator = FallbackOrchestrator::new(vec![connector]);

        let series = orchestrator.fetch(&request()).await.unwrap();

        assert_eq!(series.len(), 2);
        assert!(series[0].timestamp < series[1].timestamp);
        assert_eq!(series[0].close, dec!(101));
        assert_eq!(series[1].close, dec!(103));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_abandons_in_flight_attempt() {
        let hung = Arc::new(MockConnector::new("HUNG", 1, MockResult::Hang));
        let untried = Arc::new(MockConnector::new(
            "UNTRIED",
            5,
            MockResult::Bars(vec![day_bar(2, dec!(10))]),
        ));

        let orchestrator = FallbackOrchestrator::new(vec![hung.clone(), untried.clone()])
            .with_timeout(Duration::from_millis(50));

        let result = orchestrator.fetch(&request()).await;
        match result {
            Err(FetchError::AllSourcesExhausted { trail }) => {
                let errors = trail.errors();
                assert_eq!(errors[0].0.as_ref(), "HUNG");
                assert_eq!(errors[0].1, ErrorKind::Transport);
                assert_eq!(
                    trail.attempts[1].skipped,
                    Some(SkipReason::DeadlineExceeded)
                );
            }
            other => panic!("expected AllSourcesExhausted, got {:?}", other.map(|b| b.len())),
        }
        assert_eq!(untried.call_count(), 0);
    }
}

//! Error types and retry classification for the market data crate.
//!
//! This module provides:
//! - [`FetchError`]: The main error enum for all fetch operations
//! - [`ErrorKind`]: A lightweight projection carried in attempt trails
//! - [`RetryClass`]: Classification for determining retry behavior

mod retry;

pub use retry::RetryClass;

use thiserror::Error;

use crate::orchestrator::AttemptTrail;

/// Errors that can occur while fetching bars.
///
/// Each variant is classified into a [`RetryClass`] via the
/// [`retry_class`](Self::retry_class) method, which determines how the retry
/// policy and the orchestrator handle the error.
#[derive(Error, Debug)]
pub enum FetchError {
    /// The request was malformed (bad symbol, interval, or lookback).
    /// Fails fast before any connector is touched. Never retried.
    #[error("invalid request: {message}")]
    Validation {
        /// Description of what was wrong with the request
        message: String,
    },

    /// The connector's credential is missing or was rejected.
    /// The connector is skipped for the remainder of the process lifetime.
    #[error("authentication failed: {connector}")]
    Auth {
        /// The connector whose credential failed
        connector: String,
    },

    /// The local quota is exhausted or the provider signaled throttling.
    /// Retried with backoff up to the policy limit.
    #[error("rate limited: {connector}")]
    RateLimited {
        /// The connector that was throttled
        connector: String,
    },

    /// Network or connectivity failure, including timeouts.
    /// Retried with backoff up to the policy limit.
    #[error("transport error: {connector} - {message}")]
    Transport {
        /// The connector whose request failed
        connector: String,
        /// The underlying transport error
        message: String,
    },

    /// The provider response did not match the expected schema.
    /// Never retried - signals a provider-side format change.
    #[error("parse error: {connector} - {message}")]
    Parse {
        /// The connector whose response failed to parse
        connector: String,
        /// Description of the schema mismatch
        message: String,
    },

    /// Valid response, but no bars exist for the requested range.
    /// Success-shaped: the orchestrator surfaces an empty series.
    #[error("no data for range: {connector}")]
    NoData {
        /// The connector that returned the empty result
        connector: String,
    },

    /// Every candidate connector was unavailable, throttled, or failed.
    /// Carries the full per-connector attempt trail for diagnosis.
    #[error("all sources exhausted: {trail}")]
    AllSourcesExhausted {
        /// What happened at each connector, in attempt order
        trail: AttemptTrail,
    },
}

/// Lightweight error classification carried in attempt trails.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    Validation,
    Auth,
    RateLimit,
    Transport,
    Parse,
    NoData,
    Exhausted,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Validation => "validation",
            Self::Auth => "auth",
            Self::RateLimit => "rate-limit",
            Self::Transport => "transport",
            Self::Parse => "parse",
            Self::NoData => "no-data",
            Self::Exhausted => "exhausted",
        };
        f.write_str(name)
    }
}

impl FetchError {
    /// The kind of this error, for trail recording and diagnosis.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Auth { .. } => ErrorKind::Auth,
            Self::RateLimited { .. } => ErrorKind::RateLimit,
            Self::Transport { .. } => ErrorKind::Transport,
            Self::Parse { .. } => ErrorKind::Parse,
            Self::NoData { .. } => ErrorKind::NoData,
            Self::AllSourcesExhausted { .. } => ErrorKind::Exhausted,
        }
    }

    /// Returns the retry classification for this error.
    ///
    /// - [`RetryClass::Never`]: persistent failure, propagate immediately
    /// - [`RetryClass::WithBackoff`]: transient, retry the same connector
    /// - [`RetryClass::EmptySuccess`]: valid empty outcome, never retried
    ///
    /// # Examples
    ///
    /// ```
    /// use quantforge_market_data::errors::{FetchError, RetryClass};
    ///
    /// let error = FetchError::RateLimited { connector: "FINNHUB".to_string() };
    /// assert_eq!(error.retry_class(), RetryClass::WithBackoff);
    ///
    /// let error = FetchError::Auth { connector: "POLYGON".to_string() };
    /// assert_eq!(error.retry_class(), RetryClass::Never);
    /// ```
    pub fn retry_class(&self) -> RetryClass {
        match self {
            // Persistent failures - never retry
            Self::Validation { .. }
            | Self::Auth { .. }
            | Self::Parse { .. }
            | Self::AllSourcesExhausted { .. } => RetryClass::Never,

            // Transient failures - retry with backoff
            Self::RateLimited { .. } | Self::Transport { .. } => RetryClass::WithBackoff,

            // Valid empty outcome
            Self::NoData { .. } => RetryClass::EmptySuccess,
        }
    }
}

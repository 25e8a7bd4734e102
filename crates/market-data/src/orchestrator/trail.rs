//! Per-call attempt trail for fallback diagnostics.
//!
//! Every `fetch` builds a trail of what happened at each connector, in
//! order. On total exhaustion the trail is carried inside
//! [`FetchError::AllSourcesExhausted`](crate::errors::FetchError) so the
//! caller can see which quotas or keys need attention.

use std::fmt;

use crate::errors::{ErrorKind, FetchError};
use crate::models::ConnectorId;

/// Why a connector was skipped without a network attempt.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SkipReason {
    /// Requires an API key and none is configured.
    MissingApiKey,

    /// The connector's credential was rejected earlier in this process.
    AuthFailed,

    /// The connector does not serve the requested interval.
    UnsupportedInterval,

    /// The overall fetch deadline expired before this connector's turn.
    DeadlineExceeded,
}

/// Error details recorded for a failed attempt.
#[derive(Clone, Debug)]
pub struct AttemptError {
    /// Classification of the failure
    pub kind: ErrorKind,
    /// Rendered error message
    pub message: String,
}

/// Record of a single connector attempt during one fetch.
#[derive(Clone, Debug)]
pub struct ConnectorAttempt {
    pub connector: ConnectorId,
    pub skipped: Option<SkipReason>,
    pub error: Option<AttemptError>,
    pub success: bool,
}

/// Ordered record of every connector considered during one fetch.
#[derive(Clone, Debug, Default)]
pub struct AttemptTrail {
    pub attempts: Vec<ConnectorAttempt>,
}

impl AttemptTrail {
    pub fn new() -> Self {
        Self {
            attempts: Vec::new(),
        }
    }

    pub fn record_skip(&mut self, connector: ConnectorId, reason: SkipReason) {
        self.attempts.push(ConnectorAttempt {
            connector,
            skipped: Some(reason),
            error: None,
            success: false,
        });
    }

    pub fn record_error(&mut self, connector: ConnectorId, error: &FetchError) {
        self.attempts.push(ConnectorAttempt {
            connector,
            skipped: None,
            error: Some(AttemptError {
                kind: error.kind(),
                message: error.to_string(),
            }),
            success: false,
        });
    }

    pub fn record_success(&mut self, connector: ConnectorId) {
        self.attempts.push(ConnectorAttempt {
            connector,
            skipped: None,
            error: None,
            success: true,
        });
    }

    /// Check if any connector succeeded.
    pub fn has_success(&self) -> bool {
        self.attempts.iter().any(|a| a.success)
    }

    /// All recorded errors as (connector, kind) pairs.
    pub fn errors(&self) -> Vec<(&ConnectorId, ErrorKind)> {
        self.attempts
            .iter()
            .filter_map(|a| a.error.as_ref().map(|e| (&a.connector, e.kind)))
            .collect()
    }

    /// Summary for logging and error display.
    pub fn summary(&self) -> String {
        self.attempts
            .iter()
            .map(|a| {
                if a.success {
                    format!("{}: SUCCESS", a.connector)
                } else if let Some(skip) = &a.skipped {
                    format!("{}: SKIPPED ({:?})", a.connector, skip)
                } else if let Some(err) = &a.error {
                    format!("{}: {} ({})", a.connector, err.kind, err.message)
                } else {
                    format!("{}: UNKNOWN", a.connector)
                }
            })
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}

impl fmt::Display for AttemptTrail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

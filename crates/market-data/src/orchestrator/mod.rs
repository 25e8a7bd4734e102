//! Fallback orchestration module.
//!
//! This module provides the machinery around connector calls:
//! - Connector ordering and fallback (FallbackOrchestrator)
//! - Rolling-window rate limiting per connector
//! - Exponential-backoff retry per attempt
//! - Bar data validation
//! - Attempt-trail diagnostics

mod fallback;
mod rate_limiter;
mod retry;
mod trail;
mod validator;

pub use fallback::FallbackOrchestrator;
pub use rate_limiter::RateLimiter;
pub use retry::RetryPolicy;
pub use trail::{AttemptError, AttemptTrail, ConnectorAttempt, SkipReason};
pub use validator::{BarValidator, ValidatorConfig};

//! Provider orchestration.
//!
//! This module wraps the providers in everything a call needs:
//! - Capability filtering and priority ordering
//! - Per-host pacing
//! - Retry with exponential backoff and jitter
//! - Health tracking with backoff windows
//! - Payload validation

mod backoff;
mod chain;
mod health;
mod rate_limiter;
mod skip_reason;
mod validator;

pub use backoff::BackoffPolicy;
pub use chain::ProviderChain;
pub use health::{HealthSnapshot, HealthState, HealthTracker};
pub use rate_limiter::RateLimiter;
pub use skip_reason::{FetchDiagnostics, ProviderAttempt, SkipReason};
pub use validator::{PayloadValidator, ValidationIssue, ValidationSeverity, ValidatorConfig};

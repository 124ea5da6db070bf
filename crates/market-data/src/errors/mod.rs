//! Error types and retry classification for the market data crate.
//!
//! This module provides:
//! - [`MarketDataError`]: The main error enum for all market data operations
//! - [`TransientCause`]: The closed set of upstream failures worth retrying
//! - [`RetryClass`]: Classification for determining retry behavior

mod retry;

pub use retry::RetryClass;

use reqwest::StatusCode;
use thiserror::Error;

/// Upstream failure that may succeed if the same call is repeated.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum TransientCause {
    /// HTTP 429.
    #[error("HTTP 429 Too Many Requests")]
    TooManyRequests,

    /// HTTP 503.
    #[error("HTTP 503 Service Unavailable")]
    ServiceUnavailable,

    /// HTTP 504.
    #[error("HTTP 504 Gateway Timeout")]
    GatewayTimeout,

    /// Connection, DNS, or socket-level failure.
    #[error("I/O failure: {0}")]
    Io(String),
}

impl TransientCause {
    /// Maps an HTTP status to a transient cause, if it is one.
    pub fn from_status(status: StatusCode) -> Option<Self> {
        match status {
            StatusCode::TOO_MANY_REQUESTS => Some(Self::TooManyRequests),
            StatusCode::SERVICE_UNAVAILABLE => Some(Self::ServiceUnavailable),
            StatusCode::GATEWAY_TIMEOUT => Some(Self::GatewayTimeout),
            _ => None,
        }
    }
}

/// Errors that can occur during market data operations.
///
/// Only [`InvalidRequest`](Self::InvalidRequest) and
/// [`UnsupportedKind`](Self::UnsupportedKind) ever reach a caller of
/// [`Resolver::resolve`](crate::Resolver::resolve). Every other variant is
/// absorbed by the pipeline and ends in a synthetic result at worst.
#[derive(Error, Debug)]
pub enum MarketDataError {
    /// The symbol is empty, too long, or contains characters no exchange uses.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The requested data kind or one of its parameters is not supported.
    #[error("Unsupported kind: {0}")]
    UnsupportedKind(String),

    /// A provider failed in a way that may succeed on retry.
    #[error("Retryable failure from {provider}: {cause}")]
    ProviderRetryable {
        /// The provider that failed
        provider: String,
        /// What went wrong upstream
        cause: TransientCause,
    },

    /// A provider failed in a way that retrying will not fix.
    /// Covers other 4xx/5xx responses, parse failures, and payloads that
    /// fail validation.
    #[error("Fatal failure from {provider}: {message}")]
    ProviderFatal {
        /// The provider that failed
        provider: String,
        /// Description of the failure
        message: String,
    },

    /// Every eligible provider was tried and none produced data.
    #[error("All providers exhausted")]
    AllProvidersExhausted,

    /// The overall resolution deadline elapsed.
    #[error("Resolution deadline exceeded")]
    Timeout,

    /// The persistent store could not be read or written.
    #[error("Store error: {0}")]
    Store(String),
}

impl MarketDataError {
    /// Builds a retryable error for `provider`.
    pub fn retryable(provider: impl Into<String>, cause: TransientCause) -> Self {
        Self::ProviderRetryable {
            provider: provider.into(),
            cause,
        }
    }

    /// Builds a fatal error for `provider`.
    pub fn fatal(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProviderFatal {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Classifies an HTTP response status.
    ///
    /// Returns `None` for successful statuses. 429, 503 and 504 are
    /// retryable; every other non-success status is fatal for the call.
    pub fn from_status(provider: &str, status: StatusCode, body: &str) -> Option<Self> {
        if status.is_success() {
            return None;
        }

        if let Some(cause) = TransientCause::from_status(status) {
            return Some(Self::retryable(provider, cause));
        }

        let detail = body.trim();
        let message = if detail.is_empty() {
            format!("HTTP {}", status)
        } else {
            format!("HTTP {} - {}", status, truncate(detail, 200))
        };
        Some(Self::fatal(provider, message))
    }

    /// Classifies a transport-level `reqwest` failure.
    ///
    /// Connect, timeout and request failures are network I/O and therefore
    /// retryable; body decoding failures are parse errors and fatal.
    pub fn from_transport(provider: &str, error: reqwest::Error) -> Self {
        if error.is_decode() {
            return Self::fatal(provider, format!("Failed to decode response: {}", error));
        }

        if let Some(status) = error.status() {
            if let Some(classified) = Self::from_status(provider, status, "") {
                return classified;
            }
        }

        Self::retryable(provider, TransientCause::Io(error.to_string()))
    }

    /// Returns the retry classification for this error.
    ///
    /// - [`RetryClass::WithBackoff`]: retry the same provider with exponential backoff
    /// - [`RetryClass::NextProvider`]: give up on this provider, try the next one
    /// - [`RetryClass::Never`]: request-level or internal signal, never retried
    ///
    /// # Examples
    ///
    /// ```
    /// use borsvy_market_data::errors::{MarketDataError, RetryClass, TransientCause};
    ///
    /// let error = MarketDataError::retryable("FINNHUB", TransientCause::TooManyRequests);
    /// assert_eq!(error.retry_class(), RetryClass::WithBackoff);
    ///
    /// let error = MarketDataError::InvalidRequest("".to_string());
    /// assert_eq!(error.retry_class(), RetryClass::Never);
    /// ```
    pub fn retry_class(&self) -> RetryClass {
        match self {
            Self::ProviderRetryable { .. } => RetryClass::WithBackoff,

            Self::ProviderFatal { .. } | Self::Store(_) => RetryClass::NextProvider,

            Self::InvalidRequest(_)
            | Self::UnsupportedKind(_)
            | Self::AllProvidersExhausted
            | Self::Timeout => RetryClass::Never,
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

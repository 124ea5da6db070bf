//! Capability-tagged provider chain.
//!
//! The chain owns the providers and everything that mediates a call to
//! them:
//! - Selection by capability and priority (custom priorities win)
//! - Health gating (providers in backoff are skipped)
//! - Per-host pacing before every call
//! - Retry with exponential backoff on transient failures
//! - Payload validation

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info, warn};

use super::backoff::BackoffPolicy;
use super::health::{HealthSnapshot, HealthTracker};
use super::rate_limiter::RateLimiter;
use super::skip_reason::{FetchDiagnostics, SkipReason};
use super::validator::PayloadValidator;
use crate::errors::{MarketDataError, RetryClass};
use crate::models::{DataKind, HostId, MarketData, ProviderId, RequestKind, Symbol};
use crate::provider::MarketDataProvider;

/// Ordered set of providers plus the policies applied around each call.
pub struct ProviderChain {
    providers: Vec<Arc<dyn MarketDataProvider>>,
    /// Overrides of the static priority (provider_id -> priority).
    custom_priorities: HashMap<String, i32>,
    rate_limiter: RateLimiter,
    health: HealthTracker,
    backoff: BackoffPolicy,
    validator: PayloadValidator,
}

impl ProviderChain {
    /// Create a chain with the default backoff policy.
    pub fn new(providers: Vec<Arc<dyn MarketDataProvider>>) -> Self {
        Self::with_policy(providers, BackoffPolicy::default())
    }

    pub fn with_policy(providers: Vec<Arc<dyn MarketDataProvider>>, backoff: BackoffPolicy) -> Self {
        Self {
            providers,
            custom_priorities: HashMap::new(),
            rate_limiter: RateLimiter::new(),
            health: HealthTracker::new(backoff.clone()),
            backoff,
            validator: PayloadValidator::new(),
        }
    }

    /// Override provider priorities.
    ///
    /// * `custom_priorities` - provider_id -> priority. Lower values are tried first.
    pub fn with_priorities(mut self, custom_priorities: HashMap<String, i32>) -> Self {
        self.custom_priorities = custom_priorities;
        self
    }

    pub fn with_validator(mut self, validator: PayloadValidator) -> Self {
        self.validator = validator;
        self
    }

    fn effective_priority(&self, provider: &dyn MarketDataProvider) -> i32 {
        self.custom_priorities
            .get(provider.id())
            .copied()
            .unwrap_or_else(|| provider.priority() as i32)
    }

    /// Providers declaring `kind`, in the order they would be tried.
    ///
    /// Ignores health. Ties keep registration order.
    pub fn ordered_providers(&self, kind: DataKind) -> Vec<&Arc<dyn MarketDataProvider>> {
        let mut providers: Vec<_> = self
            .providers
            .iter()
            .filter(|p| p.capabilities().supports(kind))
            .collect();

        providers.sort_by_key(|p| self.effective_priority(p.as_ref()));
        providers
    }

    /// Providers that may be called for `kind` right now, highest priority first.
    ///
    /// A provider is eligible when it declares the capability and is not
    /// inside a backoff window. Every exclusion is recorded in `diagnostics`.
    pub fn eligible(
        &self,
        kind: DataKind,
        diagnostics: &mut FetchDiagnostics,
    ) -> Vec<Arc<dyn MarketDataProvider>> {
        for provider in &self.providers {
            if !provider.capabilities().supports(kind) {
                diagnostics.record_skip(
                    Cow::Borrowed(provider.id()),
                    SkipReason::CapabilityMismatch { kind },
                );
            }
        }

        self.ordered_providers(kind)
            .into_iter()
            .filter(|provider| {
                let provider_id: ProviderId = Cow::Borrowed(provider.id());
                let available = self.health.is_available(&provider_id);
                if !available {
                    debug!("Provider '{}' is backing off, skipping", provider_id);
                    diagnostics.record_skip(provider_id, SkipReason::BackingOff);
                }
                available
            })
            .cloned()
            .collect()
    }

    /// Walk the eligible providers until one returns a valid payload.
    ///
    /// Returns the winning provider's id with the payload, or
    /// [`MarketDataError::AllProvidersExhausted`] once every eligible
    /// provider has failed.
    pub async fn fetch(
        &self,
        symbol: &Symbol,
        kind: &RequestKind,
        diagnostics: &mut FetchDiagnostics,
    ) -> Result<(ProviderId, MarketData), MarketDataError> {
        let providers = self.eligible(kind.data_kind(), diagnostics);

        if providers.is_empty() {
            warn!("No eligible providers for {} {}", symbol, kind);
            return Err(MarketDataError::AllProvidersExhausted);
        }

        for provider in providers {
            let provider_id: ProviderId = Cow::Borrowed(provider.id());

            // Another request may have opened a window since selection
            if !self.health.is_available(&provider_id) {
                diagnostics.record_skip(provider_id, SkipReason::BackingOff);
                continue;
            }

            let (outcome, calls) = self.call_with_retry(provider.as_ref(), symbol, kind).await;

            match outcome {
                Ok(data) => {
                    diagnostics.record_success(provider_id.clone(), calls);
                    return Ok((provider_id, data));
                }
                Err(e) => {
                    info!(
                        "Provider '{}' failed for {} {} after {} call(s): {}",
                        provider_id, symbol, kind, calls, e
                    );
                    diagnostics.record_error(provider_id, calls, e.to_string());
                }
            }
        }

        Err(MarketDataError::AllProvidersExhausted)
    }

    /// Call one provider, retrying transient failures per the backoff policy.
    ///
    /// Returns the outcome and the number of calls made. Health is updated
    /// for every outcome: success clears it, exhaustion opens a backoff
    /// window, fatal errors are only counted.
    async fn call_with_retry(
        &self,
        provider: &dyn MarketDataProvider,
        symbol: &Symbol,
        kind: &RequestKind,
    ) -> (Result<MarketData, MarketDataError>, u32) {
        let provider_id: ProviderId = Cow::Borrowed(provider.id());
        let host: HostId = Cow::Borrowed(provider.host());
        let min_interval = provider.rate_limit().min_interval;
        let max_attempts = self.backoff.max_attempts();

        let mut attempt = 0;
        loop {
            attempt += 1;

            self.rate_limiter.acquire(&host, min_interval).await;

            let outcome = match provider.fetch(symbol, kind).await {
                Ok(data) => self.validator.validate(provider.id(), kind, data),
                Err(e) => Err(e),
            };

            let error = match outcome {
                Ok(data) => {
                    self.health.record_success(&provider_id);
                    return (Ok(data), attempt);
                }
                Err(e) => e,
            };

            match error.retry_class() {
                RetryClass::WithBackoff if attempt < max_attempts => {
                    self.health.record_transient(&provider_id, &error.to_string());
                    let delay = self.backoff.jittered_delay(attempt);
                    debug!(
                        "Provider '{}' attempt {}/{} failed ({}), retrying in {:?}",
                        provider_id, attempt, max_attempts, error, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryClass::WithBackoff => {
                    self.health.record_exhausted(&provider_id, &error.to_string());
                    return (Err(error), attempt);
                }
                RetryClass::NextProvider | RetryClass::Never => {
                    self.health.record_fatal(&provider_id, &error.to_string());
                    return (Err(error), attempt);
                }
            }
        }
    }

    /// Get the list of registered providers.
    pub fn providers(&self) -> &[Arc<dyn MarketDataProvider>] {
        &self.providers
    }

    pub fn health(&self) -> &HealthTracker {
        &self.health
    }

    /// Health of every registered provider, including ones never called.
    pub fn health_snapshot(&self) -> Vec<HealthSnapshot> {
        let mut snapshots = self.health.snapshot();
        for provider in &self.providers {
            if !snapshots.iter().any(|s| s.provider == provider.id()) {
                snapshots.push(HealthSnapshot::healthy(provider.id()));
            }
        }
        snapshots.sort_by(|a, b| a.provider.cmp(&b.provider));
        snapshots
    }
}

//! Skip reason tracking for provider selection diagnostics.

use crate::models::{DataKind, ProviderId};

/// Why a provider was skipped during a chain walk.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SkipReason {
    /// Provider does not declare the requested capability.
    CapabilityMismatch { kind: DataKind },

    /// Provider is inside an open backoff window.
    BackingOff,
}

/// Record of a single provider attempt during a fetch.
#[derive(Clone, Debug)]
pub struct ProviderAttempt {
    pub provider_id: ProviderId,
    pub skipped: Option<SkipReason>,
    pub error: Option<String>,
    /// Number of calls made to the provider, retries included.
    pub calls: u32,
    pub success: bool,
}

/// Per-resolution ledger of every provider considered.
#[derive(Clone, Debug, Default)]
pub struct FetchDiagnostics {
    pub attempts: Vec<ProviderAttempt>,
}

impl FetchDiagnostics {
    pub fn new() -> Self {
        Self {
            attempts: Vec::new(),
        }
    }

    pub fn record_skip(&mut self, provider_id: ProviderId, reason: SkipReason) {
        self.attempts.push(ProviderAttempt {
            provider_id,
            skipped: Some(reason),
            error: None,
            calls: 0,
            success: false,
        });
    }

    pub fn record_error(&mut self, provider_id: ProviderId, calls: u32, error: String) {
        self.attempts.push(ProviderAttempt {
            provider_id,
            skipped: None,
            error: Some(error),
            calls,
            success: false,
        });
    }

    pub fn record_success(&mut self, provider_id: ProviderId, calls: u32) {
        self.attempts.push(ProviderAttempt {
            provider_id,
            skipped: None,
            error: None,
            calls,
            success: true,
        });
    }

    /// Summary for logging/debugging.
    pub fn summary(&self) -> String {
        if self.attempts.is_empty() {
            return "no eligible providers".to_string();
        }

        self.attempts
            .iter()
            .map(|a| {
                if a.success {
                    format!("{}: SUCCESS", a.provider_id)
                } else if let Some(skip) = &a.skipped {
                    format!("{}: SKIPPED ({:?})", a.provider_id, skip)
                } else if let Some(err) = &a.error {
                    format!("{}: ERROR x{} ({})", a.provider_id, a.calls, err)
                } else {
                    format!("{}: UNKNOWN", a.provider_id)
                }
            })
            .collect::<Vec<_>>()
            .join(" -> ")
    }

    /// Total provider calls made, retries included.
    pub fn total_calls(&self) -> u32 {
        self.attempts.iter().map(|a| a.calls).sum()
    }

    pub fn skip_reasons(&self) -> Vec<(&ProviderId, &SkipReason)> {
        self.attempts
            .iter()
            .filter_map(|a| a.skipped.as_ref().map(|s| (&a.provider_id, s)))
            .collect()
    }

    pub fn errors(&self) -> Vec<(&ProviderId, &str)> {
        self.attempts
            .iter()
            .filter_map(|a| a.error.as_ref().map(|e| (&a.provider_id, e.as_str())))
            .collect()
    }
}

//! Provider capabilities and pacing configuration.

use std::time::Duration;

use crate::models::DataKind;

/// Describes which request kinds a provider can serve.
///
/// Used by the chain to filter providers before any call is made.
#[derive(Clone, Debug)]
pub struct ProviderCapabilities {
    /// Kinds this provider serves (Quote, Details, History, News).
    pub kinds: &'static [DataKind],
}

impl ProviderCapabilities {
    pub fn supports(&self, kind: DataKind) -> bool {
        self.kinds.contains(&kind)
    }
}

/// Pacing configuration for a provider.
///
/// Controls how often we may call the provider's host without being
/// throttled.
#[derive(Clone, Debug)]
pub struct RateLimit {
    /// Minimum delay between two calls to the same host.
    pub min_interval: Duration,
}

impl RateLimit {
    pub fn per_minute(requests: u32) -> Self {
        Self {
            min_interval: Duration::from_secs(60) / requests.max(1),
        }
    }

    pub fn unlimited() -> Self {
        Self {
            min_interval: Duration::ZERO,
        }
    }
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_secs(1),
        }
    }
}

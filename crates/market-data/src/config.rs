//! Resolver configuration.
//!
//! Every knob has a default matching production behavior. Durations are
//! stored as plain integers (seconds or milliseconds, as the field name
//! says) so the struct deserializes from flat config files and env vars.

use std::str::FromStr;
use std::time::Duration;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::models::RequestKind;

/// Symbols loaded by [`Resolver::popular`](crate::Resolver::popular).
pub const DEFAULT_POPULAR_SYMBOLS: [&str; 10] = [
    "AAPL", "MSFT", "GOOGL", "AMZN", "META", "NVDA", "TSLA", "JPM", "V", "WMT",
];

/// Cache lifetimes per data kind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TtlPolicy {
    pub quote_secs: u64,
    pub details_secs: u64,
    pub popular_secs: u64,
    /// `None` disables caching of this kind.
    pub history_secs: Option<u64>,
    pub news_secs: Option<u64>,
    /// Lifetime of a cached synthetic value. Kept short so real data wins quickly.
    pub synthetic_secs: u64,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            quote_secs: 60,
            details_secs: 3600,
            popular_secs: 3600,
            history_secs: None,
            news_secs: None,
            synthetic_secs: 15,
        }
    }
}

impl TtlPolicy {
    /// Cache TTL for a real value of `kind`, or `None` if the kind is not cached.
    pub fn for_kind(&self, kind: &RequestKind) -> Option<Duration> {
        let secs = match kind {
            RequestKind::Quote => Some(self.quote_secs),
            RequestKind::Details => Some(self.details_secs),
            RequestKind::History(_) => self.history_secs,
            RequestKind::News(_) => self.news_secs,
        };
        secs.map(Duration::from_secs)
    }

    pub fn popular(&self) -> Duration {
        Duration::from_secs(self.popular_secs)
    }

    pub fn synthetic(&self) -> Duration {
        Duration::from_secs(self.synthetic_secs)
    }
}

/// Oldest store record accepted as "fresh enough", per kind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StorePolicy {
    pub quote_secs: u64,
    pub details_secs: u64,
    pub history_secs: u64,
    pub news_secs: u64,
}

impl Default for StorePolicy {
    fn default() -> Self {
        Self {
            quote_secs: 60,
            details_secs: 3600,
            history_secs: 3600,
            news_secs: 900,
        }
    }
}

impl StorePolicy {
    pub fn max_age(&self, kind: &RequestKind) -> chrono::Duration {
        let secs = match kind {
            RequestKind::Quote => self.quote_secs,
            RequestKind::Details => self.details_secs,
            RequestKind::History(_) => self.history_secs,
            RequestKind::News(_) => self.news_secs,
        };
        chrono::Duration::seconds(secs.min(i64::MAX as u64) as i64)
    }
}

/// Retry and cooldown settings for provider calls.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BackoffConfig {
    /// Total attempts per provider call, including the first.
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
    /// Upper bound of the random delay added to each retry.
    pub jitter_ms: u64,
    /// Backoff window after the first exhaustion; doubles per consecutive exhaustion.
    pub cooldown_base_secs: u64,
    pub cooldown_max_secs: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1000,
            multiplier: 2.0,
            max_delay_ms: 10_000,
            jitter_ms: 250,
            cooldown_base_secs: 30,
            cooldown_max_secs: 300,
        }
    }
}

/// Top-level resolver configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ResolverConfig {
    pub ttl: TtlPolicy,
    pub store: StorePolicy,
    pub backoff: BackoffConfig,
    /// Upper bound on one resolution, cache lookup through synthesis.
    pub deadline_ms: u64,
    pub sweep_interval_secs: u64,
    pub synthetic_seed: u64,
    pub popular_symbols: Vec<String>,
    pub max_news_limit: u32,
    /// How long a real payload is kept as a synthesis seed after it was last seen.
    pub last_known_secs: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            ttl: TtlPolicy::default(),
            store: StorePolicy::default(),
            backoff: BackoffConfig::default(),
            deadline_ms: 10_000,
            sweep_interval_secs: 30,
            synthetic_seed: 42,
            popular_symbols: DEFAULT_POPULAR_SYMBOLS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_news_limit: 50,
            last_known_secs: 86_400,
        }
    }
}

impl ResolverConfig {
    /// Build a config from `MARKET_DATA_*` environment variables.
    ///
    /// Unset or unparsable variables fall back to the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let read = |name: &str| lookup(name);

        let popular_symbols = read("MARKET_DATA_POPULAR_SYMBOLS")
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_ascii_uppercase())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|symbols| !symbols.is_empty())
            .unwrap_or(defaults.popular_symbols);

        Self {
            ttl: TtlPolicy {
                quote_secs: parse_or(&read, "MARKET_DATA_QUOTE_TTL_SECS", defaults.ttl.quote_secs),
                details_secs: parse_or(
                    &read,
                    "MARKET_DATA_DETAILS_TTL_SECS",
                    defaults.ttl.details_secs,
                ),
                popular_secs: parse_or(
                    &read,
                    "MARKET_DATA_POPULAR_TTL_SECS",
                    defaults.ttl.popular_secs,
                ),
                synthetic_secs: parse_or(
                    &read,
                    "MARKET_DATA_SYNTHETIC_TTL_SECS",
                    defaults.ttl.synthetic_secs,
                ),
                ..defaults.ttl
            },
            store: defaults.store,
            backoff: BackoffConfig {
                max_attempts: parse_or(
                    &read,
                    "MARKET_DATA_RETRY_MAX_ATTEMPTS",
                    defaults.backoff.max_attempts,
                )
                .max(1),
                initial_delay_ms: parse_or(
                    &read,
                    "MARKET_DATA_RETRY_INITIAL_DELAY_MS",
                    defaults.backoff.initial_delay_ms,
                ),
                max_delay_ms: parse_or(
                    &read,
                    "MARKET_DATA_RETRY_MAX_DELAY_MS",
                    defaults.backoff.max_delay_ms,
                ),
                cooldown_base_secs: parse_or(
                    &read,
                    "MARKET_DATA_COOLDOWN_BASE_SECS",
                    defaults.backoff.cooldown_base_secs,
                ),
                cooldown_max_secs: parse_or(
                    &read,
                    "MARKET_DATA_COOLDOWN_MAX_SECS",
                    defaults.backoff.cooldown_max_secs,
                ),
                ..defaults.backoff
            },
            deadline_ms: parse_or(&read, "MARKET_DATA_DEADLINE_MS", defaults.deadline_ms),
            sweep_interval_secs: parse_or(
                &read,
                "MARKET_DATA_SWEEP_INTERVAL_SECS",
                defaults.sweep_interval_secs,
            ),
            synthetic_seed: parse_or(&read, "MARKET_DATA_SYNTHETIC_SEED", defaults.synthetic_seed),
            popular_symbols,
            max_news_limit: parse_or(
                &read,
                "MARKET_DATA_MAX_NEWS_LIMIT",
                defaults.max_news_limit,
            ),
            last_known_secs: parse_or(
                &read,
                "MARKET_DATA_LAST_KNOWN_SECS",
                defaults.last_known_secs,
            ),
        }
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    pub fn last_known_retention(&self) -> Duration {
        Duration::from_secs(self.last_known_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

fn parse_or<T, F>(read: &F, name: &str, default: T) -> T
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match read(name) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Ignoring invalid value '{}' for {}", raw, name);
            default
        }),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Interval;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = ResolverConfig::default();
        assert_eq!(config.deadline(), Duration::from_secs(10));
        assert_eq!(config.ttl.for_kind(&RequestKind::Quote), Some(Duration::from_secs(60)));
        assert_eq!(
            config.ttl.for_kind(&RequestKind::Details),
            Some(Duration::from_secs(3600))
        );
        assert_eq!(config.ttl.for_kind(&RequestKind::History(Interval::OneDay)), None);
        assert_eq!(config.ttl.for_kind(&RequestKind::News(10)), None);
        assert_eq!(config.backoff.max_attempts, 3);
        assert_eq!(config.popular_symbols.len(), 10);
        assert_eq!(config.store.max_age(&RequestKind::News(5)), chrono::Duration::minutes(15));
    }

    #[test]
    fn test_from_lookup_overrides_and_falls_back() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("MARKET_DATA_DEADLINE_MS", "2500"),
            ("MARKET_DATA_QUOTE_TTL_SECS", "not-a-number"),
            ("MARKET_DATA_POPULAR_SYMBOLS", "aapl, msft,,"),
            ("MARKET_DATA_RETRY_MAX_ATTEMPTS", "0"),
            ("MARKET_DATA_LAST_KNOWN_SECS", "7200"),
        ]);

        let config = ResolverConfig::from_lookup(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.deadline(), Duration::from_millis(2500));
        assert_eq!(config.ttl.quote_secs, 60);
        assert_eq!(config.popular_symbols, vec!["AAPL", "MSFT"]);
        assert_eq!(config.backoff.max_attempts, 1);
        assert_eq!(config.max_news_limit, 50);
        assert_eq!(config.last_known_retention(), Duration::from_secs(7200));
    }

    #[test]
    fn test_deserialize_partial_config() {
        let config: ResolverConfig =
            serde_json::from_str(r#"{"deadlineMs": 500, "ttl": {"quoteSecs": 5}}"#).unwrap();
        assert_eq!(config.deadline_ms, 500);
        assert_eq!(config.ttl.quote_secs, 5);
        assert_eq!(config.ttl.details_secs, 3600);
        assert_eq!(config.backoff, BackoffConfig::default());
    }
}

//! Exponential retry delays and provider cooldown windows.

use std::time::Duration;

use rand::Rng;

use crate::config::BackoffConfig;

/// Retry schedule derived from [`BackoffConfig`].
#[derive(Clone, Debug)]
pub struct BackoffPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    multiplier: f64,
    max_delay: Duration,
    jitter: Duration,
    cooldown_base: Duration,
    cooldown_max: Duration,
}

impl BackoffPolicy {
    pub fn from_config(config: &BackoffConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            multiplier: if config.multiplier.is_finite() && config.multiplier >= 1.0 {
                config.multiplier
            } else {
                1.0
            },
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter: Duration::from_millis(config.jitter_ms),
            cooldown_base: Duration::from_secs(config.cooldown_base_secs),
            cooldown_max: Duration::from_secs(config.cooldown_max_secs.max(config.cooldown_base_secs)),
        }
    }

    /// Total attempts per call, including the first one.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before retry number `retry` (1-based), without jitter.
    ///
    /// `initial * multiplier^(retry - 1)`, capped at the max delay.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(32) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = secs.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }

    /// [`delay_for`](Self::delay_for) plus a random jitter in `[0, jitter]`.
    pub fn jittered_delay(&self, retry: u32) -> Duration {
        let base = self.delay_for(retry);
        if self.jitter.is_zero() {
            return base;
        }
        let jitter_ms = rand::thread_rng().gen_range(0..=self.jitter.as_millis() as u64);
        base + Duration::from_millis(jitter_ms)
    }

    /// Backoff window after the `streak`-th consecutive exhaustion (1-based).
    ///
    /// `base * 2^(streak - 1)`, capped.
    pub fn cooldown_for(&self, streak: u32) -> Duration {
        let shift = streak.saturating_sub(1).min(16);
        self.cooldown_base
            .checked_mul(1u32 << shift)
            .unwrap_or(self.cooldown_max)
            .min(self.cooldown_max)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&BackoffConfig::default())
    }
}

//! End-to-end behavior of the resolution pipeline.
//!
//! Every test runs on paused tokio time, so backoff, cooldowns and the
//! resolution deadline elapse instantly.

mod common;

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::time::Instant;

use borsvy_market_data::{HealthState, Interval, Origin, RequestKind};
use common::{resolver_with, MockProvider};

// =============================================================================
// Cache
// =============================================================================

#[tokio::test(start_paused = true)]
async fn repeated_requests_within_ttl_hit_upstream_once() {
    let provider = Arc::new(MockProvider::quoting("A", 1, dec!(150)));
    let (resolver, store) = resolver_with(&[provider.clone()]);

    let first = resolver.resolve("AAPL", RequestKind::Quote).await.unwrap();
    tokio::time::advance(Duration::from_secs(30)).await;
    let second = resolver.resolve("AAPL", RequestKind::Quote).await.unwrap();

    assert_eq!(provider.calls(), 1);
    assert_eq!(store.reads(), 1);
    assert_eq!(first.value, second.value);
    assert_eq!(first.origin, Origin::Provider("A".into()));
    assert_eq!(second.origin, Origin::Cache);
}

#[tokio::test(start_paused = true)]
async fn symbols_are_case_normalized() {
    let provider = Arc::new(MockProvider::quoting("A", 1, dec!(150)));
    let (resolver, _) = resolver_with(&[provider.clone()]);

    resolver.resolve(" aapl ", RequestKind::Quote).await.unwrap();
    let second = resolver.resolve("AAPL", RequestKind::Quote).await.unwrap();

    assert_eq!(second.origin, Origin::Cache);
    assert_eq!(provider.calls(), 1);
}

// =============================================================================
// Single-flight
// =============================================================================

#[tokio::test(start_paused = true)]
async fn concurrent_cold_requests_share_one_walk() {
    let provider = Arc::new(MockProvider::quoting("A", 1, dec!(150)).with_delay(Duration::from_secs(2)));
    let (resolver, store) = resolver_with(&[provider.clone()]);

    let requests = (0..25).map(|_| {
        let resolver = resolver.clone();
        async move { resolver.resolve("AAPL", RequestKind::Quote).await.unwrap() }
    });
    let results = join_all(requests).await;

    assert_eq!(provider.calls(), 1);
    assert_eq!(store.reads(), 1);
    assert!(results
        .iter()
        .all(|r| r.origin == Origin::Provider("A".into()) && r.value == results[0].value));
    assert_eq!(resolver.in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn concurrent_requests_for_different_keys_do_not_share() {
    let provider = Arc::new(MockProvider::quoting("A", 1, dec!(150)).with_delay(Duration::from_secs(1)));
    let (resolver, _) = resolver_with(&[provider.clone()]);

    let (aapl, msft) = tokio::join!(
        resolver.resolve("AAPL", RequestKind::Quote),
        resolver.resolve("MSFT", RequestKind::Quote),
    );

    assert!(aapl.is_ok() && msft.is_ok());
    assert_eq!(provider.calls(), 2);
}

// =============================================================================
// Backoff and fallback
// =============================================================================

#[tokio::test(start_paused = true)]
async fn throttled_provider_enters_backoff_and_is_skipped() {
    let provider = Arc::new(MockProvider::throttled("A", 1));
    let (resolver, _) = resolver_with(&[provider.clone()]);

    let result = resolver.resolve("AAPL", RequestKind::Quote).await.unwrap();
    assert_eq!(result.origin, Origin::Synthetic);
    assert_eq!(provider.calls(), 3);

    let health = resolver.provider_health();
    assert_eq!(health[0].state, HealthState::Backoff);

    // Same kind, inside the cooldown window
    let result = resolver.resolve("MSFT", RequestKind::Quote).await.unwrap();
    assert_eq!(result.origin, Origin::Synthetic);
    assert_eq!(provider.calls(), 3);

    // Window closed: the provider is tried again
    tokio::time::advance(Duration::from_secs(31)).await;
    resolver.resolve("NVDA", RequestKind::Quote).await.unwrap();
    assert_eq!(provider.calls(), 6);
}

#[tokio::test(start_paused = true)]
async fn backing_off_provider_falls_through_to_next() {
    let a = Arc::new(MockProvider::throttled("A", 1));
    let b = Arc::new(MockProvider::quoting("B", 2, dec!(99.5)));
    let (resolver, _) = resolver_with(&[b.clone(), a.clone()]);

    let first = resolver.resolve("AAPL", RequestKind::Quote).await.unwrap();
    assert_eq!(first.origin, Origin::Provider("B".into()));
    assert_eq!(a.calls(), 3);

    // A is now backing off and never called
    let second = resolver.resolve("MSFT", RequestKind::Quote).await.unwrap();
    assert_eq!(second.origin, Origin::Provider("B".into()));
    assert_eq!(a.calls(), 3);
    assert_eq!(b.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn fatal_errors_do_not_open_backoff() {
    let a = Arc::new(MockProvider::broken("A", 1));
    let b = Arc::new(MockProvider::quoting("B", 2, dec!(10)));
    let (resolver, _) = resolver_with(&[a.clone(), b.clone()]);

    resolver.resolve("AAPL", RequestKind::Quote).await.unwrap();
    resolver.resolve("MSFT", RequestKind::Quote).await.unwrap();

    // Tried once per request, never retried, never skipped
    assert_eq!(a.calls(), 2);
    let health = resolver.provider_health();
    assert_eq!(health[0].provider, "A");
    assert_eq!(health[0].state, HealthState::Healthy);
    assert_eq!(health[0].fatal_count, 2);
}

// =============================================================================
// Synthesis
// =============================================================================

#[tokio::test(start_paused = true)]
async fn every_provider_failing_still_yields_a_result() {
    let a = Arc::new(MockProvider::broken("A", 1));
    let b = Arc::new(MockProvider::broken("B", 2));
    let (resolver, _) = resolver_with(&[a, b]);

    let result = resolver.quote("AAPL").await.unwrap();

    assert_eq!(result.origin, Origin::Synthetic);
    assert!(result.is_stale);
    assert!(result.value.price > Decimal::ZERO);
}

#[tokio::test(start_paused = true)]
async fn aapl_throttled_past_deadline_is_synthetic() {
    // Each 429 takes 3s to arrive: the deadline fires during the third call
    let provider = Arc::new(MockProvider::throttled("A", 1).with_delay(Duration::from_secs(3)));
    let (resolver, _) = resolver_with(&[provider.clone()]);
    let start = Instant::now();

    let result = resolver.quote("AAPL").await.unwrap();

    assert_eq!(result.origin, Origin::Synthetic);
    assert!(result.is_stale);
    assert!(result.value.price > Decimal::ZERO);
    assert_eq!(provider.calls(), 3);

    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(10), "{elapsed:?}");
    assert!(elapsed < Duration::from_secs(11), "{elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn aapl_throttled_three_times_is_synthetic() {
    let provider = Arc::new(MockProvider::throttled("A", 1));
    let (resolver, _) = resolver_with(&[provider.clone()]);

    let result = resolver.quote("AAPL").await.unwrap();
    tokio::time::advance(Duration::from_secs(11)).await;

    assert_eq!(result.origin, Origin::Synthetic);
    assert!(result.is_stale);
    assert!(result.value.price > Decimal::ZERO);
    assert_eq!(provider.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn late_provider_answer_is_discarded() {
    let provider = Arc::new(MockProvider::quoting("A", 1, dec!(150)).with_delay(Duration::from_secs(12)));
    let (resolver, store) = resolver_with(&[provider.clone()]);

    let result = resolver.quote("AAPL").await.unwrap();
    assert_eq!(result.origin, Origin::Synthetic);

    tokio::time::sleep(Duration::from_secs(5)).await;

    // The abandoned call never reached the cache or the store
    let again = resolver.quote("AAPL").await.unwrap();
    assert_eq!(again.origin, Origin::Cache);
    assert!(again.is_stale);
    assert_eq!(again.value.price, result.value.price);
    assert_eq!(store.writes(), 0);
}

#[tokio::test(start_paused = true)]
async fn synthetic_quotes_track_the_last_real_price() {
    let provider = Arc::new(MockProvider::quoting("A", 1, dec!(500)));
    let (resolver, _) = resolver_with(&[provider.clone()]);

    resolver.quote("NVDA").await.unwrap();

    // Nobody serves history, so the series is synthesized from the quote
    let history = resolver.history("NVDA", Interval::OneMonth).await.unwrap();

    assert!(history.is_synthetic());
    let last = history.value.last().unwrap().price;
    assert!(last >= dec!(490) && last <= dec!(510), "{last}");
}

// =============================================================================
// Invalidation
// =============================================================================

#[tokio::test(start_paused = true)]
async fn invalidate_then_resolve_never_returns_cache() {
    let provider = Arc::new(MockProvider::quoting("A", 1, dec!(150)));
    let (resolver, _) = resolver_with(&[provider.clone()]);

    resolver.resolve("AAPL", RequestKind::Quote).await.unwrap();
    tokio::task::yield_now().await;

    for _ in 0..3 {
        resolver.invalidate("AAPL", RequestKind::Quote).unwrap();
        resolver.invalidate("AAPL", RequestKind::Quote).unwrap();

        let result = resolver.resolve("AAPL", RequestKind::Quote).await.unwrap();
        assert_ne!(result.origin, Origin::Cache);
        assert_ne!(result.origin, Origin::Store);
        tokio::task::yield_now().await;
    }

    assert_eq!(provider.calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn invalidating_unknown_key_is_harmless() {
    let provider = Arc::new(MockProvider::quoting("A", 1, dec!(150)));
    let (resolver, _) = resolver_with(&[provider]);

    assert!(resolver.invalidate("ZZZZ", RequestKind::Details).is_ok());
    assert!(resolver.invalidate("", RequestKind::Quote).is_err());
}

#[tokio::test(start_paused = true)]
async fn invalidate_during_flight_starts_a_new_walk() {
    let provider = Arc::new(MockProvider::quoting("A", 1, dec!(150)).with_delay(Duration::from_secs(2)));
    let (resolver, _) = resolver_with(&[provider.clone()]);

    let early = {
        let resolver = resolver.clone();
        tokio::spawn(async move { resolver.resolve("AAPL", RequestKind::Quote).await })
    };
    tokio::time::sleep(Duration::from_millis(500)).await;

    resolver.invalidate("AAPL", RequestKind::Quote).unwrap();
    let late = resolver.resolve("AAPL", RequestKind::Quote).await.unwrap();

    assert_eq!(late.origin, Origin::Provider("A".into()));
    assert!(early.await.unwrap().is_ok());
    assert_eq!(provider.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn walk_started_before_invalidate_is_not_reused() {
    let provider = Arc::new(MockProvider::quoting("A", 1, dec!(150)).with_delay(Duration::from_secs(2)));
    let (resolver, store) = resolver_with(&[provider.clone()]);

    let early = {
        let resolver = resolver.clone();
        tokio::spawn(async move { resolver.resolve("AAPL", RequestKind::Quote).await })
    };
    tokio::time::sleep(Duration::from_millis(500)).await;
    resolver.invalidate("AAPL", RequestKind::Quote).unwrap();

    // The early caller still gets its answer, but nobody else does
    let early = early.await.unwrap().unwrap();
    assert_eq!(early.origin, Origin::Provider("A".into()));
    tokio::task::yield_now().await;
    assert_eq!(resolver.cached_entries(), 0);
    assert_eq!(store.writes(), 0);

    let again = resolver.resolve("AAPL", RequestKind::Quote).await.unwrap();
    assert_eq!(again.origin, Origin::Provider("A".into()));
    assert_eq!(provider.calls(), 2);
}

// =============================================================================
// Sweeper
// =============================================================================

#[tokio::test(start_paused = true)]
async fn sweeper_evicts_expired_entries_in_background() {
    let provider = Arc::new(MockProvider::quoting("A", 1, dec!(150)));
    let (resolver, _) = resolver_with(&[provider]);
    let sweeper = resolver.spawn_sweeper();

    resolver.quote("AAPL").await.unwrap();
    assert_eq!(resolver.cached_entries(), 1);

    tokio::time::sleep(Duration::from_secs(91)).await;
    assert_eq!(resolver.cached_entries(), 0);
    // Seeds outlive the cache entry
    assert_eq!(resolver.seed_entries(), 1);

    sweeper.shutdown().await;
}

// Rate limiter behavior over the public API
// Author: kelexine (https://github.com/kelexine)

mod common;

use chrono::Duration;
use common::UnreachableStore;
use genguard::config::{RateLimitConfig, RateLimitPolicy};
use genguard::rate_limit::{IdentityKey, RateCategory, RateLimiter};
use genguard::store::{MemoryRateLimitStore, RateLimitStore, SqliteStore};
use genguard::utils::clock::{Clock, ManualClock, MAX_SPAN_SECS};
use std::sync::Arc;

fn config(user: u32, ip: u32) -> RateLimitConfig {
    RateLimitConfig {
        user: RateLimitPolicy::new(user, 60),
        ip: RateLimitPolicy::new(ip, 60),
        ..Default::default()
    }
}

fn memory_limiter(config: RateLimitConfig) -> (RateLimiter, ManualClock) {
    let clock = ManualClock::default();
    let limiter = RateLimiter::new(
        Arc::new(MemoryRateLimitStore::new()),
        Arc::new(clock.clone()),
        config,
    );
    (limiter, clock)
}

#[tokio::test]
async fn test_eleven_requests_against_ceiling_of_ten() {
    let (limiter, _) = memory_limiter(config(10, 20));
    let user = IdentityKey::user("u1");

    let mut remaining = Vec::new();
    for _ in 0..10 {
        let decision = limiter.check(&user, RateCategory::Generation).await;
        assert!(decision.allowed);
        remaining.push(decision.remaining);
    }
    assert_eq!(remaining, vec![9, 8, 7, 6, 5, 4, 3, 2, 1, 0]);

    let eleventh = limiter.check(&user, RateCategory::Generation).await;
    assert!(!eleventh.allowed);
    assert_eq!(eleventh.remaining, 0);
    assert!(eleventh.message.is_some());
}

#[tokio::test]
async fn test_oversized_window_is_capped() {
    let config = RateLimitConfig {
        user: RateLimitPolicy::new(2, u64::MAX),
        ..Default::default()
    };
    let (limiter, clock) = memory_limiter(config);
    let user = IdentityKey::user("u1");
    let start = clock.now();

    let first = limiter.check(&user, RateCategory::Generation).await;
    assert!(first.allowed);
    assert_eq!(first.reset_at, start + Duration::seconds(MAX_SPAN_SECS as i64));

    limiter.check(&user, RateCategory::Generation).await;
    clock.advance(Duration::days(30));
    assert!(!limiter.check(&user, RateCategory::Generation).await.allowed);
}

#[tokio::test]
async fn test_serial_requests_admit_exactly_ceiling() {
    for ceiling in [1u32, 3, 7] {
        let (limiter, clock) = memory_limiter(config(ceiling, 100));
        let user = IdentityKey::user("serial");
        let mut allowed = 0;
        for _ in 0..(ceiling * 3) {
            if limiter.check(&user, RateCategory::Generation).await.allowed {
                allowed += 1;
            }
            clock.advance(Duration::milliseconds(100));
        }
        assert_eq!(allowed, ceiling);
    }
}

#[tokio::test]
async fn test_window_reset_starts_fresh_window() {
    let (limiter, clock) = memory_limiter(config(2, 20));
    let user = IdentityKey::user("u1");

    let first = limiter.check(&user, RateCategory::Generation).await;
    limiter.check(&user, RateCategory::Generation).await;
    assert!(!limiter.check(&user, RateCategory::Generation).await.allowed);

    clock.set(first.reset_at + Duration::milliseconds(1));
    let fresh = limiter.check(&user, RateCategory::Generation).await;
    assert!(fresh.allowed);
    assert_eq!(fresh.remaining, 1);
    assert!(fresh.reset_at > first.reset_at);
}

#[tokio::test]
async fn test_dimensions_and_identities_are_independent() {
    let (limiter, _) = memory_limiter(config(2, 2));
    let a = IdentityKey::user("alice");
    let b = IdentityKey::user("bob");
    let ip = IdentityKey::ip("203.0.113.7");

    for _ in 0..2 {
        limiter.check(&a, RateCategory::Generation).await;
    }
    assert!(!limiter.check(&a, RateCategory::Generation).await.allowed);

    assert!(limiter.check(&b, RateCategory::Generation).await.allowed);
    let ip_decision = limiter.check(&ip, RateCategory::Generation).await;
    assert!(ip_decision.allowed);
    assert_eq!(ip_decision.remaining, 1);
}

#[tokio::test]
async fn test_concurrent_checks_never_exceed_ceiling() {
    let stores: Vec<Arc<dyn RateLimitStore>> = vec![
        Arc::new(MemoryRateLimitStore::new()),
        Arc::new(SqliteStore::in_memory().await.unwrap()),
    ];

    for store in stores {
        let limiter = Arc::new(RateLimiter::new(
            store,
            Arc::new(ManualClock::default()),
            config(10, 100),
        ));

        let checks = (0..50).map(|_| {
            let limiter = limiter.clone();
            tokio::spawn(async move {
                limiter
                    .check(&IdentityKey::user("racer"), RateCategory::Generation)
                    .await
                    .allowed
            })
        });
        let results = futures::future::join_all(checks).await;
        let allowed = results
            .into_iter()
            .map(|r| r.unwrap())
            .filter(|allowed| *allowed)
            .count();
        assert_eq!(allowed, 10);
    }
}

#[tokio::test]
async fn test_unreachable_store_fails_open_by_default() {
    let limiter = RateLimiter::new(
        Arc::new(UnreachableStore),
        Arc::new(ManualClock::default()),
        config(10, 20),
    );
    let decision = limiter
        .check(&IdentityKey::user("u1"), RateCategory::Generation)
        .await;
    assert!(decision.allowed);
}

#[tokio::test]
async fn test_unreachable_store_can_fail_closed() {
    let limiter = RateLimiter::new(
        Arc::new(UnreachableStore),
        Arc::new(ManualClock::default()),
        RateLimitConfig {
            fail_open: false,
            ..config(10, 20)
        },
    );
    let decision = limiter
        .check(&IdentityKey::user("u1"), RateCategory::Generation)
        .await;
    assert!(!decision.allowed);
    assert_eq!(decision.remaining, 0);
}

#[tokio::test]
async fn test_sweep_drops_closed_windows() {
    let store = Arc::new(MemoryRateLimitStore::new());
    let clock = ManualClock::default();
    let limiter = RateLimiter::new(store.clone(), Arc::new(clock.clone()), config(5, 5));

    limiter
        .check(&IdentityKey::user("u1"), RateCategory::Generation)
        .await;
    limiter
        .check(&IdentityKey::ip("10.0.0.1"), RateCategory::Generation)
        .await;
    assert_eq!(store.len(), 2);

    clock.advance(Duration::seconds(61));
    assert_eq!(limiter.sweep_expired().await.unwrap(), 2);
    assert!(store.is_empty());
}

//! `SignalCache` tests. Time is paused so expiry can be driven with
//! `tokio::time::advance`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::{advance, sleep};
use tokio_util::sync::CancellationToken;

use crate::cache::{CacheError, ExpiryPolicy, SignalCache};
use crate::signal::Signal;

const KEY: &str = "defs";
const CHANNEL: &str = "defs-changed";

fn policy() -> ExpiryPolicy {
    ExpiryPolicy {
        sliding: Duration::from_secs(60),
        absolute: Duration::from_secs(240),
    }
}

fn new_cache(signal: &Signal) -> SignalCache<u32, String> {
    SignalCache::new(signal.clone(), policy())
}

/// Read through the cache; each population returns the number of
/// populations run so far.
async fn read(cache: &SignalCache<u32, String>, calls: &Arc<AtomicUsize>) -> u32 {
    let calls = Arc::clone(calls);
    let value = cache
        .get_or_populate(KEY, CHANNEL, &CancellationToken::new(), move |_| async move {
            Ok(calls.fetch_add(1, Ordering::SeqCst) as u32 + 1)
        })
        .await
        .expect("population should succeed");
    *value
}

// ============================================================
// Single-flight
// ============================================================

#[tokio::test(start_paused = true)]
async fn concurrent_misses_share_one_population() {
    let cache = new_cache(&Signal::new());
    let calls = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let cache = cache.clone();
            let calls = Arc::clone(&calls);
            tokio::spawn(async move {
                cache
                    .get_or_populate(KEY, CHANNEL, &CancellationToken::new(), move |_| async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        sleep(Duration::from_millis(50)).await;
                        Ok(7)
                    })
                    .await
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(*handle.await.unwrap().unwrap(), 7);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.populations(), 1);
}

#[tokio::test(start_paused = true)]
async fn hit_does_not_repopulate() {
    let cache = new_cache(&Signal::new());
    let calls = Arc::new(AtomicUsize::new(0));

    assert_eq!(read(&cache, &calls).await, 1);
    assert_eq!(read(&cache, &calls).await, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.peek(KEY).as_deref(), Some(&1));
}

// ============================================================
// Expiry
// ============================================================

#[tokio::test(start_paused = true)]
async fn sliding_expiration_is_reset_by_each_access() {
    let cache = new_cache(&Signal::new());
    let calls = Arc::new(AtomicUsize::new(0));

    assert_eq!(read(&cache, &calls).await, 1);
    advance(Duration::from_secs(50)).await;
    assert_eq!(read(&cache, &calls).await, 1);
    advance(Duration::from_secs(50)).await;
    // 100s since population, 50s since last access.
    assert_eq!(read(&cache, &calls).await, 1);

    advance(Duration::from_secs(61)).await;
    assert_eq!(read(&cache, &calls).await, 2);
}

#[tokio::test(start_paused = true)]
async fn absolute_expiration_bounds_continuous_access() {
    let cache = new_cache(&Signal::new());
    let calls = Arc::new(AtomicUsize::new(0));

    assert_eq!(read(&cache, &calls).await, 1);
    // Accesses every 30s keep the sliding window open...
    for _ in 0..7 {
        advance(Duration::from_secs(30)).await;
        assert_eq!(read(&cache, &calls).await, 1);
    }
    // ...but at 240s the absolute bound fires.
    advance(Duration::from_secs(30)).await;
    assert_eq!(read(&cache, &calls).await, 2);
}

#[tokio::test(start_paused = true)]
async fn peek_does_not_extend_sliding_window() {
    let cache = new_cache(&Signal::new());
    let calls = Arc::new(AtomicUsize::new(0));

    read(&cache, &calls).await;
    advance(Duration::from_secs(40)).await;
    assert!(cache.peek(KEY).is_some());
    advance(Duration::from_secs(30)).await;
    assert!(cache.peek(KEY).is_none());
}

// ============================================================
// Invalidation
// ============================================================

#[tokio::test(start_paused = true)]
async fn trigger_forces_repopulation_before_expiry() {
    let signal = Signal::new();
    let cache = new_cache(&signal);
    let calls = Arc::new(AtomicUsize::new(0));

    assert_eq!(read(&cache, &calls).await, 1);
    signal.trigger(CHANNEL);
    assert_eq!(read(&cache, &calls).await, 2);
    assert_eq!(read(&cache, &calls).await, 2);
}

#[tokio::test(start_paused = true)]
async fn trigger_on_other_channel_is_ignored() {
    let signal = Signal::new();
    let cache = new_cache(&signal);
    let calls = Arc::new(AtomicUsize::new(0));

    read(&cache, &calls).await;
    signal.trigger("unrelated");
    assert_eq!(read(&cache, &calls).await, 1);
}

#[tokio::test(start_paused = true)]
async fn trigger_during_population_invalidates_its_result() {
    let signal = Signal::new();
    let cache = new_cache(&signal);

    let in_flight = {
        let cache = cache.clone();
        tokio::spawn(async move {
            cache
                .get_or_populate(KEY, CHANNEL, &CancellationToken::new(), |_| async {
                    sleep(Duration::from_millis(100)).await;
                    Ok(1)
                })
                .await
        })
    };
    sleep(Duration::from_millis(10)).await;
    signal.trigger(CHANNEL);

    // The call already in flight still sees the old pass...
    assert_eq!(*in_flight.await.unwrap().unwrap(), 1);
    // ...but nothing stale is served afterwards.
    assert!(cache.peek(KEY).is_none());
}

#[tokio::test(start_paused = true)]
async fn lookup_after_trigger_does_not_join_the_superseded_population() {
    let signal = Signal::new();
    let cache = new_cache(&signal);
    let calls = Arc::new(AtomicUsize::new(0));

    let slow = |calls: Arc<AtomicUsize>| {
        move |_: CancellationToken| async move {
            let value = calls.fetch_add(1, Ordering::SeqCst) as u32 + 1;
            sleep(Duration::from_millis(100)).await;
            Ok::<u32, String>(value)
        }
    };

    let first = {
        let cache = cache.clone();
        let populate = slow(Arc::clone(&calls));
        tokio::spawn(async move {
            cache
                .get_or_populate(KEY, CHANNEL, &CancellationToken::new(), populate)
                .await
        })
    };
    sleep(Duration::from_millis(10)).await;
    signal.trigger(CHANNEL);

    let second = cache
        .get_or_populate(KEY, CHANNEL, &CancellationToken::new(), slow(Arc::clone(&calls)))
        .await
        .unwrap();

    assert_eq!(*first.await.unwrap().unwrap(), 1);
    assert_eq!(*second, 2);
    assert_eq!(cache.populations(), 2);
    assert_eq!(cache.peek(KEY).as_deref(), Some(&2));
}

#[tokio::test(start_paused = true)]
async fn evict_drops_the_entry() {
    let cache = new_cache(&Signal::new());
    let calls = Arc::new(AtomicUsize::new(0));

    read(&cache, &calls).await;
    cache.evict(KEY);
    assert_eq!(read(&cache, &calls).await, 2);
}

// ============================================================
// Failure
// ============================================================

#[tokio::test(start_paused = true)]
async fn failed_population_is_shared_and_not_cached() {
    let cache = new_cache(&Signal::new());

    let waiters: Vec<_> = (0..3)
        .map(|_| {
            let cache = cache.clone();
            tokio::spawn(async move {
                cache
                    .get_or_populate(KEY, CHANNEL, &CancellationToken::new(), |_| async {
                        sleep(Duration::from_millis(20)).await;
                        Err::<u32, _>("origin down".to_string())
                    })
                    .await
            })
        })
        .collect();

    for waiter in waiters {
        assert_eq!(
            waiter.await.unwrap(),
            Err(CacheError::Populate("origin down".to_string()))
        );
    }
    assert_eq!(cache.populations(), 1);
    assert!(cache.peek(KEY).is_none());

    let calls = Arc::new(AtomicUsize::new(0));
    assert_eq!(read(&cache, &calls).await, 1);
    assert_eq!(cache.populations(), 2);
}

// ============================================================
// Cancellation
// ============================================================

#[tokio::test(start_paused = true)]
async fn already_cancelled_caller_returns_immediately() {
    let cache = new_cache(&Signal::new());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = cache
        .get_or_populate(KEY, CHANNEL, &cancel, |_| async { Ok(1) })
        .await;
    assert_eq!(result, Err(CacheError::Cancelled));
    assert_eq!(cache.populations(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancelled_waiter_leaves_population_running_for_others() {
    let cache = new_cache(&Signal::new());
    let population_token: Arc<Mutex<Option<CancellationToken>>> = Arc::default();

    let first_cancel = CancellationToken::new();
    let first = {
        let cache = cache.clone();
        let cancel = first_cancel.clone();
        let population_token = Arc::clone(&population_token);
        tokio::spawn(async move {
            cache
                .get_or_populate(KEY, CHANNEL, &cancel, move |token| {
                    *population_token.lock().unwrap() = Some(token);
                    async {
                        sleep(Duration::from_millis(100)).await;
                        Ok(5)
                    }
                })
                .await
        })
    };
    sleep(Duration::from_millis(10)).await;

    let second = {
        let cache = cache.clone();
        tokio::spawn(async move {
            cache
                .get_or_populate(KEY, CHANNEL, &CancellationToken::new(), |_| async {
                    Err::<u32, _>("second caller must join, not populate".to_string())
                })
                .await
        })
    };
    sleep(Duration::from_millis(10)).await;

    first_cancel.cancel();
    assert_eq!(first.await.unwrap(), Err(CacheError::Cancelled));

    assert_eq!(*second.await.unwrap().unwrap(), 5);
    assert_eq!(cache.populations(), 1);
    let token = population_token.lock().unwrap().clone().unwrap();
    assert!(!token.is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn population_is_abandoned_when_every_waiter_cancels() {
    let cache = new_cache(&Signal::new());
    let population_token: Arc<Mutex<Option<CancellationToken>>> = Arc::default();
    let cancel = CancellationToken::new();

    let waiters: Vec<_> = (0..2)
        .map(|_| {
            let cache = cache.clone();
            let cancel = cancel.clone();
            let population_token = Arc::clone(&population_token);
            tokio::spawn(async move {
                cache
                    .get_or_populate(KEY, CHANNEL, &cancel, move |token| {
                        *population_token.lock().unwrap() = Some(token);
                        async {
                            sleep(Duration::from_secs(3600)).await;
                            Ok(1)
                        }
                    })
                    .await
            })
        })
        .collect();
    sleep(Duration::from_millis(10)).await;

    cancel.cancel();
    for waiter in waiters {
        assert_eq!(waiter.await.unwrap(), Err(CacheError::Cancelled));
    }

    let token = population_token.lock().unwrap().clone().unwrap();
    assert!(token.is_cancelled());

    // The next caller starts over.
    let calls = Arc::new(AtomicUsize::new(0));
    assert_eq!(read(&cache, &calls).await, 1);
    assert_eq!(cache.populations(), 2);
}

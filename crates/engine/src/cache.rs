//! Keyed cache with expiry, signal-based invalidation and single-flight
//! population.
//!
//! Each key maps to a slot holding at most one cached entry
//! (value, signal token, population time, last access time) and at most one
//! in-flight population. An entry is served while all of these hold:
//!
//! - its signal token has not changed,
//! - `now < populated_at + absolute`,
//! - `now < last_access + sliding` (every hit resets `last_access`).
//!
//! Otherwise the next caller starts a population. Callers that arrive while a
//! population is in flight join it instead of starting their own, and all of
//! them observe its result. A failed population caches nothing.
//!
//! A population whose channel is triggered while it runs is superseded: the
//! next caller starts a fresh one instead of joining it. Callers already
//! waiting on the old one still receive its result, but it is never stored.
//!
//! A waiter whose cancellation token fires leaves with
//! [`CacheError::Cancelled`]; the population keeps running for the others.
//! When the last waiter leaves, the population's own token is cancelled and
//! the in-flight future is dropped.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::signal::{Signal, SignalToken};

/// How long a populated entry may be served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryPolicy {
    /// Idle time after which the entry expires. Reset on every hit.
    pub sliding: Duration,
    /// Hard lifetime measured from population, regardless of hits.
    pub absolute: Duration,
}

/// Why `get_or_populate` did not return a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheError<E> {
    /// The population this call ran or joined failed.
    Populate(E),
    /// This caller's token was cancelled.
    Cancelled,
}

struct Entry<V> {
    value: Arc<V>,
    token: SignalToken,
    populated_at: Instant,
    last_access: Instant,
}

impl<V> Entry<V> {
    fn is_fresh(&self, now: Instant, policy: &ExpiryPolicy) -> bool {
        let before = |start: Instant, ttl: Duration| start.checked_add(ttl).map_or(true, |end| now < end);
        !self.token.has_changed()
            && before(self.populated_at, policy.absolute)
            && before(self.last_access, policy.sliding)
    }
}

type FlightFuture<V, E> = Shared<BoxFuture<'static, Result<Arc<V>, E>>>;

struct Flight<V, E> {
    id: u64,
    future: FlightFuture<V, E>,
    token: SignalToken,
    cancel: CancellationToken,
    waiters: usize,
}

struct Slot<V, E> {
    entry: Option<Entry<V>>,
    flight: Option<Flight<V, E>>,
}

impl<V, E> Default for Slot<V, E> {
    fn default() -> Self {
        Self { entry: None, flight: None }
    }
}

struct Inner<V, E> {
    slots: Mutex<HashMap<String, Slot<V, E>>>,
    signal: Signal,
    policy: ExpiryPolicy,
    next_flight: AtomicU64,
}

impl<V, E> Inner<V, E> {
    // Never held across an await.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Slot<V, E>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn complete(&self, key: &str, id: u64, token: SignalToken, result: &Result<Arc<V>, E>) {
        let mut slots = self.lock();
        let Some(slot) = slots.get_mut(key) else {
            return;
        };
        if slot.flight.as_ref().map(|f| f.id) != Some(id) {
            return;
        }
        slot.flight = None;

        match result {
            Ok(value) => {
                let now = Instant::now();
                slot.entry = Some(Entry {
                    value: Arc::clone(value),
                    token,
                    populated_at: now,
                    last_access: now,
                });
                debug!(key, flight = id, "cache populated");
            }
            Err(_) => debug!(key, flight = id, "population failed, nothing cached"),
        }
    }
}

/// Cheap-to-clone handle to a shared cache.
pub struct SignalCache<V, E> {
    inner: Arc<Inner<V, E>>,
}

impl<V, E> Clone for SignalCache<V, E> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<V, E> SignalCache<V, E>
where
    V: Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new(signal: Signal, policy: ExpiryPolicy) -> Self {
        Self {
            inner: Arc::new(Inner {
                slots: Mutex::new(HashMap::new()),
                signal,
                policy,
                next_flight: AtomicU64::new(0),
            }),
        }
    }

    pub fn policy(&self) -> ExpiryPolicy {
        self.inner.policy
    }

    /// Number of populations started so far.
    pub fn populations(&self) -> u64 {
        self.inner.next_flight.load(Ordering::Relaxed)
    }

    /// The cached value for `key` if it is still fresh. Does not count as an
    /// access and never populates.
    pub fn peek(&self, key: &str) -> Option<Arc<V>> {
        let slots = self.inner.lock();
        let entry = slots.get(key)?.entry.as_ref()?;
        entry
            .is_fresh(Instant::now(), &self.inner.policy)
            .then(|| Arc::clone(&entry.value))
    }

    /// Drop the cached entry for `key`. An in-flight population is left alone.
    pub fn evict(&self, key: &str) {
        if let Some(slot) = self.inner.lock().get_mut(key) {
            slot.entry = None;
        }
    }

    /// Return the fresh entry for `key`, or run (or join) a population.
    ///
    /// `channel` names the signal channel the new entry is scoped to.
    /// `populate` is only called when this caller starts a new population; it
    /// receives the population's own cancellation token, which fires once
    /// every waiter has left. It is called while the cache lock is held, so it
    /// should only build the future, not do work.
    pub async fn get_or_populate<F, Fut>(
        &self,
        key: &str,
        channel: &str,
        cancel: &CancellationToken,
        populate: F,
    ) -> Result<Arc<V>, CacheError<E>>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        if cancel.is_cancelled() {
            return Err(CacheError::Cancelled);
        }

        let (flight_id, future) = {
            let mut slots = self.inner.lock();
            let slot = slots.entry(key.to_owned()).or_default();
            let now = Instant::now();

            if let Some(entry) = slot.entry.as_mut() {
                if entry.is_fresh(now, &self.inner.policy) {
                    entry.last_access = now;
                    return Ok(Arc::clone(&entry.value));
                }
                debug!(key, "cache entry stale");
                slot.entry = None;
            }

            if let Some(stale) = slot.flight.as_ref().filter(|f| f.token.has_changed()) {
                debug!(key, flight = stale.id, "in-flight population invalidated, superseding");
                slot.flight = None;
            }

            let flight = slot
                .flight
                .get_or_insert_with(|| self.start_flight(key, channel, populate));
            flight.waiters += 1;
            debug!(key, flight = flight.id, waiters = flight.waiters, "waiting on population");
            (flight.id, flight.future.clone())
        };

        let _guard = WaiterGuard {
            inner: Arc::clone(&self.inner),
            key: key.to_owned(),
            flight_id,
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CacheError::Cancelled),
            result = future => result.map_err(CacheError::Populate),
        }
    }

    fn start_flight<F, Fut>(&self, key: &str, channel: &str, populate: F) -> Flight<V, E>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let id = self.inner.next_flight.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(key, flight = id, "population started");
        let cancel = CancellationToken::new();
        // Taken before the fetch so a trigger during it invalidates the result.
        let token = self.inner.signal.token(channel);
        let fetch = populate(cancel.clone());

        let inner = Arc::clone(&self.inner);
        let key = key.to_owned();
        let entry_token = token.clone();
        let future = async move {
            let result = fetch.await.map(Arc::new);
            inner.complete(&key, id, entry_token, &result);
            result
        }
        .boxed()
        .shared();

        Flight { id, future, token, cancel, waiters: 0 }
    }
}

/// Deregisters one waiter from a flight when the waiting call ends, however
/// it ends.
struct WaiterGuard<V, E> {
    inner: Arc<Inner<V, E>>,
    key: String,
    flight_id: u64,
}

impl<V, E> Drop for WaiterGuard<V, E> {
    fn drop(&mut self) {
        let mut slots = self.inner.lock();
        let Some(slot) = slots.get_mut(&self.key) else {
            return;
        };
        let Some(flight) = slot.flight.as_mut() else {
            return;
        };
        if flight.id != self.flight_id {
            return;
        }

        flight.waiters -= 1;
        if flight.waiters == 0 {
            debug!(key = %self.key, flight = flight.id, "all waiters left, abandoning population");
            flight.cancel.cancel();
            slot.flight = None;
        }
    }
}

//! Keyed cache with single-flight population.
//!
//! The first caller for a missing key becomes its leader: it runs the
//! initializer while the key holds a pending slot. Callers arriving meanwhile
//! subscribe to that slot and receive the leader's outcome, success or failure,
//! without running an initializer of their own. A success is stored; a failure
//! removes the key, so the next call that did not overlap tries again.
//!
//! If a leader is dropped mid-flight its slot goes stale; the next waiter evicts
//! it and takes over.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;

use tokio::sync::{RwLock, watch};

type Outcome<V, E> = Option<Result<V, E>>;

enum Slot<V, E> {
    Ready(V),
    Pending(watch::Receiver<Outcome<V, E>>),
}

enum Join<V, E> {
    Ready(V),
    Wait(watch::Receiver<Outcome<V, E>>),
    Lead(watch::Sender<Outcome<V, E>>, watch::Receiver<Outcome<V, E>>),
}

impl<V: Clone, E> Slot<V, E> {
    fn join(&self) -> Join<V, E> {
        match self {
            Self::Ready(v)    => Join::Ready(v.clone()),
            Self::Pending(rx) => Join::Wait(rx.clone()),
        }
    }

    fn is_pending_on(&self, rx: &watch::Receiver<Outcome<V, E>>) -> bool {
        matches!(self, Self::Pending(p) if p.same_channel(rx))
    }
}

pub(crate) struct SingleFlight<K, V, E> {
    slots: RwLock<HashMap<K, Slot<V, E>>>,
}

impl<K, V, E> Default for SingleFlight<K, V, E> {
    fn default() -> Self {
        Self { slots: RwLock::new(HashMap::new()) }
    }
}

impl<K: Eq + Hash, V: Clone, E: Clone> SingleFlight<K, V, E> {
    /// Return the cached value for `key`, running `init` if there is none yet.
    ///
    /// Concurrent callers for one key share a single `init` run and its result.
    pub(crate) async fn get_or_try_init<Q, F, Fut>(&self, key: &Q, init: F) -> Result<V, E>
    where
        K:   Borrow<Q>,
        Q:   Hash + Eq + ToOwned<Owned = K> + ?Sized,
        F:   FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        loop {
            let mut rx = match self.join(key).await {
                Join::Ready(v)     => return Ok(v),
                Join::Lead(tx, rx) => return self.lead(key, tx, rx, init).await,
                Join::Wait(rx)     => rx,
            };

            let outcome = match rx.wait_for(Option::is_some).await {
                Ok(landed) => (*landed).clone(),
                Err(_)     => None,
            };
            match outcome {
                Some(result) => return result,
                None => self.evict(key, &rx).await,
            }
        }
    }

    /// The value for `key`, if one has been stored.
    pub(crate) async fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        match self.slots.read().await.get(key)? {
            Slot::Ready(v)   => Some(v.clone()),
            Slot::Pending(_) => None,
        }
    }

    /// Drop the entry for `key`, returning its value if it had one.
    ///
    /// A population in flight for `key` still completes for its callers but
    /// is not stored.
    pub(crate) async fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        match self.slots.write().await.remove(key)? {
            Slot::Ready(v)   => Some(v),
            Slot::Pending(_) => None,
        }
    }

    /// Empty the cache, returning every stored value.
    ///
    /// Populations in flight are awaited and their values returned too, so
    /// nothing created around the drain is lost.
    pub(crate) async fn drain(&self) -> Vec<V> {
        let slots: Vec<Slot<V, E>> = self.slots.write().await.drain().map(|(_, s)| s).collect();
        let mut values = Vec::with_capacity(slots.len());
        for slot in slots {
            match slot {
                Slot::Ready(v) => values.push(v),
                Slot::Pending(mut rx) => {
                    let landed = match rx.wait_for(Option::is_some).await {
                        Ok(landed) => (*landed).clone(),
                        Err(_)     => None,
                    };
                    if let Some(Ok(v)) = landed {
                        values.push(v);
                    }
                }
            }
        }
        values
    }

    /// Number of keys holding a value.
    pub(crate) async fn len(&self) -> usize {
        self.slots.read().await.values().filter(|s| matches!(s, Slot::Ready(_))).count()
    }

    async fn join<Q>(&self, key: &Q) -> Join<V, E>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
    {
        if let Some(slot) = self.slots.read().await.get(key) {
            return slot.join();
        }
        let mut slots = self.slots.write().await;
        if let Some(slot) = slots.get(key) {
            return slot.join();
        }
        let (tx, rx) = watch::channel(None);
        slots.insert(key.to_owned(), Slot::Pending(rx.clone()));
        Join::Lead(tx, rx)
    }

    async fn lead<Q, F, Fut>(
        &self,
        key:  &Q,
        tx:   watch::Sender<Outcome<V, E>>,
        rx:   watch::Receiver<Outcome<V, E>>,
        init: F,
    ) -> Result<V, E>
    where
        K:   Borrow<Q>,
        Q:   Hash + Eq + ToOwned<Owned = K> + ?Sized,
        F:   FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let result = init().await;
        {
            let mut slots = self.slots.write().await;
            // Removed or drained meanwhile: hand the result out but keep it unstored.
            if slots.get(key).is_some_and(|s| s.is_pending_on(&rx)) {
                match &result {
                    Ok(v)  => { slots.insert(key.to_owned(), Slot::Ready(v.clone())); }
                    Err(_) => { slots.remove(key); }
                }
            }
        }
        tx.send_replace(Some(result.clone()));
        result
    }

    /// Remove `key` if it still holds the stale pending slot behind `rx`.
    async fn evict<Q>(&self, key: &Q, rx: &watch::Receiver<Outcome<V, E>>)
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut slots = self.slots.write().await;
        if slots.get(key).is_some_and(|s| s.is_pending_on(rx)) {
            slots.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn initializes_once() {
        let cache: SingleFlight<String, u32, ()> = SingleFlight::default();
        let calls = AtomicUsize::new(0);
        for _ in 0..3 {
            let v = cache.get_or_try_init("a", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(7)
            }).await;
            assert_eq!(v, Ok(7));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn failure_is_not_cached() {
        let cache: SingleFlight<String, u32, &str> = SingleFlight::default();
        assert_eq!(cache.get_or_try_init("a", || async { Err("down") }).await, Err("down"));
        assert_eq!(cache.get("a").await, None);
        assert_eq!(cache.len().await, 0);
        assert_eq!(cache.get_or_try_init("a", || async { Ok(1) }).await, Ok(1));
    }

    async fn slow_failure(cache: &SingleFlight<String, u32, &'static str>, calls: &AtomicUsize) -> Result<u32, &'static str> {
        cache.get_or_try_init("a", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Err("down")
        }).await
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_failure() {
        let cache = SingleFlight::default();
        let calls = AtomicUsize::new(0);
        let results = tokio::join!(
            slow_failure(&cache, &calls),
            slow_failure(&cache, &calls),
            slow_failure(&cache, &calls),
            slow_failure(&cache, &calls),
        );
        assert_eq!(results, (Err("down"), Err("down"), Err("down"), Err("down")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn dropped_leader_is_replaced() {
        let cache: SingleFlight<String, u32, ()> = SingleFlight::default();
        tokio::select! {
            _ = cache.get_or_try_init("a", || async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(1)
            }) => panic!("leader should not finish"),
            _ = tokio::time::sleep(Duration::from_millis(10)) => {}
        }
        assert_eq!(cache.get_or_try_init("a", || async { Ok(2) }).await, Ok(2));
        assert_eq!(cache.get("a").await, Some(2));
    }

    #[tokio::test]
    async fn drain_collects_values_in_flight() {
        let cache: SingleFlight<i32, &str, ()> = SingleFlight::default();
        cache.get_or_try_init(&1, || async { Ok("one") }).await.unwrap();

        let (slow, drained) = tokio::join!(
            cache.get_or_try_init(&2, || async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok("two")
            }),
            async {
                tokio::task::yield_now().await;
                cache.drain().await
            },
        );
        assert_eq!(slow, Ok("two"));
        let mut drained = drained;
        drained.sort();
        assert_eq!(drained, vec!["one", "two"]);
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn remove_and_drain() {
        let cache: SingleFlight<i32, &str, ()> = SingleFlight::default();
        cache.get_or_try_init(&1, || async { Ok("one") }).await.unwrap();
        cache.get_or_try_init(&2, || async { Ok("two") }).await.unwrap();
        assert_eq!(cache.remove(&1).await, Some("one"));
        assert_eq!(cache.drain().await, vec!["two"]);
        assert_eq!(cache.len().await, 0);
    }
}

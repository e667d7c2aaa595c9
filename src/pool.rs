//! The top-level keyed pool: borrow, return, invalidate, capacity
//! accounting, and lifecycle (add/prepare/clear/close).
//!
//! Grounded on `crates/resource/src/pool.rs`'s `Pool<R>` for overall shape
//! (a `Shared` inner struct behind an `Arc`, a cheap-to-clone public facade,
//! a background maintenance task wired up at construction), generalized from
//! a single flat pool to the per-key [`Registry`]/[`SubPool`] structure
//! spec.md §3-§5 describes, and from the teacher's `tokio::sync::Semaphore`
//! capacity gate to the explicit atomic-reservation protocol spec.md §4.4
//! requires (so a blocked `borrow` can observe and react to in-flight
//! creations instead of just waiting on permit availability).

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::config::{DefaultEvictionPolicy, EvictionPolicy, PoolConfig, SwallowedErrorHook};
use crate::error::{PoolError, Result};
use crate::evictor::Evictor;
use crate::factory::PooledObjectFactory;
use crate::pooled::Pooled;
use crate::registry::Registry;
use crate::subpool::SubPool;
use crate::wrapper::{PooledObject, State};

/// A point-in-time snapshot of pool-wide counters, generalizing the
/// teacher's `Pool<R>::stats()` / `PoolStats` to the per-key core (spec.md
/// §3's "Global counters").
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PoolStats {
    pub num_total: usize,
    pub num_active: usize,
    pub num_idle: usize,
    pub num_waiters: usize,
    pub created_count: u64,
    pub destroyed_count: u64,
    pub destroyed_by_evictor: u64,
    pub destroyed_by_borrow_validation: u64,
}

struct Shared<K, V, F> {
    factory: F,
    config: RwLock<PoolConfig>,
    policy: Arc<dyn EvictionPolicy<V>>,
    swallowed_hook: Option<Arc<dyn SwallowedErrorHook<K>>>,
    registry: Registry<K, V>,
    closed: AtomicBool,
    close_lock: Mutex<()>,
    num_total: AtomicUsize,
    created_count: AtomicUsize,
    destroyed_count: AtomicUsize,
    destroyed_by_evictor: AtomicUsize,
    destroyed_by_borrow_validation: AtomicUsize,
    evictor_cursor: AtomicUsize,
    evictor: Mutex<Option<Evictor>>,
}

/// A generic, keyed, thread-safe object pool.
///
/// Cheap to clone (an `Arc` around the shared state), following the
/// teacher's `Pool<R>`/`#[derive(Clone)]` convention for handle types handed
/// out to many callers.
pub struct KeyedPool<K, V, F> {
    shared: Arc<Shared<K, V, F>>,
}

impl<K, V, F> Clone for KeyedPool<K, V, F> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<K, V, F> std::fmt::Debug for KeyedPool<K, V, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedPool")
            .field("closed", &self.shared.closed.load(Ordering::Relaxed))
            .field("num_total", &self.shared.num_total.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Builder for [`KeyedPool`], for the cases where the default eviction
/// policy or no swallowed-error hook isn't enough.
pub struct KeyedPoolBuilder<K, V, F> {
    factory: F,
    config: PoolConfig,
    policy: Arc<dyn EvictionPolicy<V>>,
    hook: Option<Arc<dyn SwallowedErrorHook<K>>>,
}

impl<K, V, F> KeyedPoolBuilder<K, V, F>
where
    K: Clone + Eq + Hash + Send + Sync + std::fmt::Debug + 'static,
    V: Send + 'static,
    F: PooledObjectFactory<K, V> + 'static,
{
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            config: PoolConfig::default(),
            policy: Arc::new(DefaultEvictionPolicy),
            hook: None,
        }
    }

    #[must_use]
    pub fn config(mut self, config: PoolConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn eviction_policy(mut self, policy: impl EvictionPolicy<V> + 'static) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    #[must_use]
    pub fn swallowed_error_hook(mut self, hook: impl SwallowedErrorHook<K> + 'static) -> Self {
        self.hook = Some(Arc::new(hook));
        self
    }

    pub fn build(self) -> Result<KeyedPool<K, V, F>, K> {
        self.config.validate::<K>()?;
        let shared = Arc::new(Shared {
            factory: self.factory,
            policy: self.policy,
            swallowed_hook: self.hook,
            registry: Registry::new(self.config.fairness),
            closed: AtomicBool::new(false),
            close_lock: Mutex::new(()),
            num_total: AtomicUsize::new(0),
            created_count: AtomicUsize::new(0),
            destroyed_count: AtomicUsize::new(0),
            destroyed_by_evictor: AtomicUsize::new(0),
            destroyed_by_borrow_validation: AtomicUsize::new(0),
            evictor_cursor: AtomicUsize::new(0),
            evictor: Mutex::new(None),
            config: RwLock::new(self.config),
        });
        let pool = KeyedPool { shared };
        pool.start_evictor()?;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            max_total = ?pool.shared.config.read().max_total,
            max_total_per_key = ?pool.shared.config.read().max_total_per_key,
            "Created new keyed object pool"
        );

        Ok(pool)
    }
}

impl<K, V, F> KeyedPool<K, V, F>
where
    K: Clone + Eq + Hash + Send + Sync + std::fmt::Debug + 'static,
    V: Send + 'static,
    F: PooledObjectFactory<K, V> + 'static,
{
    /// Construct a pool with the default eviction policy and no swallowed
    /// error hook. Use [`KeyedPoolBuilder`] for anything more.
    pub fn new(factory: F, config: PoolConfig) -> Result<Self, K> {
        KeyedPoolBuilder::new(factory).config(config).build()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// The effective configuration, as of the moment of the call. Mutating
    /// the returned copy has no effect; see [`KeyedPool::set_config`].
    pub fn config(&self) -> PoolConfig {
        self.shared.config.read().clone()
    }

    /// Replace the configuration. Affects future operations only — objects
    /// already idle or on loan keep their existing accounting (spec.md §6:
    /// "subsequent mutation affects future operations only").
    pub fn set_config(&self, config: PoolConfig) -> Result<(), K> {
        config.validate::<K>()?;
        let restart_evictor = config.time_between_eviction_runs
            != self.shared.config.read().time_between_eviction_runs;
        *self.shared.config.write() = config;
        if restart_evictor {
            if let Some(mut evictor) = self.shared.evictor.lock().take() {
                evictor.stop();
            }
            self.start_evictor()?;
        }
        Ok(())
    }

    // -- borrow ------------------------------------------------------------

    /// Borrow an object for `key`, waiting up to the configured default
    /// `max_wait` if the pool is empty and `block_when_exhausted`.
    pub fn borrow(&self, key: &K) -> Result<Pooled<V>, K> {
        let timeout = self.shared.config.read().max_wait;
        self.borrow_with_timeout(key, timeout)
    }

    /// Borrow an object for `key`, overriding the configured default wait.
    /// `timeout = None` waits forever (spec.md §6's `maxWaitMillis < 0`).
    pub fn borrow_with_timeout(&self, key: &K, timeout: Option<Duration>) -> Result<Pooled<V>, K> {
        if self.is_closed() {
            return Err(PoolError::PoolClosed);
        }
        let sub = self.shared.registry.register(key);
        let result = self.borrow_inner(key, &sub, timeout);
        self.shared.registry.deregister(key);
        result
    }

    fn borrow_inner(
        &self,
        key: &K,
        sub: &Arc<SubPool<V>>,
        timeout: Option<Duration>,
    ) -> Result<Pooled<V>, K> {
        let start = Instant::now();
        loop {
            if self.is_closed() {
                return Err(PoolError::PoolClosed);
            }

            let mut fresh = false;

            let wrapper = match sub.idle.try_pop_front() {
                Some(w) => w,
                None => match self.create(key, sub)? {
                    Some(w) => {
                        fresh = true;
                        w
                    }
                    None => {
                        let block = self.shared.config.read().block_when_exhausted;
                        if !block {
                            return Err(PoolError::Exhausted { key: key.clone() });
                        }
                        let remaining = match timeout {
                            None => None,
                            Some(t) => {
                                let elapsed = start.elapsed();
                                if elapsed >= t {
                                    return Err(PoolError::Timeout {
                                        key: key.clone(),
                                        waited_ms: elapsed.as_millis() as u64,
                                    });
                                }
                                Some(t - elapsed)
                            }
                        };
                        match sub.idle.pop_front_timeout(remaining) {
                            Some(w) => w,
                            None => {
                                if self.is_closed() {
                                    return Err(PoolError::PoolClosed);
                                }
                                return Err(PoolError::Timeout {
                                    key: key.clone(),
                                    waited_ms: start.elapsed().as_millis() as u64,
                                });
                            }
                        }
                    }
                },
            };

            let mut value = if fresh {
                match wrapper.take_freshly_created() {
                    Some(v) => v,
                    None => continue,
                }
            } else {
                match wrapper.allocate() {
                    Some(v) => v,
                    None => continue,
                }
            };

            if let Err(e) = self.shared.factory.activate_object(key, &mut value) {
                self.destroy_wrapper(key, sub, &wrapper, Some(value), false, false);
                if fresh {
                    return Err(PoolError::ActivationFailed {
                        key: key.clone(),
                        source: Some(Box::new(e)),
                    });
                }
                continue;
            }

            let (test_on_borrow, test_on_create) = {
                let cfg = self.shared.config.read();
                (cfg.test_on_borrow, cfg.test_on_create)
            };
            let should_validate = test_on_borrow || (fresh && test_on_create);
            if should_validate && !self.shared.factory.validate_object(key, &value) {
                self.destroy_wrapper(key, sub, &wrapper, Some(value), false, true);
                if fresh {
                    return Err(PoolError::ValidationFailed {
                        key: key.clone(),
                        source: None,
                    });
                }
                continue;
            }

            return Ok(Pooled::new(wrapper.id(), value));
        }
    }

    // -- return / invalidate -------------------------------------------------

    /// Return a previously borrowed object.
    pub fn return_object(&self, key: &K, pooled: Pooled<V>) -> Result<(), K> {
        let Pooled { id, mut value } = pooled;
        let Some(sub) = self.shared.registry.get(key) else {
            return Err(PoolError::ForeignReturn { key: key.clone() });
        };
        let Some(wrapper) = sub.lookup(id) else {
            return Err(PoolError::ForeignReturn { key: key.clone() });
        };
        if !wrapper.mark_returning() {
            return Err(PoolError::AlreadyReturned { key: key.clone() });
        }

        let config = self.shared.config.read().clone();

        if config.test_on_return && !self.shared.factory.validate_object(key, &value) {
            self.destroy_wrapper(key, &sub, &wrapper, Some(value), false, false);
            self.reuse_capacity();
            return Ok(());
        }

        if self.shared.factory.passivate_object(key, &mut value).is_err() {
            self.destroy_wrapper(key, &sub, &wrapper, Some(value), false, false);
            self.reuse_capacity();
            return Ok(());
        }

        if let Err(_unreturned) = wrapper.deallocate(value) {
            return Err(PoolError::AlreadyReturned { key: key.clone() });
        }

        let idle_full = config
            .max_idle_per_key
            .is_some_and(|max| sub.num_idle() >= max);

        if self.is_closed() || idle_full {
            if let Some(v) = wrapper.allocate() {
                self.destroy_wrapper(key, &sub, &wrapper, Some(v), false, false);
            }
        } else {
            if config.lifo {
                sub.idle.push_front(wrapper);
            } else {
                sub.idle.push_back(wrapper);
            }
            // `close()` may have run its clear/interrupt sequence concurrently
            // with the push above; if so this object would otherwise sit in
            // an idle deque no `borrow` will ever drain again (spec.md §4.3
            // step 6's leak guard).
            if self.is_closed() {
                self.clear_key(key);
            }
        }

        self.reuse_capacity();
        Ok(())
    }

    /// Permanently remove a borrowed object from the pool instead of
    /// returning it (e.g. the caller detected it was broken).
    pub fn invalidate(&self, key: &K, pooled: Pooled<V>) -> Result<(), K> {
        let Pooled { id, value } = pooled;
        let Some(sub) = self.shared.registry.get(key) else {
            return Err(PoolError::ForeignReturn { key: key.clone() });
        };
        let Some(wrapper) = sub.lookup(id) else {
            return Err(PoolError::ForeignReturn { key: key.clone() });
        };
        if !wrapper.mark_returning() {
            return Err(PoolError::AlreadyReturned { key: key.clone() });
        }
        self.destroy_wrapper(key, &sub, &wrapper, Some(value), false, false);
        self.reuse_capacity();
        Ok(())
    }

    // -- create / capacity reclamation --------------------------------------

    /// spec.md §4.4: reserve global and per-key capacity, then call the
    /// factory outside every lock. `Ok(None)` means "no capacity, and
    /// nothing salvageable" — the caller should block or fail per
    /// `block_when_exhausted`; `Err` is a hard factory failure.
    fn create(
        &self,
        key: &K,
        sub: &Arc<SubPool<V>>,
    ) -> Result<Option<Arc<PooledObject<V>>>, K> {
        let (max_total, max_total_per_key) = {
            let cfg = self.shared.config.read();
            (cfg.max_total, cfg.max_total_per_key)
        };

        loop {
            let reserved = self.shared.num_total.fetch_add(1, Ordering::SeqCst) + 1;
            let over = max_total.is_some_and(|max| reserved > max);
            if !over {
                break;
            }
            self.shared.num_total.fetch_sub(1, Ordering::SeqCst);
            if self.total_idle() == 0 {
                return Ok(None);
            }
            self.clear_oldest();
        }

        if !sub.reserve_create_slot(max_total_per_key) {
            self.shared.num_total.fetch_sub(1, Ordering::SeqCst);
            return Ok(None);
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(?key, "Creating new pooled object");

        match self.shared.factory.make_object(key) {
            Ok(value) => {
                sub.release_create_slot_succeeded();
                self.shared.created_count.fetch_add(1, Ordering::SeqCst);
                let wrapper = PooledObject::new_allocated(value);
                sub.insert(Arc::clone(&wrapper));
                Ok(Some(wrapper))
            }
            Err(e) => {
                sub.release_create_slot_failed();
                self.shared.num_total.fetch_sub(1, Ordering::SeqCst);
                #[cfg(feature = "tracing")]
                tracing::warn!(?key, error = %e, "Failed to create pooled object");
                Err(PoolError::creation_failed(key.clone(), e))
            }
        }
    }

    /// Create an object and settle it directly into the idle deque, for
    /// callers that want a ready instance rather than a borrowed one
    /// (`add_object`, `prepare_pool`, and the evictor's top-ups).
    fn create_idle(&self, key: &K, sub: &Arc<SubPool<V>>) -> Result<bool, K> {
        match self.create(key, sub)? {
            Some(wrapper) => {
                wrapper.settle_idle();
                sub.idle.push_back(wrapper);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn total_idle(&self) -> usize {
        self.shared
            .registry
            .all_subpools()
            .iter()
            .map(|(_, s)| s.num_idle())
            .sum()
    }

    /// spec.md §4.5 `clearOldest`: destroy the oldest 15%+1 idle wrappers
    /// across every key, ordered by `lastReturnTime`.
    fn clear_oldest(&self) {
        let subs = self.shared.registry.all_subpools();
        let mut candidates: Vec<(K, Arc<SubPool<V>>, Arc<PooledObject<V>>)> = Vec::new();
        for (key, sub) in &subs {
            for wrapper in sub.all_wrappers() {
                if wrapper.state() == State::Idle {
                    candidates.push((key.clone(), Arc::clone(sub), wrapper));
                }
            }
        }
        if candidates.is_empty() {
            return;
        }
        candidates.sort_by_key(|(_, _, w)| w.last_return_time());
        let n = candidates.len() * 15 / 100 + 1;
        for (key, sub, wrapper) in candidates.into_iter().take(n) {
            if let Some(removed) = sub.idle.remove_if(|w| w.id() == wrapper.id()) {
                self.destroy_wrapper(&key, &sub, &removed, None, false, false);
            }
        }
    }

    /// spec.md §4.5 `reuseCapacity`: best-effort liveness helper that hands
    /// a freshly created instance to whichever key currently has the most
    /// blocked borrowers.
    fn reuse_capacity(&self) {
        let subs = self.shared.registry.all_subpools();
        let Some((key, sub)) = subs.into_iter().max_by_key(|(_, s)| s.idle.waiters()) else {
            return;
        };
        if sub.idle.waiters() == 0 {
            return;
        }
        if let Err(e) = self.create_idle(&key, &sub) {
            self.swallow(&key, &e);
        }
    }

    fn ensure_min_idle(&self, key: &K, sub: &Arc<SubPool<V>>) {
        let min_idle = self.shared.config.read().effective_min_idle_per_key();
        while sub.num_idle() < min_idle {
            match self.create_idle(key, sub) {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    self.swallow(key, &e);
                    break;
                }
            }
        }
    }

    fn swallow(&self, key: &K, err: &PoolError<K>) {
        #[cfg(feature = "tracing")]
        tracing::warn!(?key, error = %err, "Swallowed factory error during background capacity maintenance");
        if let Some(hook) = &self.shared.swallowed_hook {
            hook.on_swallowed_error(key, err);
        }
    }

    fn destroy_wrapper(
        &self,
        key: &K,
        sub: &Arc<SubPool<V>>,
        wrapper: &Arc<PooledObject<V>>,
        taken: Option<V>,
        by_evictor: bool,
        by_borrow_validation: bool,
    ) {
        #[cfg(feature = "tracing")]
        tracing::debug!(?key, by_evictor, by_borrow_validation, "Destroying pooled object");

        let invalidated = wrapper.invalidate();
        let value = taken.or(invalidated);
        sub.remove(wrapper.id());
        sub.note_destroyed();
        self.shared.num_total.fetch_sub(1, Ordering::SeqCst);
        self.shared.destroyed_count.fetch_add(1, Ordering::SeqCst);
        if by_evictor {
            self.shared
                .destroyed_by_evictor
                .fetch_add(1, Ordering::SeqCst);
        }
        if by_borrow_validation {
            self.shared
                .destroyed_by_borrow_validation
                .fetch_add(1, Ordering::SeqCst);
        }
        if let Some(v) = value {
            self.shared.factory.destroy_object(key, v);
        }
    }

    // -- pool-shaping operations ---------------------------------------------

    /// Create one object for `key` and leave it idle, ignoring
    /// `min_idle_per_key`.
    pub fn add_object(&self, key: &K) -> Result<(), K> {
        if self.is_closed() {
            return Err(PoolError::PoolClosed);
        }
        let sub = self.shared.registry.register(key);
        let result = self.create_idle(key, &sub).map(|_| ());
        self.shared.registry.deregister(key);
        result
    }

    /// Top `key` up to at least one idle object (or `min_idle_per_key` if
    /// configured higher), without waiting for a borrower.
    pub fn prepare_pool(&self, key: &K) -> Result<(), K> {
        if self.is_closed() {
            return Err(PoolError::PoolClosed);
        }
        let sub = self.shared.registry.register(key);
        let target = self.shared.config.read().effective_min_idle_per_key().max(1);
        let mut result = Ok(());
        while sub.num_idle() < target {
            match self.create_idle(key, &sub) {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }
        self.shared.registry.deregister(key);
        result
    }

    /// Destroy every idle object across every key.
    pub fn clear(&self) {
        for (key, sub) in self.shared.registry.all_subpools() {
            self.clear_subpool(&key, &sub);
        }
    }

    /// Destroy every idle object under `key`.
    pub fn clear_key(&self, key: &K) {
        if let Some(sub) = self.shared.registry.get(key) {
            self.clear_subpool(key, &sub);
        }
    }

    fn clear_subpool(&self, key: &K, sub: &Arc<SubPool<V>>) {
        for wrapper in sub.idle.drain() {
            self.destroy_wrapper(key, sub, &wrapper, None, false, false);
        }
    }

    /// Close the pool. Idempotent (spec.md §4.8, §8's "close(); close()
    /// equivalent to single close()"). After this, `borrow` always raises
    /// `PoolClosed`; `return_object`/`invalidate` still run, but always
    /// destroy.
    pub fn close(&self) {
        let _guard = self.shared.close_lock.lock();
        if self.shared.closed.load(Ordering::SeqCst) {
            return;
        }

        #[cfg(feature = "tracing")]
        tracing::debug!("Closing keyed object pool");

        if let Some(mut evictor) = self.shared.evictor.lock().take() {
            evictor.stop();
        }
        self.shared.closed.store(true, Ordering::SeqCst);
        self.clear();
        for (_, sub) in self.shared.registry.all_subpools() {
            sub.idle.close();
        }
        // collect anything returned during the interruption window above
        self.clear();
    }

    // -- observers ------------------------------------------------------------

    pub fn num_active(&self) -> usize {
        self.shared
            .registry
            .all_subpools()
            .iter()
            .map(|(_, s)| s.num_active())
            .sum()
    }

    pub fn num_active_key(&self, key: &K) -> usize {
        self.shared
            .registry
            .get(key)
            .map(|s| s.num_active())
            .unwrap_or(0)
    }

    pub fn num_idle(&self) -> usize {
        self.total_idle()
    }

    pub fn num_idle_key(&self, key: &K) -> usize {
        self.shared
            .registry
            .get(key)
            .map(|s| s.num_idle())
            .unwrap_or(0)
    }

    pub fn num_waiters(&self) -> usize {
        self.shared
            .registry
            .all_subpools()
            .iter()
            .map(|(_, s)| s.idle.waiters())
            .sum()
    }

    pub fn num_waiters_by_key(&self) -> HashMap<K, usize> {
        self.shared
            .registry
            .all_subpools()
            .into_iter()
            .map(|(k, s)| (k, s.idle.waiters()))
            .collect()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            num_total: self.shared.num_total.load(Ordering::SeqCst),
            num_active: self.num_active(),
            num_idle: self.num_idle(),
            num_waiters: self.num_waiters(),
            created_count: self.shared.created_count.load(Ordering::SeqCst) as u64,
            destroyed_count: self.shared.destroyed_count.load(Ordering::SeqCst) as u64,
            destroyed_by_evictor: self.shared.destroyed_by_evictor.load(Ordering::SeqCst) as u64,
            destroyed_by_borrow_validation: self
                .shared
                .destroyed_by_borrow_validation
                .load(Ordering::SeqCst) as u64,
        }
    }

    // -- evictor --------------------------------------------------------------

    fn start_evictor(&self) -> Result<(), K> {
        let period = self.shared.config.read().time_between_eviction_runs;
        let Some(period) = period else { return Ok(()) };
        if period.is_zero() {
            return Ok(());
        }
        let pool = self.clone();
        let evictor = Evictor::spawn(period, move || pool.evict_tick())
            .map_err(|source| PoolError::EvictorSpawnFailed { source })?;
        *self.shared.evictor.lock() = Some(evictor);
        Ok(())
    }

    /// One evictor tick: spec.md §4.6 steps 1-6. Returns `false` to stop the
    /// background thread (the pool closed).
    fn evict_tick(&self) -> bool {
        if self.is_closed() {
            return false;
        }

        let config = self.shared.config.read().clone();
        let total_idle = self.total_idle();
        let n = num_tests(total_idle, config.num_tests_per_eviction_run);
        let keys = self.shared.registry.keys_snapshot();

        if n > 0 && !keys.is_empty() {
            #[cfg(feature = "tracing")]
            tracing::debug!(num_tests = n, total_idle, "Running evictor tick");

            let len = keys.len();
            let mut idx = self.shared.evictor_cursor.load(Ordering::Relaxed) % len;
            let mut tested = 0usize;
            let mut attempts = 0usize;
            let attempt_budget = n.saturating_mul(len).max(len);

            while tested < n && attempts < attempt_budget {
                attempts += 1;
                let key = &keys[idx];
                idx = (idx + 1) % len;

                let Some(sub) = self.shared.registry.get(key) else {
                    continue;
                };
                let Some(wrapper) = sub.idle.try_pop_front() else {
                    continue;
                };
                tested += 1;

                if !wrapper.start_eviction_test() {
                    // Every candidate reaches here by being popped off the
                    // idle deque ourselves, so this wrapper cannot have been
                    // raced out from under us; kept defensively.
                    sub.idle.push_back(wrapper);
                    continue;
                }

                let idle_size_of_key = sub.num_idle() + 1;
                if self
                    .shared
                    .policy
                    .evict(&config, &wrapper, idle_size_of_key)
                {
                    wrapper.end_eviction_test();
                    self.destroy_wrapper(key, &sub, &wrapper, None, true, false);
                    continue;
                }

                if config.test_while_idle {
                    // Move the value out before calling into the factory so no
                    // factory hook ever runs while this wrapper's lock is held
                    // (spec.md §5's locking discipline).
                    if let Some(mut v) = wrapper.take_for_eviction_test() {
                        let mut destroy = self.shared.factory.activate_object(key, &mut v).is_err();
                        if !destroy && !self.shared.factory.validate_object(key, &v) {
                            destroy = true;
                        }
                        if !destroy && self.shared.factory.passivate_object(key, &mut v).is_err() {
                            destroy = true;
                        }
                        if destroy {
                            #[cfg(feature = "tracing")]
                            tracing::warn!(?key, "Idle object failed test-while-idle, destroying");
                            wrapper.end_eviction_test();
                            self.destroy_wrapper(key, &sub, &wrapper, Some(v), true, false);
                            continue;
                        }
                        wrapper.restore_after_eviction_test(v);
                    }
                }

                wrapper.end_eviction_test();
                sub.idle.push_front(wrapper);
            }

            self.shared.evictor_cursor.store(idx, Ordering::Relaxed);
        }

        for key in &keys {
            if let Some(sub) = self.shared.registry.get(key) {
                self.ensure_min_idle(key, &sub);
            }
        }

        true
    }
}

/// spec.md §4.6 step 1: `numTestsPerEvictionRun >= 0` is an absolute count
/// (capped at `numIdle`); negative is a fraction, `ceil(numIdle / |n|)`.
fn num_tests(num_idle: usize, num_tests_per_eviction_run: i64) -> usize {
    if num_idle == 0 {
        return 0;
    }
    if num_tests_per_eviction_run >= 0 {
        (num_tests_per_eviction_run as usize).min(num_idle)
    } else {
        let denom = (-num_tests_per_eviction_run) as usize;
        num_idle.div_ceil(denom)
    }
}

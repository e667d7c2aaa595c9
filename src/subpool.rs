//! Per-key pool state.
//!
//! Grounded on spec.md §3/§4.4's `SubPool` description: an idle deque, an
//! identity map of every live wrapper under the key (idle or on loan), a
//! create counter, an in-flight-creation counter with its own condition
//! variable, and an "interested parties" refcount used by the key
//! registry's register/deregister protocol (§4.7).

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::{Condvar, Mutex};

use crate::wait_deque::WaitDeque;
use crate::wrapper::PooledObject;

/// Per-key state. One of these exists for as long as a key is registered
/// (spec.md §3's "Lifecycle").
pub struct SubPool<T> {
    /// Idle wrappers for this key, in LIFO or FIFO order per `PoolConfig::lifo`.
    pub idle: WaitDeque<Arc<PooledObject<T>>>,
    /// Every live wrapper under this key, idle or on loan, keyed by the
    /// wrapper's identity (spec.md §9: identity, not value equality).
    all: Mutex<HashMap<u64, Arc<PooledObject<T>>>>,
    /// Total ever created minus destroyed, under this key.
    create_count: AtomicUsize,
    /// Guards `make_object_in_flight` plus a condvar so `create()` can wait
    /// for an in-flight factory call to finish (and possibly free capacity)
    /// instead of failing outright.
    make_lock: Mutex<usize>,
    make_cv: Condvar,
    /// Count of threads currently holding a register-token on this key
    /// (spec.md §4.7).
    interested: AtomicUsize,
}

impl<T> SubPool<T> {
    pub fn new(fair: bool) -> Arc<Self> {
        Arc::new(Self {
            idle: WaitDeque::new(fair),
            all: Mutex::new(HashMap::new()),
            create_count: AtomicUsize::new(0),
            make_lock: Mutex::new(0),
            make_cv: Condvar::new(),
            interested: AtomicUsize::new(0),
        })
    }

    pub fn create_count(&self) -> usize {
        self.create_count.load(Ordering::SeqCst)
    }

    pub fn interested(&self) -> usize {
        self.interested.load(Ordering::SeqCst)
    }

    pub fn register_interest(&self) {
        self.interested.fetch_add(1, Ordering::SeqCst);
    }

    pub fn release_interest(&self) {
        self.interested.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn num_all(&self) -> usize {
        self.all.lock().len()
    }

    pub fn num_idle(&self) -> usize {
        self.idle.len()
    }

    pub fn num_active(&self) -> usize {
        self.num_all().saturating_sub(self.num_idle())
    }

    pub fn lookup(&self, id: u64) -> Option<Arc<PooledObject<T>>> {
        self.all.lock().get(&id).cloned()
    }

    pub fn insert(&self, wrapper: Arc<PooledObject<T>>) {
        self.all.lock().insert(wrapper.id(), wrapper);
    }

    pub fn remove(&self, id: u64) -> Option<Arc<PooledObject<T>>> {
        self.all.lock().remove(&id)
    }

    pub fn all_wrappers(&self) -> Vec<Arc<PooledObject<T>>> {
        self.all.lock().values().cloned().collect()
    }

    /// Attempt to reserve one unit of per-key create capacity. See spec.md
    /// §4.4 step 2: returns `true` (and bumps `make_object_in_flight`) if
    /// the caller should proceed to call the factory; `false` if the key is
    /// already at `max_total_per_key` with nothing in flight that might
    /// free capacity (steady-state full); blocks on the condvar and retries
    /// while something *is* in flight.
    pub fn reserve_create_slot(&self, max_total_per_key: Option<usize>) -> bool {
        let mut in_flight = self.make_lock.lock();
        loop {
            let reserved = self.create_count.fetch_add(1, Ordering::SeqCst) + 1;
            let over = max_total_per_key.is_some_and(|max| reserved > max);
            if !over {
                *in_flight += 1;
                return true;
            }
            self.create_count.fetch_sub(1, Ordering::SeqCst);
            if *in_flight == 0 {
                return false;
            }
            self.make_cv.wait(&mut in_flight);
        }
    }

    /// Release a reserved-but-abandoned create slot (factory raised).
    pub fn release_create_slot_failed(&self) {
        self.create_count.fetch_sub(1, Ordering::SeqCst);
        let mut in_flight = self.make_lock.lock();
        *in_flight -= 1;
        self.make_cv.notify_all();
    }

    /// A reserved create slot completed successfully: the object is now
    /// live, so `create_count` stays as-is but the in-flight counter drops.
    pub fn release_create_slot_succeeded(&self) {
        let mut in_flight = self.make_lock.lock();
        *in_flight -= 1;
        self.make_cv.notify_all();
    }

    /// Called when a live object under this key is permanently destroyed
    /// (eviction, over-capacity return, invalidate, close): frees one unit
    /// of per-key create capacity for future creates.
    pub fn note_destroyed(&self) {
        self.create_count.fetch_sub(1, Ordering::SeqCst);
    }
}

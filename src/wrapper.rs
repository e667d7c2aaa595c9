//! The per-object wrapper and its state machine.
//!
//! A [`PooledObject`] is the pool's private handle on a user value: it tracks
//! where the value currently sits in its lifecycle (idle, lent out, under an
//! eviction test, ...) plus the timestamps and counters the evictor and the
//! stats surface need. All transitions are serialized by a single per-wrapper
//! mutex so the pool never needs to hold a pool-wide lock while flipping an
//! object's state.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;

/// Lifecycle state of one pooled object.
///
/// See the state table in spec.md §4.1 for the full transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Sitting in the idle deque, eligible for borrow or eviction.
    Idle,
    /// Lent out to a caller.
    Allocated,
    /// Currently under an eviction test (`startEvictionTest`/`endEvictionTest`
    /// bracket). A concurrent `allocate()` sees this and must retry rather
    /// than steal the object mid-test.
    Eviction,
    /// An `allocate()` raced a `startEvictionTest()` and lost; when the test
    /// ends the wrapper must go back to the *head* of the idle deque instead
    /// of the tail, so the waiting borrower's retry observes it immediately.
    EvictionReturnToHead,
    /// Between `markReturning()` and `deallocate()`, i.e. mid-return while
    /// passivation/validation run outside the pool's locks.
    Returning,
    /// Terminal. Never transitions out.
    Invalid,
    /// Dropped without being returned. Not produced by this crate today
    /// (abandoned-object tracking is out of scope, spec.md §1) but kept as a
    /// distinct state so a future tracer can mark it without renumbering.
    Abandoned,
}

/// The pool's private wrapper around one user-owned value of type `T`.
///
/// `object` is `None` exactly while the value is lent out to a caller (it
/// physically moved into the [`crate::pooled::Pooled<T>`] handle) or after
/// the wrapper has been invalidated/destroyed.
pub struct PooledObject<T> {
    id: u64,
    inner: Mutex<Inner<T>>,
}

struct Inner<T> {
    object: Option<T>,
    state: State,
    create_time: Instant,
    last_borrow_time: Instant,
    last_use_time: Instant,
    last_return_time: Instant,
    borrowed_count: u64,
}

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a fresh process-unique identity.
///
/// Rust has no generic notion of stable pointer identity for an arbitrary
/// `T` (spec.md §9), so identity is a monotonic counter assigned once per
/// wrapper instead of an address.
pub fn next_identity() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

impl<T> PooledObject<T> {
    /// Wrap a freshly created value. Per spec.md §9's resolved open
    /// question, a freshly created wrapper starts life already `Allocated`
    /// (handed straight to the borrower) rather than entering `Idle` first.
    pub fn new_allocated(object: T) -> Arc<Self> {
        let now = Instant::now();
        Arc::new(Self {
            id: next_identity(),
            inner: Mutex::new(Inner {
                object: Some(object),
                state: State::Allocated,
                create_time: now,
                last_borrow_time: now,
                last_use_time: now,
                last_return_time: now,
                borrowed_count: 1,
            }),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> State {
        self.inner.lock().state
    }

    pub fn create_time(&self) -> Instant {
        self.inner.lock().create_time
    }

    pub fn last_return_time(&self) -> Instant {
        self.inner.lock().last_return_time
    }

    pub fn last_use_time(&self) -> Instant {
        self.inner.lock().last_use_time
    }

    pub fn idle_time(&self) -> std::time::Duration {
        self.inner.lock().last_return_time.elapsed()
    }

    pub fn borrowed_count(&self) -> u64 {
        self.inner.lock().borrowed_count
    }

    /// `IDLE -> ALLOCATED`. Returns the moved-out object on success.
    ///
    /// `EVICTION -> EVICTION_RETURN_TO_HEAD` is a *different* transition (see
    /// spec.md §4.1): it always returns `None`, signalling the caller to
    /// retry, and leaves the eviction test to hand the object back later.
    pub fn allocate(&self) -> Option<T> {
        let mut inner = self.inner.lock();
        match inner.state {
            State::Idle => {
                let now = Instant::now();
                inner.state = State::Allocated;
                inner.last_borrow_time = now;
                inner.last_use_time = now;
                inner.borrowed_count += 1;
                inner.object.take()
            }
            State::Eviction => {
                inner.state = State::EvictionReturnToHead;
                None
            }
            _ => None,
        }
    }

    /// `ALLOCATED | RETURNING -> IDLE`. Puts `object` back and returns
    /// `true`, unless the wrapper is not in a returnable state (a second
    /// `deallocate()` of the same wrapper), in which case it returns `false`
    /// and `object` is handed back to the caller untouched.
    pub fn deallocate(&self, object: T) -> Result<(), T> {
        let mut inner = self.inner.lock();
        match inner.state {
            State::Allocated | State::Returning => {
                inner.last_return_time = Instant::now();
                inner.state = State::Idle;
                inner.object = Some(object);
                Ok(())
            }
            _ => Err(object),
        }
    }

    pub fn mark_returning(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state == State::Allocated {
            inner.state = State::Returning;
            true
        } else {
            false
        }
    }

    /// `IDLE -> EVICTION`. Returns `false` (test skipped) if the object was
    /// borrowed out from under the evictor.
    pub fn start_eviction_test(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state == State::Idle {
            inner.state = State::Eviction;
            true
        } else {
            false
        }
    }

    /// Ends an eviction test window. Returns `true` with `goes_to_head =
    /// true` if a concurrent `allocate()` collided with the test and must
    /// now see the object at the head of the idle deque.
    pub fn end_eviction_test(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            State::Eviction => {
                inner.state = State::Idle;
                false
            }
            State::EvictionReturnToHead => {
                inner.state = State::Idle;
                true
            }
            _ => false,
        }
    }

    /// Pull the value out of a *freshly created* wrapper (already
    /// `Allocated` by construction, per spec.md §9's resolved open question
    /// on the wrapper's initial state) to hand to the borrower that
    /// triggered its creation. Distinct from `allocate()`, which performs
    /// the `Idle -> Allocated` transition for a pre-existing idle wrapper.
    pub fn take_freshly_created(&self) -> Option<T> {
        let mut inner = self.inner.lock();
        if inner.state == State::Allocated {
            inner.object.take()
        } else {
            None
        }
    }

    /// Demote a freshly created wrapper straight to `Idle` without ever
    /// handing its value to a borrower. Used when the pool creates an
    /// object for its own bookkeeping rather than in response to a
    /// `borrow` — `add_object`/`prepare_pool` and the evictor's
    /// `ensureMinIdle`/`reuseCapacity` top-ups.
    pub fn settle_idle(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state == State::Allocated && inner.object.is_some() {
            inner.state = State::Idle;
            inner.last_return_time = Instant::now();
            true
        } else {
            false
        }
    }

    /// Move the value out while the wrapper is under an eviction test, so the
    /// pool can run `testWhileIdle`'s activate/validate/passivate sequence
    /// against it without holding this wrapper's lock across a factory call.
    /// Leaves the state (`Eviction`/`EvictionReturnToHead`) untouched; pair
    /// with [`Self::restore_after_eviction_test`].
    pub fn take_for_eviction_test(&self) -> Option<T> {
        let mut inner = self.inner.lock();
        match inner.state {
            State::Eviction | State::EvictionReturnToHead => inner.object.take(),
            _ => None,
        }
    }

    /// Put the value back after running factory hooks outside the lock. Only
    /// meaningful paired with a prior [`Self::take_for_eviction_test`].
    pub fn restore_after_eviction_test(&self, object: T) {
        let mut inner = self.inner.lock();
        inner.object = Some(object);
    }

    pub fn invalidate(&self) -> Option<T> {
        let mut inner = self.inner.lock();
        inner.state = State::Invalid;
        inner.object.take()
    }

    /// Whether the wrapper is currently on loan.
    pub fn peek_borrowed(&self) -> bool {
        matches!(self.inner.lock().state, State::Allocated)
    }
}

impl<T> std::fmt::Debug for PooledObject<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("PooledObject")
            .field("id", &self.id)
            .field("state", &inner.state)
            .field("borrowed_count", &inner.borrowed_count)
            .finish()
    }
}

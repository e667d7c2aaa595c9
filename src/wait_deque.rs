//! A bounded, blocking, double-ended queue of idle wrappers.
//!
//! This is the synchronization substrate spec.md §2 calls out as its own
//! component (~20% of the implementation budget): a take can block with a
//! timeout, pushes can go to either end (LIFO/FIFO idle selection), waiters
//! are counted for `numWaiters`/capacity-reuse targeting, and in `fairness`
//! mode waiters are served in strict arrival order even though idle-object
//! selection (LIFO/FIFO) is an orthogonal axis (spec.md §5's "ordering"
//! note).
//!
//! Built on `parking_lot::Mutex` + `parking_lot::Condvar`, the same
//! primitives the teacher reaches for (`crates/resource/src/pool.rs` uses
//! `parking_lot::Mutex`; this component adds the condvar the teacher's
//! semaphore-based design didn't need because it never blocks per-key).

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

struct Inner<T> {
    items: VecDeque<T>,
    /// Monotonically increasing; a fairness ticket equal to this value is
    /// next in line to be served.
    next_to_serve: u64,
    closed: bool,
}

/// A bounded blocking double-ended queue of `T`, as used for one key's idle
/// objects.
pub struct WaitDeque<T> {
    inner: Mutex<Inner<T>>,
    not_empty: Condvar,
    waiters: AtomicUsize,
    next_ticket: AtomicU64,
    fair: bool,
}

impl<T> WaitDeque<T> {
    pub fn new(fair: bool) -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                next_to_serve: 0,
                closed: false,
            }),
            not_empty: Condvar::new(),
            waiters: AtomicUsize::new(0),
            next_ticket: AtomicU64::new(0),
            fair,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn waiters(&self) -> usize {
        self.waiters.load(Ordering::Relaxed)
    }

    /// Push to the tail (FIFO order for subsequent pops) or head (LIFO /
    /// `EVICTION_RETURN_TO_HEAD`) and wake one waiter.
    pub fn push_back(&self, item: T) {
        let mut inner = self.inner.lock();
        inner.items.push_back(item);
        self.wake_one(&mut inner);
    }

    pub fn push_front(&self, item: T) {
        let mut inner = self.inner.lock();
        inner.items.push_front(item);
        self.wake_one(&mut inner);
    }

    fn wake_one(&self, inner: &mut Inner<T>) {
        if self.fair {
            // Fair mode: the next-ticket-holder's own wait loop checks
            // `next_to_serve` itself; a broadcast lets every waiter
            // re-check and only the front-of-line one proceeds.
            drop(inner);
            self.not_empty.notify_all();
        } else {
            drop(inner);
            self.not_empty.notify_one();
        }
    }

    /// Non-blocking pop from the front. Never participates in fairness
    /// ordering — this is the fast path `borrow` tries before considering a
    /// blocking wait at all (spec.md §4.2 step 2a).
    pub fn try_pop_front(&self) -> Option<T> {
        self.inner.lock().items.pop_front()
    }

    /// Block until an item is available or `timeout` elapses (`None` =
    /// forever). Returns `None` on timeout or if the deque was closed while
    /// waiting (close interrupts every waiter, spec.md §4.8).
    pub fn pop_front_timeout(&self, timeout: Option<Duration>) -> Option<T> {
        let ticket = if self.fair {
            Some(self.next_ticket.fetch_add(1, Ordering::SeqCst))
        } else {
            None
        };

        self.waiters.fetch_add(1, Ordering::SeqCst);
        let _dec_on_exit = DecrementOnDrop(&self.waiters);

        let deadline = timeout.map(|d| Instant::now() + d);
        let mut inner = self.inner.lock();
        loop {
            if inner.closed {
                return None;
            }
            let my_turn = ticket.is_none_or(|t| t == inner.next_to_serve);
            if my_turn && let Some(item) = inner.items.pop_front() {
                if let Some(t) = ticket {
                    inner.next_to_serve = t + 1;
                }
                return Some(item);
            }
            match deadline {
                None => {
                    self.not_empty.wait(&mut inner);
                }
                Some(dl) => {
                    let now = Instant::now();
                    if now >= dl {
                        return None;
                    }
                    let timed_out = self.not_empty.wait_for(&mut inner, dl - now).timed_out();
                    if timed_out && inner.items.is_empty() {
                        return None;
                    }
                }
            }
        }
    }

    /// Wake every blocked waiter with no item delivered (used by `close`).
    /// Waiters observe `closed` and return `None`.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        drop(inner);
        self.not_empty.notify_all();
    }

    /// Drain every currently idle item (used by `clear`).
    pub fn drain(&self) -> Vec<T> {
        self.inner.lock().items.drain(..).collect()
    }

    /// Remove the first item matching `predicate`, if any, without
    /// disturbing the rest of the ordering. Used by `clear_oldest`'s
    /// tolerant-of-concurrent-removal scan.
    pub fn remove_if(&self, mut predicate: impl FnMut(&T) -> bool) -> Option<T> {
        let mut inner = self.inner.lock();
        let idx = inner.items.iter().position(|i| predicate(i))?;
        inner.items.remove(idx)
    }
}

struct DecrementOnDrop<'a>(&'a AtomicUsize);

impl Drop for DecrementOnDrop<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

//! The value handed out by [`crate::KeyedPool::borrow`].

use std::ops::{Deref, DerefMut};

/// A value on loan from a [`crate::KeyedPool`].
///
/// `Pooled<T>` is a plain data carrier, not an RAII guard: spec.md models
/// borrow/return as an explicit manual protocol (`borrow(key) -> T`,
/// `return(key, T)`), and a few of its testable properties — returning the
/// same object twice (`AlreadyReturned`), returning an object the pool
/// doesn't recognize (`ForeignReturn`) — only make sense if dropping a
/// `Pooled<T>` does *not* silently return it. Both fields are public so
/// advanced callers (and this crate's own tests) can reconstruct one to
/// exercise those raw-protocol paths directly.
#[derive(Debug)]
pub struct Pooled<T> {
    /// The wrapper identity this value was lent from. Used by
    /// `return_object`/`invalidate` to find the matching entry in the
    /// owning sub-pool's identity map.
    pub id: u64,
    /// The loaned value itself.
    pub value: T,
}

impl<T> Pooled<T> {
    pub fn new(id: u64, value: T) -> Self {
        Self { id, value }
    }

    /// Split into the raw `(identity, value)` pair, e.g. to move the value
    /// across an API boundary that doesn't know about `Pooled`.
    pub fn into_parts(self) -> (u64, T) {
        (self.id, self.value)
    }
}

impl<T> Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

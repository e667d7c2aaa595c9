//! The factory contract a [`crate::KeyedPool`] is built around.
//!
//! Grounded on `crates/resource/src/resource.rs`'s `Resource` trait (create /
//! is_valid / recycle / cleanup with sensible no-op defaults), generalized to
//! the five-hook factory spec.md §6 describes and made synchronous: per
//! spec.md §5, factory calls may block arbitrarily and the pool must never
//! hold a lock across one, which a blocking trait makes structurally true
//! rather than merely disciplined.

use std::error::Error as StdError;

/// Capability set a [`crate::KeyedPool`] drives: create, destroy, validate,
/// activate, passivate. Only `make_object` and `destroy_object` are
/// mandatory; the rest default to no-ops, mirroring the `Resource` trait's
/// default `is_valid`/`recycle`/`cleanup` implementations.
///
/// Implementations must be safe to call from multiple pool worker threads at
/// once — the pool gives no per-key exclusivity guarantee around factory
/// calls (spec.md §3: "SubPool... makeObjectInFlight (count of factory calls
/// currently executing)" can be greater than one).
pub trait PooledObjectFactory<K, V>: Send + Sync {
    /// The error type raised by the hooks below.
    type Error: StdError + Send + Sync + 'static;

    /// Create a new instance for `key`. May block.
    fn make_object(&self, key: &K) -> Result<V, Self::Error>;

    /// Release whatever resources `value` holds. Called when an object is
    /// permanently removed from the pool (eviction, over-capacity return,
    /// close, or a failed validate/activate/passivate). Infallible by
    /// design — destruction failures are swallowed by the pool and routed to
    /// an optional [`crate::config::SwallowedErrorHook`] rather than
    /// propagated, per spec.md §7.
    fn destroy_object(&self, key: &K, value: V);

    /// Check whether `value` is still usable. Called on borrow
    /// (`test_on_borrow`/`test_on_create`), on return (`test_on_return`), and
    /// while idle (`test_while_idle`).
    fn validate_object(&self, _key: &K, _value: &V) -> bool {
        true
    }

    /// Prepare `value` for a borrower, right before it is handed out.
    fn activate_object(&self, _key: &K, _value: &mut V) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Reset `value` before it re-enters the idle deque.
    fn passivate_object(&self, _key: &K, _value: &mut V) -> Result<(), Self::Error> {
        Ok(())
    }
}

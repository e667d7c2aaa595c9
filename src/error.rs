//! Error taxonomy for pool operations.
//!
//! Grounded on `crates/resource/src/error.rs`'s style: struct-like variants
//! carrying enough context to act on the failure, a crate-wide `Result`
//! alias, and small `impl Error` helper constructors plus classification
//! methods instead of matching on variants everywhere.

use std::fmt::Debug;

use thiserror::Error;

/// Result type for pool operations.
pub type Result<T, K = String> = std::result::Result<T, PoolError<K>>;

/// Boxed source error from a user-supplied factory.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised at the pool's boundary. See spec.md §7.
#[derive(Error, Debug)]
pub enum PoolError<K = String> {
    /// The pool has been closed.
    #[error("pool is closed")]
    PoolClosed,

    /// `borrow` with `block_when_exhausted` waited the full timeout without
    /// obtaining an object.
    #[error("timed out waiting for an object for key {key:?} after {waited_ms}ms")]
    Timeout {
        /// The key that was being borrowed.
        key: K,
        /// How long the caller actually waited.
        waited_ms: u64,
    },

    /// `borrow` with `block_when_exhausted = false` found no idle object and
    /// could not create one under the current caps.
    #[error("pool for key {key:?} is exhausted")]
    Exhausted {
        /// The key that was being borrowed.
        key: K,
    },

    /// The factory's `make_object` returned an error.
    #[error("failed to create an object for key {key:?}")]
    CreationFailed {
        /// The key being created for.
        key: K,
        /// The factory's error.
        #[source]
        source: BoxError,
    },

    /// `activate_object` failed on a *freshly created* instance (a failure
    /// on a stale idle instance is not fatal — the pool just retries with
    /// another instance, per spec.md §4.2 step 2e).
    #[error("failed to activate a freshly created object for key {key:?}")]
    ActivationFailed {
        /// The key being activated for.
        key: K,
        /// The factory's error, if any (a plain validation-style failure
        /// with no underlying cause is represented as `None`).
        #[source]
        source: Option<BoxError>,
    },

    /// `validate_object` returned `false` (or raised) for a *freshly
    /// created* instance.
    #[error("a freshly created object for key {key:?} failed validation")]
    ValidationFailed {
        /// The key being validated for.
        key: K,
        #[source]
        source: Option<BoxError>,
    },

    /// `return_object`/`invalidate` was called with an object this pool
    /// never created (or already destroyed).
    #[error("returned object for key {key:?} is not known to this pool")]
    ForeignReturn {
        /// The key it was returned under.
        key: K,
    },

    /// The same object was returned (or invalidated) twice.
    #[error("object for key {key:?} was already returned")]
    AlreadyReturned {
        /// The key it was returned under.
        key: K,
    },

    /// An optional pool operation was invoked but is not supported by this
    /// configuration (reserved for base-class-style specializations; see
    /// spec.md §1's "simple base classes that expose no-op factory
    /// defaults").
    #[error("unsupported operation: {operation}")]
    Unsupported {
        /// Name of the attempted operation.
        operation: &'static str,
    },

    /// The supplied `PoolConfig` failed validation.
    #[error("invalid pool configuration: {message}")]
    Configuration {
        /// Human-readable description of the violated constraint.
        message: String,
    },

    /// The OS refused to spawn the evictor's background thread.
    #[error("failed to spawn the evictor thread")]
    EvictorSpawnFailed {
        /// The underlying OS error.
        #[source]
        source: std::io::Error,
    },
}

impl<K: Debug> PoolError<K> {
    pub fn creation_failed(key: K, source: impl Into<BoxError>) -> Self {
        Self::CreationFailed {
            key,
            source: source.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Whether a caller could reasonably retry the operation (as opposed to
    /// a foreign-return/already-returned bug in the caller, or a closed
    /// pool that will never reopen).
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Exhausted { .. })
    }

    /// The key the error pertains to, if any (`Unsupported`/`Configuration`
    /// are not key-scoped).
    #[must_use]
    pub fn key(&self) -> Option<&K> {
        match self {
            Self::PoolClosed
            | Self::Unsupported { .. }
            | Self::Configuration { .. }
            | Self::EvictorSpawnFailed { .. } => None,
            Self::Timeout { key, .. }
            | Self::Exhausted { key }
            | Self::CreationFailed { key, .. }
            | Self::ActivationFailed { key, .. }
            | Self::ValidationFailed { key, .. }
            | Self::ForeignReturn { key }
            | Self::AlreadyReturned { key } => Some(key),
        }
    }
}

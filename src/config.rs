//! Pool configuration and eviction policy.
//!
//! `PoolConfig`'s shape and its eager `validate()` are grounded on
//! `crates/resource/src/pool.rs`'s `PoolConfig`/`PoolConfig::validate()`;
//! the fields themselves come from spec.md §6's configuration table.

use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{PoolError, Result};
use crate::wrapper::PooledObject;

/// `-1` (modeled as `None`) means "unbounded" throughout this crate, matching
/// spec.md's `<0 = unbounded` convention for `max_total`/`max_total_per_key`
/// and `<0 = forever` for `max_wait`.
pub type Cap = Option<usize>;

/// Pool-wide and per-key tuning knobs. See spec.md §6.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PoolConfig {
    /// Global cap on live objects across all keys. `None` = unbounded.
    pub max_total: Cap,
    /// Per-key cap on live objects. `None` = unbounded.
    pub max_total_per_key: Cap,
    /// Per-key cap on idle objects; over this, `return_object` destroys
    /// instead of idling. `None` = unbounded.
    pub max_idle_per_key: Cap,
    /// The evictor tops idle objects up to this per key. Capped at
    /// `max_idle_per_key` if that is set and smaller (spec.md §8 boundary
    /// behavior).
    pub min_idle_per_key: usize,
    /// Whether `borrow` blocks when a key has nothing idle and is at
    /// capacity, vs. failing immediately with `Exhausted`.
    pub block_when_exhausted: bool,
    /// Default wait for a blocking `borrow` with no explicit timeout.
    /// `None` = wait forever.
    pub max_wait: Option<Duration>,
    /// Idle selection order: `true` = LIFO (most recently returned first),
    /// `false` = FIFO.
    pub lifo: bool,
    /// Whether blocked waiters on the same key's idle deque are served in
    /// strict arrival order.
    pub fairness: bool,
    /// Validate objects freshly created by `borrow` before handing them out.
    pub test_on_create: bool,
    /// Validate objects (fresh or idle) on every `borrow`.
    pub test_on_borrow: bool,
    /// Validate objects on `return_object`.
    pub test_on_return: bool,
    /// Validate (and activate/passivate) idle objects from the evictor.
    pub test_while_idle: bool,
    /// Evictor period. `None`/`<=0` disables the evictor.
    pub time_between_eviction_runs: Option<Duration>,
    /// How many idle objects the evictor inspects per tick. Positive = an
    /// absolute count (capped at `numIdle`); negative = a fraction,
    /// `ceil(numIdle / |n|)`.
    pub num_tests_per_eviction_run: i64,
    /// An idle object older than this is always evicted.
    pub min_evictable_idle_time: Option<Duration>,
    /// An idle object older than this is evicted *if* its key has more than
    /// `min_idle_per_key` idle objects.
    pub soft_min_evictable_idle_time: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_total: Some(8),
            max_total_per_key: Some(8),
            max_idle_per_key: Some(8),
            min_idle_per_key: 0,
            block_when_exhausted: true,
            max_wait: None,
            lifo: true,
            fairness: false,
            test_on_create: false,
            test_on_borrow: false,
            test_on_return: false,
            test_while_idle: false,
            time_between_eviction_runs: None,
            num_tests_per_eviction_run: -1,
            min_evictable_idle_time: Some(Duration::from_secs(30 * 60)),
            soft_min_evictable_idle_time: None,
        }
    }
}

impl PoolConfig {
    /// Validate the configuration, returning an error describing the first
    /// violated constraint.
    pub fn validate<K: std::fmt::Debug>(&self) -> Result<(), K> {
        if let (Some(total), Some(per_key)) = (self.max_total, self.max_total_per_key)
            && per_key > total
        {
            return Err(PoolError::configuration(format!(
                "max_total_per_key ({per_key}) must not exceed max_total ({total})"
            )));
        }
        if self.num_tests_per_eviction_run == 0 {
            return Err(PoolError::configuration(
                "num_tests_per_eviction_run must not be 0",
            ));
        }
        Ok(())
    }

    /// `min_idle_per_key`, capped at `max_idle_per_key` when that is smaller
    /// (spec.md §8: "minIdlePerKey > maxIdlePerKey -> effective minimum is
    /// capped at maxIdlePerKey").
    pub fn effective_min_idle_per_key(&self) -> usize {
        match self.max_idle_per_key {
            Some(max) => self.min_idle_per_key.min(max),
            None => self.min_idle_per_key,
        }
    }
}

/// Decides whether an idle object should be evicted on a given sweep.
///
/// Grounded on spec.md §4.6's default rule; expressed as a trait so a caller
/// can plug in their own policy, matching the "pluggable policy" language in
/// spec.md §2's evictor summary.
pub trait EvictionPolicy<T>: Send + Sync {
    /// `idle_size_of_key` is how many objects are currently idle under the
    /// same key as `object`, taken at the moment the policy is consulted.
    fn evict(&self, config: &PoolConfig, object: &PooledObject<T>, idle_size_of_key: usize)
    -> bool;
}

/// The default policy described in spec.md §4.6: evict once an object has
/// sat idle past `min_evictable_idle_time`, or past
/// `soft_min_evictable_idle_time` while its key is still over
/// `min_idle_per_key`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultEvictionPolicy;

impl<T> EvictionPolicy<T> for DefaultEvictionPolicy {
    fn evict(
        &self,
        config: &PoolConfig,
        object: &PooledObject<T>,
        idle_size_of_key: usize,
    ) -> bool {
        let idle_time = object.idle_time();
        if let Some(hard) = config.min_evictable_idle_time
            && idle_time > hard
        {
            return true;
        }
        if let Some(soft) = config.soft_min_evictable_idle_time
            && idle_time > soft
            && idle_size_of_key > config.effective_min_idle_per_key()
        {
            return true;
        }
        false
    }
}

/// Receives destruction failures the pool swallows rather than propagates
/// (spec.md §7): a failed `destroy_object` on a recovery path, or a factory
/// exception raised during `reuseCapacity`/`ensureMinIdle`/evictor ticks.
/// Grounded on the same "optional listener, default no-op" shape as the
/// `validate_object`/`activate_object` defaults on
/// [`crate::factory::PooledObjectFactory`].
pub trait SwallowedErrorHook<K>: Send + Sync {
    fn on_swallowed_error(&self, key: &K, error: &(dyn std::error::Error + 'static));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        PoolConfig::default().validate::<&str>().unwrap();
    }

    #[test]
    fn per_key_cap_cannot_exceed_global_cap() {
        let cfg = PoolConfig {
            max_total: Some(2),
            max_total_per_key: Some(4),
            ..PoolConfig::default()
        };
        assert!(cfg.validate::<&str>().is_err());
    }

    #[test]
    fn zero_num_tests_per_eviction_run_is_rejected() {
        let cfg = PoolConfig {
            num_tests_per_eviction_run: 0,
            ..PoolConfig::default()
        };
        assert!(cfg.validate::<&str>().is_err());
    }

    #[test]
    fn effective_min_idle_is_capped_by_max_idle() {
        let cfg = PoolConfig {
            min_idle_per_key: 5,
            max_idle_per_key: Some(2),
            ..PoolConfig::default()
        };
        assert_eq!(cfg.effective_min_idle_per_key(), 2);
    }

    #[test]
    fn unbounded_max_idle_does_not_cap_min_idle() {
        let cfg = PoolConfig {
            min_idle_per_key: 5,
            max_idle_per_key: None,
            ..PoolConfig::default()
        };
        assert_eq!(cfg.effective_min_idle_per_key(), 5);
    }

    #[test]
    fn default_policy_evicts_past_hard_threshold() {
        let cfg = PoolConfig {
            min_evictable_idle_time: Some(Duration::from_millis(0)),
            ..PoolConfig::default()
        };
        let obj = PooledObject::new_allocated(());
        obj.deallocate(()).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        assert!(DefaultEvictionPolicy.evict(&cfg, &obj, 1));
    }

    #[test]
    fn default_policy_keeps_objects_under_every_threshold() {
        let cfg = PoolConfig {
            min_evictable_idle_time: Some(Duration::from_secs(3600)),
            soft_min_evictable_idle_time: None,
            ..PoolConfig::default()
        };
        let obj = PooledObject::new_allocated(());
        obj.deallocate(()).unwrap();
        assert!(!DefaultEvictionPolicy.evict(&cfg, &obj, 1));
    }
}

//! The key -> sub-pool registry and its register/deregister protocol.
//!
//! Grounded on `crates/resource/src/manager/mod.rs`'s
//! `Arc<RwLock<HashMap<...>>>` registry pattern, generalized to also carry
//! the ordered key list spec.md §3/§4.7 requires for eviction rotation, with
//! both guarded by the single `parking_lot::RwLock` spec.md §5's locking
//! discipline calls for.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::subpool::SubPool;

struct Inner<K, T> {
    map: HashMap<K, Arc<SubPool<T>>>,
    /// Parallel ordered list of keys, used by the evictor's round-robin
    /// walk. Invariant (checked in tests): `map.keys() == order` as sets at
    /// every point the write lock is not held (spec.md §4.7).
    order: Vec<K>,
}

pub struct Registry<K, T> {
    inner: RwLock<Inner<K, T>>,
    fair: bool,
}

impl<K: Clone + Eq + Hash, T> Registry<K, T> {
    pub fn new(fair: bool) -> Self {
        Self {
            inner: RwLock::new(Inner {
                map: HashMap::new(),
                order: Vec::new(),
            }),
            fair,
        }
    }

    /// Register interest in `key`, returning its sub-pool (creating one if
    /// this is the first registration). Mirrors spec.md §4.7's
    /// read-then-upgrade-to-write double-checked insertion.
    pub fn register(&self, key: &K) -> Arc<SubPool<T>> {
        {
            let read = self.inner.read();
            if let Some(sub) = read.map.get(key) {
                sub.register_interest();
                return Arc::clone(sub);
            }
        }
        let mut write = self.inner.write();
        if let Some(sub) = write.map.get(key) {
            sub.register_interest();
            return Arc::clone(sub);
        }
        let sub = SubPool::new(self.fair);
        write.map.insert(key.clone(), Arc::clone(&sub));
        write.order.push(key.clone());
        sub.register_interest();
        sub
    }

    /// Look up a key's sub-pool without registering interest in it (used by
    /// `return_object`/`invalidate`, which must not extend the key's
    /// lifetime just to act on an object that already exists).
    pub fn get(&self, key: &K) -> Option<Arc<SubPool<T>>> {
        self.inner.read().map.get(key).cloned()
    }

    /// Release interest in `key`, removing its sub-pool from the registry if
    /// it is now both uninterested-in and empty of created objects (spec.md
    /// §4.7/§3's "Lifecycle").
    pub fn deregister(&self, key: &K) {
        let sub = {
            let read = self.inner.read();
            match read.map.get(key) {
                Some(sub) => Arc::clone(sub),
                None => return,
            }
        };
        sub.release_interest();
        if sub.interested() != 0 || sub.create_count() != 0 {
            return;
        }
        let mut write = self.inner.write();
        // Re-verify under the write lock: another thread may have
        // re-registered or started a create in the gap above.
        let Some(current) = write.map.get(key) else {
            return;
        };
        if !Arc::ptr_eq(current, &sub) {
            return;
        }
        if sub.interested() != 0 || sub.create_count() != 0 {
            return;
        }
        write.map.remove(key);
        write.order.retain(|k| k != key);
    }

    /// Snapshot of keys in registration order, for the evictor's rotation.
    pub fn keys_snapshot(&self) -> Vec<K> {
        self.inner.read().order.clone()
    }

    pub fn all_subpools(&self) -> Vec<(K, Arc<SubPool<T>>)> {
        self.inner
            .read()
            .map
            .iter()
            .map(|(k, v)| (k.clone(), Arc::clone(v)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    pub fn invariant_holds(&self) -> bool {
        let inner = self.inner.read();
        let mut from_order: Vec<&K> = inner.order.iter().collect();
        let mut from_map: Vec<&K> = inner.map.keys().collect();
        from_order.sort_by_key(|k| format!("{:p}", *k as *const K));
        from_map.sort_by_key(|k| format!("{:p}", *k as *const K));
        inner.order.len() == inner.map.len()
            && inner.order.iter().all(|k| inner.map.contains_key(k))
    }
}

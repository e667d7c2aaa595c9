//! `passivate_object` failure path (spec.md §4.3 step 4): the instance is
//! destroyed instead of returned to idle, and the pool stays usable.

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use keyed_object_pool::{KeyedPool, PoolConfig};

use common::{CountingFactory, key};

#[test]
fn passivate_failure_destroys_instead_of_idling() {
    let factory = Arc::new(CountingFactory::new());
    let pool = KeyedPool::new(Arc::clone(&factory), PoolConfig::default()).unwrap();

    let o = pool.borrow(&key("a")).unwrap();
    factory.fail_passivate.store(true, Ordering::SeqCst);
    pool.return_object(&key("a"), o).unwrap();

    assert_eq!(pool.num_idle_key(&key("a")), 0, "failed passivate must destroy, not idle");
    assert_eq!(factory.destroyed_count(), 1);

    factory.fail_passivate.store(false, Ordering::SeqCst);
    let o2 = pool.borrow(&key("a")).unwrap();
    pool.return_object(&key("a"), o2).unwrap();
    assert_eq!(pool.num_idle_key(&key("a")), 1, "pool stays usable after the failure");
}

#[test]
fn return_validation_failure_destroys_instead_of_idling() {
    let factory = Arc::new(CountingFactory::new());
    let pool = KeyedPool::new(
        Arc::clone(&factory),
        PoolConfig {
            test_on_return: true,
            ..PoolConfig::default()
        },
    )
    .unwrap();

    let o = pool.borrow(&key("a")).unwrap();
    factory.fail_validate.store(true, Ordering::SeqCst);
    pool.return_object(&key("a"), o).unwrap();
    assert_eq!(pool.num_idle_key(&key("a")), 0, "failed return-validation must destroy");
    assert_eq!(factory.destroyed_count(), 1);

    factory.fail_validate.store(false, Ordering::SeqCst);
    assert!(pool.borrow(&key("a")).is_ok());
}

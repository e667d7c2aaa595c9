//! Timing out mid-wait does not leak reserved capacity: a borrower that gives
//! up after `max_wait` elapses leaves the key free for the next caller,
//! exactly as if it had never asked.

mod common;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use keyed_object_pool::{KeyedPool, PoolConfig, PoolError};

use common::{CountingFactory, key};

#[test]
fn timed_out_borrow_leaks_no_capacity() {
    let pool = KeyedPool::new(
        CountingFactory::new(),
        PoolConfig {
            max_total_per_key: Some(1),
            block_when_exhausted: true,
            max_wait: Some(Duration::from_millis(50)),
            ..PoolConfig::default()
        },
    )
    .unwrap();

    let held = pool.borrow(&key("a")).unwrap();

    let err = pool.borrow(&key("a")).unwrap_err();
    assert!(matches!(err, PoolError::Timeout { .. }));
    assert_eq!(pool.num_active_key(&key("a")), 1, "the timed-out waiter must not hold a slot");

    pool.return_object(&key("a"), held).unwrap();
    assert!(pool.borrow(&key("a")).is_ok(), "the key must still be usable afterwards");
}

#[test]
fn many_timed_out_waiters_never_starve_a_later_return() {
    let pool = Arc::new(
        KeyedPool::new(
            CountingFactory::new(),
            PoolConfig {
                max_total_per_key: Some(1),
                block_when_exhausted: true,
                max_wait: Some(Duration::from_millis(30)),
                ..PoolConfig::default()
            },
        )
        .unwrap(),
    );

    let held = pool.borrow(&key("a")).unwrap();

    let waiters: Vec<_> = (0..8)
        .map(|_| {
            let pool = Arc::clone(&pool);
            thread::spawn(move || pool.borrow(&key("a")))
        })
        .collect();

    for w in waiters {
        assert!(w.join().unwrap().is_err());
    }

    pool.return_object(&key("a"), held).unwrap();
    assert!(pool.borrow(&key("a")).is_ok());
    assert_eq!(pool.num_active_key(&key("a")), 1);
}

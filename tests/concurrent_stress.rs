//! Many real threads doing random borrow/return cycles across several keys
//! without deadlock, counter corruption, or panics. spec.md §5 requires real
//! preemptive threads as borrowers, so this drives the pool with
//! `std::thread::spawn` rather than an async executor.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use keyed_object_pool::{KeyedPool, PoolConfig};

use common::{CountingFactory, init_tracing};

#[test]
fn many_threads_random_borrow_release_across_keys() {
    init_tracing();
    let pool = Arc::new(
        KeyedPool::new(
            CountingFactory::new(),
            PoolConfig {
                max_total: Some(40),
                max_total_per_key: Some(10),
                block_when_exhausted: true,
                max_wait: Some(Duration::from_secs(10)),
                ..PoolConfig::default()
            },
        )
        .unwrap(),
    );

    let keys = ["a", "b", "c", "d"];
    let success_count = Arc::new(AtomicU64::new(0));
    let mut handles = Vec::new();

    for t in 0..50 {
        let pool = Arc::clone(&pool);
        let success_count = Arc::clone(&success_count);
        let key = keys[t % keys.len()].to_owned();
        handles.push(thread::spawn(move || {
            for _ in 0..20 {
                let o = pool.borrow(&key).expect("thread should borrow within the timeout");
                let _val: i64 = *o;
                thread::sleep(Duration::from_micros(200));
                pool.return_object(&key, o).unwrap();
            }
            success_count.fetch_add(1, Ordering::SeqCst);
        }));
    }

    for h in handles {
        h.join().expect("worker thread should not panic");
    }

    assert_eq!(success_count.load(Ordering::SeqCst), 50, "all 50 threads should complete");

    for k in keys {
        assert_eq!(pool.num_active_key(&k.to_owned()), 0, "no instance should be on loan after all threads finish");
    }

    let stats = pool.stats();
    assert_eq!(stats.num_active, 0);
    assert!(
        stats.destroyed_count <= stats.created_count,
        "destroyed ({}) should not exceed created ({})",
        stats.destroyed_count,
        stats.created_count,
    );
    assert_eq!(
        stats.num_idle + usize::try_from(stats.destroyed_count).unwrap(),
        usize::try_from(stats.created_count).unwrap(),
        "every created instance is either still idle or accounted for as destroyed",
    );
}

#[test]
fn contended_single_key_never_oversubscribes_capacity() {
    let pool = Arc::new(
        KeyedPool::new(
            CountingFactory::new(),
            PoolConfig {
                max_total_per_key: Some(3),
                block_when_exhausted: true,
                max_wait: Some(Duration::from_secs(10)),
                ..PoolConfig::default()
            },
        )
        .unwrap(),
    );

    let peak_active = Arc::new(AtomicU64::new(0));
    let mut handles = Vec::new();

    for _ in 0..16 {
        let pool = Arc::clone(&pool);
        let peak_active = Arc::clone(&peak_active);
        handles.push(thread::spawn(move || {
            for _ in 0..10 {
                let o = pool.borrow(&"single".to_owned()).unwrap();
                let active = u64::try_from(pool.num_active_key(&"single".to_owned())).unwrap();
                peak_active.fetch_max(active, Ordering::SeqCst);
                assert!(active <= 3, "must never exceed max_total_per_key");
                pool.return_object(&"single".to_owned(), o).unwrap();
            }
        }));
    }

    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(pool.num_active_key(&"single".to_owned()), 0);
}

// Pool throughput benchmarks.
//
// Measures raw pool borrow/return overhead with a zero-cost factory (no I/O,
// instant create/destroy).

use std::hint::black_box;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use criterion::{Criterion, criterion_group, criterion_main};
use keyed_object_pool::{KeyedPool, PoolConfig, PooledObjectFactory};

#[derive(Debug, thiserror::Error)]
#[error("unreachable")]
struct NeverError;

struct NoOpFactory;

impl PooledObjectFactory<String, u64> for NoOpFactory {
    type Error = NeverError;

    fn make_object(&self, _key: &String) -> Result<u64, Self::Error> {
        Ok(0)
    }

    fn destroy_object(&self, _key: &String, _value: u64) {}
}

fn pool_config(max_total_per_key: usize) -> PoolConfig {
    PoolConfig {
        min_idle_per_key: 0,
        max_total_per_key: Some(max_total_per_key),
        max_wait: Some(Duration::from_secs(5)),
        time_between_eviction_runs: None,
        ..PoolConfig::default()
    }
}

fn single_thread_throughput(c: &mut Criterion) {
    let pool = KeyedPool::new(NoOpFactory, pool_config(64)).expect("failed to create pool");
    let key = "bench".to_owned();

    // Warm up: borrow and return one instance so subsequent borrows reuse it.
    let o = pool.borrow(&key).unwrap();
    pool.return_object(&key, o).unwrap();

    c.bench_function("single_thread_borrow_return", |b| {
        b.iter(|| {
            let o = pool.borrow(&key).unwrap();
            pool.return_object(&key, o).unwrap();
            black_box(())
        });
    });
}

fn multi_thread_throughput(c: &mut Criterion) {
    let pool = Arc::new(KeyedPool::new(NoOpFactory, pool_config(64)).expect("failed to create pool"));
    let key = "bench".to_owned();

    // Warm up pool with some instances.
    let mut warm = Vec::new();
    for _ in 0..8 {
        warm.push(pool.borrow(&key).unwrap());
    }
    for o in warm {
        pool.return_object(&key, o).unwrap();
    }

    c.bench_function("multi_thread_borrow_return", |b| {
        b.iter_custom(|iters| {
            let start = std::time::Instant::now();
            thread::scope(|scope| {
                for _ in 0..4 {
                    let pool = Arc::clone(&pool);
                    let key = key.clone();
                    scope.spawn(move || {
                        for _ in 0..(iters / 4).max(1) {
                            let o = pool.borrow(&key).unwrap();
                            pool.return_object(&key, o).unwrap();
                        }
                    });
                }
            });
            start.elapsed()
        });
    });
}

fn concurrent_contention(c: &mut Criterion) {
    // Small pool to create contention.
    let pool = Arc::new(KeyedPool::new(NoOpFactory, pool_config(4)).expect("failed to create pool"));
    let key = "bench".to_owned();

    c.bench_function("contended_borrow_return_4slots", |b| {
        b.iter_custom(|iters| {
            let start = std::time::Instant::now();
            thread::scope(|scope| {
                for _ in 0..4 {
                    let pool = Arc::clone(&pool);
                    let key = key.clone();
                    scope.spawn(move || {
                        for _ in 0..(iters / 4).max(1) {
                            let o = pool.borrow(&key).unwrap();
                            pool.return_object(&key, o).unwrap();
                        }
                    });
                }
            });
            start.elapsed()
        });
    });
}

criterion_group!(
    benches,
    single_thread_throughput,
    multi_thread_throughput,
    concurrent_contention,
);
criterion_main!(benches);

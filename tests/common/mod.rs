//! Shared test fixtures: a counting factory usable across the integration
//! suite, in the style of the hand-rolled fakes `crates/resource/src/pool.rs`
//! keeps in its own test module rather than reaching for a mocking crate.

use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::Once;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use keyed_object_pool::PooledObjectFactory;

static TRACING_INIT: Once = Once::new();

/// Wire up a `tracing` subscriber so the pool's own `debug!`/`warn!` call
/// sites (create/destroy/evict/swallow) are visible with `--nocapture`.
/// Idempotent; safe to call from every test.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

#[derive(Debug, thiserror::Error)]
#[error("factory failure: {0}")]
pub struct FactoryError(pub String);

/// Hands out a monotonically increasing `i64` per key, with knobs to force
/// creation/validation/activation failures on demand.
pub struct CountingFactory {
    pub next: AtomicI64,
    pub fail_create: AtomicBool,
    pub fail_validate: AtomicBool,
    pub fail_activate: AtomicBool,
    pub fail_passivate: AtomicBool,
    pub destroyed: StdMutex<Vec<i64>>,
}

impl CountingFactory {
    pub fn new() -> Self {
        Self {
            next: AtomicI64::new(0),
            fail_create: AtomicBool::new(false),
            fail_validate: AtomicBool::new(false),
            fail_activate: AtomicBool::new(false),
            fail_passivate: AtomicBool::new(false),
            destroyed: StdMutex::new(Vec::new()),
        }
    }

    pub fn destroyed_count(&self) -> usize {
        self.destroyed.lock().unwrap().len()
    }
}

impl PooledObjectFactory<String, i64> for CountingFactory {
    type Error = FactoryError;

    fn make_object(&self, _key: &String) -> Result<i64, Self::Error> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(FactoryError("create failed".into()));
        }
        Ok(self.next.fetch_add(1, Ordering::SeqCst))
    }

    fn destroy_object(&self, _key: &String, value: i64) {
        self.destroyed.lock().unwrap().push(value);
    }

    fn validate_object(&self, _key: &String, _value: &i64) -> bool {
        !self.fail_validate.load(Ordering::SeqCst)
    }

    fn activate_object(&self, _key: &String, _value: &mut i64) -> Result<(), Self::Error> {
        if self.fail_activate.load(Ordering::SeqCst) {
            return Err(FactoryError("activate failed".into()));
        }
        Ok(())
    }

    fn passivate_object(&self, _key: &String, _value: &mut i64) -> Result<(), Self::Error> {
        if self.fail_passivate.load(Ordering::SeqCst) {
            return Err(FactoryError("passivate failed".into()));
        }
        Ok(())
    }
}

impl PooledObjectFactory<String, i64> for Arc<CountingFactory> {
    type Error = FactoryError;

    fn make_object(&self, key: &String) -> Result<i64, Self::Error> {
        CountingFactory::make_object(self, key)
    }

    fn destroy_object(&self, key: &String, value: i64) {
        CountingFactory::destroy_object(self, key, value)
    }

    fn validate_object(&self, key: &String, value: &i64) -> bool {
        CountingFactory::validate_object(self, key, value)
    }

    fn activate_object(&self, key: &String, value: &mut i64) -> Result<(), Self::Error> {
        CountingFactory::activate_object(self, key, value)
    }

    fn passivate_object(&self, key: &String, value: &mut i64) -> Result<(), Self::Error> {
        CountingFactory::passivate_object(self, key, value)
    }
}

pub fn key(s: &str) -> String {
    s.to_owned()
}

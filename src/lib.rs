#![allow(clippy::excessive_nesting)]

//! # keyed-object-pool
//!
//! A generic, keyed, thread-safe object pool: a reusable container that
//! amortizes the cost of creating expensive objects (database connections,
//! sockets, parsers) by lending them to callers, reclaiming them on return,
//! and lazily destroying them under policy. The pool is *keyed*: it behaves
//! as a mapping from a key to an independent sub-pool, with additional
//! global caps shared across all keys.
//!
//! This crate is the concurrency core: the sub-pool state machine, the
//! cross-key capacity accounting, the fair-wait borrow path, the
//! eviction/idle-maintenance loop, and the key-lifecycle (register/
//! deregister) protocol. The object factory (create/destroy/validate/
//! activate/passivate) is supplied by the caller through
//! [`factory::PooledObjectFactory`]; this crate does not ship factories for
//! any particular resource.
//!
//! ```ignore
//! use keyed_object_pool::{KeyedPool, PoolConfig, PooledObjectFactory};
//!
//! struct ConnFactory;
//! impl PooledObjectFactory<String, Connection> for ConnFactory {
//!     type Error = std::io::Error;
//!     fn make_object(&self, key: &String) -> Result<Connection, Self::Error> {
//!         Connection::open(key)
//!     }
//!     fn destroy_object(&self, _key: &String, conn: Connection) {
//!         conn.close();
//!     }
//! }
//!
//! let pool = KeyedPool::new(ConnFactory, PoolConfig::default())?;
//! let conn = pool.borrow(&"db-primary".to_owned())?;
//! pool.return_object(&"db-primary".to_owned(), conn)?;
//! ```

pub mod config;
pub mod error;
pub mod evictor;
pub mod factory;
pub mod pool;
pub mod pooled;
pub mod registry;
pub mod subpool;
pub mod wait_deque;
pub mod wrapper;

pub use config::{Cap, DefaultEvictionPolicy, EvictionPolicy, PoolConfig, SwallowedErrorHook};
pub use error::{BoxError, PoolError, Result};
pub use factory::PooledObjectFactory;
pub use pool::{KeyedPool, KeyedPoolBuilder, PoolStats};
pub use pooled::Pooled;
pub use wrapper::State as WrapperState;

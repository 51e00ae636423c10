//! Process-wide pool instance

use super::allocator::SlabPool;
use crate::config::PoolConfig;
use crate::error::{Error, Result};
use std::sync::OnceLock;
use tracing::debug;

/// The process-wide pool.
///
/// Allocations fail until [`initialize`] has run.
///
/// # Examples
///
/// ```
/// use slabpool::PoolConfig;
///
/// slabpool::initialize(&PoolConfig::new(16).with_prealloc_pages(false))?;
///
/// let pool = slabpool::global();
/// let ptr = pool.allocate(32).expect("pool has room");
/// unsafe { pool.free(ptr, 32) };
/// # Ok::<(), slabpool::error::Error>(())
/// ```
pub fn global() -> &'static SlabPool {
    static POOL: OnceLock<SlabPool> = OnceLock::new();
    POOL.get_or_init(SlabPool::empty)
}

/// Initialize the process-wide pool.
///
/// Later calls are ignored and keep the first configuration. Run this
/// before other threads start allocating.
pub fn initialize(config: &PoolConfig) -> Result<()> {
    match global().configure(config) {
        Err(Error::AlreadyInitialized) => {
            debug!("Global slab pool already initialized, ignoring");
            Ok(())
        }
        other => other,
    }
}

// slabpool - size-classed slab memory pool
// Serves small allocations out of one preallocated arena and recycles freed
// chunks through per-class free lists.

#![warn(rust_2018_idioms)]

pub mod config;
pub mod pool;

// Re-exports for convenience
pub use config::PoolConfig;
pub use pool::{
    global, initialize, ArenaStats, ClassId, ClassStats, PoolStats, PooledSlice, SlabPool,
    ALIGNMENT, HEADER_SIZE, MAX_CLASSES, MAX_OBJECT_SIZE, MIN_ARENA_MB, MIN_OBJECT_SIZE,
};

/// Pool error types
pub mod error {
    use thiserror::Error;

    #[derive(Error, Debug)]
    pub enum Error {
        #[error("Pool is already initialized")]
        AlreadyInitialized,

        #[error("Out of memory: {requested} bytes requested")]
        OutOfMemory { requested: usize },

        #[error("Invalid size class id: {0}")]
        InvalidClass(u8),

        #[error("No size class can hold {0} bytes")]
        UnmanagedSize(usize),

        #[error("Failed to grow {0}")]
        GrowthFailure(&'static str),

        #[error("Invalid configuration: {0}")]
        InvalidConfig(String),

        #[error("Configuration error: {0}")]
        Config(#[from] ::config::ConfigError),
    }

    pub type Result<T> = std::result::Result<T, Error>;
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! The process-wide pool keeps its first configuration

use slabpool::pool::calculate_size_classes;
use slabpool::PoolConfig;

#[test]
fn test_global_initialize_once() {
    let pool = slabpool::global();
    assert!(pool.allocate(64).is_none());

    let first = PoolConfig::new(16).with_prealloc_pages(false);
    slabpool::initialize(&first).expect("first initialization");
    assert!(pool.is_initialized());
    assert_eq!(pool.class_count(), calculate_size_classes(1.2).len());

    // Second call is accepted and ignored
    let second = PoolConfig::new(64).with_growth_factor(2.0);
    slabpool::initialize(&second).expect("second initialization");
    assert_eq!(pool.class_count(), calculate_size_classes(1.2).len());
    assert_eq!(pool.stats().arena.unwrap().capacity, 16 * 1024 * 1024);

    // Even an invalid configuration is ignored once the pool is set up
    let invalid = PoolConfig::new(16).with_growth_factor(0.5);
    slabpool::initialize(&invalid).expect("invalid config after initialization");
    assert_eq!(pool.class_count(), calculate_size_classes(1.2).len());

    let ptr = pool.allocate(64).expect("allocation after initialize");
    unsafe { pool.free(ptr, 64) };
    assert_eq!(pool.stats().live_chunks(), 0);
}

//! End-to-end tests for the slab pool: class table, lookup, reuse and
//! arena exhaustion

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use slabpool::{ClassId, PoolConfig, SlabPool, HEADER_SIZE, MAX_CLASSES, MAX_OBJECT_SIZE};
use std::collections::HashMap;
use std::ptr::NonNull;

fn lazy_pool(limit_mb: u32) -> SlabPool {
    SlabPool::new(&PoolConfig::new(limit_mb).with_prealloc_pages(false))
        .expect("Failed to create pool")
}

#[test]
fn test_default_class_table() {
    let pool = SlabPool::new(&PoolConfig::default()).expect("Failed to create pool");
    let stats = pool.stats();

    assert!(stats.classes.len() <= MAX_CLASSES);
    assert_eq!(pool.class_count(), stats.classes.len());

    let first = stats.classes.first().unwrap();
    assert_eq!(first.id.get(), 1);
    assert_eq!(first.chunk_size, 16);

    let last = stats.classes.last().unwrap();
    assert_eq!(last.chunk_size, MAX_OBJECT_SIZE);
    assert_eq!(last.chunks_per_page, 1);

    for (i, class) in stats.classes.iter().enumerate() {
        assert_eq!(class.id.get() as usize, i + 1);
        assert_eq!(class.chunk_size % 8, 0);
        assert!(class.chunk_size * class.chunks_per_page <= MAX_OBJECT_SIZE);
    }
    for pair in stats.classes.windows(2) {
        assert!(pair[0].chunk_size < pair[1].chunk_size);
    }

    // Default arena is 64 MB, enough for one ready page in every class
    let arena = stats.arena.unwrap();
    assert_eq!(arena.capacity, 64 * 1024 * 1024);
    assert!(arena.used <= arena.capacity);
    assert_eq!(stats.total_pages, stats.classes.len());
    for class in &stats.classes {
        assert_eq!(class.pages, 1, "class {} has no initial page", class.id);
        assert_eq!(class.current_page_free, class.chunks_per_page);
        assert_eq!(class.carved_chunks, 0);
    }
    let page_total: usize = stats.classes.iter().map(|c| c.page_bytes()).sum();
    assert_eq!(arena.used, page_total);
}

#[test]
fn test_minimum_arena_table() {
    let pool = SlabPool::new(&PoolConfig::new(15)).expect("Failed to create pool");
    let stats = pool.stats();
    let sizes: Vec<usize> = stats.classes.iter().map(|c| c.chunk_size).collect();

    assert_eq!(&sizes[..6], &[16, 24, 32, 40, 48, 64]);
    assert_eq!(*sizes.last().unwrap(), MAX_OBJECT_SIZE);
    assert_eq!(stats.arena.unwrap().capacity, 15 * 1024 * 1024);

    // Small classes got their page before the arena ran out
    assert!(stats.classes[..6].iter().all(|c| c.pages == 1));
    assert!(stats.arena.unwrap().used <= stats.arena.unwrap().capacity);
}

#[test]
fn test_resolve_is_minimal() {
    let pool = lazy_pool(16);
    let sizes: Vec<usize> = pool.stats().classes.iter().map(|c| c.chunk_size).collect();

    assert_eq!(pool.resolve_class(0), None);
    assert_eq!(pool.resolve_class(MAX_OBJECT_SIZE + 1), None);

    // Sizes are walked in ascending order, so the expected class only moves forward
    let mut expected = 0;
    for size in 1..=MAX_OBJECT_SIZE {
        while sizes[expected] < size {
            expected += 1;
        }
        let id = pool.resolve_class(size).expect("size should be managed");
        assert_eq!(id.get() as usize, expected + 1, "wrong class for {} bytes", size);
    }
}

#[test]
fn test_freed_chunks_reused_lifo() {
    let pool = lazy_pool(16);

    let ptrs: Vec<NonNull<u8>> = (0..4).map(|_| pool.allocate(24).unwrap()).collect();
    unsafe {
        pool.free(ptrs[1], 24);
        pool.free(ptrs[3], 24);
    }

    assert_eq!(pool.allocate(24), Some(ptrs[3]));
    assert_eq!(pool.allocate(24), Some(ptrs[1]));
    assert_ne!(pool.allocate(24), Some(ptrs[1]));
}

#[test]
fn test_data_survives_neighbour_writes() {
    let pool = lazy_pool(16);
    let mut live = Vec::new();

    for (i, size) in [1usize, 7, 8, 9, 100, 1000, 4096, 65536].into_iter().enumerate() {
        let ptr = pool.allocate(size).unwrap();
        assert_eq!(ptr.as_ptr() as usize % 8, 0);
        unsafe { std::ptr::write_bytes(ptr.as_ptr(), i as u8 + 1, size) };
        live.push((ptr, size, i as u8 + 1));
    }

    for (ptr, size, fill) in live {
        let bytes = unsafe { std::slice::from_raw_parts(ptr.as_ptr(), size) };
        assert!(bytes.iter().all(|&b| b == fill));
        unsafe { pool.free(ptr, size) };
    }
    assert_eq!(pool.stats().live_chunks(), 0);
}

#[test]
fn test_arena_exhaustion() {
    let pool = lazy_pool(15);
    let size = MAX_OBJECT_SIZE - HEADER_SIZE;

    // One 1 MiB chunk per page, fifteen pages in a 15 MB arena
    let mut ptrs = Vec::new();
    while let Some(ptr) = pool.allocate(size) {
        ptrs.push(ptr);
    }
    assert_eq!(ptrs.len(), 15);

    let arena = pool.stats().arena.unwrap();
    assert_eq!(arena.used, arena.capacity);

    // A class without a page cannot get one either
    assert!(pool.allocate(32).is_none());

    // Freed chunks are still served after the arena is full
    let last = ptrs.pop().unwrap();
    unsafe { pool.free(last, size) };
    assert_eq!(pool.allocate(size), Some(last));
}

#[test]
fn test_oversize_requests_bypass_arena() {
    let pool = lazy_pool(16);
    let used_before = pool.stats().arena.unwrap().used;

    let ptr = pool.allocate(MAX_OBJECT_SIZE).expect("heap allocation");
    unsafe {
        std::ptr::write_bytes(ptr.as_ptr(), 0x5A, MAX_OBJECT_SIZE);
        pool.free(ptr, MAX_OBJECT_SIZE);
    }

    let stats = pool.stats();
    assert_eq!(stats.arena.unwrap().used, used_before);
    assert_eq!(stats.total_pages, 0);
}

#[test]
fn test_heap_backed_pool() {
    let pool = SlabPool::new(&PoolConfig::new(0).with_preallocate(false))
        .expect("Failed to create pool");

    let ptr = pool.allocate(200).unwrap();
    unsafe { pool.free(ptr, 200) };

    let stats = pool.stats();
    assert!(stats.arena.is_none());
    assert!(stats.heap_page_bytes > 0);
}

#[test]
fn test_random_traffic_matches_shadow_counts() {
    let pool = lazy_pool(64);
    let mut rng = StdRng::seed_from_u64(0x51AB);
    let mut live: Vec<(NonNull<u8>, usize)> = Vec::new();
    let mut shadow: HashMap<ClassId, usize> = HashMap::new();

    for round in 0..5_000 {
        if !live.is_empty() && rng.gen_bool(0.45) {
            let (ptr, size) = live.swap_remove(rng.gen_range(0..live.len()));
            unsafe { pool.free(ptr, size) };
            let id = pool.resolve_class(size + HEADER_SIZE).unwrap();
            *shadow.get_mut(&id).unwrap() -= 1;
        } else {
            let size = rng.gen_range(1..=2048);
            let ptr = pool.allocate(size).unwrap();
            live.push((ptr, size));
            let id = pool.resolve_class(size + HEADER_SIZE).unwrap();
            *shadow.entry(id).or_default() += 1;
        }

        if round % 500 == 0 {
            for (&id, &count) in &shadow {
                let info = pool.class_info(id).unwrap();
                assert_eq!(info.live_chunks(), count, "class {}", id);
                assert!(info.carved_chunks <= info.pages * info.chunks_per_page);
            }
        }
    }

    for (ptr, size) in live {
        unsafe { pool.free(ptr, size) };
    }
    let stats = pool.stats();
    assert_eq!(stats.live_chunks(), 0);
    for class in &stats.classes {
        assert_eq!(class.free_chunks, class.carved_chunks);
    }
}

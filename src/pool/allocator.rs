//! Slab pool implementation
//!
//! All size-class, page and arena state sits behind one mutex; every raw
//! allocation and free runs inside that single critical section.

use super::arena::{heap_alloc, heap_dealloc, Arena, Backing};
use super::header::{chunk_of, data_of, Header, HEAP_CLASS, HEADER_SIZE, MAX_ELEMENT_COUNT};
use super::size_class::{calculate_size_classes, ClassId, SizeClass};
use super::stats::{ArenaStats, ClassStats, PoolStats};
use super::MAX_OBJECT_SIZE;
use crate::config::PoolConfig;
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::fmt;
use std::ptr::NonNull;
use tracing::{debug, error, info, warn};

/// Everything the pool mutex protects
pub(crate) struct PoolState {
    /// Size classes, sorted by chunk size; index = id - 1
    classes: Vec<SizeClass>,
    backing: Backing,
}

// SAFETY: the raw pointers in PoolState refer to memory owned by the state
// itself (arena and pages) and are only touched while the pool mutex is held.
unsafe impl Send for PoolState {}

impl PoolState {
    const fn empty() -> Self {
        Self {
            classes: Vec::new(),
            backing: Backing::unbounded_heap(),
        }
    }

    /// Build the class table and, when requested, the arena
    fn build(config: &PoolConfig) -> Self {
        let backing = match config.arena_bytes() {
            Some(bytes) => match Arena::new(bytes) {
                Ok(arena) => Backing::with_arena(arena),
                Err(err) => {
                    error!(bytes, %err, "Preallocating pool arena failed, pages will come from the heap");
                    Backing::with_heap_budget(config.heap_budget())
                }
            },
            None => Backing::with_heap_budget(config.heap_budget()),
        };

        let classes = calculate_size_classes(config.growth_factor)
            .into_iter()
            .zip((1..=u8::MAX).filter_map(ClassId::new))
            .map(|(shape, id)| SizeClass::new(id, shape))
            .collect();

        Self { classes, backing }
    }

    fn is_initialized(&self) -> bool {
        !self.classes.is_empty()
    }

    /// Smallest class whose chunk holds `size` bytes
    fn resolve(&self, size: usize) -> Option<ClassId> {
        if size == 0 {
            return None;
        }
        let index = self.classes.partition_point(|sc| sc.chunk_size() < size);
        self.classes.get(index).map(SizeClass::id)
    }

    /// Class named by a raw header id, if it exists
    fn class_for(&self, raw: u8) -> Option<ClassId> {
        ClassId::new(raw).filter(|id| id.index() < self.classes.len())
    }

    /// Carve one page for every class, in ascending order
    fn prealloc_pages(&mut self) {
        let ids: Vec<ClassId> = self.classes.iter().map(SizeClass::id).collect();
        let mut failed = 0usize;
        for id in ids {
            if let Err(err) = self.grow_page(id) {
                debug!(class = %id, %err, "No initial page for size class");
                failed += 1;
            }
        }
        if failed > 0 {
            warn!(failed, "Some size classes start without a page");
        }
    }

    /// Add a page to a class and make it the page being filled.
    ///
    /// A class that already owns a page fails when the page would not fit
    /// in the remaining capacity. The first page is always attempted.
    fn grow_page(&mut self, id: ClassId) -> Result<()> {
        let class = &mut self.classes[id.index()];
        let bytes = class.page_bytes();

        if class.page_count() > 0 && !self.backing.can_fit(bytes) {
            return Err(Error::OutOfMemory { requested: bytes });
        }
        if let Err(err) = class.reserve_page_slot() {
            error!(class = %id, %err, "Cannot record new page");
            return Err(err);
        }
        let page = self
            .backing
            .alloc_page(bytes)
            .ok_or(Error::OutOfMemory { requested: bytes })?;
        class.install_page(page);

        debug!(
            class = %id,
            chunk_size = class.chunk_size(),
            pages = class.page_count(),
            "Carved new page"
        );
        Ok(())
    }

    /// Hand out a chunk of at least `size` bytes, header included.
    ///
    /// Returns the chunk start with the owner class stamped in its header.
    fn raw_allocate(&mut self, size: usize) -> Result<NonNull<u8>> {
        let Some(id) = self.resolve(size) else {
            error!(size, "No size class for allocation");
            return Err(Error::UnmanagedSize(size));
        };

        if !self.classes[id.index()].has_ready_chunk() {
            self.grow_page(id)?;
        }

        let chunk = self.classes[id.index()]
            .take_chunk()
            .ok_or(Error::OutOfMemory { requested: size })?;

        // SAFETY: the chunk was just taken out of a page of this class
        unsafe { Header::write(chunk, Header::new(id.get(), 0)) };
        Ok(chunk)
    }

    /// Put a chunk back on its class's free list
    fn raw_free(&mut self, chunk: NonNull<u8>) -> Result<()> {
        // SAFETY: the caller hands back a chunk produced by raw_allocate
        let raw = unsafe { Header::read(chunk) }.class_id();
        let Some(id) = self.class_for(raw) else {
            error!(class_id = raw, "Invalid size class while freeing");
            return Err(Error::InvalidClass(raw));
        };

        if let Err(err) = self.classes[id.index()].recycle(chunk) {
            error!(class = %id, %err, "Dropping free, chunk leaked");
            return Err(err);
        }
        Ok(())
    }

    fn class_stats(sc: &SizeClass) -> ClassStats {
        ClassStats {
            id: sc.id(),
            chunk_size: sc.chunk_size(),
            chunks_per_page: sc.chunks_per_page(),
            pages: sc.page_count(),
            free_chunks: sc.free_count(),
            current_page_free: sc.current_page_free(),
            carved_chunks: sc.carved_chunks(),
        }
    }

    fn stats(&self) -> PoolStats {
        let classes: Vec<ClassStats> = self.classes.iter().map(Self::class_stats).collect();
        let arena = self.backing.arena().map(|arena| ArenaStats {
            capacity: arena.capacity(),
            used: arena.used(),
        });

        PoolStats {
            total_pages: classes.iter().map(|c| c.pages).sum(),
            heap_page_bytes: self.backing.heap_used(),
            arena,
            classes,
        }
    }
}

/// Size-classed slab memory pool.
///
/// Requests up to [`MAX_OBJECT_SIZE`] bytes (header included) are served
/// from per-class pages; larger ones go straight to the heap. Every pointer
/// handed out is preceded by an 8-byte header recording the owning class.
///
/// # Examples
///
/// ```
/// use slabpool::{PoolConfig, SlabPool};
///
/// let pool = SlabPool::new(&PoolConfig::new(16).with_prealloc_pages(false))?;
///
/// let ptr = pool.allocate(100).expect("pool has room");
/// unsafe { pool.free(ptr, 100) };
///
/// // The freed chunk is reused first
/// assert_eq!(pool.allocate(100), Some(ptr));
/// # Ok::<(), slabpool::error::Error>(())
/// ```
pub struct SlabPool {
    state: Mutex<PoolState>,
}

impl SlabPool {
    /// Create and initialize a pool
    pub fn new(config: &PoolConfig) -> Result<Self> {
        let pool = Self::empty();
        pool.configure(config)?;
        Ok(pool)
    }

    /// A pool with no size classes; every allocation fails until configured
    pub(crate) fn empty() -> Self {
        Self {
            state: Mutex::new(PoolState::empty()),
        }
    }

    /// Build the size-class table and arena.
    ///
    /// Returns [`Error::AlreadyInitialized`] and changes nothing when the
    /// pool was configured before, without looking at `config`.
    pub fn configure(&self, config: &PoolConfig) -> Result<()> {
        let mut state = self.state.lock();
        if state.is_initialized() {
            return Err(Error::AlreadyInitialized);
        }
        config.validate()?;

        *state = PoolState::build(config);
        if config.prealloc_pages {
            state.prealloc_pages();
        }

        info!(
            classes = state.classes.len(),
            arena_bytes = state.backing.arena().map_or(0, Arena::capacity),
            growth_factor = config.growth_factor,
            "Initialized slab pool"
        );
        Ok(())
    }

    /// Whether the size-class table has been built
    pub fn is_initialized(&self) -> bool {
        self.state.lock().is_initialized()
    }

    /// Allocate `size` bytes, returning `None` on any failure
    pub fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        self.try_allocate(size).ok()
    }

    /// Allocate `size` bytes.
    ///
    /// The returned pointer is 8-byte aligned and must be released with
    /// [`SlabPool::free`] using the same `size`.
    pub fn try_allocate(&self, size: usize) -> Result<NonNull<u8>> {
        self.allocate_elements(size, size)
    }

    /// Release memory obtained from [`SlabPool::allocate`].
    ///
    /// Failures are logged and the chunk is leaked.
    ///
    /// # Safety
    /// `ptr` must come from `allocate(original_size)` on this pool and must
    /// not be used afterwards.
    pub unsafe fn free(&self, ptr: NonNull<u8>, original_size: usize) {
        self.release(ptr, original_size);
    }

    /// Allocate `bytes` of payload and record `count` in the header
    pub(crate) fn allocate_elements(&self, bytes: usize, count: usize) -> Result<NonNull<u8>> {
        let total = bytes
            .checked_add(HEADER_SIZE)
            .filter(|_| count as u64 <= MAX_ELEMENT_COUNT)
            .ok_or(Error::OutOfMemory { requested: bytes })?;

        let chunk = if total > MAX_OBJECT_SIZE {
            let block = heap_alloc(total).ok_or(Error::OutOfMemory { requested: total })?;
            // SAFETY: block is a fresh heap allocation of `total` bytes
            unsafe { Header::write(block, Header::new(HEAP_CLASS, 0)) };
            block
        } else {
            self.state.lock().raw_allocate(total)?
        };

        // SAFETY: chunk is exclusively ours and at least HEADER_SIZE long
        unsafe {
            Header::set_element_count(chunk, count as u64);
            Ok(data_of(chunk))
        }
    }

    /// Route a payload pointer back to the heap or its size class.
    ///
    /// # Safety
    /// `ptr` must come from `allocate_elements(bytes, _)` on this pool.
    pub(crate) unsafe fn release(&self, ptr: NonNull<u8>, bytes: usize) {
        let chunk = chunk_of(ptr);
        let total = bytes.saturating_add(HEADER_SIZE);

        if total > MAX_OBJECT_SIZE {
            heap_dealloc(chunk, total);
            return;
        }
        // Failures were already reported where they happened
        let _ = self.state.lock().raw_free(chunk);
    }

    /// Smallest class holding `size` bytes, header included
    pub fn resolve_class(&self, size: usize) -> Option<ClassId> {
        self.state.lock().resolve(size)
    }

    /// Number of configured size classes
    pub fn class_count(&self) -> usize {
        self.state.lock().classes.len()
    }

    /// Statistics for one size class
    pub fn class_info(&self, id: ClassId) -> Option<ClassStats> {
        let state = self.state.lock();
        state.classes.get(id.index()).map(PoolState::class_stats)
    }

    /// Snapshot of arena and per-class state
    pub fn stats(&self) -> PoolStats {
        self.state.lock().stats()
    }
}

impl fmt::Debug for SlabPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SlabPool")
            .field("classes", &state.classes.len())
            .field("arena", &state.backing.arena().map(Arena::capacity))
            .finish()
    }
}

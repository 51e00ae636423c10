//! Arena bump allocator and page backing
//!
//! Pages come from one preallocated region when the pool was configured
//! with preallocation, otherwise from the general heap.

use super::{round_up, ALIGNMENT};
use crate::error::{Error, Result};
use std::alloc::{self, Layout};
use std::ptr::{self, NonNull};

/// One contiguous preallocated region with a bump cursor.
///
/// The cursor only moves forward and never passes the end of the region.
/// Memory is released when the arena is dropped.
pub struct Arena {
    /// Start of the region
    base: NonNull<u8>,
    /// Bytes handed out so far (cursor offset)
    used: usize,
    /// Total size of the region
    capacity: usize,
}

impl Arena {
    /// Allocate a region of `capacity` bytes
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidConfig("arena capacity must be non-zero".into()));
        }
        let layout = Layout::from_size_align(capacity, ALIGNMENT)
            .map_err(|_| Error::OutOfMemory { requested: capacity })?;

        // SAFETY: layout has a non-zero size (checked above)
        let base = unsafe { alloc::alloc(layout) };
        let base = NonNull::new(base).ok_or(Error::OutOfMemory { requested: capacity })?;

        Ok(Self {
            base,
            used: 0,
            capacity,
        })
    }

    /// Bump-allocate `size` bytes.
    ///
    /// Fails when the unrounded request does not fit in what is left. The
    /// cursor advances by `size` rounded up to the alignment, clamped at
    /// the end of the region.
    pub fn alloc(&mut self, size: usize) -> Option<NonNull<u8>> {
        if size > self.remaining() {
            return None;
        }

        // SAFETY: used <= capacity, so the cursor is inside the region or one past it
        let ptr = unsafe { NonNull::new_unchecked(self.base.as_ptr().add(self.used)) };
        self.used = self.used.saturating_add(round_up(size)).min(self.capacity);
        Some(ptr)
    }

    /// Bytes left before the cursor reaches the end
    pub fn remaining(&self) -> usize {
        self.capacity - self.used
    }

    /// Bytes handed out so far
    pub fn used(&self) -> usize {
        self.used
    }

    /// Total size of the region
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        // SAFETY: base was allocated in `new` with exactly this layout
        unsafe {
            alloc::dealloc(
                self.base.as_ptr(),
                Layout::from_size_align_unchecked(self.capacity, ALIGNMENT),
            );
        }
    }
}

/// Allocate a block from the general heap
pub(crate) fn heap_alloc(size: usize) -> Option<NonNull<u8>> {
    let layout = Layout::from_size_align(size, ALIGNMENT).ok()?;
    if layout.size() == 0 {
        return None;
    }
    // SAFETY: layout has a non-zero size
    NonNull::new(unsafe { alloc::alloc(layout) })
}

/// Release a block obtained from [`heap_alloc`].
///
/// # Safety
/// `ptr` must come from `heap_alloc(size)` with the same `size`.
pub(crate) unsafe fn heap_dealloc(ptr: NonNull<u8>, size: usize) {
    alloc::dealloc(
        ptr.as_ptr(),
        Layout::from_size_align_unchecked(size, ALIGNMENT),
    );
}

/// Where a page's memory came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOrigin {
    Arena,
    Heap,
}

/// A page owned by one size class.
///
/// Heap pages are released when the record is dropped; arena pages are
/// released together with the arena.
#[derive(Debug)]
pub struct Page {
    base: NonNull<u8>,
    len: usize,
    origin: PageOrigin,
}

impl Page {
    /// First byte of the page
    pub fn base(&self) -> NonNull<u8> {
        self.base
    }

    /// Page length in bytes
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn origin(&self) -> PageOrigin {
        self.origin
    }
}

impl Drop for Page {
    fn drop(&mut self) {
        if self.origin == PageOrigin::Heap {
            // SAFETY: heap pages are created by `heap_alloc(len)` in `Backing::alloc_page`
            unsafe { heap_dealloc(self.base, self.len) }
        }
    }
}

/// Memory source for new pages: the arena when present, else the heap.
///
/// Without an arena an optional byte budget plays the arena's role in
/// capacity checks.
pub struct Backing {
    arena: Option<Arena>,
    heap_budget: Option<usize>,
    heap_used: usize,
}

impl Backing {
    /// Backing with no arena and no budget
    pub const fn unbounded_heap() -> Self {
        Self {
            arena: None,
            heap_budget: None,
            heap_used: 0,
        }
    }

    /// Backing that serves pages from `arena`
    pub fn with_arena(arena: Arena) -> Self {
        Self {
            arena: Some(arena),
            heap_budget: None,
            heap_used: 0,
        }
    }

    /// Heap backing capped at `budget` bytes of pages
    pub fn with_heap_budget(budget: Option<usize>) -> Self {
        Self {
            arena: None,
            heap_budget: budget,
            heap_used: 0,
        }
    }

    pub fn arena(&self) -> Option<&Arena> {
        self.arena.as_ref()
    }

    /// Bytes of heap pages handed out
    pub fn heap_used(&self) -> usize {
        self.heap_used
    }

    /// Whether a page of `size` bytes stays within capacity
    pub fn can_fit(&self, size: usize) -> bool {
        match (&self.arena, self.heap_budget) {
            (Some(arena), _) => size <= arena.remaining(),
            (None, Some(budget)) => self.heap_used.saturating_add(size) <= budget,
            (None, None) => true,
        }
    }

    /// Obtain a zero-filled page of `size` bytes
    pub fn alloc_page(&mut self, size: usize) -> Option<Page> {
        let (base, origin) = match &mut self.arena {
            Some(arena) => (arena.alloc(size)?, PageOrigin::Arena),
            None => {
                let base = heap_alloc(size)?;
                self.heap_used += size;
                (base, PageOrigin::Heap)
            }
        };

        // SAFETY: base is valid for `size` bytes from either source
        unsafe { ptr::write_bytes(base.as_ptr(), 0, size) };

        Some(Page {
            base,
            len: size,
            origin,
        })
    }
}

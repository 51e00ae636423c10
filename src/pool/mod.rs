//! Slab Pool
//!
//! Serves small allocations from fixed-size chunks grouped into size
//! classes. Chunks are carved from pages, pages come from one preallocated
//! arena (or the heap), and freed chunks are recycled per class.
//!
//! # Architecture
//!
//! ```text
//! SlabPool (one mutex)
//!   ├─→ SizeClass #1 (16B)    → pages: [p0]      free: [c7, c3]
//!   ├─→ SizeClass #2 (24B)    → pages: [p0, p1]  free: []
//!   ├─→ ...                     (chunk sizes grow by ~1.2x)
//!   └─→ SizeClass #N (1 MiB)  → pages: [p0]      free: []
//!
//! Backing
//!   ├─→ Arena (bump cursor over one preallocated region)
//!   └─→ Heap  (when preallocation is off, and for oversize requests)
//! ```
//!
//! Every chunk starts with an 8-byte header holding the owning class id and
//! an element count, so `free` finds the class from the pointer alone.

pub mod allocator;
pub mod arena;
pub mod global;
pub mod header;
pub mod size_class;
pub mod stats;
pub mod typed;

pub use allocator::SlabPool;
pub use arena::{Arena, PageOrigin};
pub use global::{global, initialize};
pub use header::{Header, HEADER_SIZE};
pub use size_class::{calculate_size_classes, ClassId, ClassShape};
pub use stats::{ArenaStats, ClassStats, PoolStats};
pub use typed::PooledSlice;

/// Smallest managed request in bytes
pub const MIN_OBJECT_SIZE: usize = 1;

/// Largest managed chunk (header included); bigger requests use the heap
pub const MAX_OBJECT_SIZE: usize = 1024 * 1024;

/// Alignment of chunk sizes, pages and returned pointers
pub const ALIGNMENT: usize = 8;

/// Upper bound on the number of size classes
pub const MAX_CLASSES: usize = 200;

/// Arena floor when preallocation is enabled (MB)
pub const MIN_ARENA_MB: u32 = 15;

/// First capacity of page and free lists; they double from here
pub(crate) const LIST_INITIAL_CAPACITY: usize = 16;

/// Round `size` up to the next multiple of [`ALIGNMENT`]
pub(crate) const fn round_up(size: usize) -> usize {
    (size + ALIGNMENT - 1) & !(ALIGNMENT - 1)
}

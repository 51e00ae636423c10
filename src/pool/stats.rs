//! Statistics for the slab pool

use super::size_class::ClassId;
use serde::Serialize;

/// Statistics for the whole pool
#[derive(Debug, Clone, Default, Serialize)]
pub struct PoolStats {
    /// Arena usage, absent when pages come from the heap
    pub arena: Option<ArenaStats>,
    /// Bytes of pages taken from the heap
    pub heap_page_bytes: usize,
    pub total_pages: usize,
    pub classes: Vec<ClassStats>,
}

impl PoolStats {
    /// Chunks currently loaned out across all classes
    pub fn live_chunks(&self) -> usize {
        self.classes.iter().map(ClassStats::live_chunks).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ArenaStats {
    pub capacity: usize,
    pub used: usize,
}

impl ArenaStats {
    pub fn remaining(&self) -> usize {
        self.capacity - self.used
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClassStats {
    pub id: ClassId,
    pub chunk_size: usize,
    pub chunks_per_page: usize,
    pub pages: usize,
    /// Chunks waiting on the free list
    pub free_chunks: usize,
    /// Chunks not yet carved from the current page
    pub current_page_free: usize,
    /// Chunks carved from pages so far
    pub carved_chunks: usize,
}

impl ClassStats {
    /// Chunks carved and not sitting on the free list
    pub fn live_chunks(&self) -> usize {
        self.carved_chunks - self.free_chunks
    }

    /// Bytes in one page of this class
    pub fn page_size(&self) -> usize {
        self.chunks_per_page * self.chunk_size
    }

    /// Bytes of pages owned by this class
    pub fn page_bytes(&self) -> usize {
        self.pages * self.page_size()
    }
}

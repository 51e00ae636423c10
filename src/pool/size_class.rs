//! Size class management for the slab pool

use super::arena::Page;
use super::{round_up, ALIGNMENT, LIST_INITIAL_CAPACITY, MAX_CLASSES, MAX_OBJECT_SIZE, MIN_OBJECT_SIZE};
use super::header::HEADER_SIZE;
use crate::error::{Error, Result};
use serde::Serialize;
use std::fmt;
use std::num::NonZeroU8;
use std::ptr::NonNull;

/// Dense size class identifier, starting at 1.
///
/// Id 0 is never assigned; headers use it to mark heap blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ClassId(NonZeroU8);

impl ClassId {
    /// Wrap a raw id; `None` for 0
    pub fn new(raw: u8) -> Option<Self> {
        NonZeroU8::new(raw).map(Self)
    }

    /// Raw id as stored in chunk headers
    pub fn get(self) -> u8 {
        self.0.get()
    }

    /// Position in the class table
    pub(crate) fn index(self) -> usize {
        usize::from(self.0.get()) - 1
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Chunk geometry of one size class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassShape {
    /// Bytes per chunk, header included
    pub chunk_size: usize,
    /// Chunks carved from one page
    pub chunks_per_page: usize,
}

/// Calculate size classes with a geometric growth factor.
///
/// Starts at the smallest request plus header, rounded to the alignment,
/// and multiplies by `growth_factor` (re-rounding) until the next size
/// would reach `MAX_OBJECT_SIZE` or the table is full. The last class is
/// always `MAX_OBJECT_SIZE` with one chunk per page.
pub fn calculate_size_classes(growth_factor: f64) -> Vec<ClassShape> {
    let mut classes = Vec::new();
    let mut size = round_up(MIN_OBJECT_SIZE + HEADER_SIZE);

    while classes.len() + 1 < MAX_CLASSES && size < MAX_OBJECT_SIZE {
        classes.push(ClassShape {
            chunk_size: size,
            chunks_per_page: MAX_OBJECT_SIZE / size,
        });
        // Clamp before rounding so huge factors cannot overflow; keep sizes
        // strictly increasing even when the factor is tiny
        let grown = (size as f64 * growth_factor).min(MAX_OBJECT_SIZE as f64) as usize;
        size = round_up(grown).max(size + ALIGNMENT);
    }

    classes.push(ClassShape {
        chunk_size: MAX_OBJECT_SIZE,
        chunks_per_page: 1,
    });
    classes
}

/// A size class owns its pages and the free list of recycled chunks.
///
/// Allocation prefers the most recently freed chunk (LIFO) and only carves
/// from the current page when the free list is empty.
#[derive(Debug)]
pub struct SizeClass {
    id: ClassId,
    chunk_size: usize,
    chunks_per_page: usize,
    /// Recycled chunks, most recent last
    free_list: Vec<NonNull<u8>>,
    /// Next chunk to carve from the page being filled
    current_page: Option<NonNull<u8>>,
    /// Chunks left on the current page
    current_page_free: usize,
    /// Every page carved for this class
    pages: Vec<Page>,
}

impl SizeClass {
    /// Create an empty size class
    pub fn new(id: ClassId, shape: ClassShape) -> Self {
        Self {
            id,
            chunk_size: shape.chunk_size,
            chunks_per_page: shape.chunks_per_page,
            free_list: Vec::new(),
            current_page: None,
            current_page_free: 0,
            pages: Vec::new(),
        }
    }

    pub fn id(&self) -> ClassId {
        self.id
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunks_per_page(&self) -> usize {
        self.chunks_per_page
    }

    /// Bytes needed for one page of this class
    pub fn page_bytes(&self) -> usize {
        self.chunk_size * self.chunks_per_page
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn free_count(&self) -> usize {
        self.free_list.len()
    }

    /// Chunks still uncarved on the current page
    pub fn current_page_free(&self) -> usize {
        self.current_page_free
    }

    /// Chunks ever carved out of pages, live or recycled
    pub fn carved_chunks(&self) -> usize {
        self.pages.len() * self.chunks_per_page - self.current_page_free
    }

    /// Whether a chunk can be handed out without growing a page
    pub fn has_ready_chunk(&self) -> bool {
        self.current_page.is_some() || !self.free_list.is_empty()
    }

    /// Take a recycled chunk, or carve the next one from the current page
    pub fn take_chunk(&mut self) -> Option<NonNull<u8>> {
        if let Some(chunk) = self.free_list.pop() {
            return Some(chunk);
        }

        let chunk = self.current_page?;
        self.current_page_free -= 1;
        self.current_page = if self.current_page_free == 0 {
            None
        } else {
            // SAFETY: at least one more chunk remains on this page
            Some(unsafe { NonNull::new_unchecked(chunk.as_ptr().add(self.chunk_size)) })
        };
        Some(chunk)
    }

    /// Push a chunk back onto the free list
    pub fn recycle(&mut self, chunk: NonNull<u8>) -> Result<()> {
        grow_list(&mut self.free_list, "free list")?;
        self.free_list.push(chunk);
        Ok(())
    }

    /// Make room for one more page record
    pub fn reserve_page_slot(&mut self) -> Result<()> {
        grow_list(&mut self.pages, "page list")
    }

    /// Adopt a fresh page as the one being filled
    pub fn install_page(&mut self, page: Page) {
        self.current_page = Some(page.base());
        self.current_page_free = self.chunks_per_page;
        self.pages.push(page);
    }
}

/// Double a list's capacity, starting from 16, once it is full
fn grow_list<T>(list: &mut Vec<T>, what: &'static str) -> Result<()> {
    if list.len() == list.capacity() {
        let target = if list.capacity() == 0 {
            LIST_INITIAL_CAPACITY
        } else {
            list.capacity().saturating_mul(2)
        };
        list.try_reserve_exact(target - list.len())
            .map_err(|_| Error::GrowthFailure(what))?;
    }
    Ok(())
}

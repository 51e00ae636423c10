//! Chunk header stored in front of every pointer handed to a caller

use std::fmt;
use std::ptr::NonNull;

/// Size of the header prefix in bytes
pub const HEADER_SIZE: usize = std::mem::size_of::<Header>();

/// Class id stamped on blocks that came straight from the heap
pub const HEAP_CLASS: u8 = 0;

/// Largest element count a header can record (56 bits)
pub const MAX_ELEMENT_COUNT: u64 = (1 << 56) - 1;

const CLASS_BITS: u32 = 8;
const CLASS_MASK: u64 = 0xff;

/// Header word: owning class id in the low 8 bits, element count above it.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Header(u64);

impl Header {
    /// Create a header for the given owner class and element count
    pub fn new(class_id: u8, element_count: u64) -> Self {
        debug_assert!(element_count <= MAX_ELEMENT_COUNT);
        Self(u64::from(class_id) | (element_count << CLASS_BITS))
    }

    /// Owning class id (0 for heap blocks)
    pub fn class_id(self) -> u8 {
        (self.0 & CLASS_MASK) as u8
    }

    /// Number of elements recorded by the typed wrapper
    pub fn element_count(self) -> u64 {
        self.0 >> CLASS_BITS
    }

    /// Read the header at the start of `chunk`.
    ///
    /// # Safety
    /// `chunk` must be the start of a chunk obtained from this pool.
    pub(crate) unsafe fn read(chunk: NonNull<u8>) -> Self {
        chunk.cast::<Header>().as_ptr().read()
    }

    /// # Safety
    /// `chunk` must be the start of a chunk owned by the caller.
    pub(crate) unsafe fn write(chunk: NonNull<u8>, header: Header) {
        chunk.cast::<Header>().as_ptr().write(header);
    }

    /// Overwrite the element count, keeping the class id.
    ///
    /// # Safety
    /// Same as [`Header::write`].
    pub(crate) unsafe fn set_element_count(chunk: NonNull<u8>, element_count: u64) {
        let class_id = Self::read(chunk).class_id();
        Self::write(chunk, Header::new(class_id, element_count));
    }
}

impl fmt::Debug for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Header")
            .field("class_id", &self.class_id())
            .field("element_count", &self.element_count())
            .finish()
    }
}

/// Pointer handed to the caller for a chunk.
///
/// # Safety
/// `chunk` must point at least `HEADER_SIZE` bytes into a live block.
pub(crate) unsafe fn data_of(chunk: NonNull<u8>) -> NonNull<u8> {
    NonNull::new_unchecked(chunk.as_ptr().add(HEADER_SIZE))
}

/// Chunk start for a pointer previously returned by [`data_of`].
///
/// # Safety
/// `data` must have been produced by [`data_of`].
pub(crate) unsafe fn chunk_of(data: NonNull<u8>) -> NonNull<u8> {
    NonNull::new_unchecked(data.as_ptr().sub(HEADER_SIZE))
}

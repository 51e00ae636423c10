//! Typed construct/destroy on top of the raw pool
//!
//! The header records how many elements were constructed; `destroy` reads
//! it back to drop them and to pick the same heap-or-pool route that
//! `construct` took. The header carries no type information, so the type
//! given to `destroy` must be the one given to `construct`.
//! [`PooledSlice`] ties the two together and is the safe way to use this.

use super::allocator::SlabPool;
use super::header::{chunk_of, Header};
use super::ALIGNMENT;
use bytemuck::Zeroable;
use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::ops::{Deref, DerefMut};
use std::ptr::{self, NonNull};

impl SlabPool {
    /// Allocate `count` elements and construct each with `T::default()`,
    /// in ascending index order.
    ///
    /// Returns `None` for `count == 0`, for types aligned above 8 bytes, and
    /// when memory is exhausted. Release with [`SlabPool::destroy`].
    pub fn construct<T: Default>(&self, count: usize) -> Option<NonNull<T>> {
        let data = self.reserve_elements::<T>(count)?;
        for i in 0..count {
            // SAFETY: data is valid for `count` elements of T
            unsafe { data.as_ptr().add(i).write(T::default()) };
        }
        Some(data)
    }

    /// Allocate `count` all-zero elements without running any constructor
    pub fn construct_zeroed<T: Zeroable>(&self, count: usize) -> Option<NonNull<T>> {
        let data = self.reserve_elements::<T>(count)?;
        // SAFETY: data is valid for `count` elements and all-zero is a valid T
        unsafe { ptr::write_bytes(data.as_ptr(), 0, count) };
        Some(data)
    }

    /// Drop the elements behind `ptr` in ascending order and release them.
    ///
    /// No-op for a null pointer or a header recording zero elements.
    ///
    /// # Safety
    /// `ptr` must come from `construct::<T>` or `construct_zeroed::<T>` on
    /// this pool with the same `T`, and must not be used afterwards.
    pub unsafe fn destroy<T>(&self, ptr: *mut T) {
        let Some(data) = NonNull::new(ptr) else {
            return;
        };
        let count = Header::read(chunk_of(data.cast())).element_count() as usize;
        if count == 0 {
            return;
        }

        if mem::needs_drop::<T>() {
            for i in 0..count {
                ptr::drop_in_place(data.as_ptr().add(i));
            }
        }
        self.release(data.cast(), count * mem::size_of::<T>());
    }

    /// Allocate `count` default elements behind an owning handle
    pub fn boxed_slice<T: Default>(&self, count: usize) -> Option<PooledSlice<'_, T>> {
        let ptr = self.construct::<T>(count)?;
        Some(PooledSlice {
            pool: self,
            ptr,
            len: count,
            _owns: PhantomData,
        })
    }

    fn reserve_elements<T>(&self, count: usize) -> Option<NonNull<T>> {
        if count == 0 || mem::align_of::<T>() > ALIGNMENT {
            return None;
        }
        let bytes = count.checked_mul(mem::size_of::<T>())?;
        self.allocate_elements(bytes, count).ok().map(NonNull::cast)
    }
}

/// Owning handle to elements constructed in a [`SlabPool`].
///
/// Dereferences to `[T]`; dropping it destroys the elements and returns
/// the memory to the pool.
pub struct PooledSlice<'p, T> {
    pool: &'p SlabPool,
    ptr: NonNull<T>,
    len: usize,
    _owns: PhantomData<T>,
}

// SAFETY: the handle owns its elements exclusively; the pool is Sync
unsafe impl<T: Send> Send for PooledSlice<'_, T> {}
unsafe impl<T: Sync> Sync for PooledSlice<'_, T> {}

impl<T> Deref for PooledSlice<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        // SAFETY: ptr holds `len` initialized elements owned by this handle
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl<T> DerefMut for PooledSlice<'_, T> {
    fn deref_mut(&mut self) -> &mut [T] {
        // SAFETY: as in deref, and &mut self guarantees exclusive access
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl<T> Drop for PooledSlice<'_, T> {
    fn drop(&mut self) {
        // SAFETY: ptr came from construct::<T> on this pool
        unsafe { self.pool.destroy(self.ptr.as_ptr()) }
    }
}

impl<T: fmt::Debug> fmt::Debug for PooledSlice<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

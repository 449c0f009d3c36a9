//! # Raw Block Memory
//!
//! Acquisition and release of untyped blocks for one size class.
//!
//! ## Safety Note
//!
//! This module calls the global allocator directly. The layout used to
//! release a block is always the layout of the size class that acquired it.

#![allow(unsafe_code)]

use std::alloc::{self, Layout};
use std::fmt;
use std::ptr::NonNull;

use crate::config::BLOCK_ALIGN;
use crate::error::{PoolError, PoolResult};

/// Block layout shared by every element type of one byte size.
///
/// The alignment is raised to at least [`BLOCK_ALIGN`], so `u64` and
/// `[u8; 8]` share the 8-byte class while a `#[repr(align(64))]` type gets
/// its own.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SizeClass {
    layout: Layout,
}

impl SizeClass {
    /// Size class holding exactly one `T`.
    #[inline]
    #[must_use]
    pub const fn of<T>() -> Self {
        Self::new(std::mem::size_of::<T>(), std::mem::align_of::<T>())
    }

    /// Size class for blocks of `size` bytes aligned to at least `align`.
    ///
    /// # Panics
    ///
    /// Panics if `align` is not a power of two, or if `size` rounded up to
    /// the alignment overflows `isize`.
    #[must_use]
    pub const fn new(size: usize, align: usize) -> Self {
        let align = if align < BLOCK_ALIGN { BLOCK_ALIGN } else { align };
        match Layout::from_size_align(size, align) {
            Ok(layout) => Self { layout },
            Err(_) => panic!("invalid size class layout"),
        }
    }

    /// Returns the block size in bytes.
    #[inline]
    #[must_use]
    pub const fn size(&self) -> usize {
        self.layout.size()
    }

    /// Returns the block alignment in bytes.
    #[inline]
    #[must_use]
    pub const fn align(&self) -> usize {
        self.layout.align()
    }

    /// Returns the layout handed to the global allocator.
    #[inline]
    #[must_use]
    pub const fn layout(&self) -> Layout {
        self.layout
    }

    /// Returns whether blocks of this class occupy no memory.
    #[inline]
    #[must_use]
    pub const fn is_zero_sized(&self) -> bool {
        self.layout.size() == 0
    }

    /// Acquires a fresh, uninitialized block from the global allocator.
    ///
    /// Zero-sized classes get a non-null, aligned address without touching
    /// the allocator.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::OutOfMemory`] if the allocator fails.
    pub fn acquire(self) -> PoolResult<NonNull<u8>> {
        if self.is_zero_sized() {
            return Ok(self.dangling());
        }

        // SAFETY: the layout has a non-zero size (checked above).
        let block = unsafe { alloc::alloc(self.layout) };
        NonNull::new(block).ok_or(PoolError::OutOfMemory {
            layout: self.layout,
        })
    }

    /// Returns `block` to the global allocator for good.
    ///
    /// Zero-sized classes make this a no-op.
    ///
    /// # Safety
    ///
    /// `block` must have been returned by [`SizeClass::acquire`] on an equal
    /// size class, must not have been released already, and must hold no
    /// live object.
    pub unsafe fn release(self, block: NonNull<u8>) {
        if self.is_zero_sized() {
            return;
        }

        // SAFETY: the caller guarantees `block` came from `acquire` with this
        // exact layout and is released once.
        unsafe { alloc::dealloc(block.as_ptr(), self.layout) };
    }

    /// Non-null address aligned for this class, for zero-sized blocks.
    #[inline]
    fn dangling(self) -> NonNull<u8> {
        NonNull::new(self.align() as *mut u8).unwrap_or(NonNull::dangling())
    }
}

impl fmt::Debug for SizeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SizeClass")
            .field("size", &self.size())
            .field("align", &self.align())
            .finish()
    }
}

//! # Pool Allocator
//!
//! Fixed-size block allocator backed by the process-wide free-list registry.

#![allow(unsafe_code)]

use std::alloc;
use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;

use crate::config::MAX_CAPACITY;
use crate::error::PoolResult;
use crate::memory::{SizeClass, StorageAllocator};
use crate::registry::{FreeList, FreeListStats, Registry, Signature};

/// A pooling allocator for one element type and pool capacity.
///
/// Freed blocks are kept in a bounded free list shared by every
/// `PoolAllocator` with the same [`Signature`] anywhere in the process,
/// whatever element type it was declared with. When the list is empty a
/// fresh block comes from the global allocator; when it is full a freed
/// block goes back to the global allocator.
///
/// The allocator is a zero-sized handle: creating, copying and dropping it
/// is free. It never runs constructors or destructors.
///
/// # Thread Safety
///
/// `allocate` and `deallocate` are lock-free and may be called from any
/// thread. A block may be freed on a different thread than allocated it.
///
/// # Example
///
/// ```rust
/// use lockfree_pool::PoolAllocator;
///
/// struct Particle { x: f32, y: f32, life: f32 }
///
/// let pool: PoolAllocator<Particle, 1024> = PoolAllocator::new();
///
/// let storage = pool.allocate();
/// // SAFETY: fresh storage; the particle is written before use and needs no drop.
/// unsafe {
///     storage.as_ptr().write(Particle { x: 0.0, y: 0.0, life: 1.0 });
///     assert_eq!((*storage.as_ptr()).life, 1.0);
///     pool.deallocate(storage);
/// }
/// ```
pub struct PoolAllocator<T, const CAPACITY: usize> {
    _marker: PhantomData<fn() -> T>,
}

impl<T, const CAPACITY: usize> PoolAllocator<T, CAPACITY> {
    /// Evaluated on instantiation: rejects capacities the stack cannot index.
    const VALID_CAPACITY: () = assert!(
        CAPACITY <= MAX_CAPACITY,
        "pool capacity exceeds MAX_CAPACITY"
    );

    /// Size class of every block this allocator hands out.
    pub const SIZE_CLASS: SizeClass = SizeClass::of::<T>();

    /// Registry key of this allocator's free list.
    pub const SIGNATURE: Signature = Signature::new(Self::SIZE_CLASS, CAPACITY);

    /// Creates the allocator. It carries no state.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        let () = Self::VALID_CAPACITY;
        Self {
            _marker: PhantomData,
        }
    }

    /// Returns the configured pool capacity.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        CAPACITY
    }

    /// Returns the size class blocks are drawn from.
    #[inline]
    #[must_use]
    pub const fn size_class(&self) -> SizeClass {
        Self::SIZE_CLASS
    }

    /// Returns the registry key of this allocator's free list.
    #[inline]
    #[must_use]
    pub const fn signature(&self) -> Signature {
        Self::SIGNATURE
    }

    /// Returns the shared free list, creating it on first use.
    ///
    /// `None` when the allocator bypasses pooling: a capacity of zero, or a
    /// zero-sized element type.
    #[inline]
    #[must_use]
    pub fn free_list(&self) -> Option<&'static FreeList> {
        if CAPACITY == 0 || Self::SIZE_CLASS.is_zero_sized() {
            None
        } else {
            Some(Registry::global().get_or_create(Self::SIGNATURE))
        }
    }

    /// Returns the counters of the shared free list, if it exists yet.
    #[must_use]
    pub fn stats(&self) -> Option<FreeListStats> {
        Registry::global().get(Self::SIGNATURE).map(FreeList::stats)
    }

    /// Returns storage for one `T`, recycled if possible.
    ///
    /// The memory is uninitialized. Recycled blocks may still contain bytes
    /// written by their previous owner.
    ///
    /// Zero-sized types get a dangling, well-aligned pointer.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::OutOfMemory`](crate::PoolError::OutOfMemory) if
    /// the pool was empty and the global allocator failed.
    pub fn try_allocate(&self) -> PoolResult<NonNull<T>> {
        if Self::SIZE_CLASS.is_zero_sized() {
            return Ok(NonNull::dangling());
        }

        if let Some(free_list) = self.free_list() {
            if let Some(block) = free_list.take() {
                return Ok(block.cast());
            }
            tracing::trace!(
                "Pool empty, acquiring fresh {}-byte block",
                Self::SIZE_CLASS.size()
            );
        }

        Self::SIZE_CLASS.acquire().map(NonNull::cast)
    }

    /// Returns storage for one `T`, recycled if possible.
    ///
    /// Aborts through [`std::alloc::handle_alloc_error`] if the pool was
    /// empty and the global allocator failed.
    #[inline]
    #[must_use]
    pub fn allocate(&self) -> NonNull<T> {
        match self.try_allocate() {
            Ok(storage) => storage,
            Err(err) => alloc::handle_alloc_error(err.layout()),
        }
    }

    /// Returns storage to the pool, or to the global allocator if the pool is
    /// full.
    ///
    /// # Safety
    ///
    /// - `storage` was returned by an allocator of the same size class
    ///   (any capacity, pooled or [`SystemAllocator`](crate::SystemAllocator)).
    /// - It is not used after this call and is not deallocated twice.
    /// - Any value it held has already been destroyed.
    pub unsafe fn deallocate(&self, storage: NonNull<T>) {
        if Self::SIZE_CLASS.is_zero_sized() {
            return;
        }

        let mut block = storage.cast::<u8>();
        if let Some(free_list) = self.free_list() {
            // SAFETY: the caller guarantees a vacant block of this size class
            // that nothing else references.
            match unsafe { free_list.give(block) } {
                Ok(()) => return,
                Err(rejected) => block = rejected,
            }
            tracing::trace!(
                "Pool full, releasing {}-byte block",
                Self::SIZE_CLASS.size()
            );
        }

        // SAFETY: same guarantee; the pool turned the block away, so this is
        // its only owner.
        unsafe { Self::SIZE_CLASS.release(block) };
    }

    /// Returns the allocator for element type `U` with the same capacity.
    ///
    /// A different element size means a different free list.
    #[inline]
    #[must_use]
    pub const fn rebind<U>(&self) -> PoolAllocator<U, CAPACITY> {
        PoolAllocator::new()
    }
}

impl<T, const CAPACITY: usize> StorageAllocator for PoolAllocator<T, CAPACITY> {
    type Value = T;
    type Rebind<U> = PoolAllocator<U, CAPACITY>;

    #[inline]
    fn rebind<U>(&self) -> PoolAllocator<U, CAPACITY> {
        PoolAllocator::new()
    }

    #[inline]
    fn try_acquire_storage(&self) -> PoolResult<NonNull<T>> {
        self.try_allocate()
    }

    #[inline]
    unsafe fn release_storage(&self, storage: NonNull<T>) {
        // SAFETY: forwarded caller contract.
        unsafe { self.deallocate(storage) };
    }
}

impl<T, U, const CAPACITY: usize> From<&PoolAllocator<U, CAPACITY>> for PoolAllocator<T, CAPACITY> {
    fn from(other: &PoolAllocator<U, CAPACITY>) -> Self {
        other.rebind()
    }
}

impl<T, const CAPACITY: usize> Clone for PoolAllocator<T, CAPACITY> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, const CAPACITY: usize> Copy for PoolAllocator<T, CAPACITY> {}

impl<T, const CAPACITY: usize> Default for PoolAllocator<T, CAPACITY> {
    fn default() -> Self {
        Self::new()
    }
}

/// All allocators of one type are interchangeable: storage from one may be
/// released through any other.
impl<T, const CAPACITY: usize> PartialEq for PoolAllocator<T, CAPACITY> {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl<T, const CAPACITY: usize> Eq for PoolAllocator<T, CAPACITY> {}

impl<T, const CAPACITY: usize> fmt::Debug for PoolAllocator<T, CAPACITY> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolAllocator")
            .field("value", &std::any::type_name::<T>())
            .field("capacity", &CAPACITY)
            .field("size_class", &Self::SIZE_CLASS)
            .finish()
    }
}

//! # Storage Allocators
//!
//! Storage and object lifetime are separate steps:
//!
//! ```text
//! acquire_storage ──▶ construct ──▶ (object alive) ──▶ destroy ──▶ release_storage
//!   memory only        caller's        caller's         caller's     memory only
//! ```
//!
//! Allocators only ever acquire and release. `construct` and `destroy` are
//! provided helpers for the caller's half of the contract.

#![allow(unsafe_code)]

use std::alloc;
use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;

use crate::error::PoolResult;
use crate::memory::SizeClass;

/// Hands out uninitialized storage for one `Value` at a time.
///
/// Implementors never run constructors or destructors of the values placed
/// in their storage.
pub trait StorageAllocator {
    /// Element type the storage is sized and aligned for.
    type Value;

    /// The same allocator configured for another element type.
    type Rebind<U>: StorageAllocator<Value = U>;

    /// Returns the allocator for element type `U`.
    fn rebind<U>(&self) -> Self::Rebind<U>;

    /// Acquires storage for one value.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::OutOfMemory`](crate::PoolError::OutOfMemory) if
    /// fresh memory was needed and the platform could not provide it.
    fn try_acquire_storage(&self) -> PoolResult<NonNull<Self::Value>>;

    /// Acquires storage for one value, aborting through
    /// [`std::alloc::handle_alloc_error`] when memory is exhausted.
    fn acquire_storage(&self) -> NonNull<Self::Value> {
        match self.try_acquire_storage() {
            Ok(storage) => storage,
            Err(err) => alloc::handle_alloc_error(err.layout()),
        }
    }

    /// Returns storage to the allocator.
    ///
    /// # Safety
    ///
    /// `storage` must come from `acquire_storage` of an allocator with the
    /// same size class, must not be released twice, and any value placed in
    /// it must already be destroyed.
    unsafe fn release_storage(&self, storage: NonNull<Self::Value>);

    /// Moves `value` into `storage`.
    ///
    /// # Safety
    ///
    /// `storage` must be acquired from this allocator and hold no live value.
    unsafe fn construct(&self, storage: NonNull<Self::Value>, value: Self::Value) {
        // SAFETY: the caller guarantees the storage is valid and vacant.
        unsafe { storage.as_ptr().write(value) };
    }

    /// Runs the destructor of the value in `storage`, leaving it vacant.
    ///
    /// # Safety
    ///
    /// `storage` must hold a live value that is not used afterwards.
    unsafe fn destroy(&self, storage: NonNull<Self::Value>) {
        // SAFETY: the caller guarantees the storage holds a live value.
        unsafe { storage.as_ptr().drop_in_place() };
    }
}

/// Allocator that always goes straight to the global allocator.
///
/// Uses the same block layout as the pool of its size class, so storage
/// from one may be released through the other.
pub struct SystemAllocator<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> SystemAllocator<T> {
    /// Size class of every block this allocator hands out.
    pub const SIZE_CLASS: SizeClass = SizeClass::of::<T>();

    /// Creates the allocator. It carries no state.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> StorageAllocator for SystemAllocator<T> {
    type Value = T;
    type Rebind<U> = SystemAllocator<U>;

    #[inline]
    fn rebind<U>(&self) -> SystemAllocator<U> {
        SystemAllocator::new()
    }

    #[inline]
    fn try_acquire_storage(&self) -> PoolResult<NonNull<T>> {
        Self::SIZE_CLASS.acquire().map(NonNull::cast)
    }

    #[inline]
    unsafe fn release_storage(&self, storage: NonNull<T>) {
        // SAFETY: forwarded caller contract; the layout is the size class's.
        unsafe { Self::SIZE_CLASS.release(storage.cast()) };
    }
}

impl<T> Clone for SystemAllocator<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for SystemAllocator<T> {}

impl<T> Default for SystemAllocator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for SystemAllocator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemAllocator")
            .field("value", &std::any::type_name::<T>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct DropCounter<'a>(&'a Cell<usize>);

    impl Drop for DropCounter<'_> {
        fn drop(&mut self) {
            self.0.set(self.0.get() + 1);
        }
    }

    #[test]
    fn test_system_allocator_lifecycle() {
        let drops = Cell::new(0);
        let alloc = SystemAllocator::<DropCounter<'_>>::new();

        let storage = alloc.acquire_storage();
        // SAFETY: fresh storage, constructed once, destroyed once, released once.
        unsafe {
            alloc.construct(storage, DropCounter(&drops));
            assert_eq!(drops.get(), 0);
            alloc.destroy(storage);
            assert_eq!(drops.get(), 1);
            alloc.release_storage(storage);
        }
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn test_system_allocator_rebind() {
        let alloc = SystemAllocator::<u8>::new();
        let wide: SystemAllocator<[u64; 8]> = alloc.rebind();

        let storage = wide.acquire_storage();
        assert_eq!(storage.as_ptr() as usize % 16, 0);
        // SAFETY: acquired above, never constructed into.
        unsafe { wide.release_storage(storage) };
    }
}

//! # Pooled Box
//!
//! Owning pointer whose storage comes from a [`PoolAllocator`].

#![allow(unsafe_code)]

use std::fmt;
use std::marker::PhantomData;
use std::mem::{ManuallyDrop, MaybeUninit};
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

use crate::error::PoolResult;
use crate::memory::{PoolAllocator, StorageAllocator};

/// A `Box`-like owner of one `T` living in pooled storage.
///
/// Dropping it runs `T`'s destructor and then hands the storage back to the
/// shared free list of `PoolAllocator<T, CAPACITY>`.
///
/// # Example
///
/// ```rust
/// use lockfree_pool::PoolBox;
///
/// let packet: PoolBox<[u8; 64], 256> = PoolBox::new([0xFF; 64]);
/// assert_eq!(packet[0], 0xFF);
///
/// let bytes = PoolBox::into_inner(packet);
/// assert_eq!(bytes.len(), 64);
/// ```
pub struct PoolBox<T, const CAPACITY: usize> {
    ptr: NonNull<T>,
    _owns: PhantomData<T>,
}

impl<T, const CAPACITY: usize> PoolBox<T, CAPACITY> {
    const ALLOCATOR: PoolAllocator<T, CAPACITY> = PoolAllocator::new();

    /// Moves `value` into pooled storage.
    ///
    /// Aborts through [`std::alloc::handle_alloc_error`] if memory is
    /// exhausted.
    #[must_use]
    pub fn new(value: T) -> Self {
        let ptr = Self::ALLOCATOR.acquire_storage();
        // SAFETY: fresh storage sized and aligned for T.
        unsafe { Self::ALLOCATOR.construct(ptr, value) };
        Self {
            ptr,
            _owns: PhantomData,
        }
    }

    /// Moves `value` into pooled storage.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::OutOfMemory`](crate::PoolError::OutOfMemory) if
    /// memory is exhausted; `value` is dropped.
    pub fn try_new(value: T) -> PoolResult<Self> {
        let ptr = Self::ALLOCATOR.try_acquire_storage()?;
        // SAFETY: fresh storage sized and aligned for T.
        unsafe { Self::ALLOCATOR.construct(ptr, value) };
        Ok(Self {
            ptr,
            _owns: PhantomData,
        })
    }

    /// Moves the value out and recycles the storage.
    #[must_use]
    pub fn into_inner(this: Self) -> T {
        let this = ManuallyDrop::new(this);
        // SAFETY: the box owns a live value; reading it leaves the storage
        // vacant, and ManuallyDrop keeps Drop from touching it again.
        unsafe {
            let value = this.ptr.as_ptr().read();
            Self::ALLOCATOR.deallocate(this.ptr);
            value
        }
    }

    /// Returns the address of the value.
    #[inline]
    #[must_use]
    pub fn as_ptr(this: &Self) -> *const T {
        this.ptr.as_ptr()
    }
}

impl<T, const CAPACITY: usize> PoolBox<MaybeUninit<T>, CAPACITY> {
    /// Acquires pooled storage for a `T` without initializing it.
    ///
    /// The storage comes from the same free list as `PoolBox<T, CAPACITY>`.
    #[must_use]
    pub fn new_uninit() -> Self {
        Self {
            ptr: Self::ALLOCATOR.acquire_storage(),
            _owns: PhantomData,
        }
    }

    /// Acquires pooled storage for a `T` without initializing it.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::OutOfMemory`](crate::PoolError::OutOfMemory) if
    /// memory is exhausted.
    pub fn try_new_uninit() -> PoolResult<Self> {
        Ok(Self {
            ptr: Self::ALLOCATOR.try_acquire_storage()?,
            _owns: PhantomData,
        })
    }

    /// Writes `value` into the storage and returns the initialized box.
    #[must_use]
    pub fn write(this: Self, value: T) -> PoolBox<T, CAPACITY> {
        // SAFETY: the storage is sized and aligned for T and holds no live
        // value; MaybeUninit<T> has T's layout.
        unsafe {
            this.ptr.cast::<T>().as_ptr().write(value);
            Self::assume_init(this)
        }
    }

    /// Converts to an initialized box.
    ///
    /// # Safety
    ///
    /// The storage must hold a fully initialized `T`.
    #[must_use]
    pub unsafe fn assume_init(this: Self) -> PoolBox<T, CAPACITY> {
        let this = ManuallyDrop::new(this);
        // Same size class on both sides, so the storage goes back to the
        // free list it came from.
        PoolBox {
            ptr: this.ptr.cast(),
            _owns: PhantomData,
        }
    }
}

impl<T, const CAPACITY: usize> Deref for PoolBox<T, CAPACITY> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        // SAFETY: the box owns a live, initialized value.
        unsafe { self.ptr.as_ref() }
    }
}

impl<T, const CAPACITY: usize> DerefMut for PoolBox<T, CAPACITY> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the box owns a live value and `&mut self` is exclusive.
        unsafe { self.ptr.as_mut() }
    }
}

impl<T, const CAPACITY: usize> Drop for PoolBox<T, CAPACITY> {
    fn drop(&mut self) {
        // SAFETY: the value is live until here, destroyed once, and the
        // storage is released after it is vacant.
        unsafe {
            Self::ALLOCATOR.destroy(self.ptr);
            Self::ALLOCATOR.deallocate(self.ptr);
        }
    }
}

// SAFETY: PoolBox owns its T exclusively, like Box<T>. The free lists it
// returns storage to are thread-safe.
unsafe impl<T: Send, const CAPACITY: usize> Send for PoolBox<T, CAPACITY> {}
// SAFETY: shared access only hands out &T.
unsafe impl<T: Sync, const CAPACITY: usize> Sync for PoolBox<T, CAPACITY> {}

impl<T: fmt::Debug, const CAPACITY: usize> fmt::Debug for PoolBox<T, CAPACITY> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

impl<T: PartialEq, const CAPACITY: usize> PartialEq for PoolBox<T, CAPACITY> {
    fn eq(&self, other: &Self) -> bool {
        **self == **other
    }
}

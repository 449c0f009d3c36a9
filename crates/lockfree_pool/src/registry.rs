//! # Free-List Registry
//!
//! Process-wide table mapping a pool signature (size class + capacity) to
//! exactly one [`FreeList`].
//!
//! ## Safety Note
//!
//! Entries are heap nodes linked through raw pointers. They are published
//! once with a release CAS and never unlinked while the registry lives.
//!
//! ## Architecture
//!
//! ```text
//!   buckets[0]  ──▶ Entry{8B x 256} ──▶ Entry{8B x 64} ──▶ null
//!   buckets[1]  ──▶ null
//!   buckets[2]  ──▶ Entry{48B x 1024} ──▶ null
//!      ...
//!   buckets[63] ──▶ Entry{16B x 256} ──▶ null
//! ```
//!
//! - Lookup: hash the signature, walk one chain. No locks, no writes.
//! - First use: build a candidate entry, link it in front of the observed
//!   chain head and CAS it in. A loser that finds its signature published by
//!   the winner drops its candidate, so every signature maps to one free list
//!   no matter how many threads race on first use.

#![allow(unsafe_code)]

use std::fmt;
use std::marker::PhantomData;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicPtr, AtomicU64, Ordering};

use crate::config::REGISTRY_BUCKETS;
use crate::memory::SizeClass;
use crate::sync::BoundedStack;

/// The process-wide registry. Never dropped.
static GLOBAL: Registry = Registry::new();

/// Key of one free list: the block layout plus the configured capacity.
///
/// Pools of the same size class but different capacities are distinct.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Signature {
    class: SizeClass,
    capacity: usize,
}

impl Signature {
    /// Creates a signature from its parts.
    #[inline]
    #[must_use]
    pub const fn new(class: SizeClass, capacity: usize) -> Self {
        Self { class, capacity }
    }

    /// Signature of a pool holding `T` with the given capacity.
    #[inline]
    #[must_use]
    pub const fn of<T>(capacity: usize) -> Self {
        Self::new(SizeClass::of::<T>(), capacity)
    }

    /// Returns the size class.
    #[inline]
    #[must_use]
    pub const fn class(&self) -> SizeClass {
        self.class
    }

    /// Returns the configured capacity.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bucket index in `0..REGISTRY_BUCKETS`: the fields folded through the
    /// splitmix64 finalizer.
    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    const fn bucket(&self) -> usize {
        let mut h = (self.class.size() as u64)
            .wrapping_mul(0x9E37_79B9_7F4A_7C15)
            .wrapping_add(self.class.align() as u64)
            .wrapping_mul(0x9E37_79B9_7F4A_7C15)
            .wrapping_add(self.capacity as u64);
        h = (h ^ (h >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        h = (h ^ (h >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        h ^= h >> 31;
        h as usize & (REGISTRY_BUCKETS - 1)
    }
}

/// The bounded free list of one signature, with usage counters.
///
/// Holds recycled, uninitialized blocks of the signature's size class.
/// Counters are relaxed and only meant for diagnostics.
pub struct FreeList {
    signature: Signature,
    stack: BoundedStack,
    /// Blocks handed out from the list.
    hits: AtomicU64,
    /// Requests that found the list empty.
    misses: AtomicU64,
    /// Blocks accepted back into the list.
    recycled: AtomicU64,
    /// Blocks turned away because the list was full.
    overflows: AtomicU64,
}

impl FreeList {
    fn new(signature: Signature) -> Self {
        Self {
            signature,
            stack: BoundedStack::new(signature.capacity()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            recycled: AtomicU64::new(0),
            overflows: AtomicU64::new(0),
        }
    }

    /// Returns the signature this list serves.
    #[inline]
    #[must_use]
    pub fn signature(&self) -> Signature {
        self.signature
    }

    /// Returns the maximum number of blocks held.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.stack.capacity()
    }

    /// Returns the number of blocks currently held.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.stack.len()
    }

    /// Returns whether no block is held.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Takes a recycled block, or `None` if the list is empty.
    ///
    /// The block is uninitialized memory of this list's size class.
    #[inline]
    pub fn take(&self) -> Option<NonNull<u8>> {
        if let Some(block) = self.stack.pop() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            Some(block)
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            None
        }
    }

    /// Offers `block` back to the list.
    ///
    /// # Errors
    ///
    /// Returns `Err(block)` when the list is full. The caller keeps ownership
    /// and is expected to release the block.
    ///
    /// # Safety
    ///
    /// `block` must have been acquired for this list's size class, must hold
    /// no live object, and must not be in use anywhere else.
    #[inline]
    pub unsafe fn give(&self, block: NonNull<u8>) -> Result<(), NonNull<u8>> {
        match self.stack.push(block) {
            Ok(()) => {
                self.recycled.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(block) => {
                self.overflows.fetch_add(1, Ordering::Relaxed);
                Err(block)
            }
        }
    }

    /// Returns a snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> FreeListStats {
        FreeListStats {
            signature: self.signature,
            held: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            recycled: self.recycled.load(Ordering::Relaxed),
            overflows: self.overflows.load(Ordering::Relaxed),
        }
    }
}

impl Drop for FreeList {
    fn drop(&mut self) {
        let class = self.signature.class();
        while let Some(block) = self.stack.pop() {
            // SAFETY: `give` only accepts blocks of this size class that
            // nothing else uses, and popping removed the only reference.
            unsafe { class.release(block) };
        }
    }
}

impl fmt::Debug for FreeList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FreeList")
            .field("signature", &self.signature)
            .field("held", &self.len())
            .finish_non_exhaustive()
    }
}

/// Counters of one free list at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeListStats {
    /// The pool this snapshot describes.
    pub signature: Signature,
    /// Blocks held when the snapshot was taken.
    pub held: usize,
    /// Allocations served from the list.
    pub hits: u64,
    /// Allocations that fell back to fresh memory.
    pub misses: u64,
    /// Deallocations kept for reuse.
    pub recycled: u64,
    /// Deallocations released because the list was full.
    pub overflows: u64,
}

impl FreeListStats {
    /// Fraction of allocations served from the list (0.0 to 1.0).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Published registry node.
struct Entry {
    free_list: FreeList,
    /// Older entry in the same bucket. Fixed once published.
    next: *const Entry,
}

/// Walks one bucket chain.
struct Chain<'a> {
    cursor: *const Entry,
    _registry: PhantomData<&'a Registry>,
}

impl<'a> Iterator for Chain<'a> {
    type Item = &'a FreeList;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor.is_null() {
            return None;
        }
        // SAFETY: non-null cursors point at entries published in the
        // registry borrowed for 'a; entries are immutable after publication
        // and freed only when the registry is dropped.
        let entry = unsafe { &*self.cursor };
        self.cursor = entry.next;
        Some(&entry.free_list)
    }
}

/// Table of free lists, one per [`Signature`].
///
/// Use [`Registry::global`] for the process-wide instance every
/// [`PoolAllocator`](crate::PoolAllocator) shares. A standalone registry
/// releases the blocks its free lists still hold when dropped.
///
/// # Example
///
/// ```rust
/// use lockfree_pool::{Registry, Signature};
///
/// let registry = Registry::new();
/// let signature = Signature::of::<u64>(16);
///
/// let first = registry.get_or_create(signature);
/// let second = registry.get_or_create(signature);
/// assert!(std::ptr::eq(first, second));
/// assert_eq!(registry.len(), 1);
/// ```
pub struct Registry {
    buckets: [AtomicPtr<Entry>; REGISTRY_BUCKETS],
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buckets: [const { AtomicPtr::new(ptr::null_mut()) }; REGISTRY_BUCKETS],
        }
    }

    /// Returns the process-wide registry.
    #[inline]
    #[must_use]
    pub fn global() -> &'static Self {
        &GLOBAL
    }

    /// Returns the free list for `signature`, if it was created already.
    #[must_use]
    pub fn get(&self, signature: Signature) -> Option<&FreeList> {
        let head = self.buckets[signature.bucket()].load(Ordering::Acquire);
        self.find(head, signature)
    }

    /// Returns the free list for `signature`, creating it on first use.
    ///
    /// Threads racing on the first call for one signature all receive the
    /// same free list. Calls for different signatures never wait on each
    /// other.
    ///
    /// # Panics
    ///
    /// Panics if the signature's capacity exceeds
    /// [`MAX_CAPACITY`](crate::config::MAX_CAPACITY).
    pub fn get_or_create(&self, signature: Signature) -> &FreeList {
        let bucket = &self.buckets[signature.bucket()];
        let mut head = bucket.load(Ordering::Acquire);
        if let Some(found) = self.find(head, signature) {
            return found;
        }

        // Each thread that misses here builds one candidate, node array
        // included. Losers free it below, so a first-use race costs at most
        // one extra stack per racing thread, once per signature.
        let candidate = Box::into_raw(Box::new(Entry {
            free_list: FreeList::new(signature),
            next: head,
        }));

        loop {
            match bucket.compare_exchange_weak(
                head,
                candidate,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    tracing::debug!(
                        "Created free list: {} bytes (align {}) x {} blocks",
                        signature.class().size(),
                        signature.class().align(),
                        signature.capacity()
                    );
                    // SAFETY: just published; lives until the registry drops.
                    return unsafe { &(*candidate).free_list };
                }
                Err(actual) => {
                    head = actual;
                    if let Some(found) = self.find(head, signature) {
                        // SAFETY: the CAS failed, so the candidate was never
                        // published and is still exclusively ours.
                        drop(unsafe { Box::from_raw(candidate) });
                        return found;
                    }
                    // SAFETY: unpublished, exclusively ours.
                    unsafe { (*candidate).next = head };
                }
            }
        }
    }

    /// Returns the number of free lists created so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Returns whether no free list has been created.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    /// Iterates over every free list created so far.
    pub fn iter(&self) -> impl Iterator<Item = &FreeList> + '_ {
        self.buckets
            .iter()
            .flat_map(|bucket| self.chain(bucket.load(Ordering::Acquire)))
    }

    /// Returns counter snapshots of every free list.
    #[must_use]
    pub fn snapshot(&self) -> Vec<FreeListStats> {
        self.iter().map(FreeList::stats).collect()
    }

    /// Emits one log event per free list.
    pub fn log_summary(&self) {
        for stats in self.snapshot() {
            tracing::info!(
                "Free list {} bytes x {}: held {}, hits {}, misses {}, recycled {}, overflows {} (hit rate {:.1}%)",
                stats.signature.class().size(),
                stats.signature.capacity(),
                stats.held,
                stats.hits,
                stats.misses,
                stats.recycled,
                stats.overflows,
                stats.hit_rate() * 100.0
            );
        }
    }

    #[inline]
    fn find(&self, head: *const Entry, signature: Signature) -> Option<&FreeList> {
        self.chain(head)
            .find(|free_list| free_list.signature == signature)
    }

    #[inline]
    fn chain(&self, head: *const Entry) -> Chain<'_> {
        Chain {
            cursor: head,
            _registry: PhantomData,
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        for bucket in &mut self.buckets {
            let mut cursor: *const Entry = *bucket.get_mut();
            while !cursor.is_null() {
                // SAFETY: `&mut self` rules out outstanding borrows; every
                // entry came from `Box::into_raw` and is linked exactly once.
                let entry = unsafe { Box::from_raw(cursor.cast_mut()) };
                cursor = entry.next;
            }
        }
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

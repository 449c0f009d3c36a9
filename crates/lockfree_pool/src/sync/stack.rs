//! # Bounded Lock-Free Stack
//!
//! Capacity-bounded container of raw block addresses, shared by any number of
//! threads without locks.
//!
//! ## Architecture
//!
//! ```text
//!          free head                      used head
//!   ┌──────────────────┐           ┌──────────────────┐
//!   │ index │  ABA tag │           │ index │  ABA tag │   (one AtomicU64 each)
//!   └───┬──────────────┘           └───┬──────────────┘
//!       ▼                              ▼
//!   ┌──────┐   ┌──────┐            ┌──────┐   ┌──────┐
//!   │node 2│──▶│node 0│──▶ NIL     │node 1│──▶│node 3│──▶ NIL
//!   │  --  │   │  --  │            │ addr │   │ addr │
//!   └──────┘   └──────┘            └──────┘   └──────┘
//!         preallocated node array (capacity entries)
//! ```
//!
//! - `push`: take a node from `free` (none left = full), store the address,
//!   publish the node on `used`.
//! - `pop`: take a node from `used` (none = empty), read the address, return
//!   the node to `free`.
//!
//! Both lists are Treiber stacks. Every successful CAS bumps the tag packed
//! next to the head index, so a head that was popped and pushed back between
//! a thread's load and its CAS no longer compares equal. Nodes live as long as
//! the stack, so reading a stale node's link is harmless.

use std::fmt;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicPtr, AtomicU32, AtomicU64, AtomicUsize, Ordering};

use crate::config::MAX_CAPACITY;

/// Node index terminating a chain.
const NIL: u32 = u32::MAX;

/// Head word: node index in the low half, ABA tag in the high half.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Tagged {
    index: u32,
    tag: u32,
}

impl Tagged {
    #[inline]
    const fn pack(self) -> u64 {
        ((self.tag as u64) << 32) | self.index as u64
    }

    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    const fn unpack(word: u64) -> Self {
        Self {
            index: word as u32,
            tag: (word >> 32) as u32,
        }
    }

    #[inline]
    const fn successor(self, index: u32) -> Self {
        Self {
            index,
            tag: self.tag.wrapping_add(1),
        }
    }
}

/// One slot of the node array.
struct Node {
    /// Index of the next node in whichever chain holds this node.
    next: AtomicU32,
    /// Stored address. Null while the node sits on the free chain.
    block: AtomicPtr<u8>,
}

/// Head of a Treiber stack threaded through the shared node array.
struct Head(AtomicU64);

impl Head {
    fn new(index: u32) -> Self {
        Self(AtomicU64::new(Tagged { index, tag: 0 }.pack()))
    }

    /// Detaches the top node, returning its index.
    fn pop(&self, nodes: &[Node]) -> Option<u32> {
        let mut current = Tagged::unpack(self.0.load(Ordering::Acquire));
        loop {
            if current.index == NIL {
                return None;
            }

            // May be stale if another thread moved the node; the tag check
            // below rejects the CAS in that case.
            let next = nodes[current.index as usize].next.load(Ordering::Relaxed);

            match self.0.compare_exchange_weak(
                current.pack(),
                current.successor(next).pack(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some(current.index),
                Err(actual) => current = Tagged::unpack(actual),
            }
        }
    }

    /// Attaches a node the caller exclusively owns.
    fn push(&self, nodes: &[Node], index: u32) {
        let node = &nodes[index as usize];
        let mut current = Tagged::unpack(self.0.load(Ordering::Relaxed));
        loop {
            node.next.store(current.index, Ordering::Relaxed);

            match self.0.compare_exchange_weak(
                current.pack(),
                current.successor(index).pack(),
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(actual) => current = Tagged::unpack(actual),
            }
        }
    }
}

/// A bounded, lock-free LIFO of raw block addresses.
///
/// All storage is allocated once in [`BoundedStack::new`]; `push` and `pop`
/// never allocate. The stack does not own the blocks it holds: dropping it
/// with addresses inside forgets them.
///
/// # Thread Safety
///
/// `push` and `pop` may be called from any number of threads at once. Each
/// call completes in a bounded number of steps unless another thread keeps
/// winning the race, in which case that thread made progress.
///
/// # Example
///
/// ```rust
/// use std::ptr::NonNull;
/// use lockfree_pool::BoundedStack;
///
/// let mut slots = [0u64; 2];
/// let a = NonNull::from(&mut slots[0]).cast::<u8>();
/// let b = NonNull::from(&mut slots[1]).cast::<u8>();
///
/// let stack = BoundedStack::new(1);
/// assert!(stack.push(a).is_ok());
/// assert_eq!(stack.push(b), Err(b)); // full, ownership handed back
/// assert_eq!(stack.pop(), Some(a));
/// assert_eq!(stack.pop(), None);
/// ```
pub struct BoundedStack {
    /// Preallocated nodes. Never resized.
    nodes: Box<[Node]>,
    /// Nodes not holding an address.
    free: Head,
    /// Nodes holding an address.
    used: Head,
    /// Number of held addresses. Raised before publishing, lowered after
    /// detaching, so it never wraps and never exceeds the capacity.
    len: AtomicUsize,
}

impl BoundedStack {
    /// Creates a stack that holds at most `capacity` addresses.
    ///
    /// A capacity of zero is valid: every `push` reports full.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` exceeds [`MAX_CAPACITY`].
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(
            capacity <= MAX_CAPACITY,
            "Capacity {capacity} exceeds the maximum of {MAX_CAPACITY}"
        );

        // Chain every node onto the free list: 0 -> 1 -> ... -> NIL.
        #[allow(clippy::cast_possible_truncation)]
        let nodes: Box<[Node]> = (1..=capacity)
            .map(|next| Node {
                next: AtomicU32::new(if next == capacity { NIL } else { next as u32 }),
                block: AtomicPtr::new(ptr::null_mut()),
            })
            .collect();

        Self {
            nodes,
            free: Head::new(if capacity == 0 { NIL } else { 0 }),
            used: Head::new(NIL),
            len: AtomicUsize::new(0),
        }
    }

    /// Returns the maximum number of addresses the stack can hold.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.nodes.len()
    }

    /// Returns the number of held addresses.
    ///
    /// Exact when no other thread is operating on the stack; otherwise a
    /// snapshot that may lag in-flight operations.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    /// Returns whether the stack holds no addresses.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns whether every node holds an address.
    #[inline]
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity()
    }

    /// Inserts `block`.
    ///
    /// # Errors
    ///
    /// Returns `Err(block)` when the stack is at capacity. The address is
    /// handed back untouched; the caller still owns it.
    pub fn push(&self, block: NonNull<u8>) -> Result<(), NonNull<u8>> {
        let Some(index) = self.free.pop(&self.nodes) else {
            return Err(block);
        };

        self.nodes[index as usize]
            .block
            .store(block.as_ptr(), Ordering::Relaxed);
        self.len.fetch_add(1, Ordering::Relaxed);

        // Release on the used head publishes the address store above.
        self.used.push(&self.nodes, index);
        Ok(())
    }

    /// Removes and returns one address, or `None` if the stack is empty.
    pub fn pop(&self) -> Option<NonNull<u8>> {
        let index = self.used.pop(&self.nodes)?;

        let block = self.nodes[index as usize]
            .block
            .swap(ptr::null_mut(), Ordering::Relaxed);
        self.len.fetch_sub(1, Ordering::Relaxed);

        self.free.push(&self.nodes, index);
        NonNull::new(block)
    }
}

impl fmt::Debug for BoundedStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedStack")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .finish()
    }
}

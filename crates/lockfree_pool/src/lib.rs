//! # Lock-Free Pool
//!
//! Process-wide, lock-free, size-class pooling allocator designed for:
//! - Objects that are created and destroyed at a high rate
//! - Many threads allocating and freeing concurrently
//! - Bounded memory retention per size class
//!
//! ## Architecture Rules
//!
//! 1. **No locks on the hot path** - free lists are lock-free stacks
//! 2. **Memory, not objects** - the pool never runs constructors or destructors
//! 3. **One free list per signature** - every allocator of the same size class
//!    and capacity in the process shares it
//!
//! ## Example
//!
//! ```rust
//! use lockfree_pool::{PoolAllocator, PoolBox};
//!
//! #[derive(Debug, Default)]
//! struct Projectile { x: f32, y: f32, z: f32 }
//!
//! // Storage only: the caller constructs and destroys.
//! let pool: PoolAllocator<Projectile, 4096> = PoolAllocator::new();
//! let storage = pool.allocate();
//! // SAFETY: fresh storage; Projectile needs no drop.
//! unsafe {
//!     storage.as_ptr().write(Projectile::default());
//!     pool.deallocate(storage);
//! }
//!
//! // Or let a PoolBox manage the object.
//! let boxed: PoolBox<Projectile, 4096> = PoolBox::new(Projectile { x: 1.0, y: 2.0, z: 3.0 });
//! assert_eq!(boxed.y, 2.0);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod error;
pub mod memory;
pub mod registry;
pub mod sync;

pub use error::{PoolError, PoolResult};
pub use memory::{PoolAllocator, PoolBox, SizeClass, StorageAllocator, SystemAllocator};
pub use registry::{FreeList, FreeListStats, Registry, Signature};
pub use sync::BoundedStack;

//! # Memory Management
//!
//! Pooled storage for fixed-size objects.
//!
//! ## Design Philosophy
//!
//! Memory and object lifetime are managed separately:
//! - Allocators hand out and take back raw, uninitialized blocks
//! - Callers construct into and destroy out of those blocks
//! - Freed blocks are recycled through a shared, bounded free list

mod boxed;
mod pool;
mod raw;
mod storage;

pub use boxed::PoolBox;
pub use pool::PoolAllocator;
pub use raw::SizeClass;
pub use storage::{StorageAllocator, SystemAllocator};

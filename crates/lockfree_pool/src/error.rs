//! # Pool Error Types
//!
//! Pool full and pool empty are routed fallbacks, never errors. The only
//! failure a caller can observe is the platform running out of memory.

use std::alloc::Layout;

use thiserror::Error;

/// Errors that can occur while acquiring pooled storage.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    /// The platform allocator could not provide a fresh block.
    #[error(
        "out of memory: failed to acquire {} bytes aligned to {}",
        .layout.size(),
        .layout.align()
    )]
    OutOfMemory {
        /// Layout of the block that could not be acquired.
        layout: Layout,
    },
}

impl PoolError {
    /// Layout of the request that failed.
    ///
    /// Used to hand the failure to [`std::alloc::handle_alloc_error`].
    #[must_use]
    pub const fn layout(&self) -> Layout {
        match *self {
            Self::OutOfMemory { layout } => layout,
        }
    }
}

/// Result type for pool operations.
pub type PoolResult<T> = Result<T, PoolError>;

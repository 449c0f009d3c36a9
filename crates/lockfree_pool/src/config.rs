//! # Pool Constants
//!
//! Compile-time configuration shared by every pool in the process.
//!
//! **NOTE:** Call sites configure a pool through generics (element type and
//! `CAPACITY`). The values below are the process-wide knobs behind them.

// =============================================================================
// BLOCK LAYOUT
// =============================================================================

/// Minimum alignment of every pooled block.
///
/// Matches the fundamental alignment the platform allocator guarantees, so
/// all element types of one byte size with ordinary alignment share a pool.
/// Types aligned above this get a size class of their own.
pub const BLOCK_ALIGN: usize = 16;

// =============================================================================
// FREE LISTS
// =============================================================================

/// Largest capacity a single free list supports.
///
/// Node links are 32-bit indices and `u32::MAX` marks the end of a list.
pub const MAX_CAPACITY: usize = (u32::MAX - 1) as usize;

/// Number of bucket chains in a registry.
///
/// Must be a power of two. Processes typically use a handful of signatures,
/// so chains stay one or two entries long.
pub const REGISTRY_BUCKETS: usize = 64;

const _: () = assert!(REGISTRY_BUCKETS.is_power_of_two());
const _: () = assert!(BLOCK_ALIGN.is_power_of_two());

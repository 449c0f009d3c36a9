//! # Lock-Free Synchronization Primitives
//!
//! No locks on the hot path. Every shared structure here is built from
//! compare-and-swap loops over preallocated storage.
//!
//! ## The Problem
//!
//! ```text
//! Thread 1:  deallocate(A)  ──push──┐
//! Thread 2:  allocate()     ──pop───┼──▶  one free list per size class
//! Thread 3:  deallocate(B)  ──push──┘
//!
//! With Mutex:   every allocation serializes on one lock
//! Lock-free:    contention costs a retry, never a wait
//! ```

mod stack;

pub use stack::BoundedStack;

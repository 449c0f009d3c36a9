//! Property tests for the bounded stack and the free-list counters.
//!
//! Uses proptest to drive random push/pop sequences against a `Vec` model:
//! - The stack never holds more than its capacity
//! - A full stack hands the rejected block back unchanged
//! - Single-threaded order is LIFO
//! - Free-list counters account for every take and give

#![allow(unsafe_code)]

use std::ptr::NonNull;

use lockfree_pool::{BoundedStack, Registry, Signature, SizeClass};
use proptest::prelude::*;

#[derive(Debug, Clone, Copy)]
enum Op {
    Push,
    Pop,
}

fn arb_ops() -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(
        prop_oneof![3 => Just(Op::Push), 2 => Just(Op::Pop)],
        0..200,
    )
}

/// Stack entries are never dereferenced, so any non-null address will do.
fn fake_block(n: usize) -> NonNull<u8> {
    NonNull::new(((n + 1) * 16) as *mut u8).unwrap()
}

// ---------------------------------------------------------------------------
// Property: the stack behaves like a bounded Vec
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn stack_matches_bounded_model(capacity in 0usize..24, ops in arb_ops()) {
        let stack = BoundedStack::new(capacity);
        let mut model: Vec<NonNull<u8>> = Vec::new();
        let mut next = 0;

        for op in ops {
            match op {
                Op::Push => {
                    let block = fake_block(next);
                    next += 1;
                    if model.len() < capacity {
                        prop_assert_eq!(stack.push(block), Ok(()));
                        model.push(block);
                    } else {
                        prop_assert_eq!(stack.push(block), Err(block));
                    }
                }
                Op::Pop => prop_assert_eq!(stack.pop(), model.pop()),
            }

            prop_assert_eq!(stack.len(), model.len());
            prop_assert!(stack.len() <= stack.capacity());
            prop_assert_eq!(stack.is_full(), model.len() == capacity);
            prop_assert_eq!(stack.is_empty(), model.is_empty());
        }
    }
}

// ---------------------------------------------------------------------------
// Property: free-list counters account for every operation
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn free_list_counters_balance(capacity in 1usize..8, ops in arb_ops()) {
        let class = SizeClass::new(48, 16);
        let registry = Registry::new();
        let list = registry.get_or_create(Signature::new(class, capacity));

        let mut outstanding: Vec<NonNull<u8>> = Vec::new();
        let (mut takes, mut gives) = (0u64, 0u64);

        for op in ops {
            match op {
                Op::Pop => {
                    takes += 1;
                    let block = match list.take() {
                        Some(block) => block,
                        None => class.acquire().unwrap(),
                    };
                    outstanding.push(block);
                }
                Op::Push => {
                    if let Some(block) = outstanding.pop() {
                        gives += 1;
                        // SAFETY: the block belongs to this size class and is vacant.
                        if let Err(rejected) = unsafe { list.give(block) } {
                            // SAFETY: the list turned it away, so this is the only owner.
                            unsafe { class.release(rejected) };
                        }
                    }
                }
            }

            let stats = list.stats();
            prop_assert!(stats.held <= capacity);
            prop_assert_eq!(stats.hits + stats.misses, takes);
            prop_assert_eq!(stats.recycled + stats.overflows, gives);
        }

        for block in outstanding {
            // SAFETY: still owned by the test, released once.
            unsafe { class.release(block) };
        }
        // Dropping the registry releases whatever the list still holds.
    }
}

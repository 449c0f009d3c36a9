//! Integration tests for the pooling allocator contract.
//!
//! Free lists are process-wide, so every test in this binary uses a
//! signature (size class + capacity) that no other test touches.

#![allow(unsafe_code)]

use std::collections::HashSet;
use std::ptr::NonNull;

use lockfree_pool::{PoolAllocator, Registry, Signature, StorageAllocator, SystemAllocator};

fn allocate_n<T, const C: usize>(pool: &PoolAllocator<T, C>, n: usize) -> Vec<NonNull<T>> {
    (0..n).map(|_| pool.allocate()).collect()
}

fn deallocate_all<T, const C: usize>(pool: &PoolAllocator<T, C>, blocks: &[NonNull<T>]) {
    for &block in blocks {
        // SAFETY: every block came from this pool and holds no live value.
        unsafe { pool.deallocate(block) };
    }
}

#[test]
fn test_concrete_scenario_capacity_two() {
    let pool: PoolAllocator<[u8; 72], 2> = PoolAllocator::new();

    let blocks = allocate_n(&pool, 3);
    let all: HashSet<_> = blocks.iter().copied().collect();
    assert_eq!(all.len(), 3);

    // deallocate(A), deallocate(B), deallocate(C) on an empty pool.
    deallocate_all(&pool, &blocks);

    let stats = pool.stats().unwrap();
    assert_eq!(stats.held, 2);
    assert_eq!(stats.recycled, 2);
    assert_eq!(stats.overflows, 1);

    // The next two allocations come from the pool, the third is fresh.
    let first = pool.allocate();
    let second = pool.allocate();
    assert!(all.contains(&first));
    assert!(all.contains(&second));
    assert_ne!(first, second);
    assert_eq!(pool.stats().unwrap().hits, 2);

    let third = pool.allocate();
    assert_eq!(pool.stats().unwrap().misses, 4);

    deallocate_all(&pool, &[first, second, third]);
}

#[test]
fn test_round_trip_keeps_contents() {
    let pool: PoolAllocator<u64, 1> = PoolAllocator::new();
    let neighbour = pool.allocate();
    let block = pool.allocate();

    // SAFETY: both blocks are fresh u64 storage owned by this test.
    unsafe {
        neighbour.as_ptr().write(0x1111_1111_1111_1111);
        block.as_ptr().write(0xDEAD_BEEF_CAFE_F00D);
        pool.deallocate(block);
    }

    let again = pool.allocate();
    assert_eq!(again, block);

    // SAFETY: recycled storage still holds the marker; the neighbour is live.
    unsafe {
        assert_eq!(again.as_ptr().read(), 0xDEAD_BEEF_CAFE_F00D);
        assert_eq!(neighbour.as_ptr().read(), 0x1111_1111_1111_1111);
    }

    deallocate_all(&pool, &[again, neighbour]);
}

#[test]
fn test_zero_capacity_never_pools() {
    let pool: PoolAllocator<[u64; 7], 0> = PoolAllocator::new();

    for _ in 0..100 {
        let block = pool.allocate();
        // SAFETY: fresh storage, released once.
        unsafe { pool.deallocate(block) };
    }

    assert!(pool.free_list().is_none());
    assert!(Registry::global().get(pool.signature()).is_none());
}

#[test]
fn test_signature_isolation_between_sizes() {
    let small: PoolAllocator<u64, 48> = PoolAllocator::new();
    let large: PoolAllocator<[u64; 2], 48> = PoolAllocator::new();

    let small_blocks = allocate_n(&small, 16);
    let large_blocks = allocate_n(&large, 16);
    let small_set: HashSet<usize> = small_blocks.iter().map(|p| p.as_ptr() as usize).collect();
    let large_set: HashSet<usize> = large_blocks.iter().map(|p| p.as_ptr() as usize).collect();

    deallocate_all(&small, &small_blocks);
    deallocate_all(&large, &large_blocks);

    let from_small = allocate_n(&small, 16);
    let from_large = allocate_n(&large, 16);

    for block in &from_small {
        assert!(!large_set.contains(&(block.as_ptr() as usize)));
        assert!(small_set.contains(&(block.as_ptr() as usize)));
    }
    for block in &from_large {
        assert!(!small_set.contains(&(block.as_ptr() as usize)));
    }

    deallocate_all(&small, &from_small);
    deallocate_all(&large, &from_large);
}

#[test]
fn test_same_size_types_share_a_pool() {
    let words: PoolAllocator<u32, 5> = PoolAllocator::new();
    let bytes: PoolAllocator<[u8; 4], 5> = words.rebind();
    assert_eq!(words.signature(), bytes.signature());

    let block = words.allocate();
    // SAFETY: vacant storage of the shared size class.
    unsafe { words.deallocate(block) };

    let reused = bytes.allocate();
    assert_eq!(reused.cast::<u32>(), block);
    // SAFETY: vacant, released once.
    unsafe { bytes.deallocate(reused) };
}

#[test]
fn test_capacity_is_part_of_the_signature() {
    let narrow: PoolAllocator<[u32; 3], 1> = PoolAllocator::new();
    let wide: PoolAllocator<[u32; 3], 64> = PoolAllocator::new();
    assert_eq!(narrow.size_class(), wide.size_class());
    assert_ne!(narrow.signature(), wide.signature());

    let block = narrow.allocate();
    // SAFETY: vacant, released once.
    unsafe { narrow.deallocate(block) };

    // The wide pool has never seen that block.
    assert!(wide.free_list().unwrap().is_empty());
    assert_eq!(narrow.stats().unwrap().held, 1);

    let registry = Registry::global();
    let narrow_list = registry.get(Signature::of::<[u32; 3]>(1)).unwrap();
    let wide_list = registry.get(Signature::of::<[u32; 3]>(64)).unwrap();
    assert!(!std::ptr::eq(narrow_list, wide_list));
}

#[test]
fn test_over_aligned_types_get_their_own_class() {
    #[allow(dead_code)]
    #[repr(align(64))]
    struct CacheLine([u8; 64]);

    let aligned: PoolAllocator<CacheLine, 4> = PoolAllocator::new();
    let plain: PoolAllocator<[u8; 64], 4> = PoolAllocator::new();
    assert_ne!(aligned.signature(), plain.signature());

    let blocks = allocate_n(&aligned, 4);
    deallocate_all(&aligned, &blocks);
    for block in allocate_n(&aligned, 4) {
        assert_eq!(block.as_ptr() as usize % 64, 0);
        // SAFETY: vacant, released once.
        unsafe { aligned.deallocate(block) };
    }
}

#[test]
fn test_construct_destroy_through_trait() {
    fn churn<A: StorageAllocator<Value = String>>(alloc: &A) -> String {
        let storage = alloc.acquire_storage();
        // SAFETY: constructed once, read while live, destroyed once, released once.
        unsafe {
            alloc.construct(storage, String::from("storage only"));
            let text = (*storage.as_ptr()).clone();
            alloc.destroy(storage);
            alloc.release_storage(storage);
            text
        }
    }

    assert_eq!(churn(&PoolAllocator::<String, 3>::new()), "storage only");
    assert_eq!(churn(&SystemAllocator::<String>::new()), "storage only");
}

#[test]
fn test_try_allocate_succeeds() {
    let pool: PoolAllocator<[u16; 50], 2> = PoolAllocator::new();
    let block = pool.try_allocate().unwrap();
    // SAFETY: vacant, released once.
    unsafe { pool.deallocate(block) };
    assert_eq!(pool.try_allocate().unwrap(), block);
}

// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Integration tests for the literal boundary scenarios this core's spec
//! calls out: minimum blocks, split-then-coalesce, heap extension, growing
//! reallocation, and zero-allocate overflow. Run with `--features test-utils`.

#![cfg(feature = "test-utils")]

use rxalloc::{Allocator, ArenaHeap};

fn small_heap() -> Allocator<ArenaHeap<65536>> {
    Allocator::with_chunk_size(ArenaHeap::new(), 256)
}

#[test]
fn minimum_block_allocation() {
    let mut heap = small_heap();
    let p = heap.allocate(1);
    assert!(!p.is_null());
    assert_eq!(p as usize % 16, 0, "payload must be 16-byte aligned");
    assert!(heap.integrity_check("minimum_block_allocation"));
    heap.free(p);
    assert!(heap.integrity_check("minimum_block_allocation"));
}

#[test]
fn split_then_coalesce_reunites_the_chunk() {
    let mut heap = small_heap();
    let a = heap.allocate(24);
    let b = heap.allocate(24);
    assert!(!a.is_null() && !b.is_null());
    assert!(heap.integrity_check("split_then_coalesce"));

    heap.free(a);
    assert!(heap.integrity_check("split_then_coalesce"));
    heap.free(b);
    assert!(heap.integrity_check("split_then_coalesce"));
}

#[test]
fn repeated_large_allocations_force_heap_extension() {
    let mut heap: Allocator<ArenaHeap<1_048_576>> = Allocator::with_chunk_size(ArenaHeap::new(), 4096);
    let mut live = std::vec::Vec::new();
    for _ in 0..64 {
        let p = heap.allocate(4096);
        assert!(!p.is_null(), "arena should have room for 64 4096-byte requests");
        assert!(heap.integrity_check("repeated_large_allocations"));
        live.push(p);
    }
    for p in live {
        heap.free(p);
    }
    assert!(heap.integrity_check("repeated_large_allocations"));
}

#[test]
fn reallocate_grow_preserves_leading_bytes() {
    let mut heap = small_heap();
    let p = heap.allocate(32);
    assert!(!p.is_null());
    let pattern: std::vec::Vec<u8> = (0..32u8).collect();
    unsafe {
        std::ptr::copy_nonoverlapping(pattern.as_ptr(), p, 32);
    }

    let q = heap.reallocate(p, 1024);
    assert!(!q.is_null());
    unsafe {
        for (i, &byte) in pattern.iter().enumerate() {
            assert_eq!(q.add(i).read(), byte);
        }
    }
    assert!(heap.integrity_check("reallocate_grow_preserves_leading_bytes"));
    heap.free(q);
}

#[test]
fn reallocate_shrink_preserves_new_size_worth_of_bytes() {
    let mut heap = small_heap();
    let p = heap.allocate(128);
    assert!(!p.is_null());
    let pattern: std::vec::Vec<u8> = (0..128u8).collect();
    unsafe {
        std::ptr::copy_nonoverlapping(pattern.as_ptr(), p, 128);
    }

    let q = heap.reallocate(p, 16);
    assert!(!q.is_null());
    unsafe {
        for i in 0..16 {
            assert_eq!(q.add(i).read(), pattern[i]);
        }
    }
    heap.free(q);
}

#[test]
fn zero_allocate_overflow_returns_null_without_touching_heap() {
    let mut heap = small_heap();
    assert!(heap.zero_allocate(usize::MAX, 2).is_null());
    assert!(heap.integrity_check("zero_allocate_overflow"));
}

#[test]
fn zero_allocate_memory_is_all_zero() {
    let mut heap = small_heap();
    let p = heap.zero_allocate(16, 8);
    assert!(!p.is_null());
    unsafe {
        for i in 0..128 {
            assert_eq!(p.add(i).read(), 0);
        }
    }
    heap.free(p);
}

#[test]
fn exhausting_a_tiny_arena_fails_cleanly() {
    let mut heap: Allocator<ArenaHeap<256>> = Allocator::with_chunk_size(ArenaHeap::new(), 128);
    let mut live = std::vec::Vec::new();
    loop {
        let p = heap.allocate(48);
        if p.is_null() {
            break;
        }
        live.push(p);
    }
    assert!(heap.integrity_check("exhausting_a_tiny_arena"));
    for p in live {
        heap.free(p);
    }
    assert!(heap.integrity_check("exhausting_a_tiny_arena"));
}

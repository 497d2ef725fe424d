// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Fit search: choosing where in the free lists a request gets placed.
//!
//! Each bucket scan is bounded to `BETTER_FIT_SCAN_LIMIT` visited blocks and
//! tracks the best (smallest-excess) candidate seen so far, accepting early
//! if a candidate's excess is within `NEAR_FIT_SLACK`. This bound is load
//! bearing, not just a performance knob: the minimum-block bucket is a
//! singly-linked chain that ends in a self-loop rather than a true ring (see
//! `freelist.rs`), so a scan that didn't stop after a fixed number of steps
//! would still terminate on that bucket (the self-loop repeats the terminal
//! node forever) but would never advance past the first dead end. Bounding
//! by visit count keeps one scan loop correct for both bucket shapes.
//!
//! When a bucket scan comes up empty, the search escalates to successively
//! larger buckets until one yields a fit or the buckets are exhausted.

use crate::config::{bucket_of, NEAR_FIT_SLACK, NUM_BUCKETS};
use crate::freelist::{get_next, FreeLists};
use crate::{block, config};

/// Scan a single bucket for a block whose size is at least `requested`,
/// returning the best candidate found within the scan bound.
///
/// # Safety
/// Every block linked into `bucket` must be a live free block.
unsafe fn scan_bucket(lists: &FreeLists, bucket: usize, requested: usize) -> Option<usize> {
    let head = lists.head(bucket);
    if head == 0 {
        return None;
    }

    let mut best: Option<(usize, usize)> = None; // (addr, excess)
    let mut cur = head;
    let mut visited = 0;

    loop {
        let size = block::block_size(cur);
        if size >= requested {
            let excess = size - requested;
            if excess <= NEAR_FIT_SLACK {
                return Some(cur);
            }
            if best.map_or(true, |(_, best_excess)| excess < best_excess) {
                best = Some((cur, excess));
            }
        }

        visited += 1;
        let next = get_next(cur);
        if next == head || visited >= config::BETTER_FIT_SCAN_LIMIT {
            break;
        }
        cur = next;
    }

    best.map(|(addr, _)| addr)
}

/// Find a free block able to satisfy a request of `requested` bytes,
/// starting at the requested size's natural bucket and escalating to larger
/// buckets on a miss.
///
/// # Safety
/// Every block linked into `lists` must be a live free block.
pub unsafe fn find_fit(lists: &FreeLists, requested: usize) -> Option<usize> {
    let start = bucket_of(requested);
    for bucket in start..NUM_BUCKETS {
        if let Some(addr) = scan_bucket(lists, bucket, requested) {
            return Some(addr);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Arena {
        base: *mut u8,
        layout: std::alloc::Layout,
    }

    impl Arena {
        fn new(bytes: usize) -> Self {
            let layout = std::alloc::Layout::from_size_align(bytes, 16).unwrap();
            let base = unsafe { std::alloc::alloc(layout) };
            Self { base, layout }
        }

        fn at(&self, offset: usize) -> usize {
            self.base as usize + offset
        }
    }

    impl Drop for Arena {
        fn drop(&mut self) {
            unsafe { std::alloc::dealloc(self.base, self.layout) };
        }
    }

    #[test]
    fn finds_exact_fit_in_natural_bucket() {
        let arena = Arena::new(1024);
        let mut lists = FreeLists::new();
        unsafe {
            let blk = arena.at(0);
            block::write_free_block(blk, 64, true, false);
            lists.insert(blk, 64);

            let found = find_fit(&lists, 64).expect("expected a fit");
            assert_eq!(found, blk);
        }
    }

    #[test]
    fn escalates_to_larger_bucket_on_miss() {
        let arena = Arena::new(4096);
        let mut lists = FreeLists::new();
        unsafe {
            let blk = arena.at(0);
            block::write_free_block(blk, 512, true, false);
            lists.insert(blk, 512);

            // A 64-byte request has nothing in its own bucket; escalate.
            let found = find_fit(&lists, 64).expect("expected escalation to find the block");
            assert_eq!(found, blk);
        }
    }

    #[test]
    fn prefers_near_fit_over_larger_exact_candidates_seen_later() {
        let arena = Arena::new(4096);
        let mut lists = FreeLists::new();
        unsafe {
            // Bucket for size 512 holds two candidates for a 480-byte request:
            // one with large excess (inserted first, so visited first after
            // LIFO head swap) and one within NEAR_FIT_SLACK.
            let far = arena.at(0);
            block::write_free_block(far, 512, true, false);
            lists.insert(far, 512);

            let near = arena.at(512);
            block::write_free_block(near, 496, true, false);
            lists.insert(near, 496);

            // LIFO: `near` is the head, so it's visited first and accepted
            // immediately since its excess (16) is within NEAR_FIT_SLACK.
            let found = find_fit(&lists, 480).expect("expected a fit");
            assert_eq!(found, near);
        }
    }

    #[test]
    fn returns_none_when_no_bucket_has_room() {
        let lists = FreeLists::new();
        unsafe {
            assert!(find_fit(&lists, 128).is_none());
        }
    }
}

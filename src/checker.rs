// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Heap integrity checker.
//!
//! Walks the implicit address-ordered block list and cross-checks it
//! against the segregated free lists. Meant to be sprinkled through tests
//! (and, in debug builds, around tricky mutations) rather than run on every
//! allocation, since it's O(n) in the number of live blocks.

use crate::block::{self, BlockFlags};
use crate::config::{ALIGNMENT, MIN_BLOCK_SIZE, NUM_BUCKETS, WSIZE};
use crate::freelist::{get_next, get_prev, FreeLists};

#[cfg(feature = "logging")]
macro_rules! check_error {
    ($tag:expr, $($arg:tt)*) => {
        log::error!("integrity check [{}] failed: {}", $tag, format_args!($($arg)*));
    };
}

#[cfg(not(feature = "logging"))]
macro_rules! check_error {
    ($tag:expr, $($arg:tt)*) => {
        let _ = $tag;
        let _ = format_args!($($arg)*);
    };
}

/// Validate the heap's structural invariants.
///
/// `tag` identifies the call site in logged failures (a caller typically
/// passes something like `concat!(file!(), ":", line!())`).
///
/// # Safety
/// `lo..hi` must be memory the allocator has exclusive access to, and
/// `heap_start` and every address linked into `lists` must lie within it.
pub unsafe fn integrity_check(
    tag: &str,
    lo: usize,
    hi: usize,
    heap_start: usize,
    lists: &FreeLists,
) -> bool {
    if lo == 0 {
        // Nothing has been initialized yet; there is nothing to check.
        return true;
    }

    if hi < lo + 2 * WSIZE {
        check_error!(tag, "heap range {:#x}..{:#x} too small for prologue+epilogue", lo, hi);
        return false;
    }

    let prologue_word = block::read_word(lo);
    if block::unpack_size(prologue_word) != 0
        || !block::unpack_flags(prologue_word).contains(BlockFlags::CUR_ALLOC)
    {
        check_error!(tag, "prologue at {:#x} is malformed: {:#x}", lo, prologue_word);
        return false;
    }

    let epilogue_addr = hi - WSIZE;
    let epilogue_word = block::read_word(epilogue_addr);
    if block::unpack_size(epilogue_word) != 0
        || !block::unpack_flags(epilogue_word).contains(BlockFlags::CUR_ALLOC)
    {
        check_error!(tag, "epilogue at {:#x} is malformed: {:#x}", epilogue_addr, epilogue_word);
        return false;
    }

    let mut implicit_free_count = 0usize;
    let mut cur = heap_start;
    let mut prev_was_free = false;
    // The prologue is allocated and has size 0, so it is not a min block.
    let mut prev_alloc = true;
    let mut prev_is_min = false;

    while cur < epilogue_addr {
        let header = block::header(cur);
        let size = block::unpack_size(header);
        let flags = block::unpack_flags(header);

        if size < MIN_BLOCK_SIZE {
            check_error!(tag, "block at {:#x} has size {} below minimum", cur, size);
            return false;
        }
        if size % ALIGNMENT != 0 {
            check_error!(tag, "block at {:#x} has misaligned size {}", cur, size);
            return false;
        }
        if cur + size > epilogue_addr {
            check_error!(tag, "block at {:#x} of size {} overruns the epilogue", cur, size);
            return false;
        }

        if flags.contains(BlockFlags::PREV_ALLOC) != prev_alloc {
            check_error!(
                tag,
                "block at {:#x} has prev_alloc={}, but its predecessor is {}",
                cur,
                flags.contains(BlockFlags::PREV_ALLOC),
                if prev_alloc { "allocated" } else { "free" }
            );
            return false;
        }
        if flags.contains(BlockFlags::PREV_MIN) != prev_is_min {
            check_error!(
                tag,
                "block at {:#x} has prev_min={}, but its predecessor's size==16 is {}",
                cur,
                flags.contains(BlockFlags::PREV_MIN),
                prev_is_min
            );
            return false;
        }

        let is_free = !flags.contains(BlockFlags::CUR_ALLOC);

        if is_free && size > MIN_BLOCK_SIZE {
            let footer = block::footer(cur, size);
            if footer != header {
                check_error!(tag, "block at {:#x} header/footer mismatch", cur);
                return false;
            }
        }

        if is_free && prev_was_free {
            check_error!(tag, "block at {:#x} is free directly after a free block", cur);
            return false;
        }

        if is_free {
            implicit_free_count += 1;
        }
        prev_was_free = is_free;
        prev_alloc = !is_free;
        prev_is_min = size == MIN_BLOCK_SIZE;
        cur = cur + size;
    }

    if cur != epilogue_addr {
        check_error!(tag, "implicit list walk ended at {:#x}, expected epilogue at {:#x}", cur, epilogue_addr);
        return false;
    }

    if block::unpack_flags(epilogue_word).contains(BlockFlags::PREV_ALLOC) != prev_alloc {
        check_error!(tag, "epilogue at {:#x} has a stale prev_alloc bit", epilogue_addr);
        return false;
    }
    if block::unpack_flags(epilogue_word).contains(BlockFlags::PREV_MIN) != prev_is_min {
        check_error!(tag, "epilogue at {:#x} has a stale prev_min bit", epilogue_addr);
        return false;
    }

    let mut free_list_count = 0usize;
    for bucket in 0..NUM_BUCKETS {
        let head = lists.head(bucket);
        if head == 0 {
            continue;
        }
        if bucket == 0 {
            free_list_count += check_mini_bucket(tag, head, lo, hi);
        } else {
            match check_basic_bucket(tag, bucket, head, lo, hi) {
                Some(count) => free_list_count += count,
                None => return false,
            }
        }
    }

    if free_list_count != implicit_free_count {
        check_error!(
            tag,
            "free block count mismatch: implicit list saw {}, free lists saw {}",
            implicit_free_count,
            free_list_count
        );
        return false;
    }

    true
}

/// Count and sanity-check the self-loop-terminated mini bucket. Returns the
/// count (0 is impossible for a non-null head, since a node always points at
/// itself or another node).
unsafe fn check_mini_bucket(tag: &str, head: usize, lo: usize, hi: usize) -> usize {
    let mut count = 0usize;
    let mut cur = head;
    loop {
        if cur < lo || cur >= hi {
            check_error!(tag, "mini bucket node {:#x} outside heap range", cur);
            return count;
        }
        if block::block_size(cur) != MIN_BLOCK_SIZE {
            check_error!(tag, "mini bucket node {:#x} is not minimum size", cur);
            return count;
        }
        count += 1;
        let next = get_next(cur);
        if next == cur {
            break;
        }
        cur = next;
    }
    count
}

/// Count and sanity-check a doubly-linked ring bucket, verifying
/// `next->prev == block` and `prev->next == block` for every member.
/// Returns `None` if a consistency violation was found.
unsafe fn check_basic_bucket(tag: &str, bucket: usize, head: usize, lo: usize, hi: usize) -> Option<usize> {
    let mut count = 0usize;
    let mut cur = head;
    loop {
        if cur < lo || cur >= hi {
            check_error!(tag, "bucket {} node {:#x} outside heap range", bucket, cur);
            return None;
        }
        let size = block::block_size(cur);
        if crate::config::bucket_of(size) != bucket {
            check_error!(tag, "bucket {} node {:#x} has size {} belonging elsewhere", bucket, cur, size);
            return None;
        }

        let next = get_next(cur);
        let prev = get_prev(cur);
        if get_prev(next) != cur {
            check_error!(tag, "bucket {} node {:#x}: next->prev != self", bucket, cur);
            return None;
        }
        if get_next(prev) != cur {
            check_error!(tag, "bucket {} node {:#x}: prev->next != self", bucket, cur);
            return None;
        }

        count += 1;
        cur = next;
        if cur == head {
            break;
        }
    }
    Some(count)
}

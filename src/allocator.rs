// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! The allocator core: lazy initialization, allocation, freeing,
//! reallocation, zero-initialized allocation, and the heap-extension and
//! coalescing machinery underneath them.

use core::ptr;

use crate::block::{self, BlockFlags};
use crate::checker;
use crate::config::{round_up, ALIGNMENT, CHUNK_SIZE, MIN_BLOCK_SIZE, WSIZE};
use crate::error::HeapError;
use crate::freelist::FreeLists;
use crate::placement;
use crate::provider::HeapProvider;

#[cfg(feature = "logging")]
macro_rules! log_debug { ($($arg:tt)*) => { log::debug!($($arg)*); }; }
#[cfg(not(feature = "logging"))]
macro_rules! log_debug { ($($arg:tt)*) => { let _ = format_args!($($arg)*); }; }

#[cfg(feature = "logging")]
macro_rules! log_trace { ($($arg:tt)*) => { log::trace!($($arg)*); }; }
#[cfg(not(feature = "logging"))]
macro_rules! log_trace { ($($arg:tt)*) => { let _ = format_args!($($arg)*); }; }

#[cfg(feature = "logging")]
macro_rules! log_warn { ($($arg:tt)*) => { log::warn!($($arg)*); }; }
#[cfg(not(feature = "logging"))]
macro_rules! log_warn { ($($arg:tt)*) => { let _ = format_args!($($arg)*); }; }

/// A segregated free-list allocator over heap space supplied by `P`.
///
/// Not `Sync`, not reentrant: callers needing a shared, thread-safe
/// allocator must add their own synchronization around an `Allocator`
/// (e.g. a mutex), matching the bare single-threaded contract this core
/// implements rather than baking a particular locking policy in.
pub struct Allocator<P: HeapProvider> {
    provider: P,
    lists: FreeLists,
    /// `0` until the first successful allocation-triggering initialization.
    lo: usize,
    /// Address right after the prologue; fixed for the provider's lifetime.
    heap_start: usize,
    /// Address of the current epilogue word (`provider.hi() - WSIZE`).
    epilogue: usize,
    chunk_size: usize,
}

impl<P: HeapProvider> Allocator<P> {
    /// Build an allocator over `provider` with the default heap-growth
    /// granularity.
    pub const fn new(provider: P) -> Self {
        Self::with_chunk_size(provider, CHUNK_SIZE)
    }

    /// Build an allocator that grows the heap in units of `chunk_size`
    /// bytes (rounded up to the allocator's alignment at growth time).
    pub const fn with_chunk_size(provider: P, chunk_size: usize) -> Self {
        Self {
            provider,
            lists: FreeLists::new(),
            lo: 0,
            heap_start: 0,
            epilogue: 0,
            chunk_size,
        }
    }

    /// Validate the heap's structural invariants. `tag` identifies the call
    /// site in any logged failure.
    pub fn integrity_check(&self, tag: &str) -> bool {
        unsafe {
            checker::integrity_check(tag, self.lo, self.provider.hi(), self.heap_start, &self.lists)
        }
    }

    fn ensure_init(&mut self) -> Result<(), HeapError> {
        if self.lo != 0 {
            return Ok(());
        }
        self.init()
    }

    fn init(&mut self) -> Result<(), HeapError> {
        let base = self.provider.extend(2 * WSIZE).ok_or(HeapError::OutOfMemory)?;
        unsafe {
            block::set_header(base, block::pack(0, false, true, false));
            let epilogue_addr = base + WSIZE;
            block::set_header(epilogue_addr, block::pack(0, true, true, false));

            self.lo = self.provider.lo();
            self.heap_start = epilogue_addr;
            self.epilogue = epilogue_addr;
            log_debug!("heap initialized at {:#x}", self.lo);

            let (addr, size) = self.extend_heap(self.chunk_size)?;
            self.lists.insert(addr, size);
        }
        Ok(())
    }

    /// Grow the heap by at least `requested` bytes (rounded up to
    /// alignment), coalescing the new space with a free block that already
    /// bordered the old top if one exists.
    ///
    /// # Safety
    /// Must only be called after `self.lo`/`self.epilogue` have been
    /// established by [`init`](Self::init).
    unsafe fn extend_heap(&mut self, requested: usize) -> Result<(usize, usize), HeapError> {
        let requested = round_up(requested, ALIGNMENT);
        let old_epilogue = self.epilogue;

        let granted = self.provider.extend(requested).ok_or_else(|| {
            log_warn!("heap provider refused to grant {} more bytes", requested);
            HeapError::OutOfMemory
        })?;
        debug_assert_eq!(
            granted,
            old_epilogue + WSIZE,
            "heap provider must grant space contiguous with the prior epilogue"
        );

        let epilogue_word = block::header(old_epilogue);
        let flags = block::unpack_flags(epilogue_word);
        block::write_free_block(
            old_epilogue,
            requested,
            flags.contains(BlockFlags::PREV_ALLOC),
            flags.contains(BlockFlags::PREV_MIN),
        );

        let new_epilogue = old_epilogue + requested;
        block::set_header(new_epilogue, block::pack(0, false, true, false));
        self.epilogue = new_epilogue;
        log_debug!("heap extended by {} bytes, new top at {:#x}", requested, new_epilogue);

        Ok(self.coalesce(old_epilogue))
    }

    /// Merge the free block at `addr` with whichever of its physical
    /// neighbors are also free, removing any merged neighbor from its
    /// bucket and leaving the final (possibly unchanged) block written as a
    /// free block but NOT yet linked into any bucket (callers insert it).
    ///
    /// # Safety
    /// `addr` must already be written as a free block header (and footer,
    /// if non-minimum size); its neighbors, if present, must be valid block
    /// headers.
    unsafe fn coalesce(&mut self, addr: usize) -> (usize, usize) {
        let header = block::header(addr);
        let mut size = block::unpack_size(header);
        let prev_alloc = block::unpack_flags(header).contains(BlockFlags::PREV_ALLOC);

        let next_addr = addr + size;
        let next_header = block::header(next_addr);
        let next_alloc = block::unpack_flags(next_header).contains(BlockFlags::CUR_ALLOC);

        let mut result_addr = addr;

        if prev_alloc && next_alloc {
            log_trace!("coalesce {:#x}: no free neighbors", addr);
        } else if prev_alloc && !next_alloc {
            let next_size = block::unpack_size(next_header);
            self.lists.remove(next_addr, next_size);
            size += next_size;
            log_trace!("coalesce {:#x}: merged with next ({} bytes)", addr, next_size);
        } else if !prev_alloc && next_alloc {
            let prev_addr = block::prev_free_block(addr);
            let prev_size = block::block_size(prev_addr);
            self.lists.remove(prev_addr, prev_size);
            size += prev_size;
            result_addr = prev_addr;
            log_trace!("coalesce {:#x}: merged with prev ({} bytes)", addr, prev_size);
        } else {
            let prev_addr = block::prev_free_block(addr);
            let prev_size = block::block_size(prev_addr);
            self.lists.remove(prev_addr, prev_size);
            self.lists.remove(next_addr, next_size_of(next_header));
            size += prev_size + next_size_of(next_header);
            result_addr = prev_addr;
            log_trace!("coalesce {:#x}: merged with both neighbors", addr);
        }

        let result_header = block::header(result_addr);
        let result_flags = block::unpack_flags(result_header);
        block::write_free_block(
            result_addr,
            size,
            result_flags.contains(BlockFlags::PREV_ALLOC),
            result_flags.contains(BlockFlags::PREV_MIN),
        );

        let after = result_addr + size;
        block::set_prev_flags(after, false, size == MIN_BLOCK_SIZE);

        (result_addr, size)
    }

    /// Split `addr` (currently an allocated block of its full free size)
    /// down to exactly `asize` bytes if the remainder would still be a
    /// valid free block, returning the leftover to its bucket.
    ///
    /// # Safety
    /// `addr` must be an allocated block whose size is at least `asize`.
    unsafe fn maybe_split(&mut self, addr: usize, asize: usize) {
        let size = block::block_size(addr);
        if size - asize < MIN_BLOCK_SIZE {
            return;
        }

        let header = block::header(addr);
        let flags = block::unpack_flags(header);
        block::set_header(
            addr,
            block::pack(asize, flags.contains(BlockFlags::PREV_ALLOC), true, flags.contains(BlockFlags::PREV_MIN)),
        );

        let tail_addr = addr + asize;
        let tail_size = size - asize;
        block::write_free_block(tail_addr, tail_size, true, asize == MIN_BLOCK_SIZE);

        let after_tail = tail_addr + tail_size;
        block::set_prev_flags(after_tail, false, tail_size == MIN_BLOCK_SIZE);

        self.lists.insert(tail_addr, tail_size);
        log_trace!("split {:#x}: {} bytes kept, {} bytes returned at {:#x}", addr, asize, tail_size, tail_addr);
    }

    /// Allocate at least `size` bytes, returning a null pointer on failure
    /// (including `size == 0`).
    pub fn allocate(&mut self, size: usize) -> *mut u8 {
        if self.ensure_init().is_err() {
            return ptr::null_mut();
        }
        if size == 0 {
            return ptr::null_mut();
        }

        let asize = round_up(size + WSIZE, ALIGNMENT);

        let block_addr = unsafe {
            match placement::find_fit(&self.lists, asize) {
                Some(addr) => addr,
                None => {
                    let grow = core::cmp::max(asize, self.chunk_size);
                    match self.extend_heap(grow) {
                        Ok((addr, grown_size)) => {
                            self.lists.insert(addr, grown_size);
                            match placement::find_fit(&self.lists, asize) {
                                Some(found) => found,
                                None => return ptr::null_mut(),
                            }
                        }
                        Err(_) => return ptr::null_mut(),
                    }
                }
            }
        };

        unsafe {
            let found_size = block::block_size(block_addr);
            self.lists.remove(block_addr, found_size);

            let header = block::header(block_addr);
            let flags = block::unpack_flags(header);
            block::set_header(
                block_addr,
                block::pack(found_size, flags.contains(BlockFlags::PREV_ALLOC), true, flags.contains(BlockFlags::PREV_MIN)),
            );

            let next_addr = block_addr + found_size;
            block::set_prev_flags(next_addr, true, found_size == MIN_BLOCK_SIZE);

            self.maybe_split(block_addr, asize);

            (block_addr + WSIZE) as *mut u8
        }
    }

    /// Free a pointer previously returned by [`allocate`](Self::allocate),
    /// [`zero_allocate`](Self::zero_allocate), or
    /// [`reallocate`](Self::reallocate). A null pointer is a no-op.
    pub fn free(&mut self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }
        unsafe {
            let addr = ptr as usize - WSIZE;
            let header = block::header(addr);
            let flags = block::unpack_flags(header);
            debug_assert!(flags.contains(BlockFlags::CUR_ALLOC), "double free at {:#x}", addr);

            let size = block::unpack_size(header);
            block::write_free_block(
                addr,
                size,
                flags.contains(BlockFlags::PREV_ALLOC),
                flags.contains(BlockFlags::PREV_MIN),
            );

            let (final_addr, final_size) = self.coalesce(addr);
            self.lists.insert(final_addr, final_size);
        }
    }

    /// Resize the allocation at `ptr` to `size` bytes, preserving its
    /// contents up to the smaller of the old and new sizes. `ptr == null`
    /// behaves like [`allocate`](Self::allocate); `size == 0` behaves like
    /// [`free`](Self::free) and returns null.
    pub fn reallocate(&mut self, ptr: *mut u8, size: usize) -> *mut u8 {
        if size == 0 {
            self.free(ptr);
            return ptr::null_mut();
        }
        if ptr.is_null() {
            return self.allocate(size);
        }

        let new_ptr = self.allocate(size);
        if new_ptr.is_null() {
            return ptr::null_mut();
        }

        unsafe {
            let old_addr = ptr as usize - WSIZE;
            let old_size = block::block_size(old_addr);
            let old_payload = allocated_payload_size(old_size);
            let copy_size = core::cmp::min(old_payload, size);
            ptr::copy_nonoverlapping(ptr, new_ptr, copy_size);
        }
        self.free(ptr);
        new_ptr
    }

    /// Allocate space for `count` elements of `size` bytes each,
    /// zero-initialized. Returns null on overflow, on `count == 0`, or on
    /// ordinary allocation failure.
    pub fn zero_allocate(&mut self, count: usize, size: usize) -> *mut u8 {
        if count == 0 {
            return ptr::null_mut();
        }
        let total = match count.checked_mul(size) {
            Some(t) => t,
            None => {
                log_warn!("zero_allocate overflow: {} * {}", count, size);
                return ptr::null_mut();
            }
        };
        let p = self.allocate(total);
        if !p.is_null() {
            unsafe { ptr::write_bytes(p, 0, total) };
        }
        p
    }
}

/// Usable payload bytes of an allocated block of `block_size` bytes
/// (minimum-size blocks have no footer, so their whole remainder past the
/// header is payload regardless of the general "no footer when allocated"
/// rule the non-minimum case relies on).
fn allocated_payload_size(block_size: usize) -> usize {
    if block_size == MIN_BLOCK_SIZE {
        WSIZE
    } else {
        block_size - WSIZE
    }
}

#[inline]
fn next_size_of(next_header: u64) -> usize {
    block::unpack_size(next_header)
}

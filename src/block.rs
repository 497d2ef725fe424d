// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Boundary-tag primitives.
//!
//! The heap is treated as an opaque byte range addressed by `usize`
//! offsets rather than as a sequence of typed structs: boundary-tag
//! protocols (a header word here, a footer word squeezed in just before the
//! next block's header there) don't map onto a typed-pointer walk, so all
//! access below goes through raw word reads/writes at explicit byte
//! offsets.
//!
//! A block's header is one 64-bit word: bits `[63:4]` hold the size
//! (always a multiple of 16), and the low nibble holds the three
//! [`BlockFlags`].

use bitflags::bitflags;

use crate::config::{ALIGNMENT, MIN_BLOCK_SIZE, WSIZE};

bitflags! {
    /// The three flag bits packed into the low nibble of a header/footer word.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BlockFlags: u64 {
        /// This block is currently allocated.
        const CUR_ALLOC = 0b001;
        /// The physically preceding block is currently allocated.
        const PREV_ALLOC = 0b010;
        /// The physically preceding block is exactly `MIN_BLOCK_SIZE` bytes.
        const PREV_MIN = 0b100;
    }
}

const SIZE_MASK: u64 = !(ALIGNMENT as u64 - 1);
const FLAGS_MASK: u64 = ALIGNMENT as u64 - 1;

/// Pack a size and the three flag bits into a header/footer word.
#[inline]
pub fn pack(size: usize, prev_alloc: bool, cur_alloc: bool, prev_min: bool) -> u64 {
    debug_assert_eq!(size & (ALIGNMENT - 1), 0, "block size must be 16-byte aligned");
    let mut flags = BlockFlags::empty();
    flags.set(BlockFlags::PREV_ALLOC, prev_alloc);
    flags.set(BlockFlags::CUR_ALLOC, cur_alloc);
    flags.set(BlockFlags::PREV_MIN, prev_min);
    size as u64 | flags.bits()
}

/// Extract the size encoded in a header/footer word.
#[inline]
pub fn unpack_size(word: u64) -> usize {
    (word & SIZE_MASK) as usize
}

/// Extract the flag bits encoded in a header/footer word.
#[inline]
pub fn unpack_flags(word: u64) -> BlockFlags {
    BlockFlags::from_bits_truncate(word & FLAGS_MASK)
}

/// Read the raw word at `addr`.
///
/// # Safety
/// `addr` must be validly mapped for an 8-byte read.
#[inline]
pub unsafe fn read_word(addr: usize) -> u64 {
    (addr as *const u64).read()
}

/// Write the raw word at `addr`.
///
/// # Safety
/// `addr` must be validly mapped for an 8-byte write.
#[inline]
pub unsafe fn write_word(addr: usize, value: u64) {
    (addr as *mut u64).write(value);
}

/// Read a block's header word.
///
/// # Safety
/// `addr` must point at a live block header.
#[inline]
pub unsafe fn header(addr: usize) -> u64 {
    read_word(addr)
}

/// Overwrite a block's header word.
///
/// # Safety
/// `addr` must point at a live block header.
#[inline]
pub unsafe fn set_header(addr: usize, word: u64) {
    write_word(addr, word);
}

/// Byte offset of a non-minimum block's footer, relative to its header.
#[inline]
pub fn footer_offset(size: usize) -> usize {
    debug_assert!(size > MIN_BLOCK_SIZE, "minimum-size blocks have no footer");
    size - WSIZE
}

/// Address of a non-minimum block's footer.
#[inline]
pub fn footer_addr(addr: usize, size: usize) -> usize {
    addr + footer_offset(size)
}

/// Read a non-minimum free block's footer word.
///
/// # Safety
/// `addr` must be the header of a live block with `size > MIN_BLOCK_SIZE`.
#[inline]
pub unsafe fn footer(addr: usize, size: usize) -> u64 {
    read_word(footer_addr(addr, size))
}

/// Overwrite a non-minimum free block's footer word.
///
/// # Safety
/// `addr` must be the header of a live block with `size > MIN_BLOCK_SIZE`.
#[inline]
pub unsafe fn set_footer(addr: usize, size: usize, word: u64) {
    write_word(footer_addr(addr, size), word);
}

/// Write a free block's header and, if it is not minimum-size, its footer.
///
/// # Safety
/// `[addr, addr + size)` must be valid, writable heap memory.
pub unsafe fn write_free_block(addr: usize, size: usize, prev_alloc: bool, prev_min: bool) {
    let word = pack(size, prev_alloc, false, prev_min);
    set_header(addr, word);
    if size > MIN_BLOCK_SIZE {
        set_footer(addr, size, word);
    }
}

/// The size of the block whose header is at `addr`.
///
/// # Safety
/// `addr` must point at a live block header.
#[inline]
pub unsafe fn block_size(addr: usize) -> usize {
    unpack_size(header(addr))
}

/// Address of the block physically following the block at `addr`.
///
/// # Safety
/// `addr` must point at a live, non-epilogue block header.
#[inline]
pub unsafe fn next_block(addr: usize) -> usize {
    addr + block_size(addr)
}

/// Address of the block physically preceding the block at `addr`, given
/// that the predecessor is known to be free (the caller must have already
/// checked the `PREV_ALLOC` bit, an allocated predecessor's trailing word
/// is payload, not a footer, and may not be read as one).
///
/// # Safety
/// `addr` must point at a live block header whose predecessor is free.
pub unsafe fn prev_free_block(addr: usize) -> usize {
    let flags = unpack_flags(header(addr));
    if flags.contains(BlockFlags::PREV_MIN) {
        addr - MIN_BLOCK_SIZE
    } else {
        let prev_footer_addr = addr - WSIZE;
        let size = unpack_size(read_word(prev_footer_addr));
        prev_footer_addr + WSIZE - size
    }
}

/// Update the `PREV_ALLOC`/`PREV_MIN` bits of the block at `addr` to reflect
/// a (possibly new) predecessor, rewriting its footer too if it is a
/// non-minimum free block (invariant: a free block's footer always
/// bit-matches its header).
///
/// # Safety
/// `addr` must point at a live block header.
pub unsafe fn set_prev_flags(addr: usize, prev_alloc: bool, prev_min: bool) {
    let word = header(addr);
    let size = unpack_size(word);
    let cur_alloc = unpack_flags(word).contains(BlockFlags::CUR_ALLOC);
    let new_word = pack(size, prev_alloc, cur_alloc, prev_min);
    set_header(addr, new_word);
    if !cur_alloc && size > MIN_BLOCK_SIZE {
        set_footer(addr, size, new_word);
    }
}

// Offsets of the intrusive free-list link fields within a free block,
// expressed once here so the singly- and doubly-linked bucket code (see
// `freelist.rs`) shares one definition of where the pointers live.
pub(crate) const FREE_NEXT_OFFSET: usize = WSIZE;
pub(crate) const FREE_PREV_OFFSET: usize = 2 * WSIZE;

#[cfg(test)]
mod layout_asserts {
    // A plain repr(C) stand-in for a free block's two link words, used only
    // to cross-check the hand-computed FREE_NEXT_OFFSET/FREE_PREV_OFFSET
    // against a real struct layout rather than trusting arithmetic alone.
    #[repr(C)]
    struct FreeLinks {
        next: u64,
        prev: u64,
    }

    #[test]
    fn free_link_offsets_match_struct_layout() {
        use memoffset::offset_of;
        assert_eq!(offset_of!(FreeLinks, next), super::FREE_NEXT_OFFSET - super::WSIZE);
        assert_eq!(offset_of!(FreeLinks, prev), super::FREE_PREV_OFFSET - super::WSIZE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_unpack_roundtrip() {
        let w = pack(4096, true, false, true);
        assert_eq!(unpack_size(w), 4096);
        let flags = unpack_flags(w);
        assert!(flags.contains(BlockFlags::PREV_ALLOC));
        assert!(!flags.contains(BlockFlags::CUR_ALLOC));
        assert!(flags.contains(BlockFlags::PREV_MIN));
    }

    #[test]
    fn pack_unpack_all_combinations() {
        for &prev_alloc in &[true, false] {
            for &cur_alloc in &[true, false] {
                for &prev_min in &[true, false] {
                    let w = pack(32, prev_alloc, cur_alloc, prev_min);
                    assert_eq!(unpack_size(w), 32);
                    let flags = unpack_flags(w);
                    assert_eq!(flags.contains(BlockFlags::PREV_ALLOC), prev_alloc);
                    assert_eq!(flags.contains(BlockFlags::CUR_ALLOC), cur_alloc);
                    assert_eq!(flags.contains(BlockFlags::PREV_MIN), prev_min);
                }
            }
        }
    }

    #[test]
    fn footer_addr_matches_spec_formula() {
        // A 48-byte block's footer is one word before its physical end.
        assert_eq!(footer_addr(0x1000, 48), 0x1000 + 48 - WSIZE);
    }
}

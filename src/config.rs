// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Tunable constants for the block allocator.
//!
//! Everything here is a compile-time constant rather than a runtime field:
//! the bucket count and size-class boundaries are fixed by the on-disk
//! (on-heap) layout, not configuration.

/// Bytes in one machine word; also the header/footer size.
pub const WSIZE: usize = 8;

/// Required alignment of every block's payload and total size.
pub const ALIGNMENT: usize = 16;

/// Smallest possible block: header + one forward link, no footer.
pub const MIN_BLOCK_SIZE: usize = ALIGNMENT;

/// Default minimum heap growth per extension.
pub const CHUNK_SIZE: usize = 4096;

/// Number of segregated free-list buckets.
pub const NUM_BUCKETS: usize = 14;

/// A bucket scan gives up looking for a better candidate after this many
/// visited blocks and falls back to the best one seen so far.
pub const BETTER_FIT_SCAN_LIMIT: usize = 16;

/// A candidate whose excess over the request is at most this many bytes is
/// accepted immediately instead of continuing the scan.
pub const NEAR_FIT_SLACK: usize = 16;

/// Upper (inclusive) size bound of buckets 0..=12; bucket 13 takes anything
/// larger than the last entry. Bucket 0 is the fixed-size minimum-block
/// bucket (`size == 16`), so its "upper bound" and "size" coincide.
pub const BUCKET_UPPER_BOUNDS: [usize; NUM_BUCKETS - 1] =
    [16, 32, 48, 64, 128, 256, 512, 1024, 2048, 4096, 8192, 16384, 32768];

/// Round `size` up to the next multiple of `align` (`align` must be a power
/// of two).
#[inline]
pub const fn round_up(size: usize, align: usize) -> usize {
    (size + align - 1) & !(align - 1)
}

/// Map a block size to the bucket that owns it (see `BUCKET_UPPER_BOUNDS`).
#[inline]
pub fn bucket_of(size: usize) -> usize {
    let mut i = 0;
    while i < BUCKET_UPPER_BOUNDS.len() {
        if size <= BUCKET_UPPER_BOUNDS[i] {
            return i;
        }
        i += 1;
    }
    NUM_BUCKETS - 1
}

// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Error type for the allocator's internal, fallible operations.
//!
//! The public allocate/free/reallocate/zero-allocate surface collapses every
//! failure to a null payload pointer, matching the C `malloc` family this
//! core is modeled on. Internally, `HeapError` keeps the two distinct
//! causes apart so logging and tests can tell them apart.

/// Failure reason for an internal fallible operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapError {
    /// The heap provider refused to extend the heap.
    OutOfMemory,
    /// A size computation (`count * size` in zero-allocate) overflowed.
    Overflow,
}

impl core::fmt::Display for HeapError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            HeapError::OutOfMemory => f.write_str("heap provider refused to extend the heap"),
            HeapError::Overflow => f.write_str("size computation overflowed"),
        }
    }
}

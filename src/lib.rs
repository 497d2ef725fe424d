// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! A segregated free-list dynamic memory allocator core.
//!
//! `rxalloc` implements the block manager half of a `malloc`/`free`-style
//! allocator: boundary-tag block layout, a 14-bucket segregated free-list
//! index, a bounded better-fit placement policy, immediate coalescing, and
//! an offline integrity checker. It does not itself talk to the operating
//! system, it asks a [`HeapProvider`](provider::HeapProvider) for more
//! address space and otherwise treats the heap as an opaque byte range, so
//! the same core runs against a real `sbrk`/`mmap`-backed provider or an
//! in-process test arena.
//!
//! The four public operations live on [`Allocator`](allocator::Allocator):
//! [`allocate`](allocator::Allocator::allocate),
//! [`free`](allocator::Allocator::free),
//! [`reallocate`](allocator::Allocator::reallocate), and
//! [`zero_allocate`](allocator::Allocator::zero_allocate).
//!
//! ```ignore
//! // Requires the `test-utils` feature for `ArenaHeap` outside this crate's
//! // own test builds.
//! use rxalloc::{Allocator, ArenaHeap};
//!
//! let mut heap: Allocator<ArenaHeap<65536>> = Allocator::new(ArenaHeap::new());
//! let p = heap.allocate(48);
//! assert!(!p.is_null());
//! assert!(heap.integrity_check(concat!(file!(), ":", line!())));
//! heap.free(p);
//! ```

#![warn(missing_docs)]

/// Lazy init, heap extension, coalescing, splitting, and the public
/// allocate/free/reallocate/zero-allocate operations.
pub mod allocator;
/// Boundary-tag header/footer packing and implicit-list traversal.
pub mod block;
/// Offline heap integrity checker.
pub mod checker;
/// Compile-time tunables (alignment, bucket boundaries, scan bounds).
pub mod config;
/// The internal fallible-operation error type.
pub mod error;
/// The 14-bucket segregated free-list index.
pub mod freelist;
/// Bounded better-fit block placement search.
pub mod placement;
/// The `HeapProvider` trait and its backing implementations.
pub mod provider;

pub use allocator::Allocator;
pub use error::HeapError;
pub use provider::HeapProvider;

#[cfg(any(test, feature = "test-utils"))]
pub use provider::ArenaHeap;

#[cfg(feature = "sbrk")]
pub use provider::SystemHeap;

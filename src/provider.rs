// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Heap backing storage.
//!
//! The allocator core never calls `sbrk`/`mmap`/`brk` itself: it asks a
//! [`HeapProvider`] for more address space and otherwise only reads and
//! writes within the range the provider has already granted. This keeps the
//! core testable on a plain byte array and embeddable wherever the host
//! environment's actual growth mechanism lives.

/// A source of contiguous, growable heap address space.
///
/// Implementations must guarantee that addresses returned by a successful
/// [`extend`](HeapProvider::extend) stay valid (and stay mapped to the same
/// bytes) for the provider's remaining lifetime: the allocator core never
/// revalidates a previously granted range.
pub trait HeapProvider {
    /// The lowest address ever handed out by this provider, or `0` before
    /// the first successful [`extend`](HeapProvider::extend).
    fn lo(&self) -> usize;

    /// One past the highest address currently granted, or equal to
    /// [`lo`](HeapProvider::lo) before the first successful extension.
    fn hi(&self) -> usize;

    /// Grow the heap by at least `size` bytes, returning the address of the
    /// start of the new region on success.
    ///
    /// `size` is always a multiple of the allocator's alignment. A provider
    /// that cannot grant the request returns `None` and must leave its
    /// previously granted range untouched.
    fn extend(&mut self, size: usize) -> Option<usize>;
}

/// A fixed-capacity, array-backed [`HeapProvider`].
///
/// `ArenaHeap` owns `N` bytes of storage inline (no `alloc`, no `Box`), so it
/// works in `no_std` contexts with no global allocator at all; it is also
/// what the test suite uses in place of a real `sbrk`-backed provider, since
/// `original_source/` only specified the core's contract against
/// `mem_sbrk`/`mem_heap_lo`/`mem_heap_hi`, not a concrete host binding.
///
/// Available unconditionally inside this crate's own `#[cfg(test)]` modules;
/// downstream crates that want it for their own integration tests (which
/// compile as a separate crate and don't see `#[cfg(test)]`) must enable the
/// `test-utils` feature.
#[cfg(any(test, feature = "test-utils"))]
pub struct ArenaHeap<const N: usize> {
    storage: [u8; N],
    used: usize,
}

#[cfg(any(test, feature = "test-utils"))]
impl<const N: usize> ArenaHeap<N> {
    /// Create an arena with nothing granted yet.
    pub const fn new() -> Self {
        Self { storage: [0; N], used: 0 }
    }

    /// Total capacity of the backing storage.
    pub const fn capacity(&self) -> usize {
        N
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl<const N: usize> Default for ArenaHeap<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl<const N: usize> HeapProvider for ArenaHeap<N> {
    fn lo(&self) -> usize {
        self.storage.as_ptr() as usize
    }

    fn hi(&self) -> usize {
        self.storage.as_ptr() as usize + self.used
    }

    fn extend(&mut self, size: usize) -> Option<usize> {
        let new_used = self.used.checked_add(size)?;
        if new_used > N {
            return None;
        }
        let start = self.storage.as_ptr() as usize + self.used;
        self.used = new_used;
        Some(start)
    }
}

/// A [`HeapProvider`] backed by a single statically-reserved, link-time
/// region rather than a real `brk`/`mmap` system call.
///
/// There is no portable, hosted `sbrk` primitive available to a plain
/// library crate, so `SystemHeap` takes the same approach as the donor
/// codebase's own kernel heap (a fixed-size `static` array behind a
/// `#[repr(align(16))]` wrapper, grown by bumping a used-bytes counter): it
/// reserves `N` bytes once, for the life of the process, and `extend` simply
/// advances into that reservation. A hosted caller that wants the heap to
/// track real process memory growth should implement [`HeapProvider`] over
/// its platform's `mmap`/`VirtualAlloc` instead; this type exists for
/// embedders with no such facility, matching the spec's "heap only grows,
/// never returns memory to the OS" contract either way.
#[cfg(feature = "sbrk")]
#[repr(align(16))]
pub struct SystemHeap<const N: usize> {
    storage: [u8; N],
    used: usize,
}

#[cfg(feature = "sbrk")]
impl<const N: usize> SystemHeap<N> {
    /// Create a reservation with nothing granted yet.
    pub const fn new() -> Self {
        Self { storage: [0; N], used: 0 }
    }

    /// Total capacity of the reserved region.
    pub const fn capacity(&self) -> usize {
        N
    }
}

#[cfg(feature = "sbrk")]
impl<const N: usize> Default for SystemHeap<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "sbrk")]
impl<const N: usize> HeapProvider for SystemHeap<N> {
    fn lo(&self) -> usize {
        self.storage.as_ptr() as usize
    }

    fn hi(&self) -> usize {
        self.storage.as_ptr() as usize + self.used
    }

    fn extend(&mut self, size: usize) -> Option<usize> {
        let new_used = self.used.checked_add(size)?;
        if new_used > N {
            return None;
        }
        let start = self.storage.as_ptr() as usize + self.used;
        self.used = new_used;
        Some(start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extend_grows_contiguously_from_lo() {
        let mut heap = ArenaHeap::<256>::new();
        assert_eq!(heap.hi(), heap.lo());

        let first = heap.extend(64).expect("room for first extension");
        assert_eq!(first, heap.lo());
        assert_eq!(heap.hi(), heap.lo() + 64);

        let second = heap.extend(32).expect("room for second extension");
        assert_eq!(second, heap.lo() + 64);
        assert_eq!(heap.hi(), heap.lo() + 96);
    }

    #[test]
    fn extend_refuses_past_capacity() {
        let mut heap = ArenaHeap::<128>::new();
        assert!(heap.extend(64).is_some());
        assert!(heap.extend(128).is_none(), "64 + 128 exceeds the 128-byte arena");
        // A refused extension must not disturb what was already granted.
        assert_eq!(heap.hi(), heap.lo() + 64);
    }
}

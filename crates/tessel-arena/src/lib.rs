//! Arena allocator for evaluation-scoped buffers.
//!
//! Every evaluation of a compiled program gets its own [`Arena`]. Kernels
//! allocate their output cells and scratch space from it, and the whole
//! region is released in one step when the arena is dropped at the end of
//! the evaluation. Arenas are not `Sync`; concurrent evaluations each own
//! one.

#![warn(missing_docs)]

use std::cell::Cell;

use bumpalo::Bump;

/// Default initial capacity for an evaluation arena (64 KiB).
pub const DEFAULT_ARENA_CAPACITY: usize = 64 * 1024;

/// A bump arena for fast, scoped allocations.
///
/// All allocations from this arena are freed when the arena is dropped.
#[derive(Debug)]
pub struct Arena {
    bump: Bump,
    bytes_allocated: Cell<usize>,
    allocation_count: Cell<usize>,
}

impl Arena {
    /// Create a new empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self {
            bump: Bump::new(),
            bytes_allocated: Cell::new(0),
            allocation_count: Cell::new(0),
        }
    }

    /// Create a new arena with the specified initial capacity in bytes.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bump: Bump::with_capacity(capacity),
            bytes_allocated: Cell::new(0),
            allocation_count: Cell::new(0),
        }
    }

    fn record(&self, bytes: usize) {
        self.bytes_allocated.set(self.bytes_allocated.get() + bytes);
        self.allocation_count.set(self.allocation_count.get() + 1);
    }

    /// Allocate `len` default-initialized elements.
    pub fn alloc_slice_default<T: Copy + Default>(&self, len: usize) -> &mut [T] {
        self.record(len * std::mem::size_of::<T>());
        self.bump.alloc_slice_fill_default(len)
    }

    /// Allocate an iterator's items in the arena. The items are never dropped.
    pub fn alloc_from_iter<T, I>(&self, iter: I) -> &mut [T]
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: ExactSizeIterator,
    {
        let result = self.bump.alloc_slice_fill_iter(iter);
        self.record(std::mem::size_of_val(result));
        result
    }

    /// Total payload bytes handed out by this arena.
    #[must_use]
    pub fn bytes_allocated(&self) -> usize {
        self.bytes_allocated.get()
    }

    /// Number of allocations served since creation.
    #[must_use]
    pub fn allocation_count(&self) -> usize {
        self.allocation_count.get()
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::new()
    }
}

/// Run `f` with a fresh arena that is dropped when `f` returns.
pub fn with_arena<F, R>(capacity: usize, f: F) -> R
where
    F: FnOnce(&Arena) -> R,
{
    let arena = Arena::with_capacity(capacity);
    f(&arena)
}

//! Typed indices for arena-style data structures.
//!
//! Graph nodes, compiled parameter blocks and similar tables are stored in
//! flat vectors and referenced by small copyable handles instead of
//! references. [`Idx`] is implemented by those handle types and
//! [`IndexVec`] is a vector that can only be indexed by one of them.

#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::ops::Index;

/// A type usable as a typed index into an [`IndexVec`].
pub trait Idx: Copy + Eq + std::hash::Hash + fmt::Debug + 'static {
    /// Create an index from a raw `usize`.
    fn new(idx: usize) -> Self;

    /// Get the raw `usize` value of this index.
    fn index(self) -> usize;
}

/// A vector indexed by a typed index.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndexVec<I: Idx, T> {
    raw: Vec<T>,
    #[serde(skip)]
    _marker: PhantomData<fn(&I)>,
}

impl<I: Idx, T> IndexVec<I, T> {
    /// Create a new empty vector.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            raw: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Append an element and return its index.
    pub fn push(&mut self, value: T) -> I {
        let idx = I::new(self.raw.len());
        self.raw.push(value);
        idx
    }

    /// Get an element by index, if in bounds.
    #[must_use]
    pub fn get(&self, idx: I) -> Option<&T> {
        self.raw.get(idx.index())
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    /// Returns true if the vector holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }
}

impl<I: Idx, T> Default for IndexVec<I, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: Idx, T: fmt::Debug> fmt::Debug for IndexVec<I, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.raw, f)
    }
}

impl<I: Idx, T> Index<I> for IndexVec<I, T> {
    type Output = T;

    #[inline]
    fn index(&self, idx: I) -> &T {
        &self.raw[idx.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    struct TestId(u32);

    impl Idx for TestId {
        fn new(idx: usize) -> Self {
            Self(idx as u32)
        }

        fn index(self) -> usize {
            self.0 as usize
        }
    }

    #[test]
    fn test_push_returns_sequential_ids() {
        let mut v: IndexVec<TestId, &str> = IndexVec::new();
        assert!(v.is_empty());
        let a = v.push("a");
        let b = v.push("b");
        assert_eq!(a, TestId(0));
        assert_eq!(b, TestId(1));
        assert_eq!(v[b], "b");
        assert_eq!(v.len(), 2);
    }

    #[test]
    fn test_get_out_of_bounds() {
        let mut v: IndexVec<TestId, i32> = IndexVec::default();
        let id = v.push(3);
        assert_eq!(v.get(id), Some(&3));
        assert_eq!(v.get(TestId(1)), None);
    }
}

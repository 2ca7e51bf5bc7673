//! Aggregator strategies.
//!
//! Each aggregator is a small stateful fold over one cell type. A reduction
//! calls [`Aggregator::seed`] with the first cell, [`Aggregator::combine`]
//! for every following cell in scan order, and [`Aggregator::extract`] once
//! at the end. Accumulation is strictly left to right, so floating point
//! rounding follows the order cells are visited in.

use crate::cell::Cell;

/// A fold over cells of type `T`.
pub trait Aggregator<T: Cell>: Default {
    /// Starts a new fold from its first cell.
    fn seed(&mut self, value: T);

    /// Folds one more cell into the state.
    fn combine(&mut self, value: T);

    /// Returns the folded result.
    fn extract(&self) -> T;
}

/// Sum of all cells.
#[derive(Clone, Copy, Debug, Default)]
pub struct Sum<T>(T);

impl<T: Cell> Aggregator<T> for Sum<T> {
    #[inline]
    fn seed(&mut self, value: T) {
        self.0 = value;
    }

    #[inline]
    fn combine(&mut self, value: T) {
        self.0 = self.0 + value;
    }

    #[inline]
    fn extract(&self) -> T {
        self.0
    }
}

/// Product of all cells.
#[derive(Clone, Copy, Debug, Default)]
pub struct Prod<T>(T);

impl<T: Cell> Aggregator<T> for Prod<T> {
    #[inline]
    fn seed(&mut self, value: T) {
        self.0 = value;
    }

    #[inline]
    fn combine(&mut self, value: T) {
        self.0 = self.0 * value;
    }

    #[inline]
    fn extract(&self) -> T {
        self.0
    }
}

/// Largest cell.
///
/// The accumulator is only replaced when it compares less than the new
/// cell, so a NaN seed sticks and NaN cells after the seed are skipped.
#[derive(Clone, Copy, Debug, Default)]
pub struct Max<T>(T);

impl<T: Cell> Aggregator<T> for Max<T> {
    #[inline]
    fn seed(&mut self, value: T) {
        self.0 = value;
    }

    #[inline]
    fn combine(&mut self, value: T) {
        if self.0 < value {
            self.0 = value;
        }
    }

    #[inline]
    fn extract(&self) -> T {
        self.0
    }
}

/// Smallest cell, with the same NaN behavior as [`Max`].
#[derive(Clone, Copy, Debug, Default)]
pub struct Min<T>(T);

impl<T: Cell> Aggregator<T> for Min<T> {
    #[inline]
    fn seed(&mut self, value: T) {
        self.0 = value;
    }

    #[inline]
    fn combine(&mut self, value: T) {
        if value < self.0 {
            self.0 = value;
        }
    }

    #[inline]
    fn extract(&self) -> T {
        self.0
    }
}

/// Number of cells. Cell values are never inspected.
#[derive(Clone, Copy, Debug, Default)]
pub struct Count<T>(T);

impl<T: Cell> Aggregator<T> for Count<T> {
    #[inline]
    fn seed(&mut self, _value: T) {
        self.0 = T::ONE;
    }

    #[inline]
    fn combine(&mut self, _value: T) {
        self.0 = self.0 + T::ONE;
    }

    #[inline]
    fn extract(&self) -> T {
        self.0
    }
}

/// Arithmetic mean: running sum divided by the number of cells.
#[derive(Clone, Copy, Debug, Default)]
pub struct Avg<T> {
    sum: T,
    count: usize,
}

impl<T: Cell> Aggregator<T> for Avg<T> {
    #[inline]
    fn seed(&mut self, value: T) {
        self.sum = value;
        self.count = 1;
    }

    #[inline]
    fn combine(&mut self, value: T) {
        self.sum = self.sum + value;
        self.count += 1;
    }

    #[inline]
    fn extract(&self) -> T {
        self.sum / T::from_count(self.count)
    }
}

//! Cell storage for dense values.
//!
//! Kernels are written once against the [`Cell`] trait and instantiated for
//! `f64` and `f32`. [`TypedCells`] is the borrowed, width-tagged form kept on
//! the value stack; [`OwnedCells`] is what callers get back.

use std::fmt;
use std::ops::{Add, Div, Mul};
use tessel_tensor_ir::CellType;

/// A numeric cell type the interpreter can compute on.
pub trait Cell:
    Copy
    + Default
    + PartialOrd
    + Add<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + fmt::Debug
    + Send
    + Sync
    + 'static
{
    /// The matching type-level tag.
    const CELL_TYPE: CellType;

    /// The multiplicative identity.
    const ONE: Self;

    /// Converts a cell count to this type.
    fn from_count(n: usize) -> Self;

    /// Views width-tagged cells as a slice of `Self`.
    ///
    /// # Panics
    ///
    /// Panics if `cells` has a different width. Cell types are checked when
    /// a program is compiled and when inputs are bound, so a mismatch here is
    /// a bug in the caller.
    fn typify(cells: TypedCells<'_>) -> &[Self];

    /// Tags a slice with its width.
    fn wrap(cells: &[Self]) -> TypedCells<'_>;
}

impl Cell for f64 {
    const CELL_TYPE: CellType = CellType::Double;
    const ONE: Self = 1.0;

    #[inline]
    #[allow(clippy::cast_precision_loss)]
    fn from_count(n: usize) -> Self {
        n as f64
    }

    #[inline]
    fn typify(cells: TypedCells<'_>) -> &[Self] {
        match cells {
            TypedCells::Double(cells) => cells,
            TypedCells::Float(_) => panic!("expected double cells, found float"),
        }
    }

    #[inline]
    fn wrap(cells: &[Self]) -> TypedCells<'_> {
        TypedCells::Double(cells)
    }
}

impl Cell for f32 {
    const CELL_TYPE: CellType = CellType::Float;
    const ONE: Self = 1.0;

    #[inline]
    #[allow(clippy::cast_precision_loss)]
    fn from_count(n: usize) -> Self {
        n as f32
    }

    #[inline]
    fn typify(cells: TypedCells<'_>) -> &[Self] {
        match cells {
            TypedCells::Float(cells) => cells,
            TypedCells::Double(_) => panic!("expected float cells, found double"),
        }
    }

    #[inline]
    fn wrap(cells: &[Self]) -> TypedCells<'_> {
        TypedCells::Float(cells)
    }
}

/// Borrowed row-major cells tagged with their width.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TypedCells<'a> {
    /// 64-bit cells.
    Double(&'a [f64]),
    /// 32-bit cells.
    Float(&'a [f32]),
}

impl TypedCells<'_> {
    /// The cell type of these cells.
    #[must_use]
    pub const fn cell_type(&self) -> CellType {
        match self {
            Self::Double(_) => CellType::Double,
            Self::Float(_) => CellType::Float,
        }
    }

    /// Number of cells.
    #[must_use]
    pub const fn len(&self) -> usize {
        match self {
            Self::Double(cells) => cells.len(),
            Self::Float(cells) => cells.len(),
        }
    }

    /// Returns true if there are no cells.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the cell at `idx` widened to `f64`.
    #[must_use]
    pub fn get_f64(&self, idx: usize) -> Option<f64> {
        match self {
            Self::Double(cells) => cells.get(idx).copied(),
            Self::Float(cells) => cells.get(idx).map(|&c| f64::from(c)),
        }
    }

    /// Copies the cells out of whatever region they are borrowed from.
    #[must_use]
    pub fn to_owned_cells(&self) -> OwnedCells {
        match self {
            Self::Double(cells) => OwnedCells::Double(cells.to_vec()),
            Self::Float(cells) => OwnedCells::Float(cells.to_vec()),
        }
    }
}

impl<'a> From<&'a [f64]> for TypedCells<'a> {
    fn from(cells: &'a [f64]) -> Self {
        Self::Double(cells)
    }
}

impl<'a> From<&'a [f32]> for TypedCells<'a> {
    fn from(cells: &'a [f32]) -> Self {
        Self::Float(cells)
    }
}

/// Owned row-major cells tagged with their width.
#[derive(Clone, Debug, PartialEq)]
pub enum OwnedCells {
    /// 64-bit cells.
    Double(Vec<f64>),
    /// 32-bit cells.
    Float(Vec<f32>),
}

impl OwnedCells {
    /// Borrows the cells.
    #[must_use]
    pub fn as_typed(&self) -> TypedCells<'_> {
        match self {
            Self::Double(cells) => TypedCells::Double(cells),
            Self::Float(cells) => TypedCells::Float(cells),
        }
    }

    /// The cell type of these cells.
    #[must_use]
    pub fn cell_type(&self) -> CellType {
        self.as_typed().cell_type()
    }

    /// Number of cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.as_typed().len()
    }

    /// Returns true if there are no cells.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Vec<f64>> for OwnedCells {
    fn from(cells: Vec<f64>) -> Self {
        Self::Double(cells)
    }
}

impl From<Vec<f32>> for OwnedCells {
    fn from(cells: Vec<f32>) -> Self {
        Self::Float(cells)
    }
}

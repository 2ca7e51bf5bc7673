//! Runtime values.

use crate::cell::{OwnedCells, TypedCells};
use tessel_tensor_ir::ValueType;

/// A dense value on the evaluation stack.
///
/// Both the type and the cells are borrowed: the type from the compiled
/// program, the cells from an input or from the evaluation arena.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Value<'a> {
    ty: &'a ValueType,
    cells: TypedCells<'a>,
}

impl<'a> Value<'a> {
    /// Pairs a type with its cells.
    ///
    /// The cell count must match the type's dense subspace size.
    #[must_use]
    pub fn new(ty: &'a ValueType, cells: TypedCells<'a>) -> Self {
        debug_assert_eq!(ty.cell_type(), cells.cell_type());
        debug_assert_eq!(ty.dense_subspace_size(), cells.len());
        Self { ty, cells }
    }

    /// The value's type.
    #[must_use]
    pub fn ty(&self) -> &'a ValueType {
        self.ty
    }

    /// The value's cells.
    #[must_use]
    pub fn cells(&self) -> TypedCells<'a> {
        self.cells
    }

    /// Returns the single cell of a scalar value, widened to `f64`.
    #[must_use]
    pub fn as_scalar(&self) -> Option<f64> {
        if self.ty.is_scalar() {
            self.cells.get_f64(0)
        } else {
            None
        }
    }

    /// Copies the value out of the arena it lives in.
    #[must_use]
    pub fn to_owned_value(&self) -> OwnedValue {
        OwnedValue {
            ty: self.ty.clone(),
            cells: self.cells.to_owned_cells(),
        }
    }
}

/// A dense value owned by the caller.
#[derive(Clone, Debug, PartialEq)]
pub struct OwnedValue {
    /// The value's type.
    pub ty: ValueType,
    /// Row-major cells.
    pub cells: OwnedCells,
}

impl OwnedValue {
    /// Returns the single cell of a scalar value, widened to `f64`.
    #[must_use]
    pub fn as_scalar(&self) -> Option<f64> {
        if self.ty.is_scalar() {
            self.cells.as_typed().get_f64(0)
        } else {
            None
        }
    }
}

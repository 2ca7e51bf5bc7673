//! # Tessel Tensor IR
//!
//! Value types and the tensor function graph that the Tessel interpreter
//! compiles and executes.
//!
//! ## Overview
//!
//! A tensor value has a [`ValueType`]: an ordered list of named
//! [`Dimension`]s plus a [`CellType`]. Indexed dimensions carry a fixed
//! size; mapped dimensions do not, and a type with any mapped dimension is
//! not dense. Dense values are stored as flat row-major cell arrays in
//! declared dimension order.
//!
//! Computations are described by a [`graph::Graph`], an append-only arena
//! of nodes referencing their children by [`graph::NodeId`]. The
//! [`optimize`] module holds rewrite rules that replace generic nodes with
//! specialized ones before compilation.
//!
//! ## Pipeline Position
//!
//! ```text
//! [Graph]       <- This crate: typed tensor functions
//!     |
//!     | optimize::optimize_graph
//!     v
//! [Graph']      <- generic reduces replaced where eligible
//!     |
//!     v
//! [Program]     <- tessel-eval: flat instruction list
//! ```
//!
//! ## Main Types
//!
//! - [`ValueType`]: Dimensions and cell type of a value
//! - [`CellType`]: Element types
//! - [`Aggr`]: Aggregation kinds usable by reductions
//! - [`graph::Graph`]: The tensor function arena

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod graph;
pub mod optimize;
pub mod type_spec;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use std::str::FromStr;

pub use type_spec::TypeSpecError;

/// Tensor cell types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellType {
    /// 64-bit floating point.
    Double,
    /// 32-bit floating point.
    Float,
    /// Brain floating point (bfloat16).
    BFloat16,
    /// 8-bit signed integer.
    Int8,
}

impl CellType {
    /// Returns true if cells of this type can be stored and computed on.
    ///
    /// Only the two IEEE float widths have a cell representation in the
    /// interpreter; the others are accepted by the type system only.
    #[must_use]
    pub const fn is_supported(self) -> bool {
        matches!(self, Self::Double | Self::Float)
    }

    /// The name used in type specs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Double => "double",
            Self::Float => "float",
            Self::BFloat16 => "bfloat16",
            Self::Int8 => "int8",
        }
    }

    /// Looks up a cell type by its type-spec name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "double" => Some(Self::Double),
            "float" => Some(Self::Float),
            "bfloat16" => Some(Self::BFloat16),
            "int8" => Some(Self::Int8),
            _ => None,
        }
    }
}

impl fmt::Display for CellType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A named dimension of a tensor type.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimension {
    /// Dimension name, unique within a type.
    pub name: String,
    /// Size for indexed dimensions, `None` for mapped dimensions.
    pub size: Option<usize>,
}

impl Dimension {
    /// Creates an indexed dimension. `size` must be positive.
    #[must_use]
    pub fn indexed(name: impl Into<String>, size: usize) -> Self {
        debug_assert!(size > 0, "indexed dimensions must have a positive size");
        Self {
            name: name.into(),
            size: Some(size),
        }
    }

    /// Creates a mapped dimension.
    #[must_use]
    pub fn mapped(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: None,
        }
    }

    /// Returns true if this dimension has a fixed size.
    #[must_use]
    pub const fn is_indexed(&self) -> bool {
        self.size.is_some()
    }
}

/// The type of a tensor value.
///
/// Dimensions are kept in declared order. A type with no dimensions is a
/// scalar of its cell type.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValueType {
    cell_type: CellType,
    dimensions: SmallVec<[Dimension; 4]>,
}

impl ValueType {
    /// Creates a scalar type.
    #[must_use]
    pub fn scalar(cell_type: CellType) -> Self {
        Self {
            cell_type,
            dimensions: SmallVec::new(),
        }
    }

    /// Creates a tensor type from dimensions in declared order.
    #[must_use]
    pub fn tensor(cell_type: CellType, dimensions: impl IntoIterator<Item = Dimension>) -> Self {
        Self {
            cell_type,
            dimensions: dimensions.into_iter().collect(),
        }
    }

    /// Creates a dense tensor type from `(name, size)` pairs.
    #[must_use]
    pub fn dense(cell_type: CellType, dims: &[(&str, usize)]) -> Self {
        Self::tensor(
            cell_type,
            dims.iter().map(|&(name, size)| Dimension::indexed(name, size)),
        )
    }

    /// Returns the cell type.
    #[must_use]
    pub const fn cell_type(&self) -> CellType {
        self.cell_type
    }

    /// Returns the dimensions in declared order.
    #[must_use]
    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    /// Returns the number of dimensions.
    #[must_use]
    pub fn rank(&self) -> usize {
        self.dimensions.len()
    }

    /// Returns true if this type has no dimensions.
    #[must_use]
    pub fn is_scalar(&self) -> bool {
        self.dimensions.is_empty()
    }

    /// Returns true if every dimension is indexed.
    #[must_use]
    pub fn is_dense(&self) -> bool {
        self.dimensions.iter().all(Dimension::is_indexed)
    }

    /// Returns the position of the named dimension.
    #[must_use]
    pub fn dimension_index(&self, name: &str) -> Option<usize> {
        self.dimensions.iter().position(|d| d.name == name)
    }

    /// Product of all indexed dimension sizes.
    ///
    /// For dense types this is the number of cells.
    #[must_use]
    pub fn dense_subspace_size(&self) -> usize {
        self.dimensions.iter().filter_map(|d| d.size).product()
    }

    /// Result type of reducing the named dimensions.
    ///
    /// An empty list reduces every dimension. The cell type is kept.
    ///
    /// # Errors
    ///
    /// Returns [`TensorIrError::UnknownDimension`] if a name is not a
    /// dimension of this type.
    pub fn reduce<S: AsRef<str>>(&self, dims: &[S]) -> Result<Self, TensorIrError> {
        if dims.is_empty() {
            return Ok(Self::scalar(self.cell_type));
        }
        for dim in dims {
            if self.dimension_index(dim.as_ref()).is_none() {
                return Err(TensorIrError::UnknownDimension {
                    name: dim.as_ref().to_string(),
                    ty: self.to_string(),
                });
            }
        }
        Ok(Self {
            cell_type: self.cell_type,
            dimensions: self
                .dimensions
                .iter()
                .filter(|d| !dims.iter().any(|r| r.as_ref() == d.name))
                .cloned()
                .collect(),
        })
    }

    /// Result type of removing the dimension at `dim_idx`.
    ///
    /// # Panics
    ///
    /// Panics if `dim_idx` is out of bounds.
    #[must_use]
    pub fn without_dimension(&self, dim_idx: usize) -> Self {
        let mut dimensions = self.dimensions.clone();
        dimensions.remove(dim_idx);
        Self {
            cell_type: self.cell_type,
            dimensions,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.dimensions.is_empty() {
            return f.write_str(self.cell_type.name());
        }
        f.write_str("tensor")?;
        if self.cell_type != CellType::Double {
            write!(f, "<{}>", self.cell_type)?;
        }
        f.write_str("(")?;
        for (i, dim) in self.dimensions.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            match dim.size {
                Some(size) => write!(f, "{}[{size}]", dim.name)?,
                None => write!(f, "{}{{}}", dim.name)?,
            }
        }
        f.write_str(")")
    }
}

impl FromStr for ValueType {
    type Err = TypeSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        type_spec::parse(s)
    }
}

/// Aggregation kinds usable by reductions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Aggr {
    /// Arithmetic mean.
    Avg,
    /// Number of cells.
    Count,
    /// Product.
    Prod,
    /// Sum.
    Sum,
    /// Maximum.
    Max,
    /// Minimum.
    Min,
}

impl Aggr {
    /// Every aggregation kind.
    pub const ALL: [Self; 6] = [
        Self::Avg,
        Self::Count,
        Self::Prod,
        Self::Sum,
        Self::Max,
        Self::Min,
    ];

    /// The lowercase name of this aggregator.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Avg => "avg",
            Self::Count => "count",
            Self::Prod => "prod",
            Self::Sum => "sum",
            Self::Max => "max",
            Self::Min => "min",
        }
    }
}

impl fmt::Display for Aggr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Aggr {
    type Err = TensorIrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.name() == s)
            .ok_or_else(|| TensorIrError::UnknownAggr(s.to_string()))
    }
}

/// Errors raised while building tensor functions.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TensorIrError {
    /// A reduce named a dimension the child type does not have.
    #[error("unknown dimension '{name}' in {ty}")]
    UnknownDimension {
        /// The dimension name.
        name: String,
        /// The child type, rendered as a type spec.
        ty: String,
    },

    /// An aggregator name was not recognized.
    #[error("unknown aggregator: {0}")]
    UnknownAggr(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_type_support() {
        assert!(CellType::Double.is_supported());
        assert!(CellType::Float.is_supported());
        assert!(!CellType::BFloat16.is_supported());
        assert!(!CellType::Int8.is_supported());
    }

    #[test]
    fn test_dense_subspace_size() {
        let ty = ValueType::dense(CellType::Double, &[("a", 2), ("b", 3), ("c", 4)]);
        assert_eq!(ty.dense_subspace_size(), 24);
        assert_eq!(ty.rank(), 3);
        assert!(ty.is_dense());
        assert_eq!(ValueType::scalar(CellType::Float).dense_subspace_size(), 1);
    }

    #[test]
    fn test_mapped_dimension_is_not_dense() {
        let ty = ValueType::tensor(
            CellType::Double,
            [Dimension::mapped("cat"), Dimension::indexed("x", 3)],
        );
        assert!(!ty.is_dense());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "positive size")]
    fn test_zero_sized_dimension_panics() {
        let _ = ValueType::dense(CellType::Double, &[("x", 0)]);
    }

    #[test]
    fn test_dimension_index_uses_declared_order() {
        let ty = ValueType::dense(CellType::Float, &[("z", 2), ("a", 5)]);
        assert_eq!(ty.dimension_index("z"), Some(0));
        assert_eq!(ty.dimension_index("a"), Some(1));
        assert_eq!(ty.dimension_index("q"), None);
    }

    #[test]
    fn test_reduce_type() {
        let ty = ValueType::dense(CellType::Float, &[("a", 2), ("b", 3), ("c", 4)]);
        let reduced = ty.reduce(&["b"]).unwrap();
        assert_eq!(reduced, ValueType::dense(CellType::Float, &[("a", 2), ("c", 4)]));

        let all: &[&str] = &[];
        assert_eq!(ty.reduce(all).unwrap(), ValueType::scalar(CellType::Float));

        assert!(matches!(
            ty.reduce(&["nope"]),
            Err(TensorIrError::UnknownDimension { .. })
        ));
    }

    #[test]
    fn test_without_dimension() {
        let ty = ValueType::dense(CellType::Double, &[("a", 2), ("b", 3)]);
        assert_eq!(
            ty.without_dimension(0),
            ValueType::dense(CellType::Double, &[("b", 3)])
        );
    }

    #[test]
    fn test_value_type_display() {
        let ty = ValueType::tensor(
            CellType::Float,
            [Dimension::indexed("x", 2), Dimension::mapped("y")],
        );
        assert_eq!(ty.to_string(), "tensor<float>(x[2],y{})");
        let ty = ValueType::dense(CellType::Double, &[("x", 3)]);
        assert_eq!(ty.to_string(), "tensor(x[3])");
        assert_eq!(ValueType::scalar(CellType::Double).to_string(), "double");
    }

    #[test]
    fn test_aggr_names() {
        for aggr in Aggr::ALL {
            assert_eq!(aggr.name().parse::<Aggr>().unwrap(), aggr);
        }
        assert!("median".parse::<Aggr>().is_err());
    }
}

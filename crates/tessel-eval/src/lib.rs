//! # Tessel Eval
//!
//! Compiles tensor function graphs into flat instruction lists and runs
//! them over dense cell buffers.
//!
//! ## Overview
//!
//! A [`Program`] is compiled once from a [`tessel_tensor_ir::graph::Graph`].
//! Every node becomes one [`Instruction`]: a monomorphized kernel plus a
//! [`ParamId`] pointing at its precomputed parameters in the program's
//! [`Stash`]. Evaluation runs the instructions over a value stack; every
//! intermediate buffer is bump-allocated from a caller-supplied
//! [`tessel_arena::Arena`] and released when that arena is dropped.
//!
//! ## Kernels
//!
//! - [`single_reduce`]: reduce of one dimension of a dense value, as a
//!   strided fold over an `[outer, dim, inner]` view
//! - [`reduce`]: reduce of any set of dimensions, the fallback for nodes
//!   the rewrite pass did not specialize
//!
//! Both are generic over the [`Cell`] type and the [`Aggregator`], and the
//! concrete instantiation is selected when the program is compiled.
//!
//! ## Pipeline Position
//!
//! ```text
//! [Graph]      <- tessel-tensor-ir
//!     |
//!     | Program::compile
//!     v
//! [Program]    <- This crate
//!     |
//!     | Program::eval (per-evaluation Arena)
//!     v
//! [Value]
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod aggr;
pub mod cell;
pub mod program;
pub mod reduce;
pub mod single_reduce;
pub mod state;
pub mod value;

pub use aggr::Aggregator;
pub use cell::{Cell, OwnedCells, TypedCells};
pub use program::{CompileError, EvalError, InjectParams, Program};
pub use single_reduce::{
    compile_single_reduce, fold_axis, reduce_dense, select_single_reduce_op, single_reduce_op,
    SingleReduceParams,
};
pub use state::{Instruction, OpFn, OpParams, ParamId, Stash, State};
pub use value::{OwnedValue, Value};

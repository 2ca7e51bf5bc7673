//! Dense reduce of a single dimension.
//!
//! A dense value of rank `n` with the dimension `d` reduced is viewed as a
//! three-dimensional array `[outer, dim, inner]`: `outer` is the product of
//! the sizes before `d`, `inner` the product of the sizes after it. Every
//! output cell is then a strided fold over `dim` source cells, `inner`
//! apart. The shape is derived once at compile time; the kernel itself only
//! does index arithmetic.

use crate::aggr::{Aggregator, Avg, Count, Max, Min, Prod, Sum};
use crate::cell::Cell;
use crate::state::{Instruction, OpFn, ParamId, Stash, State};
use crate::value::Value;
use tessel_tensor_ir::{Aggr, CellType, ValueType};

/// Shape parameters of a single-dimension reduce.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SingleReduceParams {
    /// Type of the reduced value.
    pub result_type: ValueType,
    /// Product of the dimension sizes before the reduced one.
    pub outer_size: usize,
    /// Size of the reduced dimension.
    pub dim_size: usize,
    /// Product of the dimension sizes after the reduced one.
    pub inner_size: usize,
}

impl SingleReduceParams {
    /// Derives the shape of reducing dimension `dim_idx` of `child_type`.
    ///
    /// `child_type` must be dense and `dim_idx` must be a valid position.
    #[must_use]
    pub fn new(result_type: ValueType, child_type: &ValueType, dim_idx: usize) -> Self {
        let dims = child_type.dimensions();
        debug_assert!(dim_idx < dims.len(), "dim_idx {dim_idx} out of range for {child_type}");
        debug_assert!(child_type.is_dense());

        let size = |idx: usize| dims[idx].size.unwrap_or(1);
        let outer_size = (0..dim_idx).map(size).product();
        let dim_size = size(dim_idx);
        let inner_size = (dim_idx + 1..dims.len()).map(size).product();

        Self {
            result_type,
            outer_size,
            dim_size,
            inner_size,
        }
    }

    /// Number of cells in the result.
    #[must_use]
    pub fn output_size(&self) -> usize {
        self.outer_size * self.inner_size
    }
}

/// Folds `dim_size` cells of `cells`, starting at `start` and `stride` apart.
#[inline]
pub fn fold_axis<T: Cell, A: Aggregator<T>>(
    cells: &[T],
    start: usize,
    stride: usize,
    dim_size: usize,
    aggr: &mut A,
) -> T {
    aggr.seed(cells[start]);
    let mut idx = start;
    for _ in 1..dim_size {
        idx += stride;
        aggr.combine(cells[idx]);
    }
    aggr.extract()
}

/// Reduces `src` into `dst` according to `params`.
///
/// `src` holds `outer * dim * inner` cells and `dst` holds `outer * inner`.
pub fn reduce_dense<T: Cell, A: Aggregator<T>>(
    src: &[T],
    params: &SingleReduceParams,
    dst: &mut [T],
) {
    let SingleReduceParams {
        outer_size,
        dim_size,
        inner_size,
        ..
    } = *params;
    debug_assert_eq!(src.len(), outer_size * dim_size * inner_size);
    debug_assert_eq!(dst.len(), outer_size * inner_size);

    let mut aggr = A::default();
    for (outer, row) in dst.chunks_exact_mut(inner_size).enumerate() {
        let base = outer * dim_size * inner_size;
        for (inner, out) in row.iter_mut().enumerate() {
            *out = fold_axis(src, base + inner, inner_size, dim_size, &mut aggr);
        }
    }
}

/// The instruction body: replaces the top of the stack by its reduction.
pub fn single_reduce_op<T: Cell, A: Aggregator<T>>(state: &mut State<'_>, param: ParamId) {
    let params: &SingleReduceParams = state.stash().get(param);
    let src = T::typify(state.peek(0).cells());
    let dst = state.arena().alloc_slice_default::<T>(params.output_size());
    reduce_dense::<T, A>(src, params, dst);
    let dst: &[T] = dst;
    state.pop_push(Value::new(&params.result_type, T::wrap(dst)));
}

fn select_for_cell<T: Cell>(aggr: Aggr) -> OpFn {
    match aggr {
        Aggr::Avg => single_reduce_op::<T, Avg<T>>,
        Aggr::Count => single_reduce_op::<T, Count<T>>,
        Aggr::Prod => single_reduce_op::<T, Prod<T>>,
        Aggr::Sum => single_reduce_op::<T, Sum<T>>,
        Aggr::Max => single_reduce_op::<T, Max<T>>,
        Aggr::Min => single_reduce_op::<T, Min<T>>,
    }
}

/// Picks the kernel instantiation for a cell type and aggregator.
///
/// # Panics
///
/// Panics on a cell type the interpreter cannot compute on. The rewrite
/// rule only produces single reduces over supported cell types.
#[must_use]
pub fn select_single_reduce_op(cell_type: CellType, aggr: Aggr) -> OpFn {
    match cell_type {
        CellType::Double => select_for_cell::<f64>(aggr),
        CellType::Float => select_for_cell::<f32>(aggr),
        CellType::BFloat16 | CellType::Int8 => {
            unreachable!("no single reduce kernel for {cell_type} cells")
        }
    }
}

/// Emits the instruction reducing dimension `dim_idx` of a `child_type`
/// value with `aggr`, storing its parameters in `stash`.
#[must_use]
pub fn compile_single_reduce(
    result_type: &ValueType,
    child_type: &ValueType,
    dim_idx: usize,
    aggr: Aggr,
    stash: &mut Stash,
) -> Instruction {
    let op = select_single_reduce_op(child_type.cell_type(), aggr);
    let params = SingleReduceParams::new(result_type.clone(), child_type, dim_idx);
    let param = stash.create(params);
    Instruction::new(op, param, "dense_single_reduce")
}

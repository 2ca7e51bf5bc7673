//! Generic dense reduce over any set of dimensions.
//!
//! Used for reduces the rewrite pass left alone (several dimensions, every
//! dimension, or optimization turned off). The source is walked once in
//! row-major order and each cell is folded into the aggregator of the
//! output cell its kept coordinates address. Every output therefore sees
//! its source cells in increasing index order, the same order the
//! single-dimension kernel uses, so both produce identical results.

use crate::aggr::{Aggregator, Avg, Count, Max, Min, Prod, Sum};
use crate::cell::Cell;
use crate::state::{Instruction, OpFn, ParamId, Stash, State};
use crate::value::Value;
use smallvec::SmallVec;
use tessel_arena::Arena;
use tessel_tensor_ir::{Aggr, CellType, ValueType};

/// Shape parameters of a generic reduce.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReduceParams {
    /// Type of the reduced value.
    pub result_type: ValueType,
    /// Sizes of the source dimensions.
    pub in_sizes: SmallVec<[usize; 4]>,
    /// Output stride of each source dimension, zero for reduced ones.
    pub out_strides: SmallVec<[usize; 4]>,
    /// Number of output cells.
    pub out_size: usize,
}

impl ReduceParams {
    /// Derives the shape of reducing `dims` of `child_type`. An empty list
    /// reduces every dimension.
    ///
    /// # Panics
    ///
    /// Panics if a name is not a dimension of `child_type`.
    #[must_use]
    pub fn new<S: AsRef<str>>(result_type: ValueType, child_type: &ValueType, dims: &[S]) -> Self {
        let rank = child_type.rank();
        let mut reduced: SmallVec<[bool; 4]> = SmallVec::from_elem(dims.is_empty(), rank);
        for name in dims {
            let name = name.as_ref();
            let idx = child_type
                .dimension_index(name)
                .unwrap_or_else(|| panic!("reduced dimension '{name}' not in {child_type}"));
            reduced[idx] = true;
        }

        let in_sizes: SmallVec<[usize; 4]> = child_type
            .dimensions()
            .iter()
            .map(|d| d.size.unwrap_or(1))
            .collect();

        let mut out_strides: SmallVec<[usize; 4]> = SmallVec::from_elem(0, rank);
        let mut stride = 1;
        for idx in (0..rank).rev() {
            if !reduced[idx] {
                out_strides[idx] = stride;
                stride *= in_sizes[idx];
            }
        }

        Self {
            result_type,
            in_sizes,
            out_strides,
            out_size: stride,
        }
    }
}

/// Reduces `src` into `dst` according to `params`. Per-output aggregator
/// state is scratch allocated from `arena`.
pub fn reduce_generic<T: Cell, A: Aggregator<T>>(
    arena: &Arena,
    src: &[T],
    params: &ReduceParams,
    dst: &mut [T],
) {
    debug_assert_eq!(src.len(), params.in_sizes.iter().product::<usize>());
    debug_assert_eq!(dst.len(), params.out_size);

    let rank = params.in_sizes.len();
    let aggrs = arena.alloc_from_iter((0..params.out_size).map(|_| A::default()));
    let seen: &mut [bool] = arena.alloc_slice_default(params.out_size);
    let mut coords: SmallVec<[usize; 4]> = SmallVec::from_elem(0, rank);
    let mut out = 0;

    for &cell in src {
        if seen[out] {
            aggrs[out].combine(cell);
        } else {
            aggrs[out].seed(cell);
            seen[out] = true;
        }
        // advance the row-major odometer, keeping `out` in step
        for idx in (0..rank).rev() {
            coords[idx] += 1;
            out += params.out_strides[idx];
            if coords[idx] < params.in_sizes[idx] {
                break;
            }
            out -= params.out_strides[idx] * coords[idx];
            coords[idx] = 0;
        }
    }

    for (slot, aggr) in dst.iter_mut().zip(aggrs.iter()) {
        *slot = aggr.extract();
    }
}

/// The instruction body: replaces the top of the stack by its reduction.
pub fn reduce_op<T: Cell, A: Aggregator<T>>(state: &mut State<'_>, param: ParamId) {
    let params: &ReduceParams = state.stash().get(param);
    let src = T::typify(state.peek(0).cells());
    let dst = state.arena().alloc_slice_default::<T>(params.out_size);
    reduce_generic::<T, A>(state.arena(), src, params, dst);
    let dst: &[T] = dst;
    state.pop_push(Value::new(&params.result_type, T::wrap(dst)));
}

fn select_for_cell<T: Cell>(aggr: Aggr) -> OpFn {
    match aggr {
        Aggr::Avg => reduce_op::<T, Avg<T>>,
        Aggr::Count => reduce_op::<T, Count<T>>,
        Aggr::Prod => reduce_op::<T, Prod<T>>,
        Aggr::Sum => reduce_op::<T, Sum<T>>,
        Aggr::Max => reduce_op::<T, Max<T>>,
        Aggr::Min => reduce_op::<T, Min<T>>,
    }
}

/// Picks the generic kernel instantiation for a cell type and aggregator.
///
/// # Panics
///
/// Panics on an unsupported cell type; the compiler rejects those first.
#[must_use]
pub fn select_reduce_op(cell_type: CellType, aggr: Aggr) -> OpFn {
    match cell_type {
        CellType::Double => select_for_cell::<f64>(aggr),
        CellType::Float => select_for_cell::<f32>(aggr),
        CellType::BFloat16 | CellType::Int8 => {
            unreachable!("no reduce kernel for {cell_type} cells")
        }
    }
}

/// Emits the instruction reducing `dims` of a `child_type` value.
#[must_use]
pub fn compile_reduce<S: AsRef<str>>(
    result_type: &ValueType,
    child_type: &ValueType,
    dims: &[S],
    aggr: Aggr,
    stash: &mut Stash,
) -> Instruction {
    let op = select_reduce_op(child_type.cell_type(), aggr);
    let param = stash.create(ReduceParams::new(result_type.clone(), child_type, dims));
    Instruction::new(op, param, "reduce")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cube() -> ValueType {
        ValueType::dense(CellType::Double, &[("a", 2), ("b", 3), ("c", 4)])
    }

    fn run<A: Aggregator<f64>>(dims: &[&str], src: &[f64]) -> Vec<f64> {
        let ty = cube();
        let result = ty.reduce(dims).unwrap();
        let params = ReduceParams::new(result, &ty, dims);
        let mut dst = vec![0.0; params.out_size];
        reduce_generic::<f64, A>(&Arena::new(), src, &params, &mut dst);
        dst
    }

    #[test]
    fn test_params_strides() {
        let ty = cube();
        let p = ReduceParams::new(ty.reduce(&["b"]).unwrap(), &ty, &["b"]);
        assert_eq!(p.in_sizes.as_slice(), &[2, 3, 4]);
        assert_eq!(p.out_strides.as_slice(), &[4, 0, 1]);
        assert_eq!(p.out_size, 8);
    }

    #[test]
    fn test_params_reduce_all() {
        let ty = cube();
        let none: &[&str] = &[];
        let p = ReduceParams::new(ValueType::scalar(CellType::Double), &ty, none);
        assert_eq!(p.out_strides.as_slice(), &[0, 0, 0]);
        assert_eq!(p.out_size, 1);
    }

    #[test]
    fn test_single_dimension_sum() {
        let src: Vec<f64> = (0..24).map(f64::from).collect();
        assert_eq!(
            run::<Sum<f64>>(&["b"], &src),
            vec![12.0, 15.0, 18.0, 21.0, 48.0, 51.0, 54.0, 57.0]
        );
    }

    #[test]
    fn test_two_dimensions() {
        let src: Vec<f64> = (0..24).map(f64::from).collect();
        // keeps b: sums over a and c of (a*12 + b*4 + c)
        let expected: Vec<f64> = (0..3)
            .map(|b| {
                (0..2)
                    .flat_map(|a| (0..4).map(move |c| f64::from(a * 12 + b * 4 + c)))
                    .sum::<f64>()
            })
            .collect();
        assert_eq!(run::<Sum<f64>>(&["a", "c"], &src), expected);
        assert_eq!(run::<Count<f64>>(&["c", "a"], &src), vec![8.0; 3]);
    }

    #[test]
    fn test_all_dimensions() {
        let src: Vec<f64> = (1..=24).map(f64::from).collect();
        let none: &[&str] = &[];
        assert_eq!(run::<Max<f64>>(none, &src), vec![24.0]);
        assert_eq!(run::<Avg<f64>>(none, &src), vec![12.5]);
    }

    #[test]
    fn test_scratch_comes_from_arena() {
        let ty = cube();
        let params = ReduceParams::new(ty.reduce(&["a", "c"]).unwrap(), &ty, &["a", "c"]);
        let src: Vec<f64> = (0..24).map(f64::from).collect();
        let arena = Arena::new();
        let mut dst = vec![0.0; params.out_size];
        reduce_generic::<f64, Avg<f64>>(&arena, &src, &params, &mut dst);
        assert_eq!(arena.allocation_count(), 2);
        assert_eq!(
            arena.bytes_allocated(),
            3 * (std::mem::size_of::<Avg<f64>>() + std::mem::size_of::<bool>())
        );
    }

    #[test]
    #[should_panic(expected = "reduced dimension 'z' not in")]
    fn test_unknown_dimension_panics() {
        let ty = cube();
        let _ = ReduceParams::new(ValueType::scalar(CellType::Double), &ty, &["z"]);
    }
}

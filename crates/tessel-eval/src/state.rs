//! Instructions, their parameter table and the execution state.
//!
//! A compiled program is a flat list of [`Instruction`]s. Each instruction
//! pairs an operation with a [`ParamId`] naming its parameter block in the
//! program's [`Stash`]. Parameter blocks are built once at compile time and
//! only read afterwards, so one program can be evaluated from several
//! threads at the same time, each thread with its own [`State`] and arena.

use crate::cell::TypedCells;
use crate::program::InjectParams;
use crate::reduce::ReduceParams;
use crate::single_reduce::SingleReduceParams;
use crate::value::Value;
use smallvec::SmallVec;
use tessel_arena::Arena;
use tessel_index::{Idx, IndexVec};

/// A handle to a parameter block in a [`Stash`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ParamId(u32);

impl Idx for ParamId {
    fn new(idx: usize) -> Self {
        Self(u32::try_from(idx).expect("parameter count exceeds u32::MAX"))
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

/// A parameter block of any instruction kind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OpParams {
    /// Parameters of an input instruction.
    Inject(InjectParams),
    /// Parameters of a dense single-dimension reduce.
    SingleReduce(SingleReduceParams),
    /// Parameters of a generic reduce.
    Reduce(ReduceParams),
}

/// Typed access to one [`OpParams`] variant.
pub trait StashParams: Sized {
    /// Short name of the variant, used in panic messages.
    const KIND: &'static str;

    /// Returns the block if `params` holds this kind.
    fn from_params(params: &OpParams) -> Option<&Self>;
}

macro_rules! stash_params {
    ($ty:ty, $variant:ident, $kind:literal) => {
        impl StashParams for $ty {
            const KIND: &'static str = $kind;

            fn from_params(params: &OpParams) -> Option<&Self> {
                match params {
                    OpParams::$variant(p) => Some(p),
                    _ => None,
                }
            }
        }

        impl From<$ty> for OpParams {
            fn from(params: $ty) -> Self {
                OpParams::$variant(params)
            }
        }
    };
}

stash_params!(InjectParams, Inject, "inject");
stash_params!(SingleReduceParams, SingleReduce, "single_reduce");
stash_params!(ReduceParams, Reduce, "reduce");

/// The parameter table owned by a compiled program.
#[derive(Clone, Debug, Default)]
pub struct Stash {
    params: IndexVec<ParamId, OpParams>,
}

impl Stash {
    /// Creates an empty stash.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a parameter block and returns its handle.
    pub fn create(&mut self, params: impl Into<OpParams>) -> ParamId {
        self.params.push(params.into())
    }

    /// Returns the block behind `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not name a block of kind `P`. Handles are only
    /// created by the compiler together with the operation that reads them.
    #[must_use]
    pub fn get<P: StashParams>(&self, id: ParamId) -> &P {
        P::from_params(&self.params[id])
            .unwrap_or_else(|| panic!("parameter {id:?} is not a {} block", P::KIND))
    }

    /// Number of stored blocks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Returns true if nothing has been stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

/// The signature shared by every instruction.
pub type OpFn = for<'a> fn(&mut State<'a>, ParamId);

/// An operation bound to its parameter block.
#[derive(Clone, Copy)]
pub struct Instruction {
    /// The operation.
    pub op: OpFn,
    /// Its parameters in the program's stash.
    pub param: ParamId,
    /// Name for logs.
    pub name: &'static str,
}

impl Instruction {
    /// Binds an operation to a parameter block.
    #[must_use]
    pub fn new(op: OpFn, param: ParamId, name: &'static str) -> Self {
        Self { op, param, name }
    }
}

impl std::fmt::Debug for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instruction")
            .field("name", &self.name)
            .field("param", &self.param)
            .finish_non_exhaustive()
    }
}

/// Mutable state of one evaluation.
pub struct State<'a> {
    arena: &'a Arena,
    stash: &'a Stash,
    inputs: SmallVec<[TypedCells<'a>; 4]>,
    stack: Vec<Value<'a>>,
}

impl<'a> State<'a> {
    /// Creates the state for one evaluation.
    #[must_use]
    pub fn new(arena: &'a Arena, stash: &'a Stash, inputs: &[TypedCells<'a>]) -> Self {
        Self {
            arena,
            stash,
            inputs: inputs.iter().copied().collect(),
            stack: Vec::new(),
        }
    }

    /// The evaluation arena.
    #[must_use]
    pub fn arena(&self) -> &'a Arena {
        self.arena
    }

    /// The program's parameter table.
    #[must_use]
    pub fn stash(&self) -> &'a Stash {
        self.stash
    }

    /// The cells of input `idx`.
    #[must_use]
    pub fn input(&self, idx: usize) -> TypedCells<'a> {
        self.inputs[idx]
    }

    /// Returns the value `n` slots below the top of the stack.
    ///
    /// # Panics
    ///
    /// Panics if the stack holds `n` values or fewer.
    #[must_use]
    pub fn peek(&self, n: usize) -> Value<'a> {
        self.stack[self.stack.len() - 1 - n]
    }

    /// Pushes a value.
    pub fn push(&mut self, value: Value<'a>) {
        self.stack.push(value);
    }

    /// Replaces the top of the stack.
    ///
    /// # Panics
    ///
    /// Panics if the stack is empty.
    pub fn pop_push(&mut self, value: Value<'a>) {
        let top = self
            .stack
            .last_mut()
            .expect("pop_push on an empty stack");
        *top = value;
    }

    /// Number of values on the stack.
    #[must_use]
    pub fn stack_len(&self) -> usize {
        self.stack.len()
    }

    /// Consumes the state, returning the remaining stack.
    #[must_use]
    pub fn into_stack(self) -> Vec<Value<'a>> {
        self.stack
    }
}

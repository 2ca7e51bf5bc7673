//! Compiling graphs into instruction lists and running them.

use crate::cell::TypedCells;
use crate::reduce::compile_reduce;
use crate::single_reduce::compile_single_reduce;
use crate::state::{Instruction, ParamId, Stash, State};
use crate::value::Value;
use tessel_arena::Arena;
use tessel_tensor_ir::graph::{Graph, NodeId, NodeKind};
use tessel_tensor_ir::{CellType, ValueType};
use thiserror::Error;
use tracing::trace;

/// Parameters of an input instruction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InjectParams {
    /// Input position.
    pub param: usize,
    /// Declared type of the input.
    pub result_type: ValueType,
}

fn inject_op(state: &mut State<'_>, param: ParamId) {
    let params: &InjectParams = state.stash().get(param);
    let cells = state.input(params.param);
    state.push(Value::new(&params.result_type, cells));
}

/// Errors raised while compiling a graph.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CompileError {
    /// A node produces or reads a type the interpreter cannot handle.
    #[error("node {node:?} has unsupported type {ty}")]
    UnsupportedType {
        /// The offending node.
        node: NodeId,
        /// The type, rendered as a type spec.
        ty: String,
    },

    /// Two input nodes declare different types for the same position.
    #[error("input {param} declared as both {first} and {second}")]
    ConflictingInput {
        /// Input position.
        param: usize,
        /// Type of the first declaration.
        first: String,
        /// Type of the conflicting declaration.
        second: String,
    },
}

/// Errors raised while evaluating a program.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum EvalError {
    /// The number of inputs does not match the program.
    #[error("expected {expected} inputs, got {found}")]
    InputCount {
        /// Inputs the program reads.
        expected: usize,
        /// Inputs supplied.
        found: usize,
    },

    /// An input has the wrong cell type.
    #[error("input {param}: expected {expected} cells, got {found}")]
    CellTypeMismatch {
        /// Input position.
        param: usize,
        /// Declared cell type.
        expected: CellType,
        /// Supplied cell type.
        found: CellType,
    },

    /// An input has the wrong number of cells.
    #[error("input {param}: expected {expected} cells, got {found} cells")]
    LengthMismatch {
        /// Input position.
        param: usize,
        /// Declared cell count.
        expected: usize,
        /// Supplied cell count.
        found: usize,
    },

    /// The program did not leave exactly one value on the stack.
    #[error("evaluation left {0} values on the stack")]
    StackImbalance(usize),
}

fn check_type(node: NodeId, ty: &ValueType) -> Result<(), CompileError> {
    if ty.is_dense() && ty.cell_type().is_supported() {
        Ok(())
    } else {
        Err(CompileError::UnsupportedType {
            node,
            ty: ty.to_string(),
        })
    }
}

/// A compiled tensor function.
///
/// A program owns its parameter table and is immutable once compiled, so
/// it may be shared between threads and evaluated concurrently.
#[derive(Clone, Debug)]
pub struct Program {
    stash: Stash,
    instructions: Vec<Instruction>,
    input_types: Vec<Option<ValueType>>,
    result_type: ValueType,
    trace_instructions: bool,
}

impl Program {
    /// Compiles the function rooted at `root`, one instruction per node.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError`] if a node has a sparse or unsupported type,
    /// or if two inputs at the same position disagree on their type.
    pub fn compile(graph: &Graph, root: NodeId) -> Result<Self, CompileError> {
        let mut stash = Stash::new();
        let mut instructions = Vec::new();
        let mut input_types: Vec<Option<ValueType>> = vec![None; graph.num_params(root)];

        for id in graph.postorder(root) {
            let node = graph.node(id);
            check_type(id, &node.result_type)?;
            let instr = match &node.kind {
                NodeKind::Inject { param } => {
                    match &input_types[*param] {
                        Some(first) if first != &node.result_type => {
                            return Err(CompileError::ConflictingInput {
                                param: *param,
                                first: first.to_string(),
                                second: node.result_type.to_string(),
                            });
                        }
                        Some(_) => {}
                        None => input_types[*param] = Some(node.result_type.clone()),
                    }
                    let param = stash.create(InjectParams {
                        param: *param,
                        result_type: node.result_type.clone(),
                    });
                    Instruction::new(inject_op, param, "inject")
                }
                NodeKind::Reduce {
                    child,
                    aggr,
                    dimensions,
                } => {
                    let child_type = graph.result_type(*child);
                    check_type(*child, child_type)?;
                    compile_reduce(&node.result_type, child_type, dimensions.as_slice(), *aggr, &mut stash)
                }
                NodeKind::DenseSingleReduce {
                    child,
                    dim_idx,
                    aggr,
                } => {
                    let child_type = graph.result_type(*child);
                    check_type(*child, child_type)?;
                    compile_single_reduce(&node.result_type, child_type, *dim_idx, *aggr, &mut stash)
                }
            };
            instructions.push(instr);
        }

        Ok(Self {
            stash,
            instructions,
            input_types,
            result_type: graph.result_type(root).clone(),
            trace_instructions: false,
        })
    }

    /// Emits a `trace` event for every executed instruction.
    #[must_use]
    pub fn with_trace_instructions(mut self, enabled: bool) -> Self {
        self.trace_instructions = enabled;
        self
    }

    /// The compiled instructions, in execution order.
    #[must_use]
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// The parameter table.
    #[must_use]
    pub fn stash(&self) -> &Stash {
        &self.stash
    }

    /// Number of inputs the program expects.
    #[must_use]
    pub fn num_inputs(&self) -> usize {
        self.input_types.len()
    }

    /// Declared type of input `param`, if the function reads it.
    #[must_use]
    pub fn input_type(&self, param: usize) -> Option<&ValueType> {
        self.input_types.get(param).and_then(Option::as_ref)
    }

    /// Type of the value the program produces.
    #[must_use]
    pub fn result_type(&self) -> &ValueType {
        &self.result_type
    }

    /// Evaluates the program on `inputs`.
    ///
    /// Intermediate and result cells are allocated in `arena`; the returned
    /// value borrows from it (or from an input, if the function is a bare
    /// input).
    ///
    /// # Errors
    ///
    /// Returns [`EvalError`] if the inputs do not match the declared input
    /// types.
    pub fn eval<'a>(
        &'a self,
        arena: &'a Arena,
        inputs: &[TypedCells<'a>],
    ) -> Result<Value<'a>, EvalError> {
        self.check_inputs(inputs)?;

        let mut state = State::new(arena, &self.stash, inputs);
        for instr in &self.instructions {
            if self.trace_instructions {
                trace!(op = instr.name, param = ?instr.param, "exec");
            }
            (instr.op)(&mut state, instr.param);
        }

        let mut stack = state.into_stack();
        match stack.len() {
            1 => Ok(stack.remove(0)),
            n => Err(EvalError::StackImbalance(n)),
        }
    }

    fn check_inputs(&self, inputs: &[TypedCells<'_>]) -> Result<(), EvalError> {
        if inputs.len() != self.input_types.len() {
            return Err(EvalError::InputCount {
                expected: self.input_types.len(),
                found: inputs.len(),
            });
        }
        for (param, (cells, ty)) in inputs.iter().zip(&self.input_types).enumerate() {
            let Some(ty) = ty else { continue };
            if cells.cell_type() != ty.cell_type() {
                return Err(EvalError::CellTypeMismatch {
                    param,
                    expected: ty.cell_type(),
                    found: cells.cell_type(),
                });
            }
            if cells.len() != ty.dense_subspace_size() {
                return Err(EvalError::LengthMismatch {
                    param,
                    expected: ty.dense_subspace_size(),
                    found: cells.len(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessel_tensor_ir::optimize::{optimize_graph, DEFAULT_RULES};
    use tessel_tensor_ir::{Aggr, Dimension};

    fn cube() -> ValueType {
        ValueType::dense(CellType::Double, &[("a", 2), ("b", 3), ("c", 4)])
    }

    #[test]
    fn test_compile_one_instruction_per_node() {
        let mut graph = Graph::new();
        let x = graph.inject(0, cube());
        let r = graph.reduce(x, Aggr::Sum, &["b"]).unwrap();
        let program = Program::compile(&graph, r).unwrap();
        let names: Vec<_> = program.instructions().iter().map(|i| i.name).collect();
        assert_eq!(names, ["inject", "reduce"]);
        assert_eq!(program.stash().len(), 2);
        assert_eq!(program.num_inputs(), 1);
        assert_eq!(program.input_type(0), Some(&cube()));

        let report = optimize_graph(&mut graph, r, DEFAULT_RULES);
        let program = Program::compile(&graph, report.root).unwrap();
        let names: Vec<_> = program.instructions().iter().map(|i| i.name).collect();
        assert_eq!(names, ["inject", "dense_single_reduce"]);
    }

    #[test]
    fn test_eval_bare_input() {
        let mut graph = Graph::new();
        let ty = ValueType::dense(CellType::Float, &[("x", 2)]);
        let x = graph.inject(0, ty.clone());
        let program = Program::compile(&graph, x).unwrap();

        let arena = Arena::new();
        let cells = [1.0f32, 2.0];
        let value = program.eval(&arena, &[TypedCells::Float(&cells)]).unwrap();
        assert_eq!(value.ty(), &ty);
        assert_eq!(value.cells(), TypedCells::Float(&cells));
        assert_eq!(arena.allocation_count(), 0);
    }

    #[test]
    fn test_sparse_type_is_rejected() {
        let mut graph = Graph::new();
        let ty = ValueType::tensor(CellType::Double, [Dimension::mapped("k")]);
        let x = graph.inject(0, ty);
        let err = Program::compile(&graph, x).unwrap_err();
        assert!(matches!(err, CompileError::UnsupportedType { node, .. } if node == x));
    }

    #[test]
    fn test_unsupported_cell_type_is_rejected() {
        let mut graph = Graph::new();
        let x = graph.inject(0, ValueType::dense(CellType::Int8, &[("x", 2)]));
        let r = graph.reduce(x, Aggr::Sum, &["x"]).unwrap();
        assert!(matches!(
            Program::compile(&graph, r),
            Err(CompileError::UnsupportedType { .. })
        ));
    }

    #[test]
    fn test_input_validation() {
        let mut graph = Graph::new();
        let x = graph.inject(0, cube());
        let r = graph.reduce(x, Aggr::Sum, &["a"]).unwrap();
        let program = Program::compile(&graph, r).unwrap();
        let arena = Arena::new();

        assert_eq!(
            program.eval(&arena, &[]).unwrap_err(),
            EvalError::InputCount {
                expected: 1,
                found: 0
            }
        );

        let floats = [0.0f32; 24];
        assert_eq!(
            program.eval(&arena, &[TypedCells::Float(&floats)]).unwrap_err(),
            EvalError::CellTypeMismatch {
                param: 0,
                expected: CellType::Double,
                found: CellType::Float
            }
        );

        let short = [0.0f64; 23];
        assert_eq!(
            program.eval(&arena, &[TypedCells::Double(&short)]).unwrap_err(),
            EvalError::LengthMismatch {
                param: 0,
                expected: 24,
                found: 23
            }
        );
    }

    #[test]
    fn test_eval_allocates_only_outputs() {
        let mut graph = Graph::new();
        let x = graph.inject(0, cube());
        let r1 = graph.reduce(x, Aggr::Sum, &["c"]).unwrap();
        let r2 = graph.reduce(r1, Aggr::Max, &["a"]).unwrap();
        let report = optimize_graph(&mut graph, r2, DEFAULT_RULES);
        let program = Program::compile(&graph, report.root).unwrap();

        let arena = Arena::new();
        let cells: Vec<f64> = (0..24).map(f64::from).collect();
        let value = program.eval(&arena, &[TypedCells::Double(&cells)]).unwrap();
        // rows of c summed: 6 + 16k for k in 0..6, then max over a
        assert_eq!(value.cells(), TypedCells::Double(&[54.0, 70.0, 86.0]));
        assert_eq!(arena.allocation_count(), 2);
        assert_eq!(arena.bytes_allocated(), (6 + 3) * 8);
    }
}

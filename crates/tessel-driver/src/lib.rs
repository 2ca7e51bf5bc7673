//! Optimize, compile and evaluate pipeline for Tessel.
//!
//! # Overview
//!
//! The [`Engine`] takes a tensor function graph through every stage:
//!
//! ```text
//!   Graph
//!     │
//!     ▼ (Options::optimize)
//! ┌──────────┐     ┌──────────┐     ┌──────────┐
//! │ Optimize │ ──▶ │ Compile  │ ──▶ │ Evaluate │ ──▶ OwnedValue
//! └──────────┘     └──────────┘     └──────────┘
//! ```
//!
//! Compiled programs are immutable and may be evaluated from many threads.
//! Each evaluation gets a fresh arena sized by `Options::arena_capacity`;
//! the result is copied out before the arena is released.

#![warn(missing_docs)]

use camino::Utf8Path;
use std::sync::Arc;
use tessel_arena::with_arena;
use tessel_eval::{CompileError, EvalError, OwnedValue, Program, TypedCells};
use tessel_session::{Options, Session, SessionError, SessionRef};
use tessel_tensor_ir::graph::{Graph, NodeId};
use tessel_tensor_ir::optimize::{optimize_graph, DEFAULT_RULES};
use tessel_tensor_ir::{Aggr, TensorIrError, TypeSpecError, ValueType};
use thiserror::Error;
use tracing::{debug, info, instrument};

/// Errors that can occur anywhere in the pipeline.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Session creation failed.
    #[error("failed to create session: {0}")]
    Session(#[from] SessionError),

    /// A type spec did not parse.
    #[error("invalid type: {0}")]
    TypeSpec(#[from] TypeSpecError),

    /// Building the function graph failed.
    #[error("tensor IR error: {0}")]
    TensorIr(#[from] TensorIrError),

    /// The graph could not be compiled.
    #[error("compilation failed: {0}")]
    Compile(#[from] CompileError),

    /// Evaluation failed.
    #[error("evaluation failed: {0}")]
    Eval(#[from] EvalError),
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// A stage of the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnginePhase {
    /// Running the rewrite pass.
    Optimize,
    /// Emitting instructions.
    Compile,
    /// Running a compiled program.
    Evaluate,
}

impl EnginePhase {
    /// Get a human-readable name for this phase.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Optimize => "optimize",
            Self::Compile => "compile",
            Self::Evaluate => "evaluate",
        }
    }
}

/// Callbacks for monitoring pipeline progress.
pub trait EngineCallbacks: Send + Sync {
    /// Called when a phase starts.
    fn on_phase_start(&self, _phase: EnginePhase) {}

    /// Called when a phase completes.
    fn on_phase_complete(&self, _phase: EnginePhase) {}

    /// Called when a phase fails.
    fn on_error(&self, _error: &EngineError) {}
}

/// Default no-op implementation of callbacks.
#[derive(Default)]
pub struct NoopCallbacks;

impl EngineCallbacks for NoopCallbacks {}

/// The pipeline driver.
pub struct Engine {
    session: SessionRef,
    callbacks: Arc<dyn EngineCallbacks>,
}

impl Engine {
    /// Create an engine with the given options.
    #[must_use]
    pub fn new(options: Options) -> Self {
        Self::with_session(tessel_session::create_session(options))
    }

    /// Create an engine with default options.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(Options::default())
    }

    /// Create an engine from a TOML options file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be loaded.
    pub fn from_config(path: &Utf8Path) -> EngineResult<Self> {
        Ok(Self::new(Options::load(path)?))
    }

    /// Create an engine sharing an existing session.
    #[must_use]
    pub fn with_session(session: SessionRef) -> Self {
        Self {
            session,
            callbacks: Arc::new(NoopCallbacks),
        }
    }

    /// Set the pipeline callbacks.
    #[must_use]
    pub fn with_callbacks(mut self, callbacks: impl EngineCallbacks + 'static) -> Self {
        self.callbacks = Arc::new(callbacks);
        self
    }

    /// Get a reference to the session.
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    fn phase<T>(&self, phase: EnginePhase, f: impl FnOnce() -> EngineResult<T>) -> EngineResult<T> {
        self.callbacks.on_phase_start(phase);
        match f() {
            Ok(value) => {
                self.callbacks.on_phase_complete(phase);
                Ok(value)
            }
            Err(err) => {
                self.callbacks.on_error(&err);
                Err(err)
            }
        }
    }

    /// Runs the rewrite pass if enabled and returns the root to compile.
    #[instrument(skip(self, graph))]
    pub fn optimize(&self, graph: &mut Graph, root: NodeId) -> NodeId {
        let options = &self.session.options;
        if options.dump.graph {
            debug!(expr = %graph.to_expr_string(root), "graph before optimization");
        }
        if !options.optimize {
            return root;
        }

        self.callbacks.on_phase_start(EnginePhase::Optimize);
        let report = optimize_graph(graph, root, DEFAULT_RULES);
        self.session.record_optimization(report.rewrites.len());
        debug!(rewrites = report.rewrites.len(), root = ?report.root, "optimization complete");
        if options.dump.graph && !report.is_unchanged() {
            debug!(expr = %graph.to_expr_string(report.root), "graph after optimization");
        }
        self.callbacks.on_phase_complete(EnginePhase::Optimize);
        report.root
    }

    /// Optimizes (if enabled) and compiles the function rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph contains types the interpreter does
    /// not support.
    #[instrument(skip(self, graph))]
    pub fn prepare(&self, graph: &mut Graph, root: NodeId) -> EngineResult<Program> {
        let root = self.optimize(graph, root);
        let graph: &Graph = graph;
        self.phase(EnginePhase::Compile, || {
            let program = Program::compile(graph, root)?
                .with_trace_instructions(self.session.options.trace_instructions);
            debug!(
                instructions = program.instructions().len(),
                inputs = program.num_inputs(),
                result = %program.result_type(),
                "compilation complete"
            );
            if self.session.options.dump.program {
                for (idx, instr) in program.instructions().iter().enumerate() {
                    debug!(idx, op = instr.name, param = ?instr.param, "instruction");
                }
            }
            Ok(program)
        })
    }

    /// Evaluates a compiled program in a fresh arena.
    ///
    /// # Errors
    ///
    /// Returns an error if the inputs do not match the program.
    #[instrument(skip(self, program, inputs), fields(inputs = inputs.len()))]
    pub fn evaluate(&self, program: &Program, inputs: &[TypedCells<'_>]) -> EngineResult<OwnedValue> {
        let capacity = self.session.options.arena_capacity;
        self.phase(EnginePhase::Evaluate, || {
            with_arena(capacity, |arena| -> EngineResult<OwnedValue> {
                let value = program.eval(arena, inputs)?.to_owned_value();
                debug!(
                    bytes = arena.bytes_allocated(),
                    allocations = arena.allocation_count(),
                    "evaluation complete"
                );
                Ok(value)
            })
        })
    }

    /// Prepares and evaluates the function rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if compilation or evaluation fails.
    pub fn run(
        &self,
        graph: &mut Graph,
        root: NodeId,
        inputs: &[TypedCells<'_>],
    ) -> EngineResult<OwnedValue> {
        let program = self.prepare(graph, root)?;
        self.evaluate(&program, inputs)
    }

    /// Reduces one input described by a type spec.
    ///
    /// `aggr` is an aggregator name such as `"sum"`; an empty `dims` list
    /// reduces every dimension.
    ///
    /// # Errors
    ///
    /// Returns an error if the type spec, aggregator or dimension names are
    /// invalid, or if the cells do not match the type.
    #[instrument(skip(self, cells))]
    pub fn reduce(
        &self,
        input_type: &str,
        aggr: &str,
        dims: &[&str],
        cells: TypedCells<'_>,
    ) -> EngineResult<OwnedValue> {
        let ty: ValueType = input_type.parse()?;
        let aggr: Aggr = aggr.parse()?;
        let mut graph = Graph::new();
        let input = graph.inject(0, ty);
        let root = graph.reduce(input, aggr, dims)?;
        let value = self.run(&mut graph, root, &[cells])?;
        info!(result = %value.ty, "reduce complete");
        Ok(value)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_names() {
        assert_eq!(EnginePhase::Optimize.name(), "optimize");
        assert_eq!(EnginePhase::Compile.name(), "compile");
        assert_eq!(EnginePhase::Evaluate.name(), "evaluate");
    }

    #[test]
    fn test_optimize_respects_options() {
        let mut graph = Graph::new();
        let x = graph.inject(0, ValueType::dense(tessel_tensor_ir::CellType::Double, &[("x", 3)]));
        let r = graph.reduce(x, Aggr::Sum, &["x"]).unwrap();

        let off = Engine::new(Options {
            optimize: false,
            ..Options::default()
        });
        assert_eq!(off.optimize(&mut graph, r), r);
        assert_eq!(off.session().stats().graphs_optimized, 0);

        let on = Engine::with_defaults();
        assert_ne!(on.optimize(&mut graph, r), r);
        let stats = on.session().stats();
        assert_eq!((stats.graphs_optimized, stats.nodes_rewritten), (1, 1));
    }

    #[test]
    fn test_reduce_errors() {
        let engine = Engine::with_defaults();
        let cells = [1.0, 2.0];
        let input = TypedCells::Double(&cells);

        assert!(matches!(
            engine.reduce("tensor(x[2]", "sum", &["x"], input),
            Err(EngineError::TypeSpec(_))
        ));
        assert!(matches!(
            engine.reduce("tensor(a[4294967296],b[4294967296],c[2])", "sum", &["c"], input),
            Err(EngineError::TypeSpec(TypeSpecError::TooLarge(_)))
        ));
        assert!(matches!(
            engine.reduce("tensor(x[2])", "median", &["x"], input),
            Err(EngineError::TensorIr(TensorIrError::UnknownAggr(_)))
        ));
        assert!(matches!(
            engine.reduce("tensor(x[2])", "sum", &["y"], input),
            Err(EngineError::TensorIr(TensorIrError::UnknownDimension { .. }))
        ));
        assert!(matches!(
            engine.reduce("tensor(x[3])", "sum", &["x"], input),
            Err(EngineError::Eval(EvalError::LengthMismatch { .. }))
        ));
        assert!(matches!(
            engine.reduce("tensor(x{})", "sum", &["x"], input),
            Err(EngineError::Compile(_))
        ));
    }
}

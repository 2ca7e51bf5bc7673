//! The tensor function graph.
//!
//! Nodes are stored in an append-only arena and refer to their children by
//! [`NodeId`]. A child is always pushed before any node that uses it, so
//! child ids are strictly smaller than their parents' ids. Rewrites never
//! modify a node in place: they push a replacement and hand back its id.

use crate::{Aggr, TensorIrError, ValueType};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt::Write as _;
use tessel_index::{Idx, IndexVec};

/// A handle to a node in a [`Graph`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(u32);

impl Idx for NodeId {
    fn new(idx: usize) -> Self {
        Self(u32::try_from(idx).expect("graph node count exceeds u32::MAX"))
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

/// What a node computes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    /// The `param`-th input value of an evaluation.
    Inject {
        /// Input position.
        param: usize,
    },
    /// Generic reduce over a set of dimensions.
    ///
    /// An empty dimension list reduces every dimension.
    Reduce {
        /// The value being reduced.
        child: NodeId,
        /// The aggregator.
        aggr: Aggr,
        /// Names of the reduced dimensions.
        dimensions: SmallVec<[String; 2]>,
    },
    /// Reduce of a single dimension of a dense value, addressed by position.
    DenseSingleReduce {
        /// The value being reduced.
        child: NodeId,
        /// Position of the reduced dimension in the child type.
        dim_idx: usize,
        /// The aggregator.
        aggr: Aggr,
    },
}

/// A typed node of the graph.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Type of the value this node produces.
    pub result_type: ValueType,
    /// The operation.
    pub kind: NodeKind,
}

impl Node {
    /// The child this node reads, if any.
    #[must_use]
    pub fn child(&self) -> Option<NodeId> {
        match &self.kind {
            NodeKind::Inject { .. } => None,
            NodeKind::Reduce { child, .. } | NodeKind::DenseSingleReduce { child, .. } => {
                Some(*child)
            }
        }
    }

    /// Returns a copy of this node reading `child` instead.
    ///
    /// Leaf nodes are returned unchanged.
    #[must_use]
    pub fn with_child(&self, new_child: NodeId) -> Self {
        let mut node = self.clone();
        match &mut node.kind {
            NodeKind::Inject { .. } => {}
            NodeKind::Reduce { child, .. } | NodeKind::DenseSingleReduce { child, .. } => {
                *child = new_child;
            }
        }
        node
    }
}

/// An arena of tensor function nodes.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Graph {
    nodes: IndexVec<NodeId, Node>,
}

impl Graph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes, including nodes no longer reachable from any root.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Appends a node and returns its id.
    ///
    /// # Panics
    ///
    /// Panics if the node reads a child that is not already in the graph.
    pub fn push(&mut self, node: Node) -> NodeId {
        if let Some(child) = node.child() {
            assert!(
                child.index() < self.nodes.len(),
                "child {child:?} must be added before its parent"
            );
        }
        self.nodes.push(node)
    }

    /// Adds an input node.
    pub fn inject(&mut self, param: usize, result_type: ValueType) -> NodeId {
        self.push(Node {
            result_type,
            kind: NodeKind::Inject { param },
        })
    }

    /// Adds a generic reduce, inferring its result type.
    ///
    /// # Errors
    ///
    /// Returns [`TensorIrError::UnknownDimension`] if a dimension is not
    /// part of the child's type.
    pub fn reduce<S: AsRef<str>>(
        &mut self,
        child: NodeId,
        aggr: Aggr,
        dimensions: &[S],
    ) -> Result<NodeId, TensorIrError> {
        let result_type = self.result_type(child).reduce(dimensions)?;
        Ok(self.push(Node {
            result_type,
            kind: NodeKind::Reduce {
                child,
                aggr,
                dimensions: dimensions.iter().map(|d| d.as_ref().to_string()).collect(),
            },
        }))
    }

    /// Returns a node.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    /// Returns the result type of a node.
    #[must_use]
    pub fn result_type(&self, id: NodeId) -> &ValueType {
        &self.nodes[id].result_type
    }

    /// Returns the children a node reads.
    pub fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> {
        self.node(id).child().into_iter()
    }

    /// Returns the nodes reachable from `root`, children before parents.
    #[must_use]
    pub fn postorder(&self, root: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut visited = FxHashSet::default();
        let mut stack = vec![(root, false)];
        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                order.push(id);
                continue;
            }
            if !visited.insert(id) {
                continue;
            }
            stack.push((id, true));
            for child in self.children(id) {
                if !visited.contains(&child) {
                    stack.push((child, false));
                }
            }
        }
        order
    }

    /// Number of distinct inputs read by the function rooted at `root`.
    ///
    /// This is one past the highest `Inject` parameter reachable.
    #[must_use]
    pub fn num_params(&self, root: NodeId) -> usize {
        self.postorder(root)
            .into_iter()
            .filter_map(|id| match self.node(id).kind {
                NodeKind::Inject { param } => Some(param + 1),
                _ => None,
            })
            .max()
            .unwrap_or(0)
    }

    /// Renders the function rooted at `root` as an expression.
    #[must_use]
    pub fn to_expr_string(&self, root: NodeId) -> String {
        let mut out = String::new();
        self.write_expr(root, &mut out);
        out
    }

    fn write_expr(&self, id: NodeId, out: &mut String) {
        match &self.node(id).kind {
            NodeKind::Inject { param } => {
                let _ = write!(out, "param{param}");
            }
            NodeKind::Reduce {
                child,
                aggr,
                dimensions,
            } => {
                out.push_str("reduce(");
                self.write_expr(*child, out);
                let _ = write!(out, ",{aggr}");
                for dim in dimensions {
                    let _ = write!(out, ",{dim}");
                }
                out.push(')');
            }
            NodeKind::DenseSingleReduce {
                child,
                dim_idx,
                aggr,
            } => {
                out.push_str("dense_single_reduce(");
                self.write_expr(*child, out);
                let _ = write!(out, ",{aggr},#{dim_idx})");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CellType;

    fn dense_xyz() -> ValueType {
        ValueType::dense(CellType::Double, &[("x", 2), ("y", 3), ("z", 4)])
    }

    #[test]
    fn test_reduce_infers_result_type() {
        let mut graph = Graph::new();
        let a = graph.inject(0, dense_xyz());
        let r = graph.reduce(a, Aggr::Sum, &["y"]).unwrap();
        assert_eq!(
            graph.result_type(r),
            &ValueType::dense(CellType::Double, &[("x", 2), ("z", 4)])
        );
        assert_eq!(graph.node(r).child(), Some(a));
    }

    #[test]
    fn test_reduce_unknown_dimension() {
        let mut graph = Graph::new();
        let a = graph.inject(0, dense_xyz());
        assert!(graph.reduce(a, Aggr::Sum, &["w"]).is_err());
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_postorder_children_first() {
        let mut graph = Graph::new();
        let a = graph.inject(0, dense_xyz());
        let r1 = graph.reduce(a, Aggr::Max, &["z"]).unwrap();
        let r2 = graph.reduce(r1, Aggr::Min, &["x"]).unwrap();
        assert_eq!(graph.postorder(r2), vec![a, r1, r2]);
        assert_eq!(graph.postorder(r1), vec![a, r1]);
    }

    #[test]
    fn test_with_child_leaves_original() {
        let mut graph = Graph::new();
        let a = graph.inject(0, dense_xyz());
        let b = graph.inject(1, dense_xyz());
        let r = graph.reduce(a, Aggr::Sum, &["x"]).unwrap();
        let copy = graph.push(graph.node(r).with_child(b));
        assert_eq!(graph.node(r).child(), Some(a));
        assert_eq!(graph.node(copy).child(), Some(b));
    }

    #[test]
    #[should_panic(expected = "must be added before its parent")]
    fn test_push_rejects_forward_child() {
        let mut graph = Graph::new();
        graph.push(Node {
            result_type: ValueType::scalar(CellType::Double),
            kind: NodeKind::Reduce {
                child: NodeId::new(7),
                aggr: Aggr::Sum,
                dimensions: SmallVec::new(),
            },
        });
    }

    #[test]
    fn test_num_params_and_expr_string() {
        let mut graph = Graph::new();
        let a = graph.inject(2, dense_xyz());
        let r = graph.reduce(a, Aggr::Avg, &["x", "z"]).unwrap();
        assert_eq!(graph.num_params(r), 3);
        assert_eq!(graph.to_expr_string(r), "reduce(param2,avg,x,z)");
    }
}

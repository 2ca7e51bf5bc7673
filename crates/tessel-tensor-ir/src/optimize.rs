//! Graph rewrite rules and the pass that applies them.
//!
//! A [`RewriteRule`] looks at exactly one node and either returns it
//! unchanged or pushes a replacement and returns the new id. Rules never
//! traverse the graph; [`optimize_graph`] drives them bottom-up over every
//! node reachable from a root.

use crate::graph::{Graph, Node, NodeId, NodeKind};
use crate::ValueType;
use rustc_hash::FxHashMap;
use tracing::debug;

/// A rewrite applied to a single node.
pub trait RewriteRule {
    /// Name used in logs and reports.
    fn name(&self) -> &'static str;

    /// Returns `id` if the rule does not apply, otherwise the id of a newly
    /// pushed replacement node.
    fn rewrite(&self, graph: &mut Graph, id: NodeId) -> NodeId;
}

/// Replaces a generic reduce of one dimension of a dense value by a
/// [`NodeKind::DenseSingleReduce`] node addressing that dimension by position.
///
/// The replacement node is never itself a generic reduce, so running the
/// rule again on its output is a no-op.
#[derive(Clone, Copy, Debug, Default)]
pub struct DenseSingleReduce;

fn check_input_type(ty: &ValueType) -> bool {
    ty.is_dense() && ty.cell_type().is_supported()
}

impl DenseSingleReduce {
    /// Returns true if the node at `id` can be replaced.
    #[must_use]
    pub fn is_eligible(graph: &Graph, id: NodeId) -> bool {
        let node = graph.node(id);
        match &node.kind {
            NodeKind::Reduce {
                child, dimensions, ..
            } => {
                dimensions.len() == 1
                    && check_input_type(graph.result_type(*child))
                    && node.result_type.is_dense()
            }
            _ => false,
        }
    }

    /// Applies the rule to the node at `id`.
    ///
    /// # Panics
    ///
    /// Panics if an eligible reduce names a dimension missing from its
    /// child's type, or if its result cell type differs from the child's.
    /// Both are guaranteed by [`Graph::reduce`].
    pub fn optimize(graph: &mut Graph, id: NodeId) -> NodeId {
        if !Self::is_eligible(graph, id) {
            return id;
        }
        let node = graph.node(id);
        let NodeKind::Reduce {
            child,
            aggr,
            dimensions,
        } = &node.kind
        else {
            unreachable!("eligible node is a reduce");
        };
        let child = *child;
        let aggr = *aggr;
        let child_type = graph.result_type(child);
        let dim_idx = child_type
            .dimension_index(&dimensions[0])
            .unwrap_or_else(|| panic!("reduced dimension '{}' not in {child_type}", dimensions[0]));
        assert_eq!(
            node.result_type.cell_type(),
            child_type.cell_type(),
            "reduce must preserve the cell type"
        );
        let result_type = node.result_type.clone();
        graph.push(Node {
            result_type,
            kind: NodeKind::DenseSingleReduce {
                child,
                dim_idx,
                aggr,
            },
        })
    }
}

impl RewriteRule for DenseSingleReduce {
    fn name(&self) -> &'static str {
        "dense_single_reduce"
    }

    fn rewrite(&self, graph: &mut Graph, id: NodeId) -> NodeId {
        Self::optimize(graph, id)
    }
}

/// The rules applied by default, in order.
pub const DEFAULT_RULES: &[&dyn RewriteRule] = &[&DenseSingleReduce];

/// One replacement performed by [`optimize_graph`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rewrite {
    /// The node that was replaced.
    pub from: NodeId,
    /// Its replacement.
    pub to: NodeId,
    /// The rule that fired.
    pub rule: &'static str,
}

/// Outcome of an optimization pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OptimizeReport {
    /// Root of the optimized function.
    pub root: NodeId,
    /// Rule applications, in visit order.
    pub rewrites: Vec<Rewrite>,
}

impl OptimizeReport {
    /// Returns true if no rule fired.
    #[must_use]
    pub fn is_unchanged(&self) -> bool {
        self.rewrites.is_empty()
    }
}

/// Applies `rules` to every node reachable from `root`, children first.
///
/// When a child was replaced, its parent is first copied with the new child
/// so that rules see the rewritten subtree. Existing nodes are never
/// modified; the returned report carries the new root.
pub fn optimize_graph(graph: &mut Graph, root: NodeId, rules: &[&dyn RewriteRule]) -> OptimizeReport {
    let mut remap: FxHashMap<NodeId, NodeId> = FxHashMap::default();
    let mut rewrites = Vec::new();

    for id in graph.postorder(root) {
        let mut current = id;
        if let Some(child) = graph.node(id).child() {
            let new_child = remap.get(&child).copied().unwrap_or(child);
            if new_child != child {
                let copy = graph.node(id).with_child(new_child);
                current = graph.push(copy);
            }
        }
        for rule in rules {
            let next = rule.rewrite(graph, current);
            if next != current {
                debug!(
                    rule = rule.name(),
                    from = ?current,
                    to = ?next,
                    expr = %graph.to_expr_string(next),
                    "rewrote node"
                );
                rewrites.push(Rewrite {
                    from: current,
                    to: next,
                    rule: rule.name(),
                });
                current = next;
            }
        }
        remap.insert(id, current);
    }

    let root = remap.get(&root).copied().unwrap_or(root);
    OptimizeReport { root, rewrites }
}

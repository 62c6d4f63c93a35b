//! Dependency scheduling: turn a linear plan into an execution DAG.
//!
//! Step `j` depends on an earlier step `i` only when it consumes `i`'s output
//! or the knowledge base orders `i`'s action before `j`'s. Steps with no path
//! between them are independent and may run concurrently.

use miette::Diagnostic;
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Dfs, EdgeRef};
use serde::Serialize;
use thiserror::Error;

use crate::intent::GoalPredicate;
use crate::knowledge::{KnowledgeBase, KnowledgeError};
use crate::planner::{Plan, PlanStep};

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ScheduleError {
    #[error("dependency cycle detected among {steps} plan steps")]
    #[diagnostic(
        code(talky::schedule::cycle),
        help("Plan steps only depend on earlier steps; a cycle indicates a corrupted plan.")
    )]
    CycleDetected { steps: usize },

    #[error("step {step} takes \"{slot}\" from step {source_step}, which does not precede it")]
    #[diagnostic(
        code(talky::schedule::forward_reference),
        help("Data bindings must reference an earlier step of the same plan.")
    )]
    ForwardReference {
        step: usize,
        source_step: usize,
        slot: String,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Knowledge(#[from] KnowledgeError),
}

/// Convenience alias.
pub type ScheduleResult<T> = std::result::Result<T, ScheduleError>;

// ---------------------------------------------------------------------------
// Graph
// ---------------------------------------------------------------------------

/// Why one step waits for another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
    /// The later step consumes this slot of the earlier one's result.
    Data { slot: String },
    /// The knowledge base orders the two actions.
    Ordering,
}

/// Plan steps as a DAG. Node `i` is plan step `i`.
pub struct ExecutionGraph {
    dag: DiGraph<PlanStep, DependencyKind>,
    goals: Vec<GoalPredicate>,
}

impl std::fmt::Debug for ExecutionGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionGraph")
            .field("node_count", &self.dag.node_count())
            .field("edge_count", &self.dag.edge_count())
            .field("groups", &self.goals.len())
            .finish()
    }
}

impl ExecutionGraph {
    pub fn len(&self) -> usize {
        self.dag.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.dag.node_count() == 0
    }

    pub fn step(&self, node: usize) -> Option<&PlanStep> {
        self.dag.node_weight(NodeIndex::new(node))
    }

    pub fn steps(&self) -> impl Iterator<Item = &PlanStep> {
        self.dag.node_weights()
    }

    /// Goal groups of the originating plan.
    pub fn goals(&self) -> &[GoalPredicate] {
        &self.goals
    }

    /// Steps with no predecessors.
    pub fn roots(&self) -> Vec<usize> {
        self.dag
            .node_indices()
            .filter(|&n| {
                self.dag
                    .neighbors_directed(n, Direction::Incoming)
                    .next()
                    .is_none()
            })
            .map(NodeIndex::index)
            .collect()
    }

    /// Direct predecessors of `node`, ascending.
    pub fn predecessors(&self, node: usize) -> Vec<usize> {
        self.neighbors(node, Direction::Incoming)
    }

    /// Direct successors of `node`, ascending.
    pub fn successors(&self, node: usize) -> Vec<usize> {
        self.neighbors(node, Direction::Outgoing)
    }

    fn neighbors(&self, node: usize, dir: Direction) -> Vec<usize> {
        let mut out: Vec<usize> = self
            .dag
            .neighbors_directed(NodeIndex::new(node), dir)
            .map(NodeIndex::index)
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Edges into `node`: `(source, kind)`.
    pub fn dependencies(&self, node: usize) -> Vec<(usize, &DependencyKind)> {
        let mut deps: Vec<_> = self
            .dag
            .edges_directed(NodeIndex::new(node), Direction::Incoming)
            .map(|e| (e.source().index(), e.weight()))
            .collect();
        deps.sort_by_key(|(source, _)| *source);
        deps
    }

    /// Every step reachable from `node` (excluding `node`), ascending.
    pub fn descendants(&self, node: usize) -> Vec<usize> {
        let start = NodeIndex::new(node);
        let mut dfs = Dfs::new(&self.dag, start);
        let mut out = Vec::new();
        while let Some(n) = dfs.next(&self.dag) {
            if n != start {
                out.push(n.index());
            }
        }
        out.sort_unstable();
        out
    }

    /// Whether neither step can reach the other.
    pub fn independent(&self, a: usize, b: usize) -> bool {
        let (a, b) = (NodeIndex::new(a), NodeIndex::new(b));
        a != b
            && !petgraph::algo::has_path_connecting(&self.dag, a, b, None)
            && !petgraph::algo::has_path_connecting(&self.dag, b, a, None)
    }

    /// Nodes in a dependency-respecting order.
    pub fn topological_order(&self) -> ScheduleResult<Vec<usize>> {
        petgraph::algo::toposort(&self.dag, None)
            .map(|order| order.into_iter().map(NodeIndex::index).collect())
            .map_err(|_| ScheduleError::CycleDetected {
                steps: self.dag.node_count(),
            })
    }
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

/// Build the execution graph for `plan`.
pub fn build_graph(plan: &Plan, kb: &KnowledgeBase) -> ScheduleResult<ExecutionGraph> {
    let mut dag: DiGraph<PlanStep, DependencyKind> =
        DiGraph::with_capacity(plan.steps.len(), plan.steps.len());
    for step in &plan.steps {
        kb.action(&step.action_id)?;
        dag.add_node(step.clone());
    }

    for (j, step) in plan.steps.iter().enumerate() {
        for (i, slot) in step.data_sources() {
            if i >= j {
                return Err(ScheduleError::ForwardReference {
                    step: j,
                    source_step: i,
                    slot: slot.to_string(),
                });
            }
            let (from, to) = (NodeIndex::new(i), NodeIndex::new(j));
            if dag.find_edge(from, to).is_none() {
                dag.add_edge(
                    from,
                    to,
                    DependencyKind::Data {
                        slot: slot.to_string(),
                    },
                );
            }
        }
        for (i, earlier) in plan.steps[..j].iter().enumerate() {
            let (from, to) = (NodeIndex::new(i), NodeIndex::new(j));
            if kb.ordering_constrained(&earlier.action_id, &step.action_id)
                && dag.find_edge(from, to).is_none()
            {
                dag.add_edge(from, to, DependencyKind::Ordering);
            }
        }
    }

    if petgraph::algo::is_cyclic_directed(&dag) {
        return Err(ScheduleError::CycleDetected {
            steps: dag.node_count(),
        });
    }

    tracing::debug!(
        nodes = dag.node_count(),
        edges = dag.edge_count(),
        "execution graph built"
    );
    Ok(ExecutionGraph {
        dag,
        goals: plan.goals.clone(),
    })
}

//! Dependency-aware concurrent execution of a plan's graph.
//!
//! A single coordinator owns the node-status table. It dispatches every node
//! whose predecessors all succeeded onto a tokio task (bounded by the in-flight
//! limit), awaits completions in whatever order they arrive, and recomputes the
//! ready set after each one. Failures skip their transitive dependents only;
//! independent branches keep running.

pub mod invoker;

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{FuturesUnordered, StreamExt};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::time::Instant;

use crate::planner::Binding;
use crate::schedule::ExecutionGraph;
use crate::state::Parameters;

pub use invoker::{ActionInvoker, EchoInvoker, ErrorKind, FnInvoker, InvocationError};

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ExecError {
    #[error("illegal status transition for node {node}: {from} -> {to}")]
    #[diagnostic(
        code(talky::execute::illegal_transition),
        help("Node status only moves Pending -> Ready -> Running -> Succeeded/Failed, or to Skipped before running.")
    )]
    IllegalTransition {
        node: usize,
        from: NodeStatus,
        to: NodeStatus,
    },

    #[error("node {node} is {actual}, expected {expected}")]
    #[diagnostic(code(talky::execute::status_mismatch))]
    StatusMismatch {
        node: usize,
        expected: NodeStatus,
        actual: NodeStatus,
    },

    #[error("node {node} does not exist")]
    #[diagnostic(code(talky::execute::unknown_node))]
    UnknownNode { node: usize },
}

/// Convenience alias.
pub type ExecResult<T> = std::result::Result<T, ExecError>;

// ---------------------------------------------------------------------------
// Node status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeStatus {
    Pending,
    Ready,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl NodeStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }

    /// The only legal moves.
    pub fn can_transition_to(self, next: NodeStatus) -> bool {
        use NodeStatus::*;
        matches!(
            (self, next),
            (Pending, Ready)
                | (Ready, Running)
                | (Running, Succeeded)
                | (Running, Failed)
                | (Pending, Skipped)
                | (Ready, Skipped)
        )
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        };
        f.write_str(name)
    }
}

/// Why a node never ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// An ancestor failed (or was itself skipped).
    DependencyFailure { upstream: usize },
    /// The plan deadline passed before the node was dispatched.
    ExecutionTimeout,
}

#[derive(Debug, Clone)]
struct NodeEntry {
    status: NodeStatus,
    attempts: u32,
    result: Option<Value>,
    error: Option<InvocationError>,
    skip: Option<SkipReason>,
}

/// Status of every node in one execution. Owned by the coordinator, so every
/// update is serialized through [`NodeTable::transition`].
#[derive(Debug)]
pub struct NodeTable {
    entries: Vec<NodeEntry>,
}

impl NodeTable {
    pub fn new(len: usize) -> Self {
        Self {
            entries: vec![
                NodeEntry {
                    status: NodeStatus::Pending,
                    attempts: 0,
                    result: None,
                    error: None,
                    skip: None,
                };
                len
            ],
        }
    }

    pub fn status(&self, node: usize) -> Option<NodeStatus> {
        self.entries.get(node).map(|e| e.status)
    }

    /// Move `node` from `from` to `to`, failing if it is not currently in
    /// `from` or the move is not a legal one.
    pub fn transition(&mut self, node: usize, from: NodeStatus, to: NodeStatus) -> ExecResult<()> {
        let entry = self
            .entries
            .get_mut(node)
            .ok_or(ExecError::UnknownNode { node })?;
        if entry.status != from {
            return Err(ExecError::StatusMismatch {
                node,
                expected: from,
                actual: entry.status,
            });
        }
        if !from.can_transition_to(to) {
            return Err(ExecError::IllegalTransition { node, from, to });
        }
        entry.status = to;
        Ok(())
    }

    /// Skip a node that has not started; terminal or running nodes are left alone.
    fn skip(&mut self, node: usize, reason: SkipReason) -> ExecResult<bool> {
        let Some(current) = self.status(node) else {
            return Err(ExecError::UnknownNode { node });
        };
        if !matches!(current, NodeStatus::Pending | NodeStatus::Ready) {
            return Ok(false);
        }
        self.transition(node, current, NodeStatus::Skipped)?;
        self.entries[node].skip = Some(reason);
        Ok(true)
    }

    fn with_status(&self, status: NodeStatus) -> impl Iterator<Item = usize> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter(move |(_, e)| e.status == status)
            .map(|(i, _)| i)
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverallStatus {
    Succeeded,
    PartialFailure,
    Failed,
}

impl std::fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::PartialFailure => write!(f, "partial failure"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Outcome of one plan step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeReport {
    pub step: usize,
    pub action_id: String,
    pub status: NodeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<InvocationError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<SkipReason>,
    pub attempts: u32,
}

/// Aggregated outcome of executing one plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub status: OverallStatus,
    /// Per-node outcomes in plan order.
    pub nodes: Vec<NodeReport>,
    /// Intent labels whose goal group did not fully succeed.
    pub unmet_goals: Vec<String>,
    pub timed_out: bool,
    pub elapsed_ms: u64,
}

impl ExecutionReport {
    pub fn node(&self, step: usize) -> Option<&NodeReport> {
        self.nodes.get(step)
    }

    pub fn count(&self, status: NodeStatus) -> usize {
        self.nodes.iter().filter(|n| n.status == status).count()
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Execution knobs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExecutionLimits {
    /// Upper bound on concurrently running actions (at least 1).
    pub max_concurrent_actions: usize,
    /// Retries after a transient failure.
    pub node_retries: u32,
    pub plan_timeout: Duration,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            max_concurrent_actions: 4,
            node_retries: 2,
            plan_timeout: Duration::from_millis(30_000),
            retry_base_delay: Duration::from_millis(100),
            retry_max_delay: Duration::from_millis(2_000),
        }
    }
}

impl ExecutionLimits {
    /// Delay before retry number `retries_used + 1`: exponential, capped.
    pub fn retry_backoff(&self, retries_used: u32) -> Duration {
        let base_ms = self.retry_base_delay.as_millis();
        if base_ms == 0 {
            return Duration::ZERO;
        }
        let max_ms = self.retry_max_delay.as_millis().max(base_ms);
        let multiplier = 1u128 << retries_used.min(20);
        let backoff_ms = base_ms.saturating_mul(multiplier).min(max_ms);
        Duration::from_millis(u64::try_from(backoff_ms).unwrap_or(u64::MAX))
    }
}

/// Runs execution graphs against an [`ActionInvoker`].
#[derive(Debug, Clone, Default)]
pub struct ExecutionEngine {
    limits: ExecutionLimits,
}

impl ExecutionEngine {
    pub fn new(limits: ExecutionLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &ExecutionLimits {
        &self.limits
    }

    /// Execute every node of `graph`, honouring dependencies, the in-flight
    /// limit and the plan deadline.
    pub async fn execute(
        &self,
        graph: ExecutionGraph,
        invoker: Arc<dyn ActionInvoker>,
    ) -> ExecResult<ExecutionReport> {
        let started = Instant::now();
        let deadline = started + self.limits.plan_timeout;
        let max_in_flight = self.limits.max_concurrent_actions.max(1);
        let mut table = NodeTable::new(graph.len());
        let mut in_flight = FuturesUnordered::new();
        let mut timed_out = false;

        let sleep = tokio::time::sleep_until(deadline);
        tokio::pin!(sleep);

        loop {
            if !timed_out {
                self.promote_ready(&graph, &mut table)?;
                while in_flight.len() < max_in_flight {
                    let Some(node) = table.with_status(NodeStatus::Ready).next() else {
                        break;
                    };
                    table.transition(node, NodeStatus::Ready, NodeStatus::Running)?;
                    let Some(step) = graph.step(node) else {
                        return Err(ExecError::UnknownNode { node });
                    };
                    let action_id = step.action_id.clone();
                    let params = dispatch_params(&graph, &table, node);
                    tracing::debug!(node, action = %action_id, "dispatching action");

                    let invoker = Arc::clone(&invoker);
                    let limits = self.limits;
                    let handle = tokio::spawn(async move {
                        invoke_with_retry(invoker.as_ref(), &action_id, &params, &limits).await
                    });
                    in_flight.push(async move { (node, handle.await) });
                }
            }

            if in_flight.is_empty() {
                break;
            }

            tokio::select! {
                biased;
                Some((node, joined)) = in_flight.next() => {
                    let (outcome, attempts) = joined.unwrap_or_else(|e| {
                        (Err(InvocationError::permanent(format!("action task aborted: {e}"))), 1)
                    });
                    table.entries[node].attempts = attempts;
                    match outcome {
                        Ok(value) => {
                            table.transition(node, NodeStatus::Running, NodeStatus::Succeeded)?;
                            table.entries[node].result = Some(value);
                            tracing::debug!(node, attempts, "action succeeded");
                        }
                        Err(error) => {
                            table.transition(node, NodeStatus::Running, NodeStatus::Failed)?;
                            tracing::warn!(node, attempts, error = %error, "action failed");
                            table.entries[node].error = Some(error);
                            for dependent in graph.descendants(node) {
                                table.skip(dependent, SkipReason::DependencyFailure { upstream: node })?;
                            }
                        }
                    }
                }
                _ = &mut sleep, if !timed_out => {
                    timed_out = true;
                    let waiting: Vec<usize> = table
                        .with_status(NodeStatus::Pending)
                        .chain(table.with_status(NodeStatus::Ready))
                        .collect();
                    tracing::warn!(
                        skipped = waiting.len(),
                        running = in_flight.len(),
                        "plan deadline passed"
                    );
                    for node in waiting {
                        table.skip(node, SkipReason::ExecutionTimeout)?;
                    }
                }
            }
        }

        // Anything still waiting is blocked behind a node that never succeeded.
        let leftover: Vec<usize> = table.with_status(NodeStatus::Pending).collect();
        for node in leftover {
            let upstream = graph
                .predecessors(node)
                .into_iter()
                .find(|&p| table.status(p) != Some(NodeStatus::Succeeded))
                .unwrap_or(node);
            table.skip(node, SkipReason::DependencyFailure { upstream })?;
        }

        Ok(build_report(&graph, table, timed_out, started.elapsed()))
    }

    /// Pending nodes whose predecessors all succeeded become Ready.
    fn promote_ready(&self, graph: &ExecutionGraph, table: &mut NodeTable) -> ExecResult<()> {
        let ready: Vec<usize> = table
            .with_status(NodeStatus::Pending)
            .filter(|&n| {
                graph
                    .predecessors(n)
                    .into_iter()
                    .all(|p| table.status(p) == Some(NodeStatus::Succeeded))
            })
            .collect();
        for node in ready {
            table.transition(node, NodeStatus::Pending, NodeStatus::Ready)?;
        }
        Ok(())
    }
}

/// Literal bindings plus values taken from predecessors' results: the field
/// named after the slot when the result is an object holding it, otherwise
/// the whole result.
fn dispatch_params(graph: &ExecutionGraph, table: &NodeTable, node: usize) -> Parameters {
    let mut params = Parameters::new();
    let Some(step) = graph.step(node) else {
        return params;
    };
    for (name, binding) in &step.bindings {
        let value = match binding {
            Binding::Literal(v) => Some(v.clone()),
            Binding::FromStep { step, slot } => {
                table.entries.get(*step).and_then(|e| e.result.as_ref()).map(|result| {
                    result
                        .get(slot.as_str())
                        .cloned()
                        .unwrap_or_else(|| result.clone())
                })
            }
        };
        if let Some(value) = value {
            params.insert(name.clone(), value);
        }
    }
    params
}

/// Invoke, retrying transient failures with exponential backoff.
/// Returns the final outcome and the number of attempts made.
async fn invoke_with_retry(
    invoker: &dyn ActionInvoker,
    action_id: &str,
    params: &Parameters,
    limits: &ExecutionLimits,
) -> (Result<Value, InvocationError>, u32) {
    let mut retries_used: u32 = 0;
    loop {
        let result = invoker.invoke(action_id, params).await;
        match result {
            Err(error) if error.is_transient() && retries_used < limits.node_retries => {
                let delay = limits.retry_backoff(retries_used);
                retries_used += 1;
                tracing::warn!(
                    action = %action_id,
                    message = %error.message,
                    retry_attempt = retries_used,
                    retry_in_ms = delay.as_millis() as u64,
                    "retrying action after transient error"
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
            other => return (other, retries_used + 1),
        }
    }
}

fn build_report(
    graph: &ExecutionGraph,
    table: NodeTable,
    timed_out: bool,
    elapsed: Duration,
) -> ExecutionReport {
    let nodes: Vec<NodeReport> = table
        .entries
        .into_iter()
        .enumerate()
        .map(|(step, entry)| NodeReport {
            step,
            action_id: graph
                .step(step)
                .map(|s| s.action_id.clone())
                .unwrap_or_default(),
            status: entry.status,
            result: entry.result,
            error: entry.error,
            skipped: entry.skip,
            attempts: entry.attempts,
        })
        .collect();

    let succeeded = nodes
        .iter()
        .filter(|n| n.status == NodeStatus::Succeeded)
        .count();
    let status = if succeeded == nodes.len() {
        OverallStatus::Succeeded
    } else if succeeded > 0 {
        OverallStatus::PartialFailure
    } else {
        OverallStatus::Failed
    };

    let mut unmet_goals = Vec::new();
    for (group, goal) in graph.goals().iter().enumerate() {
        let met = graph
            .steps()
            .zip(&nodes)
            .filter(|(step, _)| step.group == group)
            .all(|(_, node)| node.status == NodeStatus::Succeeded);
        if !met {
            unmet_goals.extend(goal.intents.iter().cloned());
        }
    }

    tracing::info!(
        status = %status,
        nodes = nodes.len(),
        succeeded,
        timed_out,
        "execution finished"
    );
    ExecutionReport {
        status,
        nodes,
        unmet_goals,
        timed_out,
        elapsed_ms: elapsed.as_millis() as u64,
    }
}

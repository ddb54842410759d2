use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use graphagent_core::config::{DEFAULT_MAX_STEPS, MAX_STEPS_LIMIT};
use graphagent_core::error::Result;

use super::registry::NodeRegistry;
use super::state::TaskState;
use super::workflow::{Transition, WorkflowSpec};
use crate::nodes::NodeContext;

/// One node execution within a run.
#[derive(Debug, Clone, Serialize)]
pub struct NodeVisit {
    /// Node that ran.
    pub node: String,
    /// Token the node returned.
    pub token: String,
    /// Node scheduled next; `None` when the run ended here.
    pub next: Option<String>,
    /// Whether `token` was outside the declared edges and got replaced.
    pub redirected: bool,
    pub elapsed_ms: u64,
}

/// Why a run stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "node", rename_all = "snake_case")]
pub enum Termination {
    /// A node returned the end token.
    EndToken,
    /// A node marked the state done without returning the end token.
    Done,
    /// The step budget ran out.
    StepBudget,
    /// The scheduled node is not registered.
    UnknownNode(String),
    Cancelled,
}

/// Outcome of a whole run.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub state: TaskState,
    pub visits: Vec<NodeVisit>,
    pub termination: Termination,
    pub total_elapsed_ms: u64,
}

impl ExecutionResult {
    /// Nodes in the order they ran.
    pub fn path(&self) -> Vec<&str> {
        self.visits.iter().map(|v| v.node.as_str()).collect()
    }
}

/// Interprets a [`WorkflowSpec`] over the nodes of a [`NodeRegistry`].
///
/// The runner holds no per-run state, so one instance can drive any number
/// of concurrent runs.
#[derive(Debug, Clone)]
pub struct WorkflowRunner {
    spec: Arc<WorkflowSpec>,
    registry: Arc<NodeRegistry>,
    max_steps: usize,
}

impl WorkflowRunner {
    pub fn new(spec: Arc<WorkflowSpec>, registry: Arc<NodeRegistry>) -> Self {
        Self {
            spec,
            registry,
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    /// Set the step budget, clamped to `1..=MAX_STEPS_LIMIT`.
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.clamp(1, MAX_STEPS_LIMIT);
        self
    }

    pub fn spec(&self) -> &WorkflowSpec {
        &self.spec
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    /// Run `task` to completion.
    ///
    /// Never fails: node errors are recorded in the trace and end the run,
    /// an unregistered node stops it, and the step budget bounds it.
    pub async fn run(&self, task: &str, ctx: &NodeContext) -> ExecutionResult {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let start = Instant::now();

        let mut state = TaskState::new(task);
        let mut visits = Vec::new();
        let mut current = self.spec.start.clone();

        info!(
            run_id = %run_id,
            pipeline = %self.spec.name,
            start = %current,
            max_steps = self.max_steps,
            "Starting workflow run"
        );

        let termination = loop {
            if state.done {
                break Termination::Done;
            }
            if ctx.cancel.is_cancelled() {
                info!(run_id = %run_id, step = state.step, "Run cancelled");
                break Termination::Cancelled;
            }
            if state.step >= self.max_steps {
                warn!(run_id = %run_id, max_steps = self.max_steps, "Step budget exhausted");
                break Termination::StepBudget;
            }

            state.advance_step();

            let Some(kind) = self.registry.get(&current) else {
                warn!(run_id = %run_id, node = %current, "No node registered under this name, stopping");
                state.note(format!("[STOP] unknown node: {}", current));
                break Termination::UnknownNode(current);
            };

            info!(run_id = %run_id, node = %current, step = state.step, "Executing node");

            let node_start = Instant::now();
            let outcome = kind.execute(&mut state, ctx).await;
            let token = self.settle(&current, outcome, &mut state);
            let elapsed_ms = node_start.elapsed().as_millis() as u64;

            match self.spec.resolve(&current, &token) {
                Transition::End => {
                    debug!(node = %current, token = %token, elapsed_ms, "Node returned end token");
                    visits.push(NodeVisit {
                        node: current,
                        token,
                        next: None,
                        redirected: false,
                        elapsed_ms,
                    });
                    state.mark_done();
                    break Termination::EndToken;
                }
                Transition::Next { node, redirected } => {
                    if redirected {
                        warn!(
                            from = %current,
                            token = %token,
                            to = %node,
                            "Token not allowed by pipeline edges, redirecting"
                        );
                    } else {
                        debug!(from = %current, to = %node, elapsed_ms, "Node complete");
                    }
                    visits.push(NodeVisit {
                        node: std::mem::replace(&mut current, node.clone()),
                        token,
                        next: Some(node),
                        redirected,
                        elapsed_ms,
                    });
                }
            }
        };

        let total_elapsed_ms = start.elapsed().as_millis() as u64;
        info!(
            run_id = %run_id,
            steps = state.step,
            termination = ?termination,
            total_elapsed_ms,
            "Workflow run finished"
        );

        ExecutionResult {
            run_id,
            started_at,
            state,
            visits,
            termination,
            total_elapsed_ms,
        }
    }

    /// Turn a node outcome into the token to route on. A failed node is
    /// recorded in the trace and ends the run.
    fn settle(&self, node: &str, outcome: Result<String>, state: &mut TaskState) -> String {
        match outcome {
            Ok(token) => token,
            Err(e) => {
                error!(node = %node, error = %e, "Node failed");
                state.note(format!("[ERROR] {}: {}", node, e));
                self.spec.end.clone()
            }
        }
    }
}

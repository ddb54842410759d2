//! Built-in node behaviors.
//!
//! Every node reads and mutates the shared [`TaskState`] and returns the name
//! of the node it wants to run next. Collaborator failures never escape a
//! node: model errors become empty replies and retrieval errors become
//! sentinel evidence. Only internal failures (serializing the plan) surface
//! as `Err`, which the runner records as `[ERROR]` and treats as the end
//! token.

pub mod critic;
pub mod math;
pub mod plan;
pub mod research;
pub mod route;
pub mod write;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use graphagent_core::config::AgentConfig;
use graphagent_core::error::Result;
use graphagent_core::traits::Retriever;
use graphagent_core::types::Snippet;

use crate::caller::ModelCaller;
use crate::graph::registry::NodeKind;
use crate::graph::state::TaskState;

/// Collaborators and tuning knobs available to every node of a run.
#[derive(Clone)]
pub struct NodeContext {
    pub caller: ModelCaller,
    pub retriever: Arc<dyn Retriever>,
    pub agent: AgentConfig,
    pub cancel: CancellationToken,
}

impl NodeContext {
    pub fn new(caller: ModelCaller, retriever: Arc<dyn Retriever>, agent: &AgentConfig) -> Self {
        Self {
            caller,
            retriever,
            agent: agent.clone(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// One model call; empty on failure or cancellation.
    pub async fn ask(&self, prompt: &str, temperature: Option<f32>) -> String {
        self.caller
            .call_cancellable(prompt, temperature, &self.cancel)
            .await
    }

    /// One retrieval call; empty once the run is cancelled.
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<Snippet>> {
        tokio::select! {
            _ = self.cancel.cancelled() => {
                debug!(query = %query, "Retrieval cancelled");
                Ok(Vec::new())
            }
            result = self.retriever.search(query, limit) => result,
        }
    }
}

impl NodeKind {
    /// Run this node against `state` and return the next node's name.
    pub async fn execute(self, state: &mut TaskState, ctx: &NodeContext) -> Result<String> {
        let next = match self {
            NodeKind::Plan => plan::run(state, ctx).await?,
            NodeKind::Route => route::run(state, ctx).await,
            NodeKind::Research => research::run(state, ctx).await,
            NodeKind::Math => math::run(state, ctx).await,
            NodeKind::Write => write::run(state, ctx).await,
            NodeKind::Critic => critic::run(state, ctx).await,
        };
        Ok(next.to_string())
    }
}

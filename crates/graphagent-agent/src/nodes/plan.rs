use serde::{Deserialize, Serialize};

use graphagent_core::error::Result;

use crate::extract;
use crate::graph::state::TaskState;

use super::NodeContext;

/// Planning rationale requested from the model.
///
/// Fields the model leaves out take the default plan's value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Plan {
    pub subtasks: Vec<String>,
    pub tools: ToolPlan,
    pub success_criteria: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPlan {
    pub search: bool,
    pub math: bool,
}

impl Default for Plan {
    fn default() -> Self {
        Self {
            subtasks: vec!["Research".into(), "Synthesize".into()],
            tools: ToolPlan::default(),
            success_criteria: vec!["clear answer".into()],
        }
    }
}

impl Default for ToolPlan {
    fn default() -> Self {
        Self {
            search: true,
            math: false,
        }
    }
}

fn prompt(task: &str) -> String {
    format!(
        "Plan step-by-step to solve the user task.\n\
         Task: {}\n\
         Return JSON only: {{\"subtasks\":[\"...\"],\"tools\":{{\"search\":true/false,\"math\":true/false}},\"success_criteria\":[\"...\"]}}",
        task
    )
}

pub async fn run(state: &mut TaskState, ctx: &NodeContext) -> Result<&'static str> {
    let reply = ctx.ask(&prompt(&state.task), None).await;
    let plan = extract::object(&reply, Plan::default).into_inner();

    state.plan = serde_json::to_string_pretty(&plan)?;
    state.note(format!("PLAN:\n{}", state.plan));
    Ok("route")
}

use crate::graph::state::TaskState;

use super::NodeContext;

fn prompt(state: &TaskState, context_lines: usize) -> String {
    format!(
        "You are a router. Decide next node.\n\
         Context scratch (last {}):\n{}\n\
         If math needed -> 'math'; if research needed -> 'research'; if ready -> 'write'.\n\
         Return one token from [research, math, write].\n\
         Task: {}",
        context_lines,
        state.tail(context_lines).join("\n"),
        state.task
    )
}

/// Pick the next node from the router's reply.
///
/// The model only gets its way when the state supports it: `math` needs a
/// digit in the task and `research` only runs while there is no evidence.
pub fn choose(reply: &str, task: &str, has_evidence: bool) -> &'static str {
    let reply = reply.to_lowercase();
    if reply.contains("math") && task.chars().any(|c| c.is_ascii_digit()) {
        "math"
    } else if reply.contains("research") && !has_evidence {
        "research"
    } else {
        "write"
    }
}

pub async fn run(state: &mut TaskState, ctx: &NodeContext) -> &'static str {
    let reply = ctx
        .ask(&prompt(state, ctx.agent.route_context_lines), None)
        .await;
    let choice = choose(&reply, &state.task, !state.evidence.is_empty());
    state.note(format!("ROUTE: {}", choice));
    choice
}

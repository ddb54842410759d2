use tracing::debug;

use crate::graph::state::TaskState;

use super::write::NO_DOCUMENTS_NOTE;
use super::NodeContext;

fn prompt(state: &TaskState) -> String {
    format!(
        "Critique and improve the answer for factuality, missing steps, and clarity.\n\
         If fix needed, return improved answer. Else return 'OK'.\n\
         Answer:\n{}\n\
         Criteria:\n{}",
        state.result, state.plan
    )
}

/// True if the critic's reply should replace the current answer.
pub fn is_revision(reply: &str, min_chars: usize) -> bool {
    let reply = reply.trim();
    !reply.eq_ignore_ascii_case("ok") && reply.chars().count() > min_chars
}

/// The reply without an echoed no-documents note.
fn strip_note(reply: &str) -> &str {
    reply
        .strip_prefix(NO_DOCUMENTS_NOTE.trim_end())
        .map(str::trim_start)
        .unwrap_or(reply)
}

pub async fn run(state: &mut TaskState, ctx: &NodeContext) -> &'static str {
    let reply = ctx.ask(&prompt(state), None).await;
    let reply = strip_note(reply.trim());

    if is_revision(reply, ctx.agent.critic_min_chars) {
        let preface = if state.result.starts_with(NO_DOCUMENTS_NOTE) {
            NO_DOCUMENTS_NOTE
        } else {
            ""
        };
        state.result = format!("{}{}", preface, reply);
        state.note("REVISED");
    } else {
        debug!(reply_chars = reply.chars().count(), "Critic kept the draft");
    }

    state.mark_done();
    "end"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_revision() {
        assert!(!is_revision("OK", 20));
        assert!(!is_revision("  ok \n", 20));
        assert!(!is_revision("Needs more detail.", 20));
        assert!(is_revision("A much longer improved answer with detail.", 20));
    }

    #[test]
    fn test_strip_note() {
        let echoed = format!("{}Better answer.", NO_DOCUMENTS_NOTE);
        assert_eq!(strip_note(echoed.trim()), "Better answer.");
        assert_eq!(strip_note("Better answer."), "Better answer.");
        assert_eq!(strip_note(NO_DOCUMENTS_NOTE.trim()), "");
    }

    #[test]
    fn test_prompt_includes_plan() {
        let mut state = TaskState::new("t");
        state.result = "draft".into();
        state.plan = "{\"subtasks\": []}".into();
        let p = prompt(&state);
        assert!(p.contains("Answer:\ndraft\nCriteria:\n{\"subtasks\": []}"));
    }
}

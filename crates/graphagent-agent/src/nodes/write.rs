use graphagent_core::types::is_sentinel;

use crate::graph::state::TaskState;

use super::NodeContext;

/// Prepended to the prompt and the answer when no real evidence was found.
pub const NO_DOCUMENTS_NOTE: &str = "Note: The local RAG index returned no documents. \
The following answer is based on general model knowledge and may require verification.\n\n";

fn prompt(state: &TaskState, preface: &str, max_citations: usize, context_lines: usize) -> String {
    let citations: Vec<String> = state
        .evidence
        .iter()
        .filter(|line| !is_sentinel(line))
        .take(max_citations)
        .enumerate()
        .map(|(i, line)| format!("[{}] {}", i + 1, line))
        .collect();

    format!(
        "Write the final answer.\n\
         {}Task: {}\n\
         Use the evidence and any math results below, cite inline like [1],[2].\n\
         Evidence:\n{}\n\
         Notes:\n{}\n\
         Return a concise, structured answer.",
        preface,
        state.task,
        citations.join("\n"),
        state.tail(context_lines).join("\n")
    )
}

pub async fn run(state: &mut TaskState, ctx: &NodeContext) -> &'static str {
    let preface = if state.has_real_evidence() {
        ""
    } else {
        NO_DOCUMENTS_NOTE
    };
    let prompt = prompt(
        state,
        preface,
        ctx.agent.max_citations,
        ctx.agent.write_context_lines,
    );

    let draft = ctx.ask(&prompt, Some(ctx.agent.write_temperature)).await;
    state.result = format!("{}{}", preface, draft.trim());
    state.note(format!("DRAFT:\n{}", state.result));
    "critic"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_numbers_citations() {
        let mut state = TaskState::new("compare lawns");
        for i in 0..10 {
            state.push_evidence(format!("k{}", i), format!("doc {}", i));
        }
        let p = prompt(&state, "", 8, 5);
        assert!(p.contains("[1] doc 0"));
        assert!(p.contains("[8] doc 7"));
        assert!(!p.contains("[9]"));
        assert!(p.starts_with("Write the final answer.\nTask: compare lawns"));
    }

    #[test]
    fn test_prompt_skips_sentinel_entries() {
        let mut state = TaskState::new("t");
        state.push_evidence("err", "[RAG_ERROR] backend down");
        state.push_evidence("a", "Real doc — https://a :: real doc");
        state.push_evidence("empty", "[RAG_EMPTY] no documents found for: t");
        let p = prompt(&state, "", 8, 5);
        assert!(p.contains("[1] Real doc — https://a :: real doc"));
        assert!(!p.contains("[2]"));
        assert!(!p.contains("RAG_ERROR"));
        assert!(!p.contains("RAG_EMPTY"));
    }

    #[test]
    fn test_prompt_carries_preface() {
        let state = TaskState::new("t");
        let p = prompt(&state, NO_DOCUMENTS_NOTE, 8, 5);
        assert!(p.contains("Note: The local RAG index returned no documents."));
    }
}

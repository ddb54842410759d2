use std::collections::HashSet;

use tracing::{debug, warn};

use graphagent_core::types::{Snippet, RAG_EMPTY_TAG};

use crate::extract;
use crate::graph::state::TaskState;

use super::NodeContext;

fn prompt(task: &str, count: usize) -> String {
    format!(
        "Generate {} focused search queries for:\nTask: {}\nReturn as a JSON list of strings.",
        count, task
    )
}

/// Queries used when the model does not return a usable list.
pub fn fallback_queries(task: &str) -> Vec<String> {
    vec![
        task.to_string(),
        format!("background {}", task),
        format!("pros cons {}", task),
    ]
}

/// Key under which a snippet is de-duplicated: its canonical source, or the
/// snippet text when it has none.
pub fn dedup_key(snippet: &Snippet) -> String {
    snippet
        .canonical_source()
        .map(str::to_string)
        .unwrap_or_else(|| snippet.text.clone())
}

/// Single-line evidence entry for `snippet`.
pub fn format_line(snippet: &Snippet, max_chars: usize) -> String {
    let text = flatten(&snippet.text, max_chars);
    let title = snippet
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty());

    match (title, snippet.canonical_source()) {
        (title, Some(source)) => format!("{} — {} :: {}", title.unwrap_or(source), source, text),
        (Some(title), None) => format!("{} :: {}", title, text),
        (None, None) => text,
    }
}

fn flatten(text: &str, max_chars: usize) -> String {
    let flat = text.replace(['\r', '\n'], " ");
    let flat = flat.trim();
    if flat.chars().count() <= max_chars {
        return flat.to_string();
    }
    let cut: String = flat.chars().take(max_chars).collect();
    format!("{}…", cut.trim_end())
}

pub async fn run(state: &mut TaskState, ctx: &NodeContext) -> &'static str {
    let agent = &ctx.agent;

    let reply = ctx.ask(&prompt(&state.task, agent.max_queries), None).await;
    let extracted = extract::list(&reply, || fallback_queries(&state.task));
    let parsed = extracted.is_parsed();
    let mut queries: Vec<String> = extracted
        .into_inner()
        .into_iter()
        .map(|q: String| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .take(agent.max_queries)
        .collect();
    if queries.is_empty() {
        queries = fallback_queries(&state.task);
        queries.truncate(agent.max_queries.max(1));
    }
    if agent.baseline_query {
        queries.push(state.task.clone());
    }
    debug!(queries = queries.len(), parsed, "Research queries ready");

    let mut hits = Vec::new();
    for query in &queries {
        match ctx.search(query, agent.retrieval_limit).await {
            Ok(snippets) => hits.extend(snippets),
            Err(e) => {
                warn!(retriever = ctx.retriever.name(), query = %query, error = %e, "Retrieval failed");
                hits.push(Snippet::retrieval_error(e));
            }
        }
    }

    // Sentinels only stand in for a pass that found nothing real.
    if hits.iter().any(|s| !s.is_sentinel()) {
        hits.retain(|s| !s.is_sentinel());
    } else if hits.is_empty() {
        hits.push(Snippet::new(format!(
            "{} no documents found for: {}",
            RAG_EMPTY_TAG, state.task
        )));
    }

    let mut seen = HashSet::new();
    let fresh: Vec<(String, String)> = hits
        .iter()
        .filter_map(|snippet| {
            let key = dedup_key(snippet);
            if state.has_evidence_key(&key) || !seen.insert(key.clone()) {
                return None;
            }
            Some((key, format_line(snippet, agent.snippet_max_chars)))
        })
        .take(agent.max_evidence)
        .collect();

    let mut added = Vec::with_capacity(fresh.len());
    for (key, line) in fresh {
        if state.push_evidence(key, line.clone()) {
            added.push(line);
        }
    }

    debug!(hits = hits.len(), added = added.len(), "Research pass complete");

    if !added.is_empty() {
        let summary: Vec<&str> = added
            .iter()
            .take(agent.evidence_summary_lines)
            .map(String::as_str)
            .collect();
        state.note(format!("EVIDENCE:\n- {}", summary.join("\n- ")));
    }
    "route"
}

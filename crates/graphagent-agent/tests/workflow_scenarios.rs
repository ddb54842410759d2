use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use graphagent_agent::{
    ModelCaller, NodeContext, NodeKind, NodeRegistry, TaskState, Termination, WorkflowRunner,
    WorkflowSpec, NO_DOCUMENTS_NOTE,
};
use graphagent_core::config::{AgentConfig, ModelConfig};
use graphagent_core::traits::{LlmClient, Retriever};
use graphagent_core::types::Snippet;
use graphagent_test_utils::{
    landscaping_snippets, snippet, FailingLlm, FailingRetriever, FixedRetriever, ScriptedLlm,
    StalledLlm,
};

const PLAN_REPLY: &str = r#"{"subtasks":["Research","Compute"],"tools":{"search":true,"math":true},"success_criteria":["cites sources"]}"#;
const DRAFT: &str = "Xeriscape needs far less irrigation than turf [1][2]. 5*7 = 35.";

fn context(llm: Arc<dyn LlmClient>, retriever: Arc<dyn Retriever>) -> NodeContext {
    context_with(llm, retriever, AgentConfig::default())
}

fn context_with(
    llm: Arc<dyn LlmClient>,
    retriever: Arc<dyn Retriever>,
    agent: AgentConfig,
) -> NodeContext {
    let caller = ModelCaller::new(llm, &ModelConfig::default());
    NodeContext::new(caller, retriever, &agent)
}

fn runner(spec: WorkflowSpec) -> WorkflowRunner {
    WorkflowRunner::new(Arc::new(spec), Arc::new(NodeRegistry::with_builtins()))
}

fn routing_spec() -> WorkflowSpec {
    WorkflowSpec::new("plan").with_edges("route", ["research", "math", "write"])
}

fn scripted(critic_reply: &str) -> ScriptedLlm {
    ScriptedLlm::new()
        .on("You are a router", "research")
        .on("You are a router", "math")
        .on("You are a router", "write")
        .on("Plan step-by-step", PLAN_REPLY)
        .on("focused search queries", r#"["xeriscape water use", "turf water use"]"#)
        .on("Extract a single arithmetic expression", "5*7")
        .on("Write the final answer", DRAFT)
        .on("Critique and improve", critic_reply)
}

#[tokio::test]
async fn test_research_math_write_scenario() {
    let llm = Arc::new(scripted("OK"));
    let retriever = Arc::new(FixedRetriever::new(landscaping_snippets()));
    let ctx = context(llm.clone(), retriever.clone());

    let result = runner(routing_spec())
        .run("Compare xeriscape vs turf; compute 5*7", &ctx)
        .await;

    assert_eq!(
        result.path(),
        vec!["plan", "route", "research", "route", "math", "route", "write", "critic"]
    );
    assert_eq!(result.termination, Termination::EndToken);
    assert!(result.state.done);
    assert_eq!(result.state.step, 8);

    let scratch = &result.state.scratch;
    assert!(scratch.iter().any(|l| l == "MATH: 5*7 = 35"));
    assert!(scratch.iter().any(|l| l.starts_with("EVIDENCE:\n- Xeriscaping basics — https://example.org/xeriscape :: ")));
    assert!(!scratch.iter().any(|l| l == "REVISED"));

    // Two generated queries plus the baseline task query.
    assert_eq!(retriever.call_count(), 3);
    assert_eq!(result.state.evidence.len(), 3);
    assert_eq!(result.state.result, DRAFT);
    assert!(result.state.plan.contains("cites sources"));

    let write_call = llm
        .calls()
        .into_iter()
        .find(|c| c.prompt.starts_with("Write the final answer"))
        .unwrap();
    assert!((write_call.temperature - 0.3).abs() < f32::EPSILON);
    assert!(write_call.prompt.contains("[1] Xeriscaping basics"));
    assert!(!write_call.prompt.contains(NO_DOCUMENTS_NOTE));
}

#[tokio::test]
async fn test_no_digits_and_empty_retrieval_adds_disclaimer() {
    let llm = Arc::new(
        ScriptedLlm::new()
            .on("You are a router", "math or research")
            .on("Write the final answer", "Turf needs more water.")
            .on("Critique and improve", "OK"),
    );
    let retriever = Arc::new(FixedRetriever::empty());
    let ctx = context(llm.clone(), retriever.clone());

    let result = runner(routing_spec())
        .run("Compare xeriscape and turf lawns", &ctx)
        .await;

    let path = result.path();
    assert!(!path.contains(&"math"));
    assert_eq!(path, vec!["plan", "route", "research", "route", "write", "critic"]);

    // Fallback queries (model gave no list) plus the baseline.
    assert_eq!(retriever.call_count(), 4);
    assert_eq!(result.state.evidence.len(), 1);
    assert!(result.state.evidence[0].starts_with("[RAG_EMPTY]"));

    assert!(result.state.result.starts_with(NO_DOCUMENTS_NOTE));
    assert!(result.state.result.ends_with("Turf needs more water."));
    let write_call = llm
        .calls()
        .into_iter()
        .find(|c| c.prompt.starts_with("Write the final answer"))
        .unwrap();
    assert!(write_call.prompt.contains(NO_DOCUMENTS_NOTE));
}

#[tokio::test]
async fn test_retrieval_errors_become_one_sentinel() {
    let llm = Arc::new(
        ScriptedLlm::new()
            .on("You are a router", "research")
            .on("Write the final answer", "General answer."),
    );
    let ctx = context(llm, Arc::new(FailingRetriever));

    let result = runner(routing_spec()).run("Why mulch?", &ctx).await;

    assert_eq!(result.termination, Termination::EndToken);
    assert_eq!(result.state.evidence.len(), 1);
    assert!(result.state.evidence[0].starts_with("[RAG_ERROR]"));
    assert!(result.state.result.starts_with(NO_DOCUMENTS_NOTE));
}

#[tokio::test]
async fn test_critic_revision_replaces_result() {
    let revised = "A revised answer that is clearly longer than twenty characters.";
    let llm = Arc::new(scripted(revised));
    let ctx = context(llm, Arc::new(FixedRetriever::new(landscaping_snippets())));

    let result = runner(routing_spec())
        .run("Compare xeriscape vs turf; compute 5*7", &ctx)
        .await;

    assert_eq!(result.state.result, revised);
    assert_eq!(result.state.scratch.last().map(String::as_str), Some("REVISED"));
}

#[tokio::test]
async fn test_short_critic_reply_is_ignored() {
    let llm = Arc::new(scripted("Looks fine."));
    let ctx = context(llm, Arc::new(FixedRetriever::new(landscaping_snippets())));

    let result = runner(routing_spec())
        .run("Compare xeriscape vs turf; compute 5*7", &ctx)
        .await;

    assert_eq!(result.state.result, DRAFT);
    assert!(!result.state.scratch.iter().any(|l| l == "REVISED"));
}

#[tokio::test]
async fn test_revision_keeps_disclaimer() {
    let revised = "Xeriscaping generally saves water compared with turf.";
    let llm = Arc::new(
        ScriptedLlm::new()
            .on("Write the final answer", "Short draft.")
            .on("Critique and improve", revised),
    );
    let ctx = context(llm, Arc::new(FixedRetriever::empty()));

    let result = runner(routing_spec()).run("Compare lawns", &ctx).await;

    assert_eq!(result.state.result, format!("{}{}", NO_DOCUMENTS_NOTE, revised));
}

#[tokio::test]
async fn test_revision_echoing_disclaimer_keeps_single_note() {
    let revised = "Xeriscaping generally saves water compared with turf.";
    let echoed = format!("{}{}", NO_DOCUMENTS_NOTE, revised);
    let llm = Arc::new(
        ScriptedLlm::new()
            .on("Write the final answer", "Short draft.")
            .on("Critique and improve", echoed),
    );
    let ctx = context(llm, Arc::new(FixedRetriever::empty()));

    let result = runner(routing_spec()).run("Compare lawns", &ctx).await;

    assert_eq!(result.state.result, format!("{}{}", NO_DOCUMENTS_NOTE, revised));
    assert_eq!(result.state.result.matches("The local RAG index").count(), 1);
}

#[tokio::test]
async fn test_sentinel_hits_dropped_when_real_evidence_found() {
    let llm = Arc::new(
        ScriptedLlm::new()
            .on("You are a router", "research")
            .on("You are a router", "write")
            .on("Write the final answer", DRAFT)
            .on("Critique and improve", "OK"),
    );
    let retriever = Arc::new(FixedRetriever::new(vec![
        Snippet::retrieval_error("backend down"),
        snippet("Real doc", "https://a", "real doc"),
    ]));
    let ctx = context(llm.clone(), retriever);

    let result = runner(routing_spec()).run("Compare lawns", &ctx).await;

    assert_eq!(result.state.evidence.len(), 1);
    assert!(result.state.evidence[0].ends_with(":: real doc"));
    assert!(result.state.has_real_evidence());

    let write_prompt = llm
        .calls()
        .into_iter()
        .find(|c| c.prompt.contains("Write the final answer"))
        .map(|c| c.prompt)
        .unwrap();
    assert!(write_prompt.contains("[1] Real doc"));
    assert!(!write_prompt.contains("[2]"));
    assert!(!write_prompt.contains("RAG_ERROR"));
    assert!(!write_prompt.contains(NO_DOCUMENTS_NOTE.trim_end()));

    let summary = result
        .state
        .scratch
        .iter()
        .find(|l| l.starts_with("EVIDENCE:"))
        .unwrap();
    assert!(!summary.contains("RAG_ERROR"));
    assert_eq!(result.state.result, DRAFT);
}

#[tokio::test]
async fn test_step_budget_bounds_looping_pipeline() {
    // plan always returns "route", which this pipeline never allows.
    let spec = WorkflowSpec::new("plan").with_edges("plan", ["plan"]);
    let llm = Arc::new(ScriptedLlm::new());
    let ctx = context(llm, Arc::new(FixedRetriever::empty()));

    let result = runner(spec).with_max_steps(5).run("loop forever", &ctx).await;

    assert_eq!(result.termination, Termination::StepBudget);
    assert_eq!(result.state.step, 5);
    assert_eq!(result.visits.len(), 5);
    assert!(result.visits.iter().all(|v| v.redirected && v.token == "route"));
    assert!(!result.state.done);
}

#[tokio::test]
async fn test_invalid_token_redirects_to_declared_edge() {
    let spec = WorkflowSpec::new("plan").with_edges("plan", ["write"]);
    let llm = Arc::new(ScriptedLlm::new().on("Critique and improve", "OK"));
    let ctx = context(llm, Arc::new(FixedRetriever::empty()));

    let result = runner(spec).run("Summarize lawn care", &ctx).await;

    assert_eq!(result.path(), vec!["plan", "write", "critic"]);
    let first = &result.visits[0];
    assert_eq!(first.token, "route");
    assert_eq!(first.next.as_deref(), Some("write"));
    assert!(first.redirected);
    assert_eq!(result.termination, Termination::EndToken);
}

#[tokio::test]
async fn test_unknown_node_stops_run() {
    let llm = Arc::new(ScriptedLlm::new());
    let ctx = context(llm.clone(), Arc::new(FixedRetriever::empty()));

    let result = runner(WorkflowSpec::new("ghost")).run("anything", &ctx).await;

    assert_eq!(result.termination, Termination::UnknownNode("ghost".into()));
    assert_eq!(result.state.step, 1);
    assert!(result.visits.is_empty());
    assert_eq!(result.state.scratch, vec!["[STOP] unknown node: ghost"]);
    assert!(llm.calls().is_empty());
}

#[tokio::test]
async fn test_alias_node_runs() {
    let mut registry = NodeRegistry::with_builtins();
    registry.register("draft", NodeKind::Write);
    let spec = WorkflowSpec::new("draft").with_edges("draft", ["critic"]);
    let runner = WorkflowRunner::new(Arc::new(spec), Arc::new(registry));

    let llm = Arc::new(ScriptedLlm::new().on("Write the final answer", "Draft text."));
    let ctx = context(llm, Arc::new(FixedRetriever::empty()));

    let result = runner.run("write something", &ctx).await;
    assert_eq!(result.path(), vec!["draft", "critic"]);
    assert!(result.state.result.ends_with("Draft text."));
}

#[tokio::test]
async fn test_model_failures_still_terminate() {
    let ctx = context(Arc::new(FailingLlm), Arc::new(FixedRetriever::empty()));

    let result = runner(routing_spec()).run("Compute 2+2", &ctx).await;

    assert_eq!(result.path(), vec!["plan", "route", "write", "critic"]);
    assert_eq!(result.termination, Termination::EndToken);
    assert!(result.state.plan.contains("Synthesize"));
    assert!(result.state.result.starts_with(NO_DOCUMENTS_NOTE));
}

#[tokio::test]
async fn test_research_is_idempotent() {
    let llm = Arc::new(ScriptedLlm::new());
    let retriever = Arc::new(FixedRetriever::new(landscaping_snippets()));
    let ctx = context(llm, retriever);
    let mut state = TaskState::new("xeriscape");

    NodeKind::Research.execute(&mut state, &ctx).await.unwrap();
    let evidence = state.evidence.clone();
    let notes = state.scratch.len();
    assert_eq!(evidence.len(), 3);

    NodeKind::Research.execute(&mut state, &ctx).await.unwrap();
    assert_eq!(state.evidence, evidence);
    assert_eq!(state.scratch.len(), notes);
}

#[tokio::test]
async fn test_research_dedups_by_source_and_caps_lines() {
    let snippets = vec![
        snippet("A", "https://a", "first"),
        snippet("A mirror", "https://a", "same page again"),
        snippet("B", "https://b", "second"),
        snippet("C", "https://c", "third"),
    ];
    let agent = AgentConfig {
        max_evidence: 2,
        evidence_summary_lines: 1,
        ..AgentConfig::default()
    };
    let ctx = context_with(
        Arc::new(ScriptedLlm::new()),
        Arc::new(FixedRetriever::new(snippets)),
        AgentConfig {
            retrieval_limit: 4,
            ..agent
        },
    );
    let mut state = TaskState::new("topic");

    NodeKind::Research.execute(&mut state, &ctx).await.unwrap();
    assert_eq!(
        state.evidence,
        vec!["A — https://a :: first", "B — https://b :: second"]
    );
    assert_eq!(state.scratch, vec!["EVIDENCE:\n- A — https://a :: first"]);

    // Lines past the cap were not consumed and arrive on the next pass.
    NodeKind::Research.execute(&mut state, &ctx).await.unwrap();
    assert_eq!(state.evidence.len(), 3);
    assert_eq!(state.evidence[2], "C — https://c :: third");
}

#[tokio::test]
async fn test_concurrent_runs_are_independent() {
    let runner = Arc::new(runner(routing_spec()));
    let llm = Arc::new(
        ScriptedLlm::new()
            .on("You are a router", "write")
            .on("Critique and improve", "OK")
            .on("Write the final answer", "An answer."),
    );
    let ctx = context(llm, Arc::new(FixedRetriever::new(landscaping_snippets())));

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let runner = runner.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move { runner.run(&format!("task {}", i), &ctx).await })
        })
        .collect();

    let mut run_ids = Vec::new();
    for (i, handle) in handles.into_iter().enumerate() {
        let result = handle.await.unwrap();
        assert_eq!(result.state.task, format!("task {}", i));
        assert_eq!(result.path(), vec!["plan", "route", "write", "critic"]);
        assert!(result.state.evidence.is_empty());
        run_ids.push(result.run_id);
    }
    run_ids.sort();
    run_ids.dedup();
    assert_eq!(run_ids.len(), 4);
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let llm = Arc::new(ScriptedLlm::new());
    let cancel = CancellationToken::new();
    cancel.cancel();
    let ctx = context(llm.clone(), Arc::new(FixedRetriever::empty())).with_cancel(cancel);

    let result = runner(routing_spec()).run("never runs", &ctx).await;

    assert_eq!(result.termination, Termination::Cancelled);
    assert_eq!(result.state.step, 0);
    assert!(result.visits.is_empty());
    assert!(llm.calls().is_empty());
}

#[tokio::test]
async fn test_cancel_interrupts_stalled_model() {
    let cancel = CancellationToken::new();
    let ctx = context(Arc::new(StalledLlm), Arc::new(FixedRetriever::empty()))
        .with_cancel(cancel.clone());

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
    });

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        runner(routing_spec()).run("stalls", &ctx),
    )
    .await
    .unwrap();

    assert_eq!(result.termination, Termination::Cancelled);
    assert_eq!(result.path(), vec!["plan"]);
    assert!(result.state.plan.contains("Research"));
}

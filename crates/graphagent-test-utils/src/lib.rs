//! Mocks and fixtures shared by the GraphAgent test suites.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use futures::future::BoxFuture;
use futures::stream::{self, BoxStream};

use graphagent_core::config::ModelConfig;
use graphagent_core::error::{GraphAgentError, Result};
use graphagent_core::traits::{LlmClient, Retriever};
use graphagent_core::types::{ChatMessage, Role, Snippet, StopReason, StreamDelta};

/// One request as seen by [`ScriptedLlm`].
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub system: Option<String>,
    pub prompt: String,
    pub temperature: f32,
}

struct Rule {
    needle: String,
    responses: VecDeque<String>,
}

/// LLM mock that answers by substring match on the user prompt.
///
/// Rules are checked in registration order. Each rule hands out its queued
/// responses one at a time and keeps repeating the last one. Prompts that
/// match no rule get the default response.
pub struct ScriptedLlm {
    rules: Mutex<Vec<Rule>>,
    default_response: String,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self::with_default("")
    }

    pub fn with_default(text: impl Into<String>) -> Self {
        Self {
            rules: Mutex::new(Vec::new()),
            default_response: text.into(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue `response` for prompts containing `needle`.
    pub fn on(self, needle: impl Into<String>, response: impl Into<String>) -> Self {
        let needle = needle.into();
        {
            let mut rules = self.rules.lock().unwrap();
            match rules.iter_mut().find(|r| r.needle == needle) {
                Some(rule) => rule.responses.push_back(response.into()),
                None => rules.push(Rule {
                    needle,
                    responses: VecDeque::from([response.into()]),
                }),
            }
        }
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of recorded prompts containing `needle`.
    pub fn count_containing(&self, needle: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.prompt.contains(needle))
            .count()
    }

    fn respond(&self, prompt: &str) -> String {
        let mut rules = self.rules.lock().unwrap();
        for rule in rules.iter_mut() {
            if prompt.contains(&rule.needle) {
                if rule.responses.len() > 1 {
                    if let Some(next) = rule.responses.pop_front() {
                        return next;
                    }
                }
                return rule.responses.front().cloned().unwrap_or_default();
            }
        }
        self.default_response.clone()
    }
}

impl Default for ScriptedLlm {
    fn default() -> Self {
        Self::new()
    }
}

impl LlmClient for ScriptedLlm {
    fn chat_stream(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
        let system = messages
            .iter()
            .find(|m| m.role == Role::System)
            .map(|m| m.content.clone());
        let prompt = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();
        let temperature = config.temperature;

        Box::pin(async move {
            let text = self.respond(&prompt);
            self.calls.lock().unwrap().push(RecordedCall {
                system,
                prompt,
                temperature,
            });

            // Two text deltas so consumers must concatenate.
            let mid = text
                .char_indices()
                .nth(text.chars().count() / 2)
                .map(|(i, _)| i)
                .unwrap_or(text.len());
            let (head, tail) = text.split_at(mid);
            let deltas = vec![
                Ok(StreamDelta::TextDelta(head.to_string())),
                Ok(StreamDelta::TextDelta(tail.to_string())),
                Ok(StreamDelta::Stop(StopReason::EndTurn)),
            ];
            Ok(Box::pin(stream::iter(deltas)) as BoxStream<'_, Result<StreamDelta>>)
        })
    }
}

/// LLM mock whose every request fails.
#[derive(Default)]
pub struct FailingLlm;

impl LlmClient for FailingLlm {
    fn chat_stream(
        &self,
        _config: &ModelConfig,
        _messages: Vec<ChatMessage>,
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
        Box::pin(async { Err(GraphAgentError::LlmRequest("connection refused".into())) })
    }
}

/// LLM mock whose requests never complete.
#[derive(Default)]
pub struct StalledLlm;

impl LlmClient for StalledLlm {
    fn chat_stream(
        &self,
        _config: &ModelConfig,
        _messages: Vec<ChatMessage>,
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
        let never = futures::future::pending::<Result<BoxStream<'_, Result<StreamDelta>>>>();
        Box::pin(never)
    }
}

/// Retriever that returns the same snippets for every query.
pub struct FixedRetriever {
    snippets: Vec<Snippet>,
    queries: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl FixedRetriever {
    pub fn new(snippets: Vec<Snippet>) -> Self {
        Self {
            snippets,
            queries: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

impl Retriever for FixedRetriever {
    fn name(&self) -> &str {
        "fixed"
    }

    fn search(&self, query: &str, limit: usize) -> BoxFuture<'_, Result<Vec<Snippet>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().unwrap().push(query.to_string());
        let hits: Vec<Snippet> = self.snippets.iter().take(limit).cloned().collect();
        Box::pin(async move { Ok(hits) })
    }
}

/// Retriever whose every search returns `Err`.
#[derive(Default)]
pub struct FailingRetriever;

impl Retriever for FailingRetriever {
    fn name(&self) -> &str {
        "failing"
    }

    fn search(&self, _query: &str, _limit: usize) -> BoxFuture<'_, Result<Vec<Snippet>>> {
        Box::pin(async { Err(GraphAgentError::Retrieval("index offline".into())) })
    }
}

/// A snippet with all fields set.
pub fn snippet(title: &str, source: &str, text: &str) -> Snippet {
    Snippet::new(text).with_title(title).with_source(source)
}

/// A small landscaping corpus with distinct sources.
pub fn landscaping_snippets() -> Vec<Snippet> {
    vec![
        snippet(
            "Xeriscaping basics",
            "https://example.org/xeriscape",
            "Xeriscaping replaces turf with drought-tolerant plants and mulch,\ncutting irrigation needs.",
        ),
        snippet(
            "Turf grass water use",
            "https://example.org/turf",
            "Cool-season turf typically needs about an inch of water per week in summer.",
        ),
        snippet(
            "Cost comparison",
            "https://example.org/costs",
            "Up-front xeriscape installation costs more but maintenance is lower.",
        ),
    ]
}

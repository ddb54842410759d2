use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::{BoxStream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use graphagent_core::config::ModelConfig;
use graphagent_core::error::{GraphAgentError, Result};
use graphagent_core::traits::LlmClient;
use graphagent_core::types::*;

use crate::streaming::{SseEvent, SseStream};

/// Local OpenAI-compatible server (LM Studio default port).
pub const DEFAULT_API_BASE: &str = "http://127.0.0.1:1234/v1";

/// OpenAI-compatible client. Works with LM Studio, Ollama, vLLM, llama.cpp, OpenAI, etc.
pub struct OpenAiClient {
    http: Client,
}

impl OpenAiClient {
    pub fn new() -> Self {
        Self {
            http: Client::new(),
        }
    }

    /// Client whose requests give up after `secs` seconds.
    pub fn with_timeout(secs: u64) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(secs))
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Failed to build HTTP client with timeout, using defaults");
                Client::new()
            });
        Self { http }
    }
}

impl Default for OpenAiClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Full chat-completions URL for a configured API base.
pub fn chat_completions_url(base_url: Option<&str>) -> String {
    let base = base_url.unwrap_or(DEFAULT_API_BASE).trim_end_matches('/');
    if base.ends_with("/chat/completions") {
        base.to_string()
    } else {
        format!("{}/chat/completions", base)
    }
}

// Request types
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<OaiMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Serialize)]
struct OaiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

// Response types
#[derive(Deserialize, Debug)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<StreamUsage>,
}

#[derive(Deserialize, Debug)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<StreamDeltaContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct StreamDeltaContent {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct StreamUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

pub(crate) fn parse_chunk(event: SseEvent) -> Vec<Result<StreamDelta>> {
    if event.data.trim() == "[DONE]" {
        return vec![];
    }

    let chunk: StreamChunk = match serde_json::from_str(&event.data) {
        Ok(chunk) => chunk,
        Err(e) => {
            warn!(data = %event.data, error = %e, "Failed to parse OpenAI SSE chunk");
            return vec![];
        }
    };

    let mut deltas = Vec::new();

    if let Some(usage) = chunk.usage {
        deltas.push(Ok(StreamDelta::Usage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
        }));
    }

    let Some(choice) = chunk.choices.into_iter().next() else {
        return deltas;
    };

    if let Some(text) = choice.delta.and_then(|d| d.content) {
        if !text.is_empty() {
            deltas.push(Ok(StreamDelta::TextDelta(text)));
        }
    }

    if let Some(reason) = choice.finish_reason {
        let stop = match reason.as_str() {
            "length" => StopReason::MaxTokens,
            "stop_sequence" => StopReason::StopSequence,
            _ => StopReason::EndTurn,
        };
        deltas.push(Ok(StreamDelta::Stop(stop)));
    }

    deltas
}

impl LlmClient for OpenAiClient {
    fn chat_stream(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
        let config = config.clone();

        Box::pin(async move {
            let url = chat_completions_url(config.base_url.as_deref());

            let body = ChatRequest {
                model: &config.model_id,
                messages: messages
                    .iter()
                    .map(|m| OaiMessage {
                        role: role_name(m.role),
                        content: &m.content,
                    })
                    .collect(),
                max_tokens: config.max_tokens,
                temperature: config.temperature,
                stream: true,
            };

            debug!(url = %url, model = %config.model_id, "Sending chat completion request");

            let mut req = self.http.post(&url).json(&body);

            if let Some(api_key) = &config.api_key {
                req = req.header("Authorization", format!("Bearer {}", api_key));
            }

            let response = req
                .send()
                .await
                .map_err(|e| GraphAgentError::LlmRequest(e.to_string()))?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "unknown".to_string());
                return Err(GraphAgentError::LlmRequest(format!(
                    "HTTP {}: {}",
                    status, body
                )));
            }

            let sse_stream = SseStream::new(response.bytes_stream());

            let delta_stream = sse_stream
                .map(|event| futures::stream::iter(parse_chunk(event)))
                .flatten();

            Ok(Box::pin(delta_stream) as BoxStream<'_, Result<StreamDelta>>)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(data: &str) -> SseEvent {
        SseEvent {
            event_type: None,
            data: data.to_string(),
        }
    }

    #[test]
    fn test_chat_completions_url() {
        assert_eq!(
            chat_completions_url(None),
            "http://127.0.0.1:1234/v1/chat/completions"
        );
        assert_eq!(
            chat_completions_url(Some("http://localhost:11434/v1/")),
            "http://localhost:11434/v1/chat/completions"
        );
        assert_eq!(
            chat_completions_url(Some("https://api.example.com/v1/chat/completions")),
            "https://api.example.com/v1/chat/completions"
        );
    }

    #[test]
    fn test_parse_text_delta() {
        let deltas = parse_chunk(event(r#"{"choices":[{"delta":{"content":"Hello"}}]}"#));
        assert_eq!(deltas.len(), 1);
        assert!(matches!(&deltas[0], Ok(StreamDelta::TextDelta(t)) if t == "Hello"));
    }

    #[test]
    fn test_parse_finish_reason() {
        let deltas = parse_chunk(event(
            r#"{"choices":[{"delta":{},"finish_reason":"length"}]}"#,
        ));
        assert!(matches!(
            &deltas[0],
            Ok(StreamDelta::Stop(StopReason::MaxTokens))
        ));
    }

    #[test]
    fn test_parse_usage_chunk() {
        let deltas = parse_chunk(event(
            r#"{"choices":[],"usage":{"prompt_tokens":12,"completion_tokens":3}}"#,
        ));
        assert!(matches!(
            &deltas[0],
            Ok(StreamDelta::Usage {
                input_tokens: 12,
                output_tokens: 3
            })
        ));
    }

    #[test]
    fn test_parse_done_and_garbage() {
        assert!(parse_chunk(event("[DONE]")).is_empty());
        assert!(parse_chunk(event("not json")).is_empty());
    }

    #[test]
    fn test_request_serialization() {
        let msgs = [ChatMessage::system("be brief"), ChatMessage::user("hi")];
        let body = ChatRequest {
            model: "qwen",
            messages: msgs
                .iter()
                .map(|m| OaiMessage {
                    role: role_name(m.role),
                    content: &m.content,
                })
                .collect(),
            max_tokens: 10,
            temperature: 0.2,
            stream: true,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
        assert_eq!(json["stream"], true);
    }
}

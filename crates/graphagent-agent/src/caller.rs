use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use graphagent_core::config::ModelConfig;
use graphagent_core::error::Result;
use graphagent_core::traits::LlmClient;
use graphagent_core::types::{ChatMessage, StreamDelta};

/// System preamble used when the config does not set `model.system_prompt`.
pub const DEFAULT_PREAMBLE: &str = "You are GraphAgent, a principled planner-executor. \
Prefer structured, concise outputs; use provided tools when asked.";

/// Prompt-in, text-out adapter over a streaming [`LlmClient`].
///
/// Failures and cancellation are absorbed: the caller always gets a string,
/// empty when no answer could be produced.
#[derive(Clone)]
pub struct ModelCaller {
    llm: Arc<dyn LlmClient>,
    config: ModelConfig,
    preamble: String,
}

impl ModelCaller {
    pub fn new(llm: Arc<dyn LlmClient>, config: &ModelConfig) -> Self {
        let preamble = config
            .system_prompt
            .clone()
            .unwrap_or_else(|| DEFAULT_PREAMBLE.to_string());
        Self {
            llm,
            config: config.clone(),
            preamble,
        }
    }

    /// Send `prompt` and return the trimmed reply.
    pub async fn call(&self, prompt: &str, temperature: Option<f32>) -> String {
        self.call_cancellable(prompt, temperature, &CancellationToken::new())
            .await
    }

    /// Like [`call`](Self::call), but gives up with `""` once `cancel` fires.
    pub async fn call_cancellable(
        &self,
        prompt: &str,
        temperature: Option<f32>,
        cancel: &CancellationToken,
    ) -> String {
        let mut config = self.config.clone();
        if let Some(t) = temperature {
            config.temperature = t;
        }
        let messages = vec![
            ChatMessage::system(self.preamble.clone()),
            ChatMessage::user(prompt),
        ];

        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Model call cancelled");
                String::new()
            }
            result = self.collect(&config, messages) => match result {
                Ok(text) => text.trim().to_string(),
                Err(e) => {
                    warn!(model = %config.model_id, error = %e, "Model call failed, continuing with empty output");
                    String::new()
                }
            }
        }
    }

    async fn collect(&self, config: &ModelConfig, messages: Vec<ChatMessage>) -> Result<String> {
        let mut stream = self.llm.chat_stream(config, messages).await?;
        let mut text = String::new();

        while let Some(delta) = stream.next().await {
            match delta? {
                StreamDelta::TextDelta(chunk) => text.push_str(&chunk),
                StreamDelta::Usage {
                    input_tokens,
                    output_tokens,
                } => debug!(input_tokens, output_tokens, "Model usage"),
                StreamDelta::Stop(reason) => debug!(?reason, "Model stopped"),
            }
        }

        Ok(text)
    }
}

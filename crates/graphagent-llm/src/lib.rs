pub mod providers;
pub mod streaming;

use graphagent_core::config::ModelConfig;
use graphagent_core::error::{GraphAgentError, Result};
use graphagent_core::traits::LlmClient;

pub use providers::openai::OpenAiClient;

/// Create an LLM client based on the provider name.
///
/// Every supported provider speaks the OpenAI chat-completions protocol;
/// the name only selects defaults.
pub fn create_client(config: &ModelConfig) -> Result<Box<dyn LlmClient>> {
    match config.provider.to_lowercase().as_str() {
        "openai" | "local" | "lmstudio" | "ollama" | "vllm" | "llamacpp" | "groq"
        | "openrouter" => Ok(Box::new(OpenAiClient::with_timeout(
            config.request_timeout_secs,
        ))),
        other => Err(GraphAgentError::UnsupportedProvider(other.to_string())),
    }
}

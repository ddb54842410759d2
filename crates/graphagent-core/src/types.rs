use serde::{Deserialize, Serialize};

/// Prefix of evidence entries produced when a retrieval backend failed.
pub const RAG_ERROR_TAG: &str = "[RAG_ERROR]";

/// Prefix of evidence entries recorded when retrieval came back empty.
pub const RAG_EMPTY_TAG: &str = "[RAG_EMPTY]";

/// Returns true if `text` is a sentinel entry rather than real content.
pub fn is_sentinel(text: &str) -> bool {
    let text = text.trim_start();
    text.starts_with(RAG_ERROR_TAG) || text.starts_with(RAG_EMPTY_TAG)
}

/// Role in a conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A chat message sent to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: text.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: text.into(),
        }
    }
}

/// Stop reason from the LLM.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    StopSequence,
}

/// A single streamed event from the model.
#[derive(Debug, Clone)]
pub enum StreamDelta {
    TextDelta(String),
    Usage {
        input_tokens: u64,
        output_tokens: u64,
    },
    Stop(StopReason),
}

/// A retrieved document snippet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snippet {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Canonical source identifier (usually a URL).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl Snippet {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            title: None,
            source: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// The sentinel a backend returns when it cannot be reached.
    pub fn retrieval_error(message: impl std::fmt::Display) -> Self {
        Self::new(format!("{} {}", RAG_ERROR_TAG, message))
    }

    pub fn is_sentinel(&self) -> bool {
        is_sentinel(&self.text)
    }

    /// Canonical source, ignoring blank values.
    pub fn canonical_source(&self) -> Option<&str> {
        self.source
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

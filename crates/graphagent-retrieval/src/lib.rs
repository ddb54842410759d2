pub mod http;
pub mod keyword;
pub mod unavailable;

use std::path::Path;
use std::sync::Arc;

use graphagent_core::config::{RetrievalBackend, RetrievalConfig};
use graphagent_core::error::{GraphAgentError, Result};
use graphagent_core::traits::Retriever;

pub use http::HttpRetriever;
pub use keyword::KeywordRetriever;
pub use unavailable::UnavailableRetriever;

/// Build the retriever selected by `config.backend`.
///
/// A relative corpus path is resolved against `base` (the config file's
/// directory) when given.
pub fn create_retriever(config: &RetrievalConfig, base: Option<&Path>) -> Result<Arc<dyn Retriever>> {
    match config.backend {
        RetrievalBackend::None => Ok(Arc::new(UnavailableRetriever::new(
            "no retrieval backend configured",
        ))),
        RetrievalBackend::Http => {
            let endpoint = config.endpoint.as_deref().ok_or_else(|| {
                GraphAgentError::Config("retrieval.endpoint is required for the http backend".into())
            })?;
            Ok(Arc::new(HttpRetriever::new(endpoint, config)))
        }
        RetrievalBackend::Keyword => {
            let corpus = config.corpus.as_deref().ok_or_else(|| {
                GraphAgentError::Config("retrieval.corpus is required for the keyword backend".into())
            })?;
            let path = match base {
                Some(base) if Path::new(corpus).is_relative() => base.join(corpus),
                _ => Path::new(corpus).to_path_buf(),
            };
            Ok(Arc::new(KeywordRetriever::from_json_file(&path)?))
        }
    }
}

use futures::future::BoxFuture;

use graphagent_core::error::Result;
use graphagent_core::traits::Retriever;
use graphagent_core::types::Snippet;

/// Stand-in used when no backend is reachable: every search yields the
/// `[RAG_ERROR]` sentinel so the workflow can continue and annotate.
pub struct UnavailableRetriever {
    reason: String,
}

impl UnavailableRetriever {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl Retriever for UnavailableRetriever {
    fn name(&self) -> &str {
        "none"
    }

    fn search(&self, _query: &str, _limit: usize) -> BoxFuture<'_, Result<Vec<Snippet>>> {
        Box::pin(async move { Ok(vec![Snippet::retrieval_error(&self.reason)]) })
    }
}

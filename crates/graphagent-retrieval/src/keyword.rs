use std::path::Path;

use futures::future::BoxFuture;
use serde::Deserialize;
use tracing::debug;

use graphagent_core::error::{GraphAgentError, Result};
use graphagent_core::traits::Retriever;
use graphagent_core::types::Snippet;

/// In-memory retriever ranking documents by how many query words they contain.
pub struct KeywordRetriever {
    docs: Vec<Snippet>,
}

/// Corpus entries may be bare strings or full snippet records.
#[derive(Deserialize)]
#[serde(untagged)]
enum CorpusEntry {
    Text(String),
    Record(Snippet),
}

impl KeywordRetriever {
    pub fn new(docs: Vec<Snippet>) -> Self {
        Self { docs }
    }

    /// Load a JSON array corpus.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            GraphAgentError::Retrieval(format!("cannot read corpus {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let entries: Vec<CorpusEntry> = serde_json::from_str(content)?;
        let docs = entries
            .into_iter()
            .map(|e| match e {
                CorpusEntry::Text(text) => Snippet::new(text),
                CorpusEntry::Record(s) => s,
            })
            .collect();
        Ok(Self::new(docs))
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Rank documents for `query`; ties keep corpus order, zero scores are dropped.
    pub fn rank(&self, query: &str, limit: usize) -> Vec<Snippet> {
        let words: Vec<String> = query
            .split_whitespace()
            .map(|w| w.to_lowercase())
            .collect();

        let mut scored: Vec<(usize, &Snippet)> = self
            .docs
            .iter()
            .map(|doc| {
                let haystack = match &doc.title {
                    Some(title) => format!("{} {}", title, doc.text).to_lowercase(),
                    None => doc.text.to_lowercase(),
                };
                let score = words.iter().filter(|w| haystack.contains(w.as_str())).count();
                (score, doc)
            })
            .filter(|(score, _)| *score > 0)
            .collect();

        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored
            .into_iter()
            .take(limit)
            .map(|(_, doc)| doc.clone())
            .collect()
    }
}

impl Retriever for KeywordRetriever {
    fn name(&self) -> &str {
        "keyword"
    }

    fn search(&self, query: &str, limit: usize) -> BoxFuture<'_, Result<Vec<Snippet>>> {
        let hits = self.rank(query, limit);
        debug!(query = %query, hits = hits.len(), "Keyword search");
        Box::pin(async move { Ok(hits) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn corpus() -> KeywordRetriever {
        KeywordRetriever::new(vec![
            Snippet::new("Xeriscape designs rely on native plants and drip irrigation."),
            Snippet::new("Traditional turf lawns require frequent mowing and irrigation."),
            Snippet::new("Mulch suppresses weeds in Colorado landscapes."),
        ])
    }

    #[test]
    fn test_rank_by_word_overlap() {
        let hits = corpus().rank("turf irrigation", 3);
        assert_eq!(hits.len(), 2);
        assert!(hits[0].text.starts_with("Traditional turf"));
    }

    #[test]
    fn test_rank_drops_unrelated() {
        assert!(corpus().rank("quantum chromodynamics", 3).is_empty());
    }

    #[test]
    fn test_rank_respects_limit() {
        assert_eq!(corpus().rank("and", 1).len(), 1);
    }

    #[test]
    fn test_corpus_accepts_strings_and_records() {
        let r = KeywordRetriever::from_json_str(
            r#"["plain text doc", {"text": "record doc", "title": "T", "source": "https://x.example"}]"#,
        )
        .unwrap();
        assert_eq!(r.len(), 2);
        let hits = r.rank("record", 5);
        assert_eq!(hits[0].source.as_deref(), Some("https://x.example"));
    }

    #[tokio::test]
    async fn test_search_from_file() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(br#"["drip irrigation saves water"]"#).unwrap();
        let r = KeywordRetriever::from_json_file(tmp.path()).unwrap();
        let hits = r.search("irrigation", 3).await.unwrap();
        assert_eq!(hits.len(), 1);
    }
}

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use graphagent_core::error::{GraphAgentError, Result};

/// Name of the pipeline that exists even without a file on disk.
pub const BUILTIN_PIPELINE: &str = "default";

/// Declarative description of a workflow: where it starts, the token that
/// ends it and which successors each node may hand over to.
///
/// Edge sets are ordered so that the redirect target for an out-of-edge
/// token is always the same node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSpec {
    #[serde(default, skip_serializing)]
    pub name: String,
    #[serde(default = "default_start")]
    pub start: String,
    #[serde(default = "default_end")]
    pub end: String,
    #[serde(default)]
    pub edges: BTreeMap<String, BTreeSet<String>>,
}

fn default_start() -> String {
    "plan".to_string()
}

fn default_end() -> String {
    "end".to_string()
}

/// Where the runner goes after a node returned a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    End,
    Next { node: String, redirected: bool },
}

impl WorkflowSpec {
    /// Empty workflow with the given start node and no edge constraints.
    pub fn new(start: impl Into<String>) -> Self {
        Self {
            name: String::new(),
            start: start.into(),
            end: default_end(),
            edges: BTreeMap::new(),
        }
    }

    /// Allow `from` to hand over to each of `to`.
    pub fn with_edges<I, S>(mut self, from: impl Into<String>, to: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.edges
            .entry(from.into())
            .or_default()
            .extend(to.into_iter().map(Into::into));
        self
    }

    pub fn with_end(mut self, end: impl Into<String>) -> Self {
        self.end = end.into().trim().to_lowercase();
        self
    }

    /// The pipeline used when no `default.toml` overrides it.
    pub fn builtin() -> Self {
        let mut spec = Self::new("plan")
            .with_edges("plan", ["route"])
            .with_edges("route", ["research", "math", "write"])
            .with_edges("research", ["route"])
            .with_edges("math", ["route"])
            .with_edges("write", ["critic"])
            .with_edges("critic", ["end"]);
        spec.name = BUILTIN_PIPELINE.to_string();
        spec
    }

    /// Parse a pipeline definition from TOML.
    pub fn from_toml_str(name: &str, content: &str) -> Result<Self> {
        let mut spec: Self = toml::from_str(content).map_err(|e| GraphAgentError::WorkflowInvalid {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        spec.name = name.to_string();
        spec.start = spec.start.trim().to_string();
        spec.end = spec.end.trim().to_lowercase();

        if spec.start.is_empty() {
            return Err(GraphAgentError::WorkflowInvalid {
                name: name.to_string(),
                reason: "start node must not be empty".into(),
            });
        }
        if spec.end.is_empty() {
            return Err(GraphAgentError::WorkflowInvalid {
                name: name.to_string(),
                reason: "end marker must not be empty".into(),
            });
        }
        Ok(spec)
    }

    /// Load `<dir>/<name>.toml`. A missing file falls back to the built-in
    /// pipeline for [`BUILTIN_PIPELINE`]; other read errors are returned.
    pub fn load_named(dir: &Path, name: &str) -> Result<Self> {
        let name = name.trim();
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(GraphAgentError::WorkflowNotFound(name.to_string()));
        }

        let path = dir.join(format!("{}.toml", name));
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                debug!(pipeline = %name, path = %path.display(), "Loading pipeline");
                Self::from_toml_str(name, &content)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if name == BUILTIN_PIPELINE {
                    Ok(Self::builtin())
                } else {
                    Err(GraphAgentError::WorkflowNotFound(name.to_string()))
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Pipeline names available in `dir`, always including the built-in one.
    pub fn available(dir: &Path) -> Vec<String> {
        let mut names: BTreeSet<String> = BTreeSet::from([BUILTIN_PIPELINE.to_string()]);
        if let Ok(entries) = std::fs::read_dir(dir) {
            for entry in entries.flatten() {
                let path: PathBuf = entry.path();
                if path.extension().and_then(|e| e.to_str()) == Some("toml") {
                    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                        names.insert(stem.to_string());
                    }
                }
            }
        }
        names.into_iter().collect()
    }

    /// True if `token` terminates the run.
    pub fn is_end(&self, token: &str) -> bool {
        let token = token.trim();
        token.eq_ignore_ascii_case(&self.end) || token.eq_ignore_ascii_case("end")
    }

    /// Decide where to go after `current` returned `token`.
    ///
    /// A node without declared edges may go anywhere. A token outside the
    /// declared set is replaced by the first member of that set.
    pub fn resolve(&self, current: &str, token: &str) -> Transition {
        if self.is_end(token) {
            return Transition::End;
        }
        let token = token.trim();
        match self.edges.get(current).filter(|allowed| !allowed.is_empty()) {
            None => Transition::Next {
                node: token.to_string(),
                redirected: false,
            },
            Some(allowed) if allowed.contains(token) => Transition::Next {
                node: token.to_string(),
                redirected: false,
            },
            Some(allowed) => match allowed.iter().next() {
                Some(first) if self.is_end(first) => Transition::End,
                Some(first) => Transition::Next {
                    node: first.clone(),
                    redirected: true,
                },
                None => Transition::End,
            },
        }
    }

    /// Plain-text rendering of the pipeline.
    pub fn diagram(&self) -> String {
        let mut lines = vec![format!("START -> {}", self.start)];
        for (from, to) in &self.edges {
            if to.is_empty() {
                continue;
            }
            let targets: Vec<&str> = to.iter().map(String::as_str).collect();
            lines.push(format!("{} -> {}", from, targets.join(", ")));
        }
        lines.push(format!("... -> {}", self.end.to_uppercase()));
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_toml() {
        let spec = WorkflowSpec::from_toml_str("minimal", "").unwrap();
        assert_eq!(spec.start, "plan");
        assert_eq!(spec.end, "end");
        assert!(spec.edges.is_empty());
        assert_eq!(spec.name, "minimal");
    }

    #[test]
    fn test_end_is_lowercased() {
        let spec = WorkflowSpec::from_toml_str("p", "start = \"plan\"\nend = \" FINISH \"").unwrap();
        assert_eq!(spec.end, "finish");
        assert!(spec.is_end("Finish"));
        assert!(spec.is_end("END"));
        assert!(!spec.is_end("write"));
    }

    #[test]
    fn test_invalid_toml() {
        let err = WorkflowSpec::from_toml_str("bad", "edges = 3").unwrap_err();
        assert!(matches!(err, GraphAgentError::WorkflowInvalid { ref name, .. } if name == "bad"));
    }

    #[test]
    fn test_empty_start_rejected() {
        let err = WorkflowSpec::from_toml_str("p", "start = \"  \"").unwrap_err();
        assert!(matches!(err, GraphAgentError::WorkflowInvalid { .. }));
    }

    #[test]
    fn test_resolve_accepts_declared_and_unconstrained() {
        let spec = WorkflowSpec::new("plan").with_edges("route", ["research", "math", "write"]);
        assert_eq!(
            spec.resolve("route", "math"),
            Transition::Next {
                node: "math".into(),
                redirected: false
            }
        );
        assert_eq!(
            spec.resolve("plan", "anything"),
            Transition::Next {
                node: "anything".into(),
                redirected: false
            }
        );
    }

    #[test]
    fn test_resolve_redirects_to_first_sorted() {
        let spec = WorkflowSpec::new("plan").with_edges("route", ["write", "research", "math"]);
        assert_eq!(
            spec.resolve("route", "critic"),
            Transition::Next {
                node: "math".into(),
                redirected: true
            }
        );
    }

    #[test]
    fn test_resolve_end_tokens() {
        let spec = WorkflowSpec::new("plan").with_end("done");
        assert_eq!(spec.resolve("critic", "done"), Transition::End);
        assert_eq!(spec.resolve("critic", "end"), Transition::End);
    }

    #[test]
    fn test_load_named() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("short.toml"),
            "start = \"write\"\n[edges]\nwrite = [\"critic\"]\n",
        )
        .unwrap();

        let spec = WorkflowSpec::load_named(dir.path(), "short").unwrap();
        assert_eq!(spec.start, "write");
        assert!(spec.edges["write"].contains("critic"));

        let builtin = WorkflowSpec::load_named(dir.path(), "default").unwrap();
        assert_eq!(builtin, WorkflowSpec::builtin());

        assert!(matches!(
            WorkflowSpec::load_named(dir.path(), "missing"),
            Err(GraphAgentError::WorkflowNotFound(ref n)) if n == "missing"
        ));
        assert!(matches!(
            WorkflowSpec::load_named(dir.path(), "../short"),
            Err(GraphAgentError::WorkflowNotFound(_))
        ));

        assert_eq!(
            WorkflowSpec::available(dir.path()),
            vec!["default".to_string(), "short".to_string()]
        );
    }

    #[test]
    fn test_unreadable_default_is_not_replaced_by_builtin() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("default.toml")).unwrap();

        let err = WorkflowSpec::load_named(dir.path(), BUILTIN_PIPELINE).unwrap_err();
        assert!(matches!(err, GraphAgentError::Io(_)));
    }

    #[test]
    fn test_diagram() {
        let spec = WorkflowSpec::new("plan")
            .with_edges("route", ["research", "math", "write"])
            .with_edges("idle", Vec::<String>::new());
        assert_eq!(
            spec.diagram(),
            "START -> plan\nroute -> math, research, write\n... -> END"
        );
    }
}

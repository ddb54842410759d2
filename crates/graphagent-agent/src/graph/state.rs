use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use graphagent_core::types::is_sentinel;

/// Mutable record threaded through every node of a single run.
///
/// `scratch` is an append-only trace, `evidence` holds unique citation lines
/// and `done` only ever flips from false to true.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskState {
    pub task: String,
    pub plan: String,
    pub scratch: Vec<String>,
    pub evidence: Vec<String>,
    pub result: String,
    pub step: usize,
    pub done: bool,
    #[serde(skip)]
    evidence_keys: HashSet<String>,
}

impl TaskState {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            ..Self::default()
        }
    }

    /// Append a trace line.
    pub fn note(&mut self, line: impl Into<String>) {
        self.scratch.push(line.into());
    }

    /// The last `n` scratch lines, oldest first.
    pub fn tail(&self, n: usize) -> &[String] {
        let start = self.scratch.len().saturating_sub(n);
        &self.scratch[start..]
    }

    /// Append `line` unless an entry with the same `key` was already added.
    ///
    /// Returns whether the line was appended.
    pub fn push_evidence(&mut self, key: impl Into<String>, line: impl Into<String>) -> bool {
        if !self.evidence_keys.insert(key.into()) {
            return false;
        }
        self.evidence.push(line.into());
        true
    }

    pub fn has_evidence_key(&self, key: &str) -> bool {
        self.evidence_keys.contains(key)
    }

    /// True if any evidence entry is real content rather than a sentinel.
    pub fn has_real_evidence(&self) -> bool {
        self.evidence.iter().any(|e| !is_sentinel(e))
    }

    pub fn mark_done(&mut self) {
        self.done = true;
    }

    pub(crate) fn advance_step(&mut self) {
        self.step += 1;
    }
}

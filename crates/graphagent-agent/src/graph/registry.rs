use std::collections::HashMap;
use std::fmt;

/// The closed set of node behaviors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Plan,
    Route,
    Research,
    Math,
    Write,
    Critic,
}

impl NodeKind {
    pub const ALL: [NodeKind; 6] = [
        NodeKind::Plan,
        NodeKind::Route,
        NodeKind::Research,
        NodeKind::Math,
        NodeKind::Write,
        NodeKind::Critic,
    ];

    /// Canonical node name.
    pub fn name(self) -> &'static str {
        match self {
            NodeKind::Plan => "plan",
            NodeKind::Route => "route",
            NodeKind::Research => "research",
            NodeKind::Math => "math",
            NodeKind::Write => "write",
            NodeKind::Critic => "critic",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Maps node names to behaviors. Built once, then shared read-only.
#[derive(Debug, Clone, Default)]
pub struct NodeRegistry {
    nodes: HashMap<String, NodeKind>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in node under its canonical name.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for kind in NodeKind::ALL {
            registry.register(kind.name(), kind);
        }
        registry
    }

    /// Register `kind` under `name`, replacing any previous entry.
    pub fn register(&mut self, name: impl Into<String>, kind: NodeKind) {
        self.nodes.insert(name.into(), kind);
    }

    pub fn get(&self, name: &str) -> Option<NodeKind> {
        self.nodes.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.nodes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

pub mod caller;
pub mod extract;
pub mod graph;
pub mod nodes;
pub mod sandbox;

pub use caller::{ModelCaller, DEFAULT_PREAMBLE};
pub use extract::Extracted;
pub use graph::{
    ExecutionResult, NodeKind, NodeRegistry, NodeVisit, TaskState, Termination, Transition,
    WorkflowRunner, WorkflowSpec, BUILTIN_PIPELINE,
};
pub use nodes::write::NO_DOCUMENTS_NOTE;
pub use nodes::NodeContext;

//! Workflow engine: a declarative pipeline of named nodes interpreted by a
//! step-bounded runner.
//!
//! A [`WorkflowSpec`] names the start node, the end marker and the
//! successors each node may hand over to. The [`WorkflowRunner`] resolves the
//! current node in the [`NodeRegistry`], executes it against the run's
//! [`TaskState`], validates the returned token against the declared edges
//! and either advances, redirects or stops.

pub mod executor;
pub mod registry;
pub mod state;
pub mod workflow;

pub use executor::{ExecutionResult, NodeVisit, Termination, WorkflowRunner};
pub use registry::{NodeKind, NodeRegistry};
pub use state::TaskState;
pub use workflow::{Transition, WorkflowSpec, BUILTIN_PIPELINE};

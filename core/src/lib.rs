pub mod agent;
pub mod config;
pub mod error;
pub mod graph;
pub mod memory;
pub mod providers;
pub mod state;
pub mod tools;
pub mod traits;

#[cfg(test)]
mod test_support;

pub use agent::{ContextBuilder, ToolLoop, ToolRegistry};
pub use config::*;
pub use error::{FieldViolation, RunFailure, ToolError, WorkflowError};
pub use graph::{NodeKind, RunConfig, Snapshot, Workflow, WorkflowBuilder};
pub use memory::{MemoryRegistry, StepMemory, create_memory};
pub use providers::{OllamaProvider, OpenAIProvider, ScriptedProvider, create_provider};
pub use state::{PastStep, PlanExecuteState, StateError, StateStore, StateUpdate};
pub use tools::*;
pub use traits::*;

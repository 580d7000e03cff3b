use crate::graph::Snapshot;
use crate::state::StateError;
use thiserror::Error;

/// A single argument that failed schema validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    pub field: String,
    pub reason: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "'{}' {}", self.field, self.reason)
    }
}

fn join_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Dispatcher-local failures. These never abort a run: the registry turns
/// them into failed tool results the reasoning process can read.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool '{0}' not found")]
    UnknownTool(String),

    #[error("Invalid arguments for '{tool}': {}", join_violations(.violations))]
    InvalidArguments {
        tool: String,
        violations: Vec<FieldViolation>,
    },

    #[error("Tool '{tool}' failed: {message}")]
    ExecutionFailure { tool: String, message: String },

    #[error("Tool '{0}' is already registered")]
    DuplicateTool(String),
}

impl ToolError {
    pub fn invalid(tool: impl Into<String>, violations: Vec<FieldViolation>) -> Self {
        Self::InvalidArguments {
            tool: tool.into(),
            violations,
        }
    }
}

/// Node and protocol level failures. Any of these ends the run.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("External call failed: {0:#}")]
    ExternalCall(anyhow::Error),

    #[error("Recursion limit of {limit} transitions reached without a response")]
    ResourceExhausted { limit: usize },

    #[error("Planner returned no usable plan: {0}")]
    MalformedPlan(String),

    #[error("Replanner returned neither a plan nor a response: {0}")]
    MalformedReplan(String),

    #[error("Executor reached with an empty plan")]
    EmptyPlan,

    #[error(transparent)]
    State(#[from] StateError),
}

/// What a run yields when it aborts: the cause plus the last state that was
/// successfully committed, if any.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct RunFailure {
    pub error: WorkflowError,
    pub last_snapshot: Option<Snapshot>,
}

impl RunFailure {
    pub fn new(error: WorkflowError, last_snapshot: Option<Snapshot>) -> Self {
        Self {
            error,
            last_snapshot,
        }
    }

    pub fn is_resource_exhausted(&self) -> bool {
        matches!(self.error, WorkflowError::ResourceExhausted { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_arguments_names_every_field() {
        let err = ToolError::invalid(
            "search",
            vec![
                FieldViolation::new("query", "is required"),
                FieldViolation::new("page", "is not a known argument"),
            ],
        );
        let text = err.to_string();
        assert!(text.contains("'query' is required"));
        assert!(text.contains("'page' is not a known argument"));
    }

    #[test]
    fn external_call_keeps_context_chain() {
        let cause = anyhow::anyhow!("connection reset").context("OpenAI request");
        let err = WorkflowError::ExternalCall(cause);
        assert_eq!(
            err.to_string(),
            "External call failed: OpenAI request: connection reset"
        );
    }
}

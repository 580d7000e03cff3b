use crate::agent::ToolRegistry;
use crate::error::{ToolError, WorkflowError};
use crate::graph::{Executor, NodeKind, Planner, Replanner};
use crate::state::{PlanExecuteState, StateUpdate};
use crate::traits::{ChatResponse, ToolCallRequest};
use async_trait::async_trait;

/// A unit of the graph: reads the committed state, returns a partial update.
/// Nodes never write state themselves.
#[async_trait]
pub trait StateNode: Send + Sync {
    async fn apply(&self, state: &PlanExecuteState) -> Result<StateUpdate, WorkflowError>;
}

pub enum Node {
    Planner(Planner),
    Executor(Executor),
    Replanner(Replanner),
}

impl Node {
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Planner(_) => NodeKind::Planner,
            Node::Executor(_) => NodeKind::Executor,
            Node::Replanner(_) => NodeKind::Replanner,
        }
    }

    pub async fn apply(&self, state: &PlanExecuteState) -> Result<StateUpdate, WorkflowError> {
        match self {
            Node::Planner(node) => node.apply(state).await,
            Node::Executor(node) => node.apply(state).await,
            Node::Replanner(node) => node.apply(state).await,
        }
    }
}

/// Where the graph goes after `from` committed. `None` is END.
pub fn route(from: NodeKind, state: &PlanExecuteState) -> Option<NodeKind> {
    match from {
        NodeKind::Planner => Some(NodeKind::Executor),
        NodeKind::Executor => Some(NodeKind::Replanner),
        NodeKind::Replanner if state.has_response() => None,
        NodeKind::Replanner => Some(NodeKind::Executor),
    }
}

/// Expects exactly one call in `response` that `allowed` accepts, schema
/// included. The error text says what was wrong with the output.
pub(crate) fn single_call(
    response: &ChatResponse,
    allowed: &ToolRegistry,
) -> Result<ToolCallRequest, String> {
    let call = match response.tool_calls.as_slice() {
        [call] => call,
        [] => {
            let text = response.text_or_empty().trim();
            return Err(if text.is_empty() {
                "expected one tool call, got none".to_string()
            } else {
                format!("expected one tool call, got text: {}", preview(text))
            });
        }
        calls => return Err(format!("expected one tool call, got {}", calls.len())),
    };

    let request = ToolCallRequest::try_from(call).map_err(|e| e.to_string())?;
    allowed
        .validate(&request)
        .map_err(|e: ToolError| e.to_string())?;
    Ok(request)
}

fn preview(text: &str) -> String {
    const MAX: usize = 120;
    if text.chars().count() > MAX {
        format!("{}...", crate::tools::truncate_chars(text, MAX))
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ScriptedProvider;
    use crate::tools::{PLAN, PlanTool, ResponseTool};
    use serde_json::json;

    fn replan_tools() -> ToolRegistry {
        let registry = ToolRegistry::new();
        registry.register(Box::new(PlanTool)).unwrap();
        registry.register(Box::new(ResponseTool)).unwrap();
        registry
    }

    #[test]
    fn routing_is_fixed_except_after_replanner() {
        let mut state = PlanExecuteState::default();
        assert_eq!(route(NodeKind::Planner, &state), Some(NodeKind::Executor));
        assert_eq!(route(NodeKind::Executor, &state), Some(NodeKind::Replanner));
        assert_eq!(route(NodeKind::Replanner, &state), Some(NodeKind::Executor));

        state.response = Some("done".into());
        assert_eq!(route(NodeKind::Replanner, &state), None);
        assert_eq!(route(NodeKind::Executor, &state), Some(NodeKind::Replanner));
    }

    #[test]
    fn single_call_accepts_one_valid_call() {
        let response = ScriptedProvider::tool_call(PLAN, json!({"steps": ["a"]}));
        let request = single_call(&response, &replan_tools()).unwrap();
        assert_eq!(request.name, PLAN);
    }

    #[test]
    fn single_call_rejects_text_many_and_invalid() {
        let registry = replan_tools();

        let err = single_call(&ChatResponse::text("I think we are done"), &registry).unwrap_err();
        assert!(err.contains("got text"));

        let mut two = ScriptedProvider::tool_call(PLAN, json!({"steps": ["a"]}));
        two.tool_calls
            .extend(ScriptedProvider::tool_call("response", json!({"response": "x"})).tool_calls);
        assert!(single_call(&two, &registry).unwrap_err().contains("got 2"));

        let empty_plan = ScriptedProvider::tool_call(PLAN, json!({"steps": []}));
        assert!(single_call(&empty_plan, &registry).unwrap_err().contains("steps"));

        let unknown = ScriptedProvider::tool_call("search", json!({"query": "x"}));
        assert!(single_call(&unknown, &registry).unwrap_err().contains("not found"));
    }
}

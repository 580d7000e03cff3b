use crate::agent::{ContextBuilder, PromptKind, PromptVars, ToolLoop, ToolRegistry};
use crate::error::WorkflowError;
use crate::graph::node::{StateNode, single_call};
use crate::state::{PlanExecuteState, StateUpdate};
use crate::tools::PlanTool;
use async_trait::async_trait;
use tracing::debug;

/// Turns the objective into the first plan. Runs once, before anything else.
pub struct Planner {
    tool_loop: ToolLoop,
    context: ContextBuilder,
    tools: ToolRegistry,
}

impl Planner {
    pub fn new(tool_loop: ToolLoop, context: ContextBuilder, tools: ToolRegistry) -> Self {
        let context = context.with_tool_specs(tools.get_specs());
        Self {
            tool_loop,
            context,
            tools,
        }
    }
}

#[async_trait]
impl StateNode for Planner {
    async fn apply(&self, state: &PlanExecuteState) -> Result<StateUpdate, WorkflowError> {
        let vars = PromptVars {
            objective: &state.objective,
            ..Default::default()
        };
        let messages = self.context.build_messages(PromptKind::Plan, &vars);
        let response = self
            .tool_loop
            .complete(&messages, &self.context.tool_specs)
            .await?;

        let request = single_call(&response, &self.tools).map_err(WorkflowError::MalformedPlan)?;
        let steps = PlanTool::steps(&request.arguments)
            .map_err(|e| WorkflowError::MalformedPlan(e.to_string()))?;

        debug!(steps = steps.len(), "planner produced a plan");
        Ok(StateUpdate::plan(steps))
    }
}

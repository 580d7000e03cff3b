use crate::agent::{ContextBuilder, PromptKind, PromptVars, ToolLoop, ToolRegistry};
use crate::error::WorkflowError;
use crate::graph::node::{StateNode, single_call};
use crate::state::{PlanExecuteState, StateUpdate};
use crate::tools::{PLAN, PlanTool, RESPONSE, ResponseTool};
use async_trait::async_trait;

/// Looks at everything done so far and either rewrites the remaining plan or
/// answers. Never both.
pub struct Replanner {
    tool_loop: ToolLoop,
    context: ContextBuilder,
    tools: ToolRegistry,
}

impl Replanner {
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
impl StateNode for Replanner {
    async fn apply(&self, state: &PlanExecuteState) -> Result<StateUpdate, WorkflowError> {
        let plan = state.plan.join("\n");
        let past_steps = state.past_steps_with_results();
        let vars = PromptVars {
            objective: &state.objective,
            plan: &plan,
            past_steps: &past_steps,
            ..Default::default()
        };
        let messages = self.context.build_messages(PromptKind::Replan, &vars);
        let response = self
            .tool_loop
            .complete(&messages, &self.context.tool_specs)
            .await?;

        let request =
            single_call(&response, &self.tools).map_err(WorkflowError::MalformedReplan)?;
        let malformed = |e: anyhow::Error| WorkflowError::MalformedReplan(e.to_string());

        match request.name.as_str() {
            RESPONSE => Ok(StateUpdate::response(
                ResponseTool::text(&request.arguments).map_err(malformed)?,
            )),
            PLAN => Ok(StateUpdate::plan(
                PlanTool::steps(&request.arguments).map_err(malformed)?,
            )),
            other => Err(WorkflowError::MalformedReplan(format!(
                "'{other}' is not a replanning tool"
            ))),
        }
    }
}

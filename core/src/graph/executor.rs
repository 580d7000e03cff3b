use crate::agent::{ContextBuilder, PromptKind, PromptVars, ToolLoop, ToolRegistry};
use crate::error::WorkflowError;
use crate::graph::node::StateNode;
use crate::state::{PastStep, PlanExecuteState, StateUpdate};
use crate::traits::Memory;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Works the head of the plan with tools and records what it produced.
pub struct Executor {
    tool_loop: ToolLoop,
    context: ContextBuilder,
    tools: ToolRegistry,
    memory: Arc<dyn Memory>,
}

impl Executor {
    pub fn new(
        tool_loop: ToolLoop,
        context: ContextBuilder,
        tools: ToolRegistry,
        memory: Arc<dyn Memory>,
    ) -> Self {
        let context = context.with_tool_specs(tools.get_specs());
        Self {
            tool_loop,
            context,
            tools,
            memory,
        }
    }
}

#[async_trait]
impl StateNode for Executor {
    async fn apply(&self, state: &PlanExecuteState) -> Result<StateUpdate, WorkflowError> {
        let Some((step, remaining)) = state.plan.split_first() else {
            return Err(WorkflowError::EmptyPlan);
        };

        let past_steps = state.past_step_names();
        let vars = PromptVars {
            objective: &state.objective,
            step: step.as_str(),
            past_steps: &past_steps,
            ..Default::default()
        };
        let messages = self.context.build_messages(PromptKind::Execute, &vars);
        let result = self.tool_loop.run(messages, &self.tools).await?;

        self.memory
            .store(step, &result)
            .await
            .map_err(WorkflowError::ExternalCall)?;
        debug!(step = %step, chars = result.chars().count(), "step stored");

        Ok(StateUpdate::completed_step(
            PastStep::new(step.clone(), result),
            remaining.to_vec(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::StepMemory;
    use crate::providers::ScriptedProvider;
    use crate::traits::ChatResponse;

    fn executor(provider: ScriptedProvider, memory: Arc<StepMemory>) -> Executor {
        Executor::new(
            ToolLoop::new(Arc::new(provider), "m"),
            ContextBuilder::new("/nonexistent"),
            ToolRegistry::new(),
            memory,
        )
    }

    #[tokio::test]
    async fn empty_plan_is_rejected_without_a_model_call() {
        let memory = Arc::new(StepMemory::new());
        let node = executor(ScriptedProvider::new([]), memory);

        let err = node.apply(&PlanExecuteState::default()).await.unwrap_err();
        assert!(matches!(err, WorkflowError::EmptyPlan));
    }

    #[tokio::test]
    async fn result_is_stored_under_the_step_name() {
        let memory = Arc::new(StepMemory::new());
        let node = executor(ScriptedProvider::new([ChatResponse::text("done")]), memory.clone());
        let state = PlanExecuteState {
            objective: "o".into(),
            plan: vec!["first".into(), "second".into()],
            ..Default::default()
        };

        let update = node.apply(&state).await.unwrap();
        assert_eq!(update.plan, Some(vec!["second".to_string()]));
        assert_eq!(update.past_steps, vec![PastStep::new("first", "done")]);
        assert_eq!(memory.get("first").await.unwrap().unwrap().content, "done");
    }
}

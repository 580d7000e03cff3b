use crate::state::reducer::{concat, replace_or_keep, write_once};
use crate::state::{PlanExecuteState, StateUpdate};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("Malformed state update: {0}")]
    Malformed(String),

    #[error("Objective is already set and cannot change")]
    ObjectiveImmutable,

    #[error("Response is already set and cannot change")]
    ResponseAlreadySet,
}

/// Owns the run state and applies partial updates through the reducers.
#[derive(Debug, Clone, Default)]
pub struct StateStore {
    state: PlanExecuteState,
    version: u64,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &PlanExecuteState {
        &self.state
    }

    /// Number of successful commits so far.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Validates the whole update, then merges every field. A rejected
    /// update leaves the state exactly as it was.
    pub fn commit(&mut self, update: StateUpdate) -> Result<&PlanExecuteState, StateError> {
        if update.is_empty() {
            return Err(StateError::Malformed("update carries no fields".into()));
        }
        if update.objective.as_deref().is_some_and(|o| o.trim().is_empty()) {
            return Err(StateError::Malformed("objective must not be blank".into()));
        }
        if update.plan.as_ref().is_some_and(|plan| plan.iter().any(|s| s.trim().is_empty())) {
            return Err(StateError::Malformed("plan steps must not be blank".into()));
        }
        if update.past_steps.iter().any(|past| past.step.trim().is_empty()) {
            return Err(StateError::Malformed("past step names must not be blank".into()));
        }

        let current_objective =
            (!self.state.objective.is_empty()).then(|| self.state.objective.clone());
        let objective = write_once(current_objective, update.objective)
            .map_err(|_| StateError::ObjectiveImmutable)?
            .unwrap_or_default();
        let response = write_once(self.state.response.clone(), update.response)
            .map_err(|_| StateError::ResponseAlreadySet)?;

        let state = std::mem::take(&mut self.state);
        self.state = PlanExecuteState {
            objective,
            plan: replace_or_keep(state.plan, update.plan),
            past_steps: concat(state.past_steps, update.past_steps),
            response,
        };
        self.version += 1;
        Ok(&self.state)
    }

    /// Commits an untyped update; unknown fields and wrong shapes are rejected.
    pub fn commit_json(&mut self, update: serde_json::Value) -> Result<&PlanExecuteState, StateError> {
        let update: StateUpdate =
            serde_json::from_value(update).map_err(|e| StateError::Malformed(e.to_string()))?;
        self.commit(update)
    }
}

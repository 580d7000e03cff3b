pub mod reducer;
pub mod store;

use serde::{Deserialize, Serialize};

pub use store::{StateError, StateStore};

/// One executed step and what it produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PastStep {
    pub step: String,
    pub result: String,
}

impl PastStep {
    pub fn new(step: impl Into<String>, result: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            result: result.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlanExecuteState {
    pub objective: String,
    pub plan: Vec<String>,
    pub past_steps: Vec<PastStep>,
    pub response: Option<String>,
}

impl PlanExecuteState {
    pub fn has_response(&self) -> bool {
        self.response.as_deref().is_some_and(|r| !r.trim().is_empty())
    }

    /// `1. Name: step` lines, results left out.
    pub fn past_step_names(&self) -> String {
        self.past_steps
            .iter()
            .enumerate()
            .map(|(i, past)| format!("{}. Name: {}", i + 1, past.step))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// `1. Name: step` / `Result: ...` pairs.
    pub fn past_steps_with_results(&self) -> String {
        self.past_steps
            .iter()
            .enumerate()
            .map(|(i, past)| format!("{}. Name: {}\nResult: {}", i + 1, past.step, past.result))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A partial write to the state. Absent fields leave the state untouched;
/// see [`reducer`] for how present fields merge.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct StateUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub objective: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub past_steps: Vec<PastStep>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
}

impl StateUpdate {
    pub fn objective(objective: impl Into<String>) -> Self {
        Self {
            objective: Some(objective.into()),
            ..Default::default()
        }
    }

    pub fn plan(steps: Vec<String>) -> Self {
        Self {
            plan: Some(steps),
            ..Default::default()
        }
    }

    pub fn response(response: impl Into<String>) -> Self {
        Self {
            response: Some(response.into()),
            ..Default::default()
        }
    }

    pub fn completed_step(past: PastStep, remaining_plan: Vec<String>) -> Self {
        Self {
            plan: Some(remaining_plan),
            past_steps: vec![past],
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.objective.is_none()
            && self.plan.is_none()
            && self.past_steps.is_empty()
            && self.response.is_none()
    }
}

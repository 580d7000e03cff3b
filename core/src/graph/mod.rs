//! The plan, execute, replan graph.
//!
//! `START -> Planner -> Executor -> Replanner -> {Executor | END}`. Each hop
//! commits one [`StateUpdate`](crate::state::StateUpdate) and yields a
//! [`Snapshot`].

pub mod executor;
pub mod node;
pub mod planner;
pub mod replanner;
pub mod runner;

use crate::config::DEFAULT_RECURSION_LIMIT;
use crate::state::PlanExecuteState;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use executor::Executor;
pub use node::{Node, StateNode};
pub use planner::Planner;
pub use replanner::Replanner;
pub use runner::{Workflow, WorkflowBuilder};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Planner,
    Executor,
    Replanner,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeKind::Planner => "planner",
            NodeKind::Executor => "executor",
            NodeKind::Replanner => "replanner",
        };
        f.write_str(name)
    }
}

/// The state right after a node's update was committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub thread_id: String,
    /// 1-based count of committed transitions in this run.
    pub transition: usize,
    pub node: NodeKind,
    pub state: PlanExecuteState,
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub recursion_limit: usize,
    pub thread_id: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            thread_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

impl RunConfig {
    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit;
        self
    }

    pub fn with_thread_id(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = thread_id.into();
        self
    }
}

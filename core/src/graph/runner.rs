use crate::agent::{ContextBuilder, ToolLoop, ToolRegistry};
use crate::config::Config;
use crate::error::{RunFailure, ToolError, WorkflowError};
use crate::graph::node::route;
use crate::graph::{Executor, Node, NodeKind, Planner, Replanner, RunConfig, Snapshot};
use crate::memory::MemoryRegistry;
use crate::state::{PlanExecuteState, StateStore, StateUpdate};
use crate::tools::{
    PLAN, PlanTool, QUERY, QueryTool, RESPONSE, ResponseTool, SCRAPE, SEARCH, ScrapeTool,
    SearchTool,
};
use crate::traits::{Memory, Provider, Tool};
use futures_util::stream::{self, BoxStream, StreamExt};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

const PLANNER_TOOLS: &[&str] = &[PLAN];
const EXECUTOR_TOOLS: &[&str] = &[PLAN, SEARCH, SCRAPE];
const REPLANNER_TOOLS: &[&str] = &[PLAN, RESPONSE];

pub struct WorkflowBuilder {
    provider: Arc<dyn Provider>,
    tools: ToolRegistry,
    memories: Arc<MemoryRegistry>,
    workspace: PathBuf,
    model: String,
    temperature: f64,
    max_tool_rounds: usize,
    stream: bool,
    recursion_limit: usize,
}

impl WorkflowBuilder {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        let defaults = Config::default();
        Self {
            provider,
            tools: ToolRegistry::new(),
            memories: Arc::new(MemoryRegistry::new()),
            workspace: defaults.workspace_dir,
            model: defaults.model,
            temperature: defaults.temperature,
            max_tool_rounds: defaults.max_tool_rounds,
            stream: defaults.stream.enabled,
            recursion_limit: defaults.recursion_limit,
        }
    }

    /// Takes model, sampling, limits and the workspace from `config`.
    pub fn config(mut self, config: &Config) -> Self {
        self.workspace = config.workspace_dir.clone();
        self.model = config.model.clone();
        self.temperature = config.temperature;
        self.max_tool_rounds = config.max_tool_rounds;
        self.stream = config.stream.enabled;
        self.recursion_limit = config.recursion_limit;
        self
    }

    /// Registers `search` and `scrape` as configured.
    pub fn web_tools(self, config: &Config) -> Result<Self, ToolError> {
        self.tool(Box::new(SearchTool::new(config.search.clone())))?
            .tool(Box::new(ScrapeTool::new(&config.scrape)))
    }

    pub fn tool(self, tool: Box<dyn Tool>) -> Result<Self, ToolError> {
        self.tools.register(tool)?;
        Ok(self)
    }

    pub fn memory_registry(mut self, memories: Arc<MemoryRegistry>) -> Self {
        self.memories = memories;
        self
    }

    pub fn workspace(mut self, workspace: impl Into<PathBuf>) -> Self {
        self.workspace = workspace.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn streaming(mut self, enabled: bool) -> Self {
        self.stream = enabled;
        self
    }

    pub fn max_tool_rounds(mut self, max: usize) -> Self {
        self.max_tool_rounds = max;
        self
    }

    pub fn build(self) -> Result<Workflow, ToolError> {
        if self.tools.get(PLAN).is_none() {
            self.tools.register(Box::new(PlanTool))?;
        }
        if self.tools.get(RESPONSE).is_none() {
            self.tools.register(Box::new(ResponseTool))?;
        }
        if let Some(tool) = self.tools.get(QUERY) {
            warn!(tool = tool.name(), "ignoring registered tool; query is bound per thread");
        }

        let tool_loop = ToolLoop::new(self.provider, self.model)
            .with_temperature(self.temperature)
            .with_max_tool_rounds(self.max_tool_rounds)
            .with_streaming(self.stream);

        Ok(Workflow {
            tool_loop,
            context: ContextBuilder::new(self.workspace),
            tools: self.tools,
            memories: self.memories,
            recursion_limit: self.recursion_limit,
        })
    }
}

/// A compiled plan, execute, replan graph. Cheap to run many times; each
/// run gets its own state and the memory store of its thread id.
pub struct Workflow {
    tool_loop: ToolLoop,
    context: ContextBuilder,
    tools: ToolRegistry,
    memories: Arc<MemoryRegistry>,
    recursion_limit: usize,
}

impl Workflow {
    pub fn builder(provider: Arc<dyn Provider>) -> WorkflowBuilder {
        WorkflowBuilder::new(provider)
    }

    /// The full setup the CLI uses: config values plus the web tools.
    pub fn from_config(config: &Config, provider: Arc<dyn Provider>) -> anyhow::Result<Self> {
        Ok(WorkflowBuilder::new(provider)
            .config(config)
            .web_tools(config)?
            .build()?)
    }

    /// A run config with this workflow's default recursion limit.
    pub fn run_config(&self) -> RunConfig {
        RunConfig::default().with_recursion_limit(self.recursion_limit)
    }

    pub fn memory(&self, thread_id: &str) -> Arc<dyn Memory> {
        self.memories.scope(thread_id)
    }

    /// Drops the memory store of `thread_id`. Returns whether one existed.
    /// A later run on the same thread id starts with an empty store.
    pub fn release_memory(&self, thread_id: &str) -> bool {
        self.memories.release(thread_id)
    }

    /// Starts a run. Nothing happens until the stream is polled, and each
    /// poll drives at most one node; dropping the stream stops the run.
    ///
    /// Yields one snapshot per committed transition. A failure is yielded
    /// once as the last item.
    pub fn run(
        &self,
        objective: impl Into<String>,
        config: RunConfig,
    ) -> BoxStream<'static, Result<Snapshot, RunFailure>> {
        let memory = self.memories.scope(&config.thread_id);
        let run = Run {
            planner: Node::Planner(Planner::new(
                self.tool_loop.clone(),
                self.context.clone(),
                self.tools.subset(PLANNER_TOOLS),
            )),
            executor: Node::Executor(Executor::new(
                self.tool_loop.clone(),
                self.context.clone(),
                self.executor_tools(memory.clone()),
                memory,
            )),
            replanner: Node::Replanner(Replanner::new(
                self.tool_loop.clone(),
                self.context.clone(),
                self.tools.subset(REPLANNER_TOOLS),
            )),
            store: StateStore::new(),
            objective: Some(objective.into()),
            next: Some(NodeKind::Planner),
            transitions: 0,
            limit: config.recursion_limit,
            thread_id: config.thread_id,
            last: None,
        };

        info!(
            thread_id = %run.thread_id,
            limit = run.limit,
            provider = self.tool_loop.provider_name(),
            "run started"
        );

        stream::unfold(Some(run), |run| async move {
            let mut run = run?;
            let item = run.advance().await?;
            let keep_going = item.is_ok();
            Some((item, keep_going.then_some(run)))
        })
        .boxed()
    }

    /// Runs to completion and returns the final state.
    pub async fn invoke(
        &self,
        objective: impl Into<String>,
        config: RunConfig,
    ) -> Result<PlanExecuteState, RunFailure> {
        let mut snapshots = self.run(objective, config);
        let mut last = None;
        while let Some(item) = snapshots.next().await {
            last = Some(item?.state);
        }
        Ok(last.unwrap_or_default())
    }

    fn executor_tools(&self, memory: Arc<dyn Memory>) -> ToolRegistry {
        let tools = self.tools.subset(EXECUTOR_TOOLS);
        if let Err(e) = tools.register(Box::new(QueryTool::new(memory))) {
            warn!(error = %e, "query tool unavailable for this run");
        }
        tools
    }
}

struct Run {
    planner: Node,
    executor: Node,
    replanner: Node,
    store: StateStore,
    /// Committed before the first transition.
    objective: Option<String>,
    next: Option<NodeKind>,
    transitions: usize,
    limit: usize,
    thread_id: String,
    last: Option<Snapshot>,
}

impl Run {
    fn node(&self, kind: NodeKind) -> &Node {
        match kind {
            NodeKind::Planner => &self.planner,
            NodeKind::Executor => &self.executor,
            NodeKind::Replanner => &self.replanner,
        }
    }

    /// Drives one transition. `None` once the graph reached END.
    async fn advance(&mut self) -> Option<Result<Snapshot, RunFailure>> {
        if let Some(objective) = self.objective.take()
            && let Some(e) = self.store.commit(StateUpdate::objective(objective)).err()
        {
            return Some(Err(self.fail(e.into())));
        }

        let kind = self.next?;
        if self.transitions >= self.limit {
            return Some(Err(self.fail(WorkflowError::ResourceExhausted {
                limit: self.limit,
            })));
        }

        let update = match self.node(kind).apply(self.store.state()).await {
            Ok(update) => update,
            Err(e) => return Some(Err(self.fail(e))),
        };
        let state = match self.store.commit(update).map(PlanExecuteState::clone) {
            Ok(state) => state,
            Err(e) => return Some(Err(self.fail(e.into()))),
        };

        self.transitions += 1;
        self.next = route(kind, &state);
        info!(
            thread_id = %self.thread_id,
            transition = self.transitions,
            node = %kind,
            remaining = state.plan.len(),
            completed = state.past_steps.len(),
            done = self.next.is_none(),
            "transition committed"
        );

        let snapshot = Snapshot {
            thread_id: self.thread_id.clone(),
            transition: self.transitions,
            node: kind,
            state,
        };
        self.last = Some(snapshot.clone());
        Some(Ok(snapshot))
    }

    fn fail(&mut self, error: WorkflowError) -> RunFailure {
        error!(
            thread_id = %self.thread_id,
            transitions = self.transitions,
            error = %error,
            "run aborted"
        );
        RunFailure::new(error, self.last.take())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ScriptedProvider;
    use futures_util::StreamExt;
    use serde_json::json;
    use tempfile::TempDir;

    fn workflow(provider: ScriptedProvider, workspace: &TempDir) -> (Workflow, Arc<ScriptedProvider>) {
        let provider = Arc::new(provider);
        let workflow = Workflow::builder(provider.clone())
            .workspace(workspace.path())
            .build()
            .unwrap();
        (workflow, provider)
    }

    #[tokio::test]
    async fn blank_objective_fails_before_any_transition() {
        let tmp = TempDir::new().unwrap();
        let (workflow, provider) = workflow(ScriptedProvider::new([]), &tmp);

        let items: Vec<_> = workflow.run("  ", RunConfig::default()).collect().await;
        assert_eq!(items.len(), 1);
        let failure = items.into_iter().next().unwrap().unwrap_err();
        assert!(matches!(failure.error, WorkflowError::State(_)));
        assert!(failure.last_snapshot.is_none());
        assert!(provider.requests().is_empty());
    }

    #[tokio::test]
    async fn zero_limit_exhausts_immediately() {
        let tmp = TempDir::new().unwrap();
        let (workflow, provider) = workflow(ScriptedProvider::new([]), &tmp);

        let failure = workflow
            .invoke("anything", RunConfig::default().with_recursion_limit(0))
            .await
            .unwrap_err();
        assert!(failure.is_resource_exhausted());
        assert!(provider.requests().is_empty());
    }

    #[tokio::test]
    async fn nothing_runs_until_polled() {
        let tmp = TempDir::new().unwrap();
        let (workflow, provider) = workflow(
            ScriptedProvider::new([ScriptedProvider::tool_call(PLAN, json!({"steps": ["a"]}))]),
            &tmp,
        );

        let mut snapshots = workflow.run("objective", RunConfig::default());
        assert!(provider.requests().is_empty());

        let first = snapshots.next().await.unwrap().unwrap();
        assert_eq!(first.node, NodeKind::Planner);
        assert_eq!(provider.requests().len(), 1);
        drop(snapshots);
        assert_eq!(provider.remaining(), 0);
    }

    #[test]
    fn query_is_never_taken_from_the_base_registry() {
        let tmp = TempDir::new().unwrap();
        let (workflow, _) = workflow(ScriptedProvider::new([]), &tmp);
        let tools = workflow.executor_tools(workflow.memory("t"));
        assert_eq!(tools.names(), vec!["plan", "query"]);
    }

    #[tokio::test]
    async fn released_thread_memory_is_gone() {
        let tmp = TempDir::new().unwrap();
        let (workflow, _) = workflow(
            ScriptedProvider::new([
                ScriptedProvider::tool_call(PLAN, json!({"steps": ["a"]})),
                crate::traits::ChatResponse::text("ra"),
                ScriptedProvider::tool_call(RESPONSE, json!({"response": "done"})),
            ]),
            &tmp,
        );

        let config = RunConfig::default();
        let thread_id = config.thread_id.clone();
        workflow.invoke("once", config).await.unwrap();
        assert_eq!(workflow.memories.thread_ids(), vec![thread_id.clone()]);

        assert!(workflow.release_memory(&thread_id));
        assert!(!workflow.release_memory(&thread_id));
        assert!(workflow.memories.thread_ids().is_empty());
    }
}

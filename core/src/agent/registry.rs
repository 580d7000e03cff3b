use crate::error::ToolError;
use crate::tools::RESPONSE;
use crate::traits::{Tool, ToolCall, ToolCallRequest, ToolResult, ToolSpec};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;
use tracing::{info, warn};

const ARGS_PREVIEW_CHARS: usize = 200;

/// Named tools plus the dispatch pipeline: resolve, validate, invoke.
pub struct ToolRegistry {
    tools: RwLock<Vec<Arc<dyn Tool>>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(Vec::new()),
        }
    }

    pub fn register(&self, tool: Box<dyn Tool>) -> Result<(), ToolError> {
        self.register_arc(Arc::from(tool))
    }

    pub fn register_arc(&self, tool: Arc<dyn Tool>) -> Result<(), ToolError> {
        let mut tools = self.tools.write().unwrap_or_else(PoisonError::into_inner);
        if tools.iter().any(|t| t.name() == tool.name()) {
            return Err(ToolError::DuplicateTool(tool.name().to_string()));
        }
        tools.push(tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        let tools = self.tools.read().unwrap_or_else(PoisonError::into_inner);
        tools.iter().find(|t| t.name() == name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let tools = self.tools.read().unwrap_or_else(PoisonError::into_inner);
        tools.iter().map(|t| t.name().to_string()).collect()
    }

    pub fn get_specs(&self) -> Vec<ToolSpec> {
        let tools = self.tools.read().unwrap_or_else(PoisonError::into_inner);
        tools.iter().map(|t| t.spec()).collect()
    }

    /// A new registry sharing the named tools, in the order given. Names
    /// that are not registered are skipped.
    pub fn subset(&self, names: &[&str]) -> ToolRegistry {
        let subset = names.iter().filter_map(|name| self.get(name)).collect();
        ToolRegistry {
            tools: RwLock::new(subset),
        }
    }

    /// Resolves the tool and checks the payload against its schema.
    pub fn validate(&self, request: &ToolCallRequest) -> Result<Arc<dyn Tool>, ToolError> {
        let tool = self
            .get(&request.name)
            .ok_or_else(|| ToolError::UnknownTool(request.name.clone()))?;
        tool.schema()
            .validate(&request.arguments)
            .map_err(|violations| ToolError::invalid(&request.name, violations))?;
        Ok(tool)
    }

    pub async fn dispatch(&self, request: &ToolCallRequest) -> Result<ToolResult, ToolError> {
        let tool = self.validate(request)?;
        tool.execute(request.arguments.clone())
            .await
            .map_err(|e| ToolError::ExecutionFailure {
                tool: request.name.clone(),
                message: format!("{e:#}"),
            })
    }

    /// Like [`dispatch`](Self::dispatch), but every failure comes back as a
    /// failed [`ToolResult`] so the caller can hand it to the model.
    pub async fn execute(&self, request: &ToolCallRequest) -> ToolResult {
        let start = Instant::now();
        let result = self.dispatch(request).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(result) => {
                info!(
                    tool = %request.name,
                    ok = result.success,
                    duration_ms,
                    args = %args_preview(&request.arguments),
                    "tool call"
                );
                result
            }
            Err(e) => {
                warn!(tool = %request.name, duration_ms, error = %e, "tool call rejected");
                ToolResult::error(e.to_string())
            }
        }
    }

    /// Runs one turn of calls in order and returns `(call id, result)` pairs.
    ///
    /// A turn that mixes `response` with any other call is refused as a
    /// whole: nothing is invoked and every call gets the same failure.
    pub async fn execute_turn(&self, calls: &[ToolCall]) -> Vec<(String, ToolResult)> {
        if calls.len() > 1 && calls.iter().any(|c| c.name == RESPONSE) {
            let refusal = format!("'{RESPONSE}' must be the only tool call in a turn");
            warn!(calls = calls.len(), "{}", refusal);
            return calls
                .iter()
                .map(|c| (c.id.clone(), ToolResult::error(refusal.clone())))
                .collect();
        }

        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            let result = match ToolCallRequest::try_from(call) {
                Ok(request) => self.execute(&request).await,
                Err(e) => ToolResult::error(e.to_string()),
            };
            results.push((call.id.clone(), result));
        }
        results
    }
}

fn args_preview(args: &serde_json::Value) -> String {
    let s = args.to_string();
    if s.chars().count() > ARGS_PREVIEW_CHARS {
        format!("{}...", s.chars().take(ARGS_PREVIEW_CHARS).collect::<String>())
    } else {
        s
    }
}

use crate::tools::schema::{ArgField, ArgKind, ArgSchema, Rule};
use crate::tools::{QUERY, extract_string_arg};
use crate::traits::{Memory, Tool, ToolResult};
use async_trait::async_trait;
use std::sync::Arc;

pub const QUERY_MISS: &str = "Query failed. Try querying with the correct step name.";

/// Reads a previous step's result from the run's memory.
pub struct QueryTool {
    memory: Arc<dyn Memory>,
}

impl QueryTool {
    pub fn new(memory: Arc<dyn Memory>) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Tool for QueryTool {
    fn name(&self) -> &str {
        QUERY
    }

    fn description(&self) -> &str {
        "Query the database for a previous step's execution result."
    }

    fn schema(&self) -> ArgSchema {
        ArgSchema::new().field(
            ArgField::required("key", ArgKind::String, "Query key, which is the name of the step.")
                .rule(Rule::NonEmpty),
        )
    }

    async fn execute(&self, args: serde_json::Value) -> anyhow::Result<ToolResult> {
        let key = extract_string_arg(&args, "key")?;

        match self.memory.lookup(key.trim()).await {
            Ok(Some(record)) => Ok(ToolResult::success(record.content)),
            Ok(None) => Ok(ToolResult::success(QUERY_MISS)),
            Err(e) => Ok(ToolResult::error(format!("Failed to query memory: {}", e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::StepMemory;
    use serde_json::json;

    async fn tool_with(entries: &[(&str, &str)]) -> QueryTool {
        let memory = Arc::new(StepMemory::new());
        for (key, content) in entries {
            memory.store(key, content).await.unwrap();
        }
        QueryTool::new(memory)
    }

    #[tokio::test]
    async fn exact_key_hit() {
        let tool = tool_with(&[("stepA", "result A")]).await;
        let result = tool.execute(json!({ "key": "stepA" })).await.unwrap();
        assert_eq!(result.output, "result A");
    }

    #[tokio::test]
    async fn trailing_period_hit() {
        let tool = tool_with(&[("stepA.", "result A")]).await;
        let result = tool.execute(json!({ "key": "stepA" })).await.unwrap();
        assert_eq!(result.output, "result A");
    }

    #[tokio::test]
    async fn single_substring_hit() {
        let tool = tool_with(&[("Find the first step", "found"), ("Other", "x")]).await;
        let result = tool.execute(json!({ "key": "step" })).await.unwrap();
        assert_eq!(result.output, "found");
    }

    #[tokio::test]
    async fn miss_returns_documented_message() {
        let tool = tool_with(&[("Other", "x")]).await;
        let result = tool.execute(json!({ "key": "step" })).await.unwrap();
        assert!(result.success);
        assert_eq!(result.output, QUERY_MISS);
    }
}

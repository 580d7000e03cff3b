use crate::tools::schema::{ArgField, ArgKind, ArgSchema, Rule};
use crate::tools::{PLAN, extract_string_list_arg};
use crate::traits::{Tool, ToolResult};
use async_trait::async_trait;

/// Formats an ordered step list. The Planner and Replanner read their
/// structured output through this tool's schema as well.
pub struct PlanTool;

impl PlanTool {
    pub fn steps(args: &serde_json::Value) -> anyhow::Result<Vec<String>> {
        extract_string_list_arg(args, "steps")
    }
}

#[async_trait]
impl Tool for PlanTool {
    fn name(&self) -> &str {
        PLAN
    }

    fn description(&self) -> &str {
        "Create a detailed step by step plan to complete an objective."
    }

    fn schema(&self) -> ArgSchema {
        ArgSchema::new().field(
            ArgField::required(
                "steps",
                ArgKind::StringList,
                "The list of steps to follow, should be in sorted order.",
            )
            .rule(Rule::NonEmpty),
        )
    }

    async fn execute(&self, args: serde_json::Value) -> anyhow::Result<ToolResult> {
        let steps = Self::steps(&args)?;
        Ok(ToolResult::success(steps.join("\n")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn joins_steps_in_order() {
        let result = PlanTool
            .execute(json!({ "steps": ["book flight", "book hotel"] }))
            .await
            .unwrap();
        assert_eq!(result.output, "book flight\nbook hotel");
    }

    #[test]
    fn schema_requires_non_empty_steps() {
        let schema = PlanTool.schema();
        assert!(schema.validate(&json!({ "steps": [] })).is_err());
        assert!(schema.validate(&json!({})).is_err());
        assert!(schema.validate(&json!({ "steps": ["one"] })).is_ok());
    }
}

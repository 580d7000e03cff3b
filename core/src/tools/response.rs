use crate::tools::schema::{ArgField, ArgKind, ArgSchema, Rule};
use crate::tools::{RESPONSE, extract_string_arg};
use crate::traits::{Tool, ToolResult};
use async_trait::async_trait;

/// Terminal answer to the operator. Must be the only call in its turn.
pub struct ResponseTool;

impl ResponseTool {
    pub fn text(args: &serde_json::Value) -> anyhow::Result<String> {
        extract_string_arg(args, "response")
    }
}

#[async_trait]
impl Tool for ResponseTool {
    fn name(&self) -> &str {
        RESPONSE
    }

    fn description(&self) -> &str {
        "Respond with the final solution or conclusion to the user."
    }

    fn schema(&self) -> ArgSchema {
        ArgSchema::new().field(
            ArgField::required("response", ArgKind::String, "The final response to the user.")
                .rule(Rule::NonEmpty),
        )
    }

    async fn execute(&self, args: serde_json::Value) -> anyhow::Result<ToolResult> {
        Ok(ToolResult::success(Self::text(&args)?))
    }
}

use crate::error::{FieldViolation, ToolError};
use crate::tools::ArgSchema;
use crate::traits::ToolCall;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolResult {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
}

impl ToolResult {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(error.into()),
        }
    }

    /// Text handed back to the reasoning process.
    pub fn as_text(&self) -> &str {
        match &self.error {
            Some(error) if !self.success => error,
            _ => &self.output,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters_schema: serde_json::Value,
}

/// A tool invocation with its arguments already decoded to JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

impl ToolCallRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

impl TryFrom<&ToolCall> for ToolCallRequest {
    type Error = ToolError;

    fn try_from(call: &ToolCall) -> Result<Self, Self::Error> {
        let raw = call.arguments.trim();
        let arguments = if raw.is_empty() {
            serde_json::Value::Object(serde_json::Map::new())
        } else {
            serde_json::from_str(raw).map_err(|e| {
                ToolError::invalid(
                    &call.name,
                    vec![FieldViolation::new("arguments", format!("is not valid JSON ({e})"))],
                )
            })?
        };

        Ok(Self {
            id: call.id.clone(),
            name: call.name.clone(),
            arguments,
        })
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn schema(&self) -> ArgSchema;

    /// Called by the registry only after `args` passed `schema()`.
    async fn execute(&self, args: serde_json::Value) -> anyhow::Result<ToolResult>;

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters_schema: self.schema().to_json_schema(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_from_call_parses_arguments() {
        let call = ToolCall {
            id: "call_1".into(),
            name: "query".into(),
            arguments: r#"{"key":"step one"}"#.into(),
        };
        let request = ToolCallRequest::try_from(&call).unwrap();
        assert_eq!(request.arguments["key"], "step one");
        assert_eq!(request.id, "call_1");
    }

    #[test]
    fn request_from_call_rejects_broken_json() {
        let call = ToolCall {
            id: "call_1".into(),
            name: "query".into(),
            arguments: r#"{"key": "#.into(),
        };
        let err = ToolCallRequest::try_from(&call).unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
    }

    #[test]
    fn failed_result_reports_error_text() {
        assert_eq!(ToolResult::error("boom").as_text(), "boom");
        assert_eq!(ToolResult::success("ok").as_text(), "ok");
    }
}

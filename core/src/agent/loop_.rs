use crate::agent::ToolRegistry;
use crate::error::WorkflowError;
use crate::providers::collect_response;
use crate::traits::{ChatMessage, ChatRequest, ChatResponse, Provider, ToolCall, ToolSpec};
use std::sync::Arc;
use tracing::{debug, warn};

pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 20;
pub const MAX_ROUNDS_REACHED: &str = "Max tool rounds reached without a final answer.";

const TOOL_CALL_OPEN_TAG: &str = "<tool_call>";
const TOOL_CALL_CLOSE_TAG: &str = "</tool_call>";

/// Talks to the reasoning process on behalf of a node: one-shot completions
/// for the Planner and Replanner, and a bounded tool-using loop for the
/// Executor.
#[derive(Clone)]
pub struct ToolLoop {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f64,
    max_tool_rounds: usize,
    stream: bool,
}

impl ToolLoop {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.0,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            stream: false,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tool_rounds(mut self, max: usize) -> Self {
        self.max_tool_rounds = max.max(1);
        self
    }

    pub fn with_streaming(mut self, enabled: bool) -> Self {
        self.stream = enabled;
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// One request/response round trip. Tool calls written as
    /// `<tool_call>` text are lifted into structured calls.
    pub async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<ChatResponse, WorkflowError> {
        let request = ChatRequest {
            messages,
            tools: if tools.is_empty() { None } else { Some(tools) },
        };

        let response = if self.stream && self.provider.supports_streaming() {
            let events = self
                .provider
                .chat_stream(request, &self.model, self.temperature)
                .await
                .map_err(WorkflowError::ExternalCall)?;
            collect_response(events)
                .await
                .map_err(WorkflowError::ExternalCall)?
        } else {
            self.provider
                .chat(request, &self.model, self.temperature)
                .await
                .map_err(WorkflowError::ExternalCall)?
        };

        if response.has_tool_calls() {
            return Ok(response);
        }
        match &response.text {
            Some(text) if text.contains(TOOL_CALL_OPEN_TAG) => {
                let (text, tool_calls) = parse_tool_calls_fallback(text);
                Ok(ChatResponse {
                    text: (!text.is_empty()).then_some(text),
                    tool_calls,
                })
            }
            _ => Ok(response),
        }
    }

    /// Runs the conversation until the model answers without tool calls and
    /// returns that answer. Tool failures are fed back to the model; only a
    /// failed round trip ends the loop early.
    pub async fn run(
        &self,
        mut messages: Vec<ChatMessage>,
        registry: &ToolRegistry,
    ) -> Result<String, WorkflowError> {
        let tools = registry.get_specs();

        for round in 1..=self.max_tool_rounds {
            let response = self.complete(&messages, &tools).await?;

            if !response.has_tool_calls() {
                return Ok(response.text.unwrap_or_default().trim().to_string());
            }

            debug!(round, calls = response.tool_calls.len(), "tool round");
            messages.push(ChatMessage::assistant_with_tool_calls(
                response.text.clone().unwrap_or_default(),
                response.tool_calls.clone(),
            ));

            for (call_id, result) in registry.execute_turn(&response.tool_calls).await {
                messages.push(ChatMessage::tool_result(call_id, result.as_text()));
            }
        }

        warn!(max = self.max_tool_rounds, "tool loop exhausted its rounds");
        Ok(MAX_ROUNDS_REACHED.to_string())
    }
}

/// Splits `<tool_call>{"name": .., "arguments": {..}}</tool_call>` blocks
/// out of plain text. Returns the remaining text and the parsed calls.
pub fn parse_tool_calls_fallback(response: &str) -> (String, Vec<ToolCall>) {
    let mut text_parts = Vec::new();
    let mut calls = Vec::new();
    let mut remaining = response;

    while let Some(start) = remaining.find(TOOL_CALL_OPEN_TAG) {
        let before = &remaining[..start];
        if !before.trim().is_empty() {
            text_parts.push(before.trim().to_string());
        }

        let after_open = &remaining[start + TOOL_CALL_OPEN_TAG.len()..];
        let Some(close_idx) = after_open.find(TOOL_CALL_CLOSE_TAG) else {
            break;
        };

        let inner = &after_open[..close_idx];
        calls.extend(
            extract_json_values(inner)
                .iter()
                .filter_map(parse_tool_call_value),
        );
        remaining = &after_open[close_idx + TOOL_CALL_CLOSE_TAG.len()..];
    }

    if !remaining.trim().is_empty() {
        text_parts.push(remaining.trim().to_string());
    }

    (text_parts.join("\n"), calls)
}

fn extract_json_values(text: &str) -> Vec<serde_json::Value> {
    let mut values = Vec::new();
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in text.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if !in_string && depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start
                        && let Ok(value) = serde_json::from_str::<serde_json::Value>(&text[s..=i])
                    {
                        values.push(value);
                    }
                    start = None;
                }
            }
            _ => {}
        }
    }

    values
}

fn parse_tool_call_value(value: &serde_json::Value) -> Option<ToolCall> {
    let name = value.get("name")?.as_str()?.to_string();
    let arguments = value.get("arguments")?;
    let arguments_str = serde_json::to_string(arguments).ok()?;
    let digest = md5::compute(format!("{name}:{arguments_str}").as_bytes());

    Some(ToolCall {
        id: format!("call_{:x}", digest),
        name,
        arguments: arguments_str,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ScriptedProvider;
    use crate::tools::PlanTool;
    use serde_json::json;

    #[test]
    fn fallback_parser_extracts_tagged_calls() {
        let text = "Let me look.\n<tool_call>\n{\"name\": \"search\", \"arguments\": {\"query\": \"a {b}\"}}\n</tool_call>\ndone";
        let (rest, calls) = parse_tool_calls_fallback(text);

        assert_eq!(rest, "Let me look.\ndone");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "search");
        assert_eq!(calls[0].arguments, r#"{"query":"a {b}"}"#);
        assert!(calls[0].id.starts_with("call_"));
    }

    #[test]
    fn unterminated_tag_is_left_as_text() {
        let (rest, calls) = parse_tool_calls_fallback("<tool_call>{\"name\":\"x\"");
        assert!(calls.is_empty());
        assert_eq!(rest, "<tool_call>{\"name\":\"x\"");
    }

    #[tokio::test]
    async fn complete_lifts_text_calls() {
        let provider = Arc::new(ScriptedProvider::new([ChatResponse::text(
            "<tool_call>{\"name\":\"plan\",\"arguments\":{\"steps\":[\"a\"]}}</tool_call>",
        )]));
        let tool_loop = ToolLoop::new(provider, "test-model");

        let response = tool_loop.complete(&[ChatMessage::user("hi")], &[]).await.unwrap();
        assert!(response.text.is_none());
        assert_eq!(response.tool_calls[0].name, "plan");
    }

    #[tokio::test]
    async fn run_feeds_results_back_until_text() {
        let provider = Arc::new(ScriptedProvider::new([
            ScriptedProvider::tool_call("plan", json!({"steps": ["x", "y"]})),
            ChatResponse::text(" final answer "),
        ]));
        let registry = ToolRegistry::new();
        registry.register(Box::new(PlanTool)).unwrap();

        let tool_loop = ToolLoop::new(provider.clone(), "m");
        let answer = tool_loop
            .run(vec![ChatMessage::user("go")], &registry)
            .await
            .unwrap();
        assert_eq!(answer, "final answer");

        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        let tool_message = requests[1].messages.last().unwrap();
        assert_eq!(tool_message.role, "tool");
        assert_eq!(tool_message.content, "x\ny");
    }

    #[tokio::test]
    async fn run_stops_after_max_rounds() {
        let provider = Arc::new(ScriptedProvider::new([
            ScriptedProvider::tool_call("plan", json!({"steps": ["x"]})),
            ScriptedProvider::tool_call("plan", json!({"steps": ["x"]})),
            ChatResponse::text("never reached"),
        ]));
        let registry = ToolRegistry::new();
        registry.register(Box::new(PlanTool)).unwrap();

        let tool_loop = ToolLoop::new(provider.clone(), "m").with_max_tool_rounds(2);
        let answer = tool_loop
            .run(vec![ChatMessage::user("go")], &registry)
            .await
            .unwrap();
        assert_eq!(answer, MAX_ROUNDS_REACHED);
        assert_eq!(provider.remaining(), 1);
    }

    #[tokio::test]
    async fn provider_failure_is_external_call() {
        let provider = Arc::new(ScriptedProvider::new([]).then_fail("connection reset"));
        let tool_loop = ToolLoop::new(provider, "m").with_streaming(true);

        let err = tool_loop
            .run(vec![ChatMessage::user("go")], &ToolRegistry::new())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::ExternalCall(_)));
    }
}

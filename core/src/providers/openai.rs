use crate::providers::stream::{LineBuffer, StreamAssembler, StreamChunk};
use crate::traits::{ChatMessage, ChatRequest, ChatResponse, Provider, ProviderEvent, ToolCall, ToolSpec};
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::ReceiverStream;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

#[derive(Debug, Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAIMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAITool<'a>>>,
    temperature: f64,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage<'a> {
    role: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAIToolCallRequest<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct OpenAIToolCallRequest<'a> {
    id: &'a str,
    r#type: &'a str,
    function: OpenAIFunctionRequest<'a>,
}

#[derive(Debug, Serialize)]
struct OpenAIFunctionRequest<'a> {
    name: &'a str,
    arguments: &'a str,
}

#[derive(Debug, Serialize)]
struct OpenAITool<'a> {
    r#type: &'a str,
    function: OpenAIToolFunction<'a>,
}

#[derive(Debug, Serialize)]
struct OpenAIToolFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
    tool_calls: Option<Vec<OpenAIToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OpenAIToolCall {
    id: String,
    function: OpenAIFunction,
}

#[derive(Debug, Deserialize)]
struct OpenAIFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct StreamResponse {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
    tool_calls: Option<Vec<StreamToolCall>>,
}

#[derive(Debug, Deserialize)]
struct StreamToolCall {
    #[serde(default)]
    index: usize,
    id: Option<String>,
    function: Option<StreamFunction>,
}

#[derive(Debug, Deserialize)]
struct StreamFunction {
    name: Option<String>,
    arguments: Option<String>,
}

/// OpenAI-compatible `/chat/completions` backend (OpenAI, OpenRouter, and
/// any server speaking the same protocol).
pub struct OpenAIProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    extra_headers: Vec<(String, String)>,
}

impl OpenAIProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .connect_timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            client,
            api_key: api_key.into(),
            base_url: OPENAI_BASE_URL.to_string(),
            extra_headers: vec![],
        }
    }

    pub fn openrouter(api_key: impl Into<String>) -> Self {
        Self::new(api_key)
            .with_base_url(OPENROUTER_BASE_URL)
            .with_header("X-Title", "stepwise")
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.push((name.into(), value.into()));
        self
    }

    fn convert_messages<'a>(messages: &'a [ChatMessage]) -> Vec<OpenAIMessage<'a>> {
        messages
            .iter()
            .map(|m| {
                let tool_calls = m.tool_calls.as_ref().map(|tool_calls| {
                    tool_calls
                        .iter()
                        .map(|tc| OpenAIToolCallRequest {
                            id: &tc.id,
                            r#type: "function",
                            function: OpenAIFunctionRequest {
                                name: &tc.name,
                                arguments: &tc.arguments,
                            },
                        })
                        .collect()
                });

                OpenAIMessage {
                    role: &m.role,
                    content: if m.content.is_empty() && tool_calls.is_some() {
                        None
                    } else {
                        Some(m.content.as_str())
                    },
                    tool_calls,
                    tool_call_id: m.tool_call_id.as_deref(),
                }
            })
            .collect()
    }

    fn convert_tools(tools: &[ToolSpec]) -> Vec<OpenAITool<'_>> {
        tools
            .iter()
            .map(|t| OpenAITool {
                r#type: "function",
                function: OpenAIToolFunction {
                    name: &t.name,
                    description: &t.description,
                    parameters: &t.parameters_schema,
                },
            })
            .collect()
    }

    async fn post(&self, body: &OpenAIRequest<'_>) -> anyhow::Result<reqwest::Response> {
        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json");
        for (name, value) in &self.extra_headers {
            builder = builder.header(name, value);
        }

        let response = builder.json(body).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("OpenAI API error {}: {}", status, error_text));
        }
        Ok(response)
    }

    /// Decodes one server-sent-events line into stream chunks.
    fn parse_sse_line(line: &str) -> Vec<StreamChunk> {
        let line = line.trim();
        let Some(data) = line.strip_prefix("data:").map(str::trim) else {
            return vec![];
        };
        if data == "[DONE]" {
            return vec![StreamChunk::Finish(None)];
        }

        let Ok(response) = serde_json::from_str::<StreamResponse>(data) else {
            return vec![];
        };
        let Some(choice) = response.choices.into_iter().next() else {
            return vec![];
        };

        let mut chunks = Vec::new();
        if let Some(content) = choice.delta.content {
            chunks.push(StreamChunk::Text(content));
        }
        if let Some(reasoning) = choice.delta.reasoning_content {
            chunks.push(StreamChunk::Thinking(reasoning));
        }
        for tc in choice.delta.tool_calls.unwrap_or_default() {
            let (name, arguments) = match tc.function {
                Some(f) => (f.name, f.arguments.unwrap_or_default()),
                None => (None, String::new()),
            };
            chunks.push(StreamChunk::ToolCallDelta {
                index: tc.index,
                id: tc.id,
                name,
                arguments,
            });
        }
        if let Some(reason) = choice.finish_reason {
            chunks.push(StreamChunk::Finish(Some(reason)));
        }
        chunks
    }
}

#[async_trait]
impl Provider for OpenAIProvider {
    async fn chat(
        &self,
        request: ChatRequest<'_>,
        model: &str,
        temperature: f64,
    ) -> anyhow::Result<ChatResponse> {
        let openai_request = OpenAIRequest {
            model,
            messages: Self::convert_messages(request.messages),
            tools: request.tools.map(Self::convert_tools),
            temperature,
            stream: false,
        };

        let openai_response: OpenAIResponse = self.post(&openai_request).await?.json().await?;

        let message = openai_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| anyhow::anyhow!("No choices in response"))?;

        let tool_calls: Vec<ToolCall> = message
            .tool_calls
            .map(|calls| {
                calls
                    .into_iter()
                    .map(|c| ToolCall {
                        id: c.id,
                        name: c.function.name,
                        arguments: c.function.arguments,
                    })
                    .collect()
            })
            .unwrap_or_default();

        let text = match message.content {
            Some(c) if !c.trim().is_empty() => Some(c),
            _ => message.reasoning_content,
        };
        if text.is_none() && tool_calls.is_empty() {
            return Err(anyhow::anyhow!(
                "Empty response from API: no content or tool calls"
            ));
        }

        Ok(ChatResponse { text, tool_calls })
    }

    async fn chat_stream(
        &self,
        request: ChatRequest<'_>,
        model: &str,
        temperature: f64,
    ) -> anyhow::Result<BoxStream<'static, ProviderEvent>> {
        let openai_request = OpenAIRequest {
            model,
            messages: Self::convert_messages(request.messages),
            tools: request.tools.map(Self::convert_tools),
            temperature,
            stream: true,
        };

        let response = self.post(&openai_request).await?;
        let (tx, rx) = tokio::sync::mpsc::channel::<ProviderEvent>(256);

        tokio::spawn(async move {
            use futures_util::StreamExt as _;
            let mut stream = response.bytes_stream();
            let mut lines = LineBuffer::new();
            let mut assembler = StreamAssembler::new();

            while let Some(chunk_result) = stream.next().await {
                let chunk = match chunk_result {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        let _ = tx.send(ProviderEvent::Error(e.to_string())).await;
                        return;
                    }
                };
                for line in lines.push(&chunk) {
                    for piece in Self::parse_sse_line(&line) {
                        for event in assembler.push(piece) {
                            if tx.send(event).await.is_err() {
                                return;
                            }
                        }
                    }
                }
            }

            if let Some(line) = lines.finish() {
                for piece in Self::parse_sse_line(&line) {
                    for event in assembler.push(piece) {
                        if tx.send(event).await.is_err() {
                            return;
                        }
                    }
                }
            }

            for event in assembler.finish() {
                if tx.send(event).await.is_err() {
                    return;
                }
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    fn name(&self) -> &str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sse_text_delta() {
        let chunks = OpenAIProvider::parse_sse_line(
            r#"data: {"choices":[{"delta":{"content":"Hi"},"finish_reason":null}]}"#,
        );
        assert_eq!(chunks, vec![StreamChunk::Text("Hi".into())]);
    }

    #[test]
    fn sse_tool_call_delta_and_finish() {
        let chunks = OpenAIProvider::parse_sse_line(
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":1,"id":"c1","function":{"name":"search","arguments":"{\"q"}}]},"finish_reason":"tool_calls"}]}"#,
        );
        assert_eq!(
            chunks,
            vec![
                StreamChunk::ToolCallDelta {
                    index: 1,
                    id: Some("c1".into()),
                    name: Some("search".into()),
                    arguments: "{\"q".into(),
                },
                StreamChunk::Finish(Some("tool_calls".into())),
            ]
        );
    }

    #[test]
    fn sse_done_and_noise() {
        assert_eq!(
            OpenAIProvider::parse_sse_line("data: [DONE]"),
            vec![StreamChunk::Finish(None)]
        );
        assert!(OpenAIProvider::parse_sse_line(": keep-alive").is_empty());
        assert!(OpenAIProvider::parse_sse_line("data: {broken").is_empty());
    }

    #[test]
    fn assistant_tool_call_message_omits_empty_content() {
        let messages = vec![ChatMessage::assistant_with_tool_calls(
            "",
            vec![ToolCall {
                id: "1".into(),
                name: "plan".into(),
                arguments: "{}".into(),
            }],
        )];
        let converted = OpenAIProvider::convert_messages(&messages);
        assert!(converted[0].content.is_none());
        assert_eq!(converted[0].tool_calls.as_ref().unwrap()[0].r#type, "function");
    }

    #[tokio::test]
    async fn stream_keeps_characters_split_across_reads() {
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"café\"},\"finish_reason\":null}]}\n\ndata: [DONE]\n\n";
        let bytes = body.as_bytes();
        let split = bytes.iter().position(|b| *b == 0xC3).unwrap() + 1;
        let base = crate::test_support::serve_chunked(
            "text/event-stream",
            vec![bytes[..split].to_vec(), bytes[split..].to_vec()],
        )
        .await;

        let provider = OpenAIProvider::new("sk-test").with_base_url(base);
        let messages = [ChatMessage::user("hi")];
        let request = ChatRequest {
            messages: &messages,
            tools: None,
        };
        let events = provider.chat_stream(request, "m", 0.0).await.unwrap();
        let response = crate::providers::collect_response(events).await.unwrap();
        assert_eq!(response.text.as_deref(), Some("café"));
    }
}

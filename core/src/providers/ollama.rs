use crate::providers::stream::{LineBuffer, StreamAssembler, StreamChunk};
use crate::traits::{ChatMessage, ChatRequest, ChatResponse, Provider, ProviderEvent, ToolCall, ToolSpec};
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::ReceiverStream;

pub const OLLAMA_BASE_URL: &str = "http://localhost:11434";

#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OllamaTool<'a>>>,
    options: OllamaOptions,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct OllamaMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OllamaToolCallRequest>>,
}

#[derive(Debug, Serialize)]
struct OllamaToolCallRequest {
    function: OllamaFunctionRequest,
}

#[derive(Debug, Serialize)]
struct OllamaFunctionRequest {
    name: String,
    arguments: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct OllamaTool<'a> {
    r#type: &'a str,
    function: OllamaToolFunction<'a>,
}

#[derive(Debug, Serialize)]
struct OllamaToolFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a serde_json::Value,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f64,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    message: OllamaResponseMessage,
}

#[derive(Debug, Default, Deserialize)]
struct OllamaResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<OllamaToolCallResponse>>,
    #[serde(default)]
    thinking: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaToolCallResponse {
    function: OllamaFunctionResponse,
}

#[derive(Debug, Deserialize)]
struct OllamaFunctionResponse {
    name: String,
    arguments: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct StreamResponse {
    message: Option<OllamaResponseMessage>,
    #[serde(default)]
    done: bool,
}

/// Local models through Ollama's `/api/chat`.
pub struct OllamaProvider {
    client: reqwest::Client,
    base_url: String,
}

impl OllamaProvider {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .connect_timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: OLLAMA_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let url = base_url.into();
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    /// Ollama has no tool role; consecutive tool results are folded into one
    /// user message placed where the first of them stood.
    fn convert_messages(messages: &[ChatMessage]) -> Vec<OllamaMessage> {
        let mut result = Vec::new();
        let mut tool_results_buffer: Vec<String> = Vec::new();

        let flush = |buffer: &mut Vec<String>, result: &mut Vec<OllamaMessage>| {
            if !buffer.is_empty() {
                result.push(OllamaMessage {
                    role: "user".to_string(),
                    content: Some(format!("[Tool results]\n{}", buffer.join("\n"))),
                    tool_calls: None,
                });
                buffer.clear();
            }
        };

        for m in messages {
            if m.role == "tool" {
                let tool_call_id = m.tool_call_id.as_deref().unwrap_or("unknown");
                tool_results_buffer.push(format!(
                    "<tool_result id=\"{}\">\n{}\n</tool_result>",
                    tool_call_id, m.content
                ));
                continue;
            }

            flush(&mut tool_results_buffer, &mut result);

            let tool_calls = m.tool_calls.as_ref().map(|tcs| {
                tcs.iter()
                    .map(|tc| OllamaToolCallRequest {
                        function: OllamaFunctionRequest {
                            name: tc.name.clone(),
                            arguments: serde_json::from_str(&tc.arguments)
                                .unwrap_or(serde_json::Value::Null),
                        },
                    })
                    .collect()
            });

            result.push(OllamaMessage {
                role: m.role.clone(),
                content: if m.content.is_empty() { None } else { Some(m.content.clone()) },
                tool_calls,
            });
        }
        flush(&mut tool_results_buffer, &mut result);

        result
    }

    fn convert_tools(tools: &[ToolSpec]) -> Vec<OllamaTool<'_>> {
        tools
            .iter()
            .map(|t| OllamaTool {
                r#type: "function",
                function: OllamaToolFunction {
                    name: &t.name,
                    description: &t.description,
                    parameters: &t.parameters_schema,
                },
            })
            .collect()
    }

    async fn post(&self, body: &OllamaRequest<'_>) -> anyhow::Result<reqwest::Response> {
        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Ollama API error ({}): {}", status, error_text));
        }
        Ok(response)
    }

    /// Ollama streams one JSON object per line and sends each tool call
    /// whole, so every call gets its own index.
    fn parse_stream_line(line: &str, next_index: &mut usize) -> Vec<StreamChunk> {
        let Ok(response) = serde_json::from_str::<StreamResponse>(line.trim()) else {
            return vec![];
        };

        let mut chunks = Vec::new();
        if let Some(message) = response.message {
            if let Some(content) = message.content {
                chunks.push(StreamChunk::Text(content));
            }
            if let Some(thinking) = message.thinking {
                chunks.push(StreamChunk::Thinking(thinking));
            }
            for tc in message.tool_calls.unwrap_or_default() {
                chunks.push(StreamChunk::ToolCallDelta {
                    index: *next_index,
                    id: Some(format!("ollama_{}", uuid::Uuid::new_v4())),
                    name: Some(tc.function.name),
                    arguments: tc.function.arguments.to_string(),
                });
                *next_index += 1;
            }
        }
        if response.done {
            chunks.push(StreamChunk::Finish(None));
        }
        chunks
    }
}

impl Default for OllamaProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    async fn chat(
        &self,
        request: ChatRequest<'_>,
        model: &str,
        temperature: f64,
    ) -> anyhow::Result<ChatResponse> {
        let ollama_request = OllamaRequest {
            model,
            messages: Self::convert_messages(request.messages),
            tools: request.tools.map(Self::convert_tools),
            options: OllamaOptions { temperature },
            stream: false,
        };

        let ollama_response: OllamaResponse = self.post(&ollama_request).await?.json().await?;
        let message = ollama_response.message;

        let tool_calls: Vec<ToolCall> = message
            .tool_calls
            .map(|tcs| {
                tcs.into_iter()
                    .map(|tc| ToolCall {
                        id: format!("ollama_{}", uuid::Uuid::new_v4()),
                        name: tc.function.name,
                        arguments: tc.function.arguments.to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let text = match message.content {
            Some(content) if !content.is_empty() => Some(content),
            _ if tool_calls.is_empty() => message.thinking,
            _ => None,
        };

        Ok(ChatResponse { text, tool_calls })
    }

    async fn chat_stream(
        &self,
        request: ChatRequest<'_>,
        model: &str,
        temperature: f64,
    ) -> anyhow::Result<BoxStream<'static, ProviderEvent>> {
        let ollama_request = OllamaRequest {
            model,
            messages: Self::convert_messages(request.messages),
            tools: request.tools.map(Self::convert_tools),
            options: OllamaOptions { temperature },
            stream: true,
        };

        let response = self.post(&ollama_request).await?;
        let (tx, rx) = tokio::sync::mpsc::channel::<ProviderEvent>(256);

        tokio::spawn(async move {
            use futures_util::StreamExt as _;
            let mut stream = response.bytes_stream();
            let mut lines = LineBuffer::new();
            let mut assembler = StreamAssembler::new();
            let mut next_index = 0;

            while let Some(chunk_result) = stream.next().await {
                let chunk = match chunk_result {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        let _ = tx.send(ProviderEvent::Error(e.to_string())).await;
                        return;
                    }
                };
                for line in lines.push(&chunk) {
                    for piece in Self::parse_stream_line(&line, &mut next_index) {
                        for event in assembler.push(piece) {
                            if tx.send(event).await.is_err() {
                                return;
                            }
                        }
                    }
                }
            }

            if let Some(line) = lines.finish() {
                for piece in Self::parse_stream_line(&line, &mut next_index) {
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
        "ollama"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_results_fold_into_user_message() {
        let messages = vec![
            ChatMessage::user("go"),
            ChatMessage::tool_result("a".into(), "one"),
            ChatMessage::tool_result("b".into(), "two"),
            ChatMessage::assistant("done"),
        ];
        let converted = OllamaProvider::convert_messages(&messages);
        assert_eq!(converted.len(), 3);
        assert_eq!(converted[1].role, "user");
        let folded = converted[1].content.as_deref().unwrap();
        assert!(folded.contains("<tool_result id=\"a\">\none\n</tool_result>"));
        assert!(folded.contains("<tool_result id=\"b\">"));
    }

    #[test]
    fn stream_line_tool_calls_get_sequential_indexes() {
        let mut next_index = 0;
        let line = r#"{"message":{"content":"","tool_calls":[{"function":{"name":"search","arguments":{"query":"x"}}},{"function":{"name":"query","arguments":{"key":"y"}}}]},"done":true}"#;
        let chunks = OllamaProvider::parse_stream_line(line, &mut next_index);

        assert_eq!(next_index, 2);
        assert!(matches!(&chunks[1], StreamChunk::ToolCallDelta { index: 0, name: Some(n), .. } if n == "search"));
        assert!(matches!(&chunks[2], StreamChunk::ToolCallDelta { index: 1, arguments, .. } if arguments == r#"{"key":"y"}"#));
        assert_eq!(chunks.last(), Some(&StreamChunk::Finish(None)));
    }

    #[tokio::test]
    async fn stream_keeps_characters_split_across_reads() {
        let body = "{\"message\":{\"role\":\"assistant\",\"content\":\"naïve\"},\"done\":false}\n{\"message\":{\"role\":\"assistant\",\"content\":\"\"},\"done\":true}";
        let bytes = body.as_bytes();
        let split = bytes.iter().position(|b| *b == 0xC3).unwrap() + 1;
        let base = crate::test_support::serve_chunked(
            "application/x-ndjson",
            vec![bytes[..split].to_vec(), bytes[split..].to_vec()],
        )
        .await;

        let provider = OllamaProvider::new().with_base_url(base);
        let messages = [ChatMessage::user("hi")];
        let request = ChatRequest {
            messages: &messages,
            tools: None,
        };
        let events = provider.chat_stream(request, "m", 0.0).await.unwrap();
        let response = crate::providers::collect_response(events).await.unwrap();
        assert_eq!(response.text.as_deref(), Some("naïve"));
    }
}

use crate::traits::{ChatMessage, ChatRequest, ChatResponse, Provider, ProviderEvent, ToolCall};
use async_trait::async_trait;
use futures_util::stream::{self, BoxStream};
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

/// One request the scripted provider received.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<String>,
}

/// Replays canned replies in order. Used by tests and `--dry-run`, where no
/// real backend should be contacted.
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Result<ChatResponse, String>>>,
    recorded: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedProvider {
    pub fn new(replies: impl IntoIterator<Item = ChatResponse>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(Ok).collect()),
            recorded: Mutex::new(Vec::new()),
        }
    }

    /// Queues a reply that fails the request, as a network error would.
    pub fn then_fail(self, message: impl Into<String>) -> Self {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Err(message.into()));
        self
    }

    pub fn tool_call(name: &str, arguments: serde_json::Value) -> ChatResponse {
        let id = format!("scripted_{}", uuid::Uuid::new_v4().simple());
        ChatResponse::tool_calls(vec![ToolCall {
            id,
            name: name.to_string(),
            arguments: arguments.to_string(),
        }])
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.recorded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn next_reply(&self, request: ChatRequest<'_>) -> anyhow::Result<ChatResponse> {
        self.recorded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedRequest {
                messages: request.messages.to_vec(),
                tools: request
                    .tools
                    .map(|tools| tools.iter().map(|t| t.name.clone()).collect())
                    .unwrap_or_default(),
            });

        let reply = self
            .replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match reply {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(anyhow::anyhow!(message)),
            None => Err(anyhow::anyhow!("Scripted provider has no replies left")),
        }
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    async fn chat(
        &self,
        request: ChatRequest<'_>,
        _model: &str,
        _temperature: f64,
    ) -> anyhow::Result<ChatResponse> {
        self.next_reply(request)
    }

    async fn chat_stream(
        &self,
        request: ChatRequest<'_>,
        _model: &str,
        _temperature: f64,
    ) -> anyhow::Result<BoxStream<'static, ProviderEvent>> {
        let response = self.next_reply(request)?;

        let mut events = Vec::new();
        if let Some(text) = response.text {
            events.push(ProviderEvent::Token(text));
        }
        events.extend(response.tool_calls.into_iter().map(ProviderEvent::ToolCall));
        events.push(ProviderEvent::Done);
        Ok(Box::pin(stream::iter(events)))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::collect_response;
    use serde_json::json;

    #[tokio::test]
    async fn replays_in_order_then_fails() {
        let provider = ScriptedProvider::new([ChatResponse::text("one")]).then_fail("offline");
        let messages = [ChatMessage::user("hi")];
        let request = ChatRequest {
            messages: &messages,
            tools: None,
        };

        let first = provider.chat(request, "m", 0.0).await.unwrap();
        assert_eq!(first.text.as_deref(), Some("one"));
        assert!(provider.chat(request, "m", 0.0).await.is_err());
        assert!(provider.chat(request, "m", 0.0).await.is_err());
        assert_eq!(provider.requests().len(), 3);
    }

    #[tokio::test]
    async fn stream_round_trips_through_collect() {
        let provider =
            ScriptedProvider::new([ScriptedProvider::tool_call("plan", json!({ "steps": ["a"] }))]);
        let messages = [ChatMessage::user("hi")];
        let request = ChatRequest {
            messages: &messages,
            tools: None,
        };

        let stream = provider.chat_stream(request, "m", 0.0).await.unwrap();
        let response = collect_response(stream).await.unwrap();
        assert_eq!(response.tool_calls[0].name, "plan");
        assert_eq!(provider.remaining(), 0);
    }
}

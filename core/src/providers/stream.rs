//! Reassembly of streamed completions.
//!
//! Backends emit small deltas: text fragments, and tool-call fragments keyed
//! by a call index whose name and JSON arguments arrive in pieces. The
//! [`StreamAssembler`] buffers fragments per index and releases whole
//! [`ToolCall`]s once the backend signals the end of the message, so callers
//! only ever see complete calls.

use crate::traits::{ChatResponse, ProviderEvent, ToolCall};
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use std::collections::BTreeMap;

/// One decoded fragment of a streamed completion.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    Text(String),
    Thinking(String),
    ToolCallDelta {
        index: usize,
        id: Option<String>,
        name: Option<String>,
        arguments: String,
    },
    /// End of the message, with the backend's finish reason if it sent one.
    Finish(Option<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyPhase {
    AccumulatingText,
    AccumulatingToolCall,
    Dispatching,
    Done,
}

#[derive(Debug, Default)]
struct PendingCall {
    id: String,
    name: String,
    arguments: String,
}

#[derive(Debug)]
pub struct StreamAssembler {
    phase: AssemblyPhase,
    buffers: BTreeMap<usize, PendingCall>,
}

impl Default for StreamAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamAssembler {
    pub fn new() -> Self {
        Self {
            phase: AssemblyPhase::AccumulatingText,
            buffers: BTreeMap::new(),
        }
    }

    pub fn phase(&self) -> AssemblyPhase {
        self.phase
    }

    /// Feeds one chunk and returns the events it completes, if any.
    pub fn push(&mut self, chunk: StreamChunk) -> Vec<ProviderEvent> {
        if self.phase == AssemblyPhase::Done {
            return vec![];
        }

        match chunk {
            StreamChunk::Text(text) if text.is_empty() => vec![],
            StreamChunk::Text(text) => vec![ProviderEvent::Token(text)],
            StreamChunk::Thinking(text) if text.is_empty() => vec![],
            StreamChunk::Thinking(text) => vec![ProviderEvent::Thinking(text)],
            StreamChunk::ToolCallDelta {
                index,
                id,
                name,
                arguments,
            } => {
                self.phase = AssemblyPhase::AccumulatingToolCall;
                let entry = self.buffers.entry(index).or_default();
                if let Some(id) = id.filter(|id| !id.is_empty()) {
                    entry.id = id;
                }
                if let Some(name) = name.filter(|name| !name.is_empty()) {
                    entry.name = name;
                }
                entry.arguments.push_str(&arguments);
                vec![]
            }
            StreamChunk::Finish(_) => self.dispatch(),
        }
    }

    /// Releases every buffered call, in call-index order.
    pub fn dispatch(&mut self) -> Vec<ProviderEvent> {
        if self.phase == AssemblyPhase::Done {
            return vec![];
        }
        self.phase = AssemblyPhase::Dispatching;

        std::mem::take(&mut self.buffers)
            .into_iter()
            .filter(|(_, call)| !call.name.is_empty())
            .map(|(index, call)| {
                let id = if call.id.is_empty() {
                    format!("call_{index}")
                } else {
                    call.id
                };
                ProviderEvent::ToolCall(ToolCall {
                    id,
                    name: call.name,
                    arguments: call.arguments,
                })
            })
            .collect()
    }

    /// Flushes anything still buffered and closes the stream.
    pub fn finish(&mut self) -> Vec<ProviderEvent> {
        if self.phase == AssemblyPhase::Done {
            return vec![];
        }
        let mut events = self.dispatch();
        events.push(ProviderEvent::Done);
        self.phase = AssemblyPhase::Done;
        events
    }
}

/// Drains a provider stream into one response. A transport error anywhere in
/// the stream fails the whole request.
pub async fn collect_response(
    mut stream: BoxStream<'static, ProviderEvent>,
) -> anyhow::Result<ChatResponse> {
    let mut text = String::new();
    let mut thinking = String::new();
    let mut tool_calls = Vec::new();

    while let Some(event) = stream.next().await {
        match event {
            ProviderEvent::Token(token) => text.push_str(&token),
            ProviderEvent::Thinking(token) => thinking.push_str(&token),
            ProviderEvent::ToolCall(call) => tool_calls.push(call),
            ProviderEvent::Error(message) => anyhow::bail!("stream interrupted: {message}"),
            ProviderEvent::Done => break,
        }
    }

    let text = if !text.is_empty() {
        Some(text)
    } else if tool_calls.is_empty() && !thinking.is_empty() {
        Some(thinking)
    } else {
        None
    };

    Ok(ChatResponse { text, tool_calls })
}

/// Splits a byte stream into lines. Bytes are kept until a `\n` arrives, so
/// a multi-byte character cut across network chunks is decoded whole.
#[derive(Debug, Default)]
pub struct LineBuffer {
    bytes: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `chunk` and returns every line it completed, without the
    /// trailing newline.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.bytes.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.bytes.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.bytes.drain(..=pos).collect();
            lines.push(decode_line(&line[..pos]));
        }
        lines
    }

    /// Whatever is left after the stream closed without a final newline.
    pub fn finish(&mut self) -> Option<String> {
        if self.bytes.iter().all(u8::is_ascii_whitespace) {
            self.bytes.clear();
            return None;
        }
        let rest = std::mem::take(&mut self.bytes);
        Some(decode_line(&rest))
    }
}

fn decode_line(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(line) => line.to_string(),
        Err(_) => String::from_utf8_lossy(bytes).into_owned(),
    }
}

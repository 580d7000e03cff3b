pub mod memory;
pub mod provider;
pub mod tool;

pub use memory::{Memory, MemoryRecord};
pub use provider::{ChatMessage, ChatRequest, ChatResponse, Provider, ProviderEvent, ToolCall};
pub use tool::{Tool, ToolCallRequest, ToolResult, ToolSpec};

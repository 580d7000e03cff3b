pub mod context;
pub mod loop_;
pub mod registry;

pub use context::{ContextBuilder, PromptKind, PromptVars, write_default_templates};
pub use loop_::{MAX_ROUNDS_REACHED, ToolLoop, parse_tool_calls_fallback};
pub use registry::ToolRegistry;

pub mod factory;
pub mod ollama;
pub mod openai;
pub mod scripted;
pub mod stream;

pub use factory::create_provider;
pub use ollama::OllamaProvider;
pub use openai::OpenAIProvider;
pub use scripted::ScriptedProvider;
pub use stream::{AssemblyPhase, LineBuffer, StreamAssembler, StreamChunk, collect_response};

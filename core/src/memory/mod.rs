pub mod factory;
pub mod step;

pub use factory::{MemoryRegistry, create_memory};
pub use step::StepMemory;

use crate::memory::StepMemory;
use crate::traits::Memory;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Hands out one [`StepMemory`] per thread id.
///
/// Runs with distinct thread ids never see each other's records; runs that
/// reuse a thread id share a store on purpose.
#[derive(Default)]
pub struct MemoryRegistry {
    scopes: Mutex<HashMap<String, Arc<dyn Memory>>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scope(&self, thread_id: &str) -> Arc<dyn Memory> {
        let mut scopes = self.scopes.lock().unwrap_or_else(PoisonError::into_inner);
        scopes
            .entry(thread_id.to_string())
            .or_insert_with(|| create_memory(thread_id))
            .clone()
    }

    pub fn release(&self, thread_id: &str) -> bool {
        let mut scopes = self.scopes.lock().unwrap_or_else(PoisonError::into_inner);
        scopes.remove(thread_id).is_some()
    }

    pub fn thread_ids(&self) -> Vec<String> {
        let scopes = self.scopes.lock().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<String> = scopes.keys().cloned().collect();
        ids.sort();
        ids
    }
}

pub fn create_memory(thread_id: &str) -> Arc<dyn Memory> {
    Arc::new(StepMemory::for_thread(thread_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scopes_are_isolated_by_thread() {
        let registry = MemoryRegistry::new();
        let a = registry.scope("a");
        let b = registry.scope("b");

        a.store("step", "from a").await.unwrap();
        assert!(b.lookup("step").await.unwrap().is_none());
        assert_eq!(registry.thread_ids(), vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn same_thread_shares_store() {
        let registry = MemoryRegistry::new();
        registry.scope("t").store("step", "shared").await.unwrap();

        let again = registry.scope("t");
        assert_eq!(again.count().await.unwrap(), 1);
        assert!(registry.release("t"));
        assert_eq!(registry.scope("t").count().await.unwrap(), 0);
    }

    #[test]
    fn factory_step_memory() {
        let mem = create_memory("42");
        assert_eq!(mem.name(), "step");
    }
}

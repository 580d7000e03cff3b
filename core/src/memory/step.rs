use crate::traits::{Memory, MemoryRecord};
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

/// In-process record of completed steps for one run (or one shared thread).
///
/// Records are kept in insertion order; the substring fallback of
/// [`Memory::lookup`] relies on that order to pick a winner.
#[derive(Debug, Default)]
pub struct StepMemory {
    thread_id: Option<String>,
    records: RwLock<Vec<MemoryRecord>>,
}

impl StepMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_thread(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: Some(thread_id.into()),
            records: RwLock::new(Vec::new()),
        }
    }

    pub fn thread_id(&self) -> Option<&str> {
        self.thread_id.as_deref()
    }
}

fn resolve<'a>(records: &'a [MemoryRecord], key: &str) -> Option<&'a MemoryRecord> {
    let dotted = format!("{key}.");
    records
        .iter()
        .find(|r| r.key == key)
        .or_else(|| records.iter().find(|r| r.key == dotted))
        .or_else(|| records.iter().find(|r| r.key.contains(key)))
}

#[async_trait]
impl Memory for StepMemory {
    fn name(&self) -> &str {
        "step"
    }

    async fn store(&self, key: &str, content: &str) -> anyhow::Result<()> {
        let mut records = self.records.write().await;
        match records.iter_mut().find(|r| r.key == key) {
            Some(existing) => {
                existing.content = content.to_string();
                existing.stored_at = Utc::now();
            }
            None => records.push(MemoryRecord {
                key: key.to_string(),
                content: content.to_string(),
                stored_at: Utc::now(),
                thread_id: self.thread_id.clone(),
            }),
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<MemoryRecord>> {
        let records = self.records.read().await;
        Ok(records.iter().find(|r| r.key == key).cloned())
    }

    async fn lookup(&self, key: &str) -> anyhow::Result<Option<MemoryRecord>> {
        if key.is_empty() {
            return Ok(None);
        }
        let records = self.records.read().await;
        Ok(resolve(&records, key).cloned())
    }

    async fn list(&self) -> anyhow::Result<Vec<MemoryRecord>> {
        Ok(self.records.read().await.clone())
    }

    async fn count(&self) -> anyhow::Result<usize> {
        Ok(self.records.read().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lookup_prefers_exact_key() {
        let memory = StepMemory::new();
        memory.store("stepA.", "dotted").await.unwrap();
        memory.store("stepA", "exact").await.unwrap();

        let hit = memory.lookup("stepA").await.unwrap().unwrap();
        assert_eq!(hit.content, "exact");
    }

    #[tokio::test]
    async fn lookup_falls_back_to_trailing_period() {
        let memory = StepMemory::new();
        memory.store("stepA.", "dotted").await.unwrap();

        let hit = memory.lookup("stepA").await.unwrap().unwrap();
        assert_eq!(hit.key, "stepA.");
    }

    #[tokio::test]
    async fn lookup_substring_single_match() {
        let memory = StepMemory::new();
        memory.store("Find the stepping stones", "found").await.unwrap();
        memory.store("Summarise", "summary").await.unwrap();

        let hit = memory.lookup("step").await.unwrap().unwrap();
        assert_eq!(hit.content, "found");
    }

    #[tokio::test]
    async fn lookup_substring_tie_goes_to_first_inserted() {
        let memory = StepMemory::new();
        memory.store("second step", "b").await.unwrap();
        memory.store("first step", "a").await.unwrap();

        let hit = memory.lookup("step").await.unwrap().unwrap();
        assert_eq!(hit.content, "b");
    }

    #[tokio::test]
    async fn lookup_miss_and_empty_key() {
        let memory = StepMemory::new();
        memory.store("alpha", "1").await.unwrap();

        assert!(memory.lookup("beta").await.unwrap().is_none());
        assert!(memory.lookup("").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn store_same_key_keeps_position() {
        let memory = StepMemory::for_thread("t1");
        memory.store("one", "first").await.unwrap();
        memory.store("two", "second").await.unwrap();
        memory.store("one", "again").await.unwrap();

        let records = memory.list().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].key, "one");
        assert_eq!(records[0].content, "again");
        assert_eq!(records[0].thread_id.as_deref(), Some("t1"));
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The stored result of one completed step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryRecord {
    pub key: String,
    pub content: String,
    pub stored_at: DateTime<Utc>,
    pub thread_id: Option<String>,
}

#[async_trait]
pub trait Memory: Send + Sync {
    fn name(&self) -> &str;

    /// Records `content` under `key`. A key that already exists keeps its
    /// position in insertion order and takes the newer content.
    async fn store(&self, key: &str, content: &str) -> anyhow::Result<()>;

    /// Exact-key read, no fallback.
    async fn get(&self, key: &str) -> anyhow::Result<Option<MemoryRecord>>;

    /// Exact key, then `key.`, then the first-inserted key containing `key`.
    async fn lookup(&self, key: &str) -> anyhow::Result<Option<MemoryRecord>>;

    async fn list(&self) -> anyhow::Result<Vec<MemoryRecord>>;

    async fn count(&self) -> anyhow::Result<usize>;
}

//! Append-only log of action dispatches.

use crate::execution::DispatchRecord;
use async_trait::async_trait;
use tokio::sync::RwLock;
use toolbar_core::WorkflowId;

/// Where dispatch records go.
#[async_trait]
pub trait DispatchHistory: Send + Sync {
    async fn append(&self, record: DispatchRecord);

    /// All records in append order.
    async fn records(&self) -> Vec<DispatchRecord>;

    async fn for_workflow(&self, workflow_id: WorkflowId) -> Vec<DispatchRecord> {
        self.records()
            .await
            .into_iter()
            .filter(|r| r.workflow_id == workflow_id)
            .collect()
    }
}

/// History kept in memory, optionally capped to the most recent records.
#[derive(Debug, Default)]
pub struct InMemoryHistory {
    records: RwLock<Vec<DispatchRecord>>,
    capacity: Option<usize>,
}

impl InMemoryHistory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `capacity` records, dropping the oldest.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            capacity: Some(capacity.max(1)),
        }
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl DispatchHistory for InMemoryHistory {
    async fn append(&self, record: DispatchRecord) {
        let mut records = self.records.write().await;
        records.push(record);
        if let Some(capacity) = self.capacity {
            let excess = records.len().saturating_sub(capacity);
            records.drain(..excess);
        }
    }

    async fn records(&self) -> Vec<DispatchRecord> {
        self.records.read().await.clone()
    }
}

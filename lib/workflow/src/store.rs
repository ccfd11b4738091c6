//! Workflow persistence.
//!
//! The store owns the workflow definitions. It persists them as a single
//! document through a [`KeyValueStore`] and serves read-only `Arc`
//! snapshots to the dispatcher. Saves validate first and only update the
//! in-memory copy after the backend accepted the new document.

use crate::catalog::EventType;
use crate::definition::{Workflow, WorkflowSummary};
use crate::error::{StoreError, WorkflowError};
use crate::legacy;
use async_trait::async_trait;
use serde_json::{Value as JsonValue, json};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, RwLock};
use toolbar_core::WorkflowId;
use tracing::{debug, info, instrument, warn};

/// Key under which the workflow document is stored.
pub const WORKFLOWS_KEY: &str = "workflows";

/// Version written by [`WorkflowStore`].
pub const DOCUMENT_VERSION: u64 = 1;

/// Key-value persistence used by the store.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Returns `None` when nothing was stored under `key`.
    async fn load(&self, key: &str) -> Result<Option<JsonValue>, StoreError>;

    async fn save(&self, key: &str, value: &JsonValue) -> Result<(), StoreError>;
}

/// In-memory backend for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: RwLock<HashMap<String, JsonValue>>,
    fail_saves: AtomicBool,
}

impl MemoryKeyValueStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following save fail with an I/O error.
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub async fn insert(&self, key: impl Into<String>, value: JsonValue) {
        self.entries.write().await.insert(key.into(), value);
    }

    pub async fn get(&self, key: &str) -> Option<JsonValue> {
        self.entries.read().await.get(key).cloned()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn load(&self, key: &str) -> Result<Option<JsonValue>, StoreError> {
        Ok(self.get(key).await)
    }

    async fn save(&self, key: &str, value: &JsonValue) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Io {
                key: key.to_string(),
                reason: "backend rejected write".to_string(),
            });
        }
        self.insert(key, value.clone()).await;
        Ok(())
    }
}

/// One pretty-printed JSON file per key inside a directory.
///
/// Writes go to a temporary file that is renamed over the old one, so a
/// crash mid-write leaves the previous document in place.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn load(&self, key: &str) -> Result<Option<JsonValue>, StoreError> {
        let path = self.path_for(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StoreError::Io {
                    key: key.to_string(),
                    reason: format!("{}: {e}", path.display()),
                });
            }
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StoreError::Serialization {
                key: key.to_string(),
                reason: e.to_string(),
            })
    }

    async fn save(&self, key: &str, value: &JsonValue) -> Result<(), StoreError> {
        let io_error = |e: std::io::Error| StoreError::Io {
            key: key.to_string(),
            reason: e.to_string(),
        };
        let bytes = serde_json::to_vec_pretty(value).map_err(|e| StoreError::Serialization {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        tokio::fs::create_dir_all(&self.dir).await.map_err(io_error)?;
        let path = self.path_for(key);
        let tmp = self.dir.join(format!("{key}.json.tmp"));
        tokio::fs::write(&tmp, bytes).await.map_err(io_error)?;
        tokio::fs::rename(&tmp, &path).await.map_err(io_error)?;
        Ok(())
    }
}

/// A persisted item that could not be loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedWorkflow {
    /// Position in the persisted list.
    pub index: usize,
    pub name: Option<String>,
    pub reason: String,
}

/// Result of [`WorkflowStore::load`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadOutcome {
    pub loaded: usize,
    /// How many of the loaded workflows came from the flat format.
    pub migrated: usize,
    pub skipped: Vec<SkippedWorkflow>,
}

/// The persisted collection of workflow definitions.
pub struct WorkflowStore {
    backend: Arc<dyn KeyValueStore>,
    key: String,
    workflows: RwLock<Vec<Arc<Workflow>>>,
    /// Serializes load, save and remove so documents are written in order.
    writes: Mutex<()>,
}

impl WorkflowStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self {
            backend,
            key: WORKFLOWS_KEY.to_string(),
            workflows: RwLock::new(Vec::new()),
            writes: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Replaces the in-memory collection with the persisted one.
    ///
    /// Invalid or duplicate items are skipped and reported; they never
    /// prevent the rest from loading.
    ///
    /// # Errors
    ///
    /// Fails when the backend fails or the document itself is unreadable.
    #[instrument(skip(self), fields(key = %self.key))]
    pub async fn load(&self) -> toolbar_core::Result<LoadOutcome, WorkflowError> {
        let _guard = self.writes.lock().await;
        let document = self
            .backend
            .load(&self.key)
            .await
            .map_err(|e| WorkflowError::Storage {
                reason: e.to_string(),
            })?;
        let items = document_items(document)?;

        let mut outcome = LoadOutcome::default();
        let mut loaded = Vec::with_capacity(items.len());
        let mut seen = HashSet::new();
        for (index, item) in items.into_iter().enumerate() {
            let name = item
                .get("name")
                .and_then(JsonValue::as_str)
                .map(str::to_string);
            match parse_item(item, &mut seen) {
                Ok((workflow, migrated)) => {
                    if migrated {
                        outcome.migrated += 1;
                    }
                    loaded.push(Arc::new(workflow));
                }
                Err(reason) => {
                    warn!(index, workflow = ?name, reason = %reason, "Skipping invalid workflow definition");
                    outcome.skipped.push(SkippedWorkflow {
                        index,
                        name,
                        reason,
                    });
                }
            }
        }
        outcome.loaded = loaded.len();
        *self.workflows.write().await = loaded;

        info!(
            loaded = outcome.loaded,
            migrated = outcome.migrated,
            skipped = outcome.skipped.len(),
            "Loaded workflows"
        );
        Ok(outcome)
    }

    /// Inserts or replaces a workflow.
    ///
    /// # Errors
    ///
    /// `InvalidWorkflow` when validation fails and `Storage` when the backend
    /// rejects the write. Either way the persisted and in-memory collections
    /// are unchanged.
    #[instrument(skip(self, workflow), fields(workflow_id = %workflow.id, workflow = %workflow.name()))]
    pub async fn save(&self, mut workflow: Workflow) -> toolbar_core::Result<(), WorkflowError> {
        workflow.validate().map_err(|e| WorkflowError::InvalidWorkflow {
            workflow_id: workflow.id,
            name: workflow.name().to_string(),
            reason: e.to_string(),
        })?;
        workflow.touch();

        let _guard = self.writes.lock().await;
        let mut next = self.workflows.read().await.clone();
        let workflow = Arc::new(workflow);
        match next.iter_mut().find(|w| w.id == workflow.id) {
            Some(slot) => *slot = Arc::clone(&workflow),
            None => next.push(Arc::clone(&workflow)),
        }
        self.persist(&next).await?;
        *self.workflows.write().await = next;
        info!("Saved workflow");
        Ok(())
    }

    /// Removes a workflow.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown ID, `Storage` when the backend fails.
    #[instrument(skip(self))]
    pub async fn remove(&self, workflow_id: WorkflowId) -> toolbar_core::Result<(), WorkflowError> {
        let _guard = self.writes.lock().await;
        let mut next = self.workflows.read().await.clone();
        let before = next.len();
        next.retain(|w| w.id != workflow_id);
        if next.len() == before {
            return Err(WorkflowError::NotFound { workflow_id }.into());
        }
        self.persist(&next).await?;
        *self.workflows.write().await = next;
        info!("Removed workflow");
        Ok(())
    }

    /// Enables or disables a workflow and persists the change.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown ID, `Storage` when the backend fails.
    pub async fn set_enabled(
        &self,
        workflow_id: WorkflowId,
        enabled: bool,
    ) -> toolbar_core::Result<(), WorkflowError> {
        let Some(current) = self.get(workflow_id).await else {
            return Err(WorkflowError::NotFound { workflow_id }.into());
        };
        let mut workflow = (*current).clone();
        if enabled {
            workflow.enable();
        } else {
            workflow.disable();
        }
        self.save(workflow).await
    }

    pub async fn get(&self, workflow_id: WorkflowId) -> Option<Arc<Workflow>> {
        self.workflows
            .read()
            .await
            .iter()
            .find(|w| w.id == workflow_id)
            .cloned()
    }

    /// All workflows in persisted order.
    pub async fn all(&self) -> Vec<Arc<Workflow>> {
        self.workflows.read().await.clone()
    }

    pub async fn list(&self) -> Vec<WorkflowSummary> {
        self.workflows
            .read()
            .await
            .iter()
            .map(|w| WorkflowSummary::from(w.as_ref()))
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.workflows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.workflows.read().await.is_empty()
    }

    /// Enabled workflows triggered by `event_type`, highest priority first,
    /// then by name.
    pub async fn enabled_for(&self, event_type: EventType) -> Vec<Arc<Workflow>> {
        let mut matching: Vec<_> = self
            .workflows
            .read()
            .await
            .iter()
            .filter(|w| w.listens_to(event_type))
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            b.metadata
                .priority
                .cmp(&a.metadata.priority)
                .then_with(|| a.name().cmp(b.name()))
        });
        matching
    }

    async fn persist(&self, workflows: &[Arc<Workflow>]) -> toolbar_core::Result<(), WorkflowError> {
        let items = workflows
            .iter()
            .map(|w| serde_json::to_value(w.as_ref()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| WorkflowError::Storage {
                reason: e.to_string(),
            })?;
        let document = json!({ "version": DOCUMENT_VERSION, "workflows": items });
        self.backend
            .save(&self.key, &document)
            .await
            .map_err(|e| WorkflowError::Storage {
                reason: e.to_string(),
            })?;
        debug!(count = workflows.len(), "Persisted workflow document");
        Ok(())
    }
}

fn document_items(document: Option<JsonValue>) -> Result<Vec<JsonValue>, WorkflowError> {
    match document {
        None => Ok(Vec::new()),
        Some(JsonValue::Array(items)) => Ok(items),
        Some(JsonValue::Object(mut map)) => {
            let version = map.get("version").and_then(JsonValue::as_u64).ok_or_else(|| {
                WorkflowError::InvalidDocument {
                    reason: "missing document version".to_string(),
                }
            })?;
            if version != DOCUMENT_VERSION {
                return Err(WorkflowError::UnsupportedVersion { version });
            }
            match map.remove("workflows") {
                Some(JsonValue::Array(items)) => Ok(items),
                None => Ok(Vec::new()),
                Some(_) => Err(WorkflowError::InvalidDocument {
                    reason: "'workflows' is not a list".to_string(),
                }),
            }
        }
        Some(_) => Err(WorkflowError::InvalidDocument {
            reason: "expected a list or a versioned document".to_string(),
        }),
    }
}

fn parse_item(item: JsonValue, seen: &mut HashSet<WorkflowId>) -> Result<(Workflow, bool), String> {
    let migrated = legacy::is_legacy(&item);
    let workflow = if migrated {
        legacy::migrate(item)?
    } else {
        serde_json::from_value::<Workflow>(item).map_err(|e| e.to_string())?
    };
    workflow.validate().map_err(|e| e.to_string())?;
    if !seen.insert(workflow.id) {
        return Err(format!("duplicate workflow id {}", workflow.id));
    }
    Ok((workflow, migrated))
}

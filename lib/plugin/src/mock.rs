//! Configurable plugin for tests.

use crate::error::PluginError;
use crate::plugin::{ActionRequest, ActionResponse, Plugin, PluginConfig};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// How a [`MockPlugin`] answers actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockResponse {
    Succeed,
    /// Handled failure (`success = false`).
    Fail(String),
    /// `Err(PluginError::Action)`.
    Error(String),
    /// Sleep before succeeding.
    Delay(Duration),
}

/// A plugin that records every hook call.
///
/// Tests usually keep an `Arc<MockPlugin>` and hand clones to the catalog,
/// then assert on the counters afterwards.
#[derive(Debug)]
pub struct MockPlugin {
    name: String,
    dependencies: Vec<String>,
    fail_init: Option<String>,
    fail_cleanup: Option<String>,
    response: MockResponse,
    journal: Arc<Mutex<Vec<String>>>,
    initialize_calls: AtomicUsize,
    activate_calls: AtomicUsize,
    cleanup_calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    config: Mutex<Option<PluginConfig>>,
    requests: Mutex<Vec<ActionRequest>>,
}

impl MockPlugin {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dependencies: Vec::new(),
            fail_init: None,
            fail_cleanup: None,
            response: MockResponse::Succeed,
            journal: Arc::new(Mutex::new(Vec::new())),
            initialize_calls: AtomicUsize::new(0),
            activate_calls: AtomicUsize::new(0),
            cleanup_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            config: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn with_dependency(mut self, dependency: impl Into<String>) -> Self {
        self.dependencies.push(dependency.into());
        self
    }

    #[must_use]
    pub fn failing_init(mut self, reason: impl Into<String>) -> Self {
        self.fail_init = Some(reason.into());
        self
    }

    #[must_use]
    pub fn failing_cleanup(mut self, reason: impl Into<String>) -> Self {
        self.fail_cleanup = Some(reason.into());
        self
    }

    #[must_use]
    pub fn responding(mut self, response: MockResponse) -> Self {
        self.response = response;
        self
    }

    /// Share a journal with other mocks to observe call order across plugins.
    #[must_use]
    pub fn with_journal(mut self, journal: Arc<Mutex<Vec<String>>>) -> Self {
        self.journal = journal;
        self
    }

    #[must_use]
    pub fn initialize_calls(&self) -> usize {
        self.initialize_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn activate_calls(&self) -> usize {
        self.activate_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn cleanup_calls(&self) -> usize {
        self.cleanup_calls.load(Ordering::SeqCst)
    }

    /// Most actions ever performed at the same time.
    #[must_use]
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Settings received by the last `initialize`.
    #[must_use]
    pub fn config(&self) -> Option<PluginConfig> {
        self.config
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn requests(&self) -> Vec<ActionRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, entry: String) {
        self.journal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }
}

#[async_trait]
impl Plugin for MockPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn dependencies(&self) -> Vec<String> {
        self.dependencies.clone()
    }

    async fn initialize(&self, config: &PluginConfig) -> Result<(), PluginError> {
        self.initialize_calls.fetch_add(1, Ordering::SeqCst);
        self.record(format!("initialize:{}", self.name));
        *self.config.lock().unwrap_or_else(PoisonError::into_inner) = Some(config.clone());
        match &self.fail_init {
            Some(reason) => Err(PluginError::Initialization {
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }

    async fn activate(&self) {
        self.activate_calls.fetch_add(1, Ordering::SeqCst);
        self.record(format!("activate:{}", self.name));
    }

    async fn cleanup(&self) -> Result<(), PluginError> {
        self.cleanup_calls.fetch_add(1, Ordering::SeqCst);
        self.record(format!("cleanup:{}", self.name));
        match &self.fail_cleanup {
            Some(reason) => Err(PluginError::Cleanup {
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }

    async fn perform(&self, request: &ActionRequest) -> Result<ActionResponse, PluginError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        self.record(format!("perform:{}:{}", self.name, request.action));
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
        let response = self.respond().await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        response
    }
}

impl MockPlugin {
    async fn respond(&self) -> Result<ActionResponse, PluginError> {
        match &self.response {
            MockResponse::Succeed => Ok(ActionResponse::success("ok")),
            MockResponse::Fail(message) => Ok(ActionResponse::failure(message.clone())),
            MockResponse::Error(reason) => Err(PluginError::Action {
                reason: reason.clone(),
            }),
            MockResponse::Delay(duration) => {
                tokio::time::sleep(*duration).await;
                Ok(ActionResponse::success("ok"))
            }
        }
    }
}

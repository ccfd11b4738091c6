//! Plugin lifecycle manager.
//!
//! Drives plugins through `Discovered -> Initialized -> Active -> Stopped`
//! in resolved dependency order. A failing plugin is marked `Failed` and
//! loading continues with every plugin that does not depend on it.
//!
//! All transitions are serialized by one async mutex, which also guards the
//! recorded load order. Readers go through the [`PluginRegistry`] and never
//! wait on that mutex.

use crate::discovery::PluginCandidate;
use crate::error::{LifecycleError, LookupError};
use crate::registry::{PluginInstance, PluginRegistry, PluginState};
use crate::resolver::{resolve, resolve_partial};
use crate::settings::merge_settings;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

/// What to do when dependency resolution fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionPolicy {
    /// Refuse to load anything.
    #[default]
    Strict,
    /// Load every plugin that can be ordered; log and report the rest.
    LoadValidPrefix,
}

/// A plugin that did not make it, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginFailure {
    pub plugin: String,
    pub reason: String,
}

impl PluginFailure {
    fn new(plugin: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
            reason: reason.into(),
        }
    }
}

/// Outcome of [`LifecycleManager::load`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    /// Resolved load order.
    pub order: Vec<String>,
    /// Plugins now `Initialized`.
    pub initialized: Vec<String>,
    /// Plugins marked `Failed` during load.
    pub failed: Vec<PluginFailure>,
    /// Plugins left out by a partial resolution.
    pub excluded: Vec<PluginFailure>,
}

/// Outcome of an unload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UnloadReport {
    /// Plugins moved to `Stopped`, in the order they were stopped.
    pub stopped: Vec<String>,
    /// Cleanup errors; logged, never propagated.
    pub cleanup_errors: Vec<PluginFailure>,
}

/// Owns plugin candidates and every registry mutation.
pub struct LifecycleManager {
    registry: PluginRegistry,
    candidates: BTreeMap<String, PluginCandidate>,
    overrides: BTreeMap<String, Map<String, JsonValue>>,
    policy: ResolutionPolicy,
    load_order: Mutex<Vec<String>>,
}

impl LifecycleManager {
    /// Create a manager for the given candidates. Names are expected to be
    /// unique; a repeated name keeps its first candidate.
    #[must_use]
    pub fn new(candidates: impl IntoIterator<Item = PluginCandidate>) -> Self {
        let mut by_name = BTreeMap::new();
        for candidate in candidates {
            by_name
                .entry(candidate.name().to_string())
                .or_insert(candidate);
        }
        Self {
            registry: PluginRegistry::new(),
            candidates: by_name,
            overrides: BTreeMap::new(),
            policy: ResolutionPolicy::default(),
            load_order: Mutex::new(Vec::new()),
        }
    }

    /// Persisted per-plugin settings merged over descriptor defaults.
    #[must_use]
    pub fn with_overrides(mut self, overrides: BTreeMap<String, Map<String, JsonValue>>) -> Self {
        self.overrides = overrides;
        self
    }

    #[must_use]
    pub fn with_policy(mut self, policy: ResolutionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Shared handle for readers such as the workflow engine.
    #[must_use]
    pub fn registry(&self) -> PluginRegistry {
        self.registry.clone()
    }

    /// Names of all candidates, in name order.
    #[must_use]
    pub fn candidate_names(&self) -> Vec<String> {
        self.candidates.keys().cloned().collect()
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<PluginInstance>, LookupError> {
        self.registry.lookup(name)
    }

    /// The order recorded by the last successful `load`.
    pub async fn load_order(&self) -> Vec<String> {
        self.load_order.lock().await.clone()
    }

    /// Resolve, instantiate and initialize every candidate.
    ///
    /// With the strict policy a resolution error aborts before any plugin
    /// is touched. Initialization errors never abort: the plugin and its
    /// dependents are marked `Failed` and reported.
    #[instrument(skip(self), fields(candidates = self.candidates.len()))]
    pub async fn load(&self) -> toolbar_core::Result<LoadReport, LifecycleError> {
        let mut load_order = self.load_order.lock().await;
        if !load_order.is_empty() {
            return Err(LifecycleError::AlreadyLoaded.into());
        }

        let descriptors = self.candidates.values().map(|c| c.descriptor().as_ref());
        let mut report = LoadReport::default();
        let order = match self.policy {
            ResolutionPolicy::Strict => match resolve(descriptors) {
                Ok(order) => order,
                Err(e) => {
                    error!(error = %e, "Plugin dependency resolution failed");
                    return Err(LifecycleError::from(e).into());
                }
            },
            ResolutionPolicy::LoadValidPrefix => {
                let partial = resolve_partial(descriptors);
                for excluded in partial.excluded {
                    warn!(plugin = %excluded.plugin(), reason = %excluded, "Excluding plugin from load order");
                    report
                        .excluded
                        .push(PluginFailure::new(excluded.plugin(), excluded.to_string()));
                }
                partial.order
            }
        };

        for name in &order {
            let Some(candidate) = self.candidates.get(name) else {
                continue;
            };
            let descriptor = candidate.descriptor();
            let plugin = candidate.instantiate();
            self.registry
                .insert(PluginInstance::new(Arc::clone(descriptor), Arc::clone(&plugin)));

            let failed_dependency = descriptor
                .dependencies
                .iter()
                .find(|dep| !self.registry.state(dep).is_some_and(PluginState::is_running));
            if let Some(dependency) = failed_dependency {
                let reason = format!("dependency failed: {dependency}");
                warn!(plugin = %name, dependency = %dependency, "Skipping plugin, dependency failed");
                self.registry
                    .transition(name, PluginState::Failed, Some(reason.clone()))?;
                report.failed.push(PluginFailure::new(name, reason));
                continue;
            }

            let config = merge_settings(&descriptor.default_settings, self.overrides.get(name));
            match plugin.initialize(&config).await {
                Ok(()) => {
                    self.registry
                        .transition(name, PluginState::Initialized, None)?;
                    info!(plugin = %name, version = %descriptor.version, "Plugin initialized");
                    report.initialized.push(name.clone());
                }
                Err(e) => {
                    error!(plugin = %name, error = %e, "Plugin failed to initialize");
                    self.registry
                        .transition(name, PluginState::Failed, Some(e.to_string()))?;
                    report.failed.push(PluginFailure::new(name, e.to_string()));
                }
            }
        }

        info!(
            initialized = report.initialized.len(),
            failed = report.failed.len(),
            excluded = report.excluded.len(),
            "Plugin load complete"
        );
        load_order.clone_from(&order);
        report.order = order;
        Ok(report)
    }

    /// Move a plugin to `Active`. Activating an active plugin is a no-op.
    #[instrument(skip(self))]
    pub async fn activate(&self, name: &str) -> Result<(), LifecycleError> {
        let _transitions = self.load_order.lock().await;
        self.activate_locked(name).await
    }

    /// Activate every `Initialized` plugin in load order.
    pub async fn activate_all(&self) -> Vec<PluginFailure> {
        let load_order = self.load_order.lock().await;
        let mut failures = Vec::new();
        for name in load_order.iter() {
            if self.registry.state(name) != Some(PluginState::Initialized) {
                continue;
            }
            if let Err(e) = self.activate_locked(name).await {
                warn!(plugin = %name, error = %e, "Plugin activation failed");
                failures.push(PluginFailure::new(name, e.to_string()));
            }
        }
        failures
    }

    async fn activate_locked(&self, name: &str) -> Result<(), LifecycleError> {
        let instance = self
            .registry
            .lookup(name)
            .map_err(|_| LifecycleError::NotFound {
                plugin: name.to_string(),
            })?;
        match instance.state() {
            PluginState::Active => {
                debug!(plugin = %name, "Plugin already active");
                Ok(())
            }
            PluginState::Initialized => {
                instance.plugin().activate().await;
                self.registry.transition(name, PluginState::Active, None)?;
                info!(plugin = %name, "Plugin activated");
                Ok(())
            }
            from => Err(LifecycleError::InvalidTransition {
                plugin: name.to_string(),
                from,
                to: PluginState::Active,
            }),
        }
    }

    /// Stop every running plugin in reverse load order.
    #[instrument(skip(self))]
    pub async fn unload(&self) -> UnloadReport {
        let mut load_order = self.load_order.lock().await;
        let mut report = UnloadReport::default();
        for name in load_order.iter().rev() {
            self.stop_locked(name, &mut report).await;
        }
        load_order.clear();
        info!(stopped = report.stopped.len(), "Plugins unloaded");
        report
    }

    /// Stop one plugin, stopping its running dependents first.
    #[instrument(skip(self))]
    pub async fn unload_plugin(&self, name: &str) -> Result<UnloadReport, LifecycleError> {
        let load_order = self.load_order.lock().await;
        if self.registry.lookup(name).is_err() {
            return Err(LifecycleError::NotFound {
                plugin: name.to_string(),
            });
        }

        let mut affected = BTreeSet::from([name.to_string()]);
        for candidate_name in load_order.iter() {
            let depends_on_affected = self.candidates.get(candidate_name).is_some_and(|c| {
                c.descriptor()
                    .dependencies
                    .iter()
                    .any(|d| affected.contains(d))
            });
            if depends_on_affected {
                affected.insert(candidate_name.clone());
            }
        }

        let mut report = UnloadReport::default();
        for stop in load_order.iter().rev().filter(|n| affected.contains(*n)) {
            self.stop_locked(stop, &mut report).await;
        }
        Ok(report)
    }

    /// Re-instantiate and initialize a stopped or failed plugin.
    ///
    /// Its dependencies must be running. The plugin ends `Initialized`;
    /// call [`activate`](Self::activate) to make it receive actions again.
    #[instrument(skip(self))]
    pub async fn reload_plugin(&self, name: &str) -> Result<(), LifecycleError> {
        let mut load_order = self.load_order.lock().await;
        let candidate = self
            .candidates
            .get(name)
            .ok_or_else(|| LifecycleError::NotFound {
                plugin: name.to_string(),
            })?;
        if let Some(state) = self.registry.state(name).filter(|s| s.is_running()) {
            return Err(LifecycleError::InvalidTransition {
                plugin: name.to_string(),
                from: state,
                to: PluginState::Initialized,
            });
        }

        let descriptor = candidate.descriptor();
        if let Some(dependency) = descriptor
            .dependencies
            .iter()
            .find(|dep| !self.registry.state(dep).is_some_and(PluginState::is_running))
        {
            return Err(LifecycleError::DependencyFailed {
                plugin: name.to_string(),
                dependency: dependency.clone(),
            });
        }

        let plugin = candidate.instantiate();
        self.registry
            .insert(PluginInstance::new(Arc::clone(descriptor), Arc::clone(&plugin)));
        let config = merge_settings(&descriptor.default_settings, self.overrides.get(name));
        if let Err(e) = plugin.initialize(&config).await {
            error!(plugin = %name, error = %e, "Plugin failed to initialize on reload");
            self.registry
                .transition(name, PluginState::Failed, Some(e.to_string()))?;
            return Err(LifecycleError::PluginInit {
                plugin: name.to_string(),
                reason: e.to_string(),
            });
        }
        self.registry
            .transition(name, PluginState::Initialized, None)?;
        if !load_order.iter().any(|n| n == name) {
            load_order.push(name.to_string());
        }
        info!(plugin = %name, "Plugin reloaded");
        Ok(())
    }

    async fn stop_locked(&self, name: &str, report: &mut UnloadReport) {
        let Ok(instance) = self.registry.lookup(name) else {
            return;
        };
        if !instance.state().is_running() {
            return;
        }
        if let Err(e) = instance.plugin().cleanup().await {
            warn!(plugin = %name, error = %e, "Plugin cleanup failed");
            report
                .cleanup_errors
                .push(PluginFailure::new(name, e.to_string()));
        }
        match self.registry.transition(name, PluginState::Stopped, None) {
            Ok(_) => {
                debug!(plugin = %name, "Plugin stopped");
                report.stopped.push(name.to_string());
            }
            Err(e) => warn!(plugin = %name, error = %e, "Failed to mark plugin stopped"),
        }
    }
}

impl std::fmt::Debug for LifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleManager")
            .field("candidates", &self.candidates.keys().collect::<Vec<_>>())
            .field("policy", &self.policy)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

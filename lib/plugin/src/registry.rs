//! Live plugin instance table.
//!
//! The registry maps plugin names to immutable instance snapshots. Each
//! lifecycle transition swaps in a new snapshot under the write lock, so
//! concurrent readers observe either the pre- or post-transition state and
//! never a partial one. Only the lifecycle manager mutates the table.

use crate::descriptor::PluginDescriptor;
use crate::error::{LifecycleError, LookupError};
use crate::plugin::Plugin;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Lifecycle state of a plugin instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginState {
    Discovered,
    Initialized,
    Active,
    Stopped,
    /// Terminal. Reached from `Discovered` or `Initialized`.
    Failed,
}

impl PluginState {
    /// Whether `self -> to` is an allowed transition.
    #[must_use]
    pub fn can_transition_to(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Discovered, Self::Initialized | Self::Failed)
                | (Self::Initialized, Self::Active | Self::Stopped | Self::Failed)
                | (Self::Active, Self::Stopped)
        )
    }

    /// Initialized or Active: the plugin holds resources and needs cleanup.
    #[must_use]
    pub fn is_running(self) -> bool {
        matches!(self, Self::Initialized | Self::Active)
    }
}

impl fmt::Display for PluginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Discovered => "discovered",
            Self::Initialized => "initialized",
            Self::Active => "active",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Snapshot of one live plugin.
#[derive(Clone)]
pub struct PluginInstance {
    descriptor: Arc<PluginDescriptor>,
    plugin: Arc<dyn Plugin>,
    state: PluginState,
    failure: Option<String>,
    changed_at: DateTime<Utc>,
}

impl PluginInstance {
    #[must_use]
    pub fn new(descriptor: Arc<PluginDescriptor>, plugin: Arc<dyn Plugin>) -> Self {
        Self {
            descriptor,
            plugin,
            state: PluginState::Discovered,
            failure: None,
            changed_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    #[must_use]
    pub fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    #[must_use]
    pub fn plugin(&self) -> &Arc<dyn Plugin> {
        &self.plugin
    }

    #[must_use]
    pub fn state(&self) -> PluginState {
        self.state
    }

    /// Reason recorded when the plugin entered `Failed`.
    #[must_use]
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    #[must_use]
    pub fn changed_at(&self) -> DateTime<Utc> {
        self.changed_at
    }

    fn with_state(&self, state: PluginState, failure: Option<String>) -> Self {
        Self {
            descriptor: Arc::clone(&self.descriptor),
            plugin: Arc::clone(&self.plugin),
            state,
            failure,
            changed_at: Utc::now(),
        }
    }
}

impl fmt::Debug for PluginInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginInstance")
            .field("name", &self.descriptor.name)
            .field("version", &self.descriptor.version)
            .field("state", &self.state)
            .field("failure", &self.failure)
            .finish_non_exhaustive()
    }
}

/// Shared handle to the instance table.
///
/// Cloning is cheap; all clones see the same table. Handed to the workflow
/// engine at construction for late binding of action targets.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    instances: Arc<RwLock<BTreeMap<String, Arc<PluginInstance>>>>,
}

impl PluginRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a plugin in any state.
    pub fn lookup(&self, name: &str) -> Result<Arc<PluginInstance>, LookupError> {
        self.instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| LookupError::NotFound {
                plugin: name.to_string(),
            })
    }

    /// Look up a plugin that is ready to receive actions.
    pub fn lookup_active(&self, name: &str) -> Result<Arc<PluginInstance>, LookupError> {
        let instance = self.lookup(name)?;
        if instance.state() == PluginState::Active {
            Ok(instance)
        } else {
            Err(LookupError::NotActive {
                plugin: name.to_string(),
                state: instance.state(),
            })
        }
    }

    #[must_use]
    pub fn state(&self, name: &str) -> Option<PluginState> {
        self.lookup(name).ok().map(|i| i.state())
    }

    /// All instances in name order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<PluginInstance>> {
        self.instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert or replace an instance.
    pub(crate) fn insert(&self, instance: PluginInstance) -> Arc<PluginInstance> {
        let instance = Arc::new(instance);
        self.instances
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(instance.name().to_string(), Arc::clone(&instance));
        instance
    }

    /// Swap in the snapshot for `name` moved to `to`.
    pub(crate) fn transition(
        &self,
        name: &str,
        to: PluginState,
        failure: Option<String>,
    ) -> Result<Arc<PluginInstance>, LifecycleError> {
        let mut instances = self
            .instances
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let current = instances.get(name).ok_or_else(|| LifecycleError::NotFound {
            plugin: name.to_string(),
        })?;
        if !current.state().can_transition_to(to) {
            return Err(LifecycleError::InvalidTransition {
                plugin: name.to_string(),
                from: current.state(),
                to,
            });
        }
        let next = Arc::new(current.with_state(to, failure));
        instances.insert(name.to_string(), Arc::clone(&next));
        Ok(next)
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("instances", &self.snapshot())
            .finish()
    }
}

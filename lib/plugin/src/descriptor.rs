//! Plugin descriptors.
//!
//! A descriptor is the immutable metadata of one plugin: its unique name,
//! version, declared dependencies, load priority and default settings.
//! Descriptors come either from a built-in registration or from a
//! `plugin.json` manifest on disk; both share this serialized shape.

use crate::plugin::Plugin;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Immutable metadata describing one plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    /// Unique key.
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub description: String,
    /// Names of plugins that must load before this one.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Higher loads first among plugins with no ordering constraint.
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub default_settings: Map<String, JsonValue>,
    /// Key of the registered implementation; defaults to `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implementation: Option<String>,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

impl PluginDescriptor {
    /// Create a descriptor with no dependencies and zero priority.
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: String::new(),
            dependencies: Vec::new(),
            priority: 0,
            default_settings: Map::new(),
            implementation: None,
        }
    }

    /// Build a descriptor from a plugin's own identity methods.
    #[must_use]
    pub fn from_plugin(plugin: &dyn Plugin) -> Self {
        Self {
            name: plugin.name().to_string(),
            version: plugin.version().to_string(),
            description: plugin.description().to_string(),
            dependencies: plugin.dependencies(),
            priority: 0,
            default_settings: Map::new(),
            implementation: None,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn with_dependency(mut self, dependency: impl Into<String>) -> Self {
        self.dependencies.push(dependency.into());
        self
    }

    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn with_default_setting(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.default_settings.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn with_implementation(mut self, implementation: impl Into<String>) -> Self {
        self.implementation = Some(implementation.into());
        self
    }

    /// The implementation key this descriptor binds to.
    #[must_use]
    pub fn implementation_key(&self) -> &str {
        self.implementation.as_deref().unwrap_or(&self.name)
    }
}

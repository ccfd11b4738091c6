//! The plugin contract.
//!
//! Every plugin exposes a fixed capability interface: identity, the three
//! lifecycle hooks and an optional action sink. The lifecycle manager owns
//! the hook calls; the workflow engine only ever calls `perform` on plugins
//! it finds active in the registry.

use crate::error::PluginError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;

/// Effective settings handed to `initialize`.
///
/// Built from the descriptor's default settings merged with the persisted
/// overrides for that plugin.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PluginConfig {
    settings: Map<String, JsonValue>,
}

impl PluginConfig {
    #[must_use]
    pub fn new(settings: Map<String, JsonValue>) -> Self {
        Self { settings }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.settings.get(key)
    }

    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.settings.get(key).and_then(JsonValue::as_str)
    }

    #[must_use]
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.settings.get(key).and_then(JsonValue::as_bool)
    }

    #[must_use]
    pub fn settings(&self) -> &Map<String, JsonValue> {
        &self.settings
    }
}

/// An action invocation delivered to a plugin's action sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    /// Action kind tag, e.g. `auto_merge_pr`.
    pub action: String,
    /// Parameters after placeholder substitution.
    pub parameters: BTreeMap<String, String>,
    /// Event type tag of the triggering event.
    pub event_type: String,
    /// Payload of the triggering event.
    #[serde(default)]
    pub payload: JsonValue,
}

impl ActionRequest {
    #[must_use]
    pub fn new(action: impl Into<String>, parameters: BTreeMap<String, String>) -> Self {
        Self {
            action: action.into(),
            parameters,
            event_type: String::new(),
            payload: JsonValue::Null,
        }
    }

    #[must_use]
    pub fn with_event(mut self, event_type: impl Into<String>, payload: JsonValue) -> Self {
        self.event_type = event_type.into();
        self.payload = payload;
        self
    }

    /// A non-empty parameter value.
    #[must_use]
    pub fn param(&self, key: &str) -> Option<&str> {
        self.parameters
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// A non-empty parameter value, or `InvalidParameters`.
    pub fn require(&self, key: &str) -> Result<&str, PluginError> {
        self.param(key).ok_or_else(|| PluginError::InvalidParameters {
            action: self.action.clone(),
            reason: format!("missing parameter '{key}'"),
        })
    }
}

/// What a plugin reports back for one action.
///
/// `success = false` is a handled failure (for example a merge that was
/// refused). Errors raised while performing the action are returned as
/// `Err(PluginError)` instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResponse {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
}

impl ActionResponse {
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
        }
    }

    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }

    #[must_use]
    pub fn with_data(mut self, data: JsonValue) -> Self {
        self.data = Some(data);
        self
    }
}

/// A plugin hosted by the lifecycle manager.
///
/// Hooks take `&self`; implementations keep mutable state behind their own
/// synchronization so one instance can be shared by the registry and by
/// concurrent workflow runs.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn description(&self) -> &str {
        ""
    }

    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    /// Called once, in resolved order, with the effective settings.
    async fn initialize(&self, config: &PluginConfig) -> Result<(), PluginError>;

    /// Called when the plugin moves to `Active`. Never called twice for the
    /// same load.
    async fn activate(&self) {}

    /// Called in reverse load order on unload.
    async fn cleanup(&self) -> Result<(), PluginError> {
        Ok(())
    }

    /// Action sink. Plugins that do not accept actions keep the default.
    async fn perform(&self, request: &ActionRequest) -> Result<ActionResponse, PluginError> {
        Err(PluginError::UnsupportedAction {
            action: request.action.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Silent;

    #[async_trait]
    impl Plugin for Silent {
        fn name(&self) -> &str {
            "silent"
        }

        async fn initialize(&self, _config: &PluginConfig) -> Result<(), PluginError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn default_perform_is_unsupported() {
        let request = ActionRequest::new("send_prompt", BTreeMap::new());
        let err = Silent.perform(&request).await.unwrap_err();
        assert_eq!(
            err,
            PluginError::UnsupportedAction {
                action: "send_prompt".to_string()
            }
        );
        assert_eq!(Silent.version(), "1.0.0");
    }

    #[test]
    fn empty_parameter_counts_as_missing() {
        let mut parameters = BTreeMap::new();
        parameters.insert("repo".to_string(), String::new());
        let request = ActionRequest::new("auto_merge_pr", parameters);
        assert_eq!(request.param("repo"), None);
        assert!(request.require("repo").unwrap_err().to_string().contains("repo"));
    }

    #[test]
    fn config_accessors() {
        let mut settings = Map::new();
        settings.insert("token".to_string(), json!("abc"));
        settings.insert("verbose".to_string(), json!(true));
        let config = PluginConfig::new(settings);
        assert_eq!(config.get_str("token"), Some("abc"));
        assert_eq!(config.get_bool("verbose"), Some(true));
        assert_eq!(config.get_str("verbose"), None);
    }
}

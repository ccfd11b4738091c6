//! Linear action sink.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use toolbar_plugin::{ActionRequest, ActionResponse, Plugin, PluginConfig, PluginError};
use tracing::info;

pub const NAME: &str = "linear";

/// An issue to create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssueDraft {
    pub title: String,
    pub description: String,
    pub team_id: Option<String>,
}

/// The Linear API as far as actions need it.
#[async_trait]
pub trait LinearClient: Send + Sync {
    /// Returns the identifier of the new issue.
    async fn create_issue(&self, draft: &IssueDraft) -> Result<String, String>;
}

/// Client that logs drafts and hands out local identifiers.
#[derive(Debug, Default)]
pub struct LoggingLinearClient {
    created: AtomicU64,
}

#[async_trait]
impl LinearClient for LoggingLinearClient {
    async fn create_issue(&self, draft: &IssueDraft) -> Result<String, String> {
        let n = self.created.fetch_add(1, Ordering::Relaxed) + 1;
        let identifier = format!("LOCAL-{n}");
        info!(
            identifier = %identifier,
            title = %draft.title,
            team_id = ?draft.team_id,
            "Creating Linear issue"
        );
        Ok(identifier)
    }
}

/// Sink for `create_linear_issue`.
pub struct LinearPlugin {
    client: Arc<dyn LinearClient>,
    default_team: RwLock<Option<String>>,
}

impl LinearPlugin {
    #[must_use]
    pub fn new(client: Arc<dyn LinearClient>) -> Self {
        Self {
            client,
            default_team: RwLock::new(None),
        }
    }
}

#[async_trait]
impl Plugin for LinearPlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Creates Linear issues"
    }

    async fn initialize(&self, config: &PluginConfig) -> Result<(), PluginError> {
        *self
            .default_team
            .write()
            .unwrap_or_else(PoisonError::into_inner) = config.get_str("default_team").map(str::to_string);
        Ok(())
    }

    async fn perform(&self, request: &ActionRequest) -> Result<ActionResponse, PluginError> {
        if request.action != "create_linear_issue" {
            return Err(PluginError::UnsupportedAction {
                action: request.action.clone(),
            });
        }
        let team_id = request.param("team_id").map(str::to_string).or_else(|| {
            self.default_team
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        });
        let draft = IssueDraft {
            title: request.require("title_template")?.to_string(),
            description: request
                .param("description_template")
                .unwrap_or_default()
                .to_string(),
            team_id,
        };

        let identifier = self
            .client
            .create_issue(&draft)
            .await
            .map_err(|reason| PluginError::Action { reason })?;
        Ok(ActionResponse::success(format!("created {identifier}"))
            .with_data(json!({ "identifier": identifier, "draft": draft })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;
    use std::collections::BTreeMap;

    fn create(parameters: &[(&str, &str)]) -> ActionRequest {
        let parameters: BTreeMap<String, String> = parameters
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ActionRequest::new("create_linear_issue", parameters)
    }

    #[tokio::test]
    async fn creates_issue_with_default_team() {
        let plugin = LinearPlugin::new(Arc::new(LoggingLinearClient::default()));
        let mut settings = Map::new();
        settings.insert("default_team".to_string(), "ENG".into());
        plugin.initialize(&PluginConfig::new(settings)).await.unwrap();

        let response = plugin
            .perform(&create(&[("title_template", "Follow up on #42")]))
            .await
            .unwrap();
        assert!(response.success);
        assert_eq!(response.message, "created LOCAL-1");
        let data = response.data.unwrap();
        assert_eq!(data["draft"]["team_id"], "ENG");
        assert_eq!(data["draft"]["description"], "");

        let second = plugin
            .perform(&create(&[("title_template", "x"), ("team_id", "OPS")]))
            .await
            .unwrap();
        assert_eq!(second.data.unwrap()["draft"]["team_id"], "OPS");
    }

    #[tokio::test]
    async fn title_is_required() {
        let plugin = LinearPlugin::new(Arc::new(LoggingLinearClient::default()));
        let err = plugin.perform(&create(&[])).await.unwrap_err();
        assert!(err.to_string().contains("title_template"));
    }
}

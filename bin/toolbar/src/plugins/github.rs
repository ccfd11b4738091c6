//! GitHub action sink.

use async_trait::async_trait;
use serde_json::json;
use std::sync::{Arc, PoisonError, RwLock};
use toolbar_plugin::{ActionRequest, ActionResponse, Plugin, PluginConfig, PluginError};
use tracing::info;

pub const NAME: &str = "github";

const DEFAULT_MERGE_METHOD: &str = "squash";

/// A merge the client performed or refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub merged: bool,
    pub message: String,
}

/// The GitHub API as far as actions need it.
#[async_trait]
pub trait GithubClient: Send + Sync {
    async fn merge_pull_request(
        &self,
        repo: &str,
        number: u64,
        method: &str,
    ) -> Result<MergeOutcome, String>;
}

/// Client that only logs what it would do.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingGithubClient;

#[async_trait]
impl GithubClient for LoggingGithubClient {
    async fn merge_pull_request(
        &self,
        repo: &str,
        number: u64,
        method: &str,
    ) -> Result<MergeOutcome, String> {
        info!(repo = %repo, pr_number = number, method = %method, "Merging pull request");
        Ok(MergeOutcome {
            merged: true,
            message: format!("merged {repo}#{number} ({method})"),
        })
    }
}

/// Sink for `auto_merge_pr`.
pub struct GithubPlugin {
    client: Arc<dyn GithubClient>,
    merge_method: RwLock<String>,
}

impl GithubPlugin {
    #[must_use]
    pub fn new(client: Arc<dyn GithubClient>) -> Self {
        Self {
            client,
            merge_method: RwLock::new(DEFAULT_MERGE_METHOD.to_string()),
        }
    }
}

#[async_trait]
impl Plugin for GithubPlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Merges pull requests"
    }

    async fn initialize(&self, config: &PluginConfig) -> Result<(), PluginError> {
        if let Some(method) = config.get_str("merge_method") {
            if !matches!(method, "merge" | "squash" | "rebase") {
                return Err(PluginError::Initialization {
                    reason: format!("unknown merge method '{method}'"),
                });
            }
            *self
                .merge_method
                .write()
                .unwrap_or_else(PoisonError::into_inner) = method.to_string();
        }
        Ok(())
    }

    async fn perform(&self, request: &ActionRequest) -> Result<ActionResponse, PluginError> {
        if request.action != "auto_merge_pr" {
            return Err(PluginError::UnsupportedAction {
                action: request.action.clone(),
            });
        }
        let repo = request.require("repo")?;
        let number = request
            .require("pr_number")?
            .parse::<u64>()
            .map_err(|e| PluginError::InvalidParameters {
                action: request.action.clone(),
                reason: format!("pr_number: {e}"),
            })?;
        let method = request.param("merge_method").map_or_else(
            || {
                self.merge_method
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone()
            },
            str::to_string,
        );

        let outcome = self
            .client
            .merge_pull_request(repo, number, &method)
            .await
            .map_err(|reason| PluginError::Action { reason })?;
        let response = if outcome.merged {
            ActionResponse::success(outcome.message)
        } else {
            ActionResponse::failure(outcome.message)
        };
        Ok(response.with_data(json!({ "repo": repo, "pr_number": number, "merge_method": method })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Refusing {
        calls: Mutex<Vec<(String, u64, String)>>,
    }

    #[async_trait]
    impl GithubClient for Refusing {
        async fn merge_pull_request(
            &self,
            repo: &str,
            number: u64,
            method: &str,
        ) -> Result<MergeOutcome, String> {
            self.calls
                .lock()
                .unwrap()
                .push((repo.to_string(), number, method.to_string()));
            Ok(MergeOutcome {
                merged: false,
                message: "required checks pending".to_string(),
            })
        }
    }

    fn merge(parameters: &[(&str, &str)]) -> ActionRequest {
        let parameters: BTreeMap<String, String> = parameters
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ActionRequest::new("auto_merge_pr", parameters)
    }

    #[tokio::test]
    async fn merges_with_configured_method() {
        let plugin = GithubPlugin::new(Arc::new(LoggingGithubClient));
        let mut settings = Map::new();
        settings.insert("merge_method".to_string(), "rebase".into());
        plugin.initialize(&PluginConfig::new(settings)).await.unwrap();

        let response = plugin
            .perform(&merge(&[("repo", "acme/site"), ("pr_number", "42")]))
            .await
            .unwrap();
        assert!(response.success);
        assert_eq!(response.message, "merged acme/site#42 (rebase)");
    }

    #[tokio::test]
    async fn refused_merge_is_failure() {
        let client = Arc::new(Refusing::default());
        let plugin = GithubPlugin::new(client.clone() as Arc<dyn GithubClient>);
        let response = plugin
            .perform(&merge(&[
                ("repo", "acme/site"),
                ("pr_number", "7"),
                ("merge_method", "merge"),
            ]))
            .await
            .unwrap();
        assert!(!response.success);
        assert_eq!(
            client.calls.lock().unwrap().as_slice(),
            &[("acme/site".to_string(), 7, "merge".to_string())]
        );
    }

    #[tokio::test]
    async fn bad_parameters() {
        let plugin = GithubPlugin::new(Arc::new(LoggingGithubClient));
        let err = plugin
            .perform(&merge(&[("repo", "acme/site"), ("pr_number", "x")]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("pr_number"));

        let mut settings = Map::new();
        settings.insert("merge_method".to_string(), "octopus".into());
        assert!(plugin.initialize(&PluginConfig::new(settings)).await.is_err());
    }
}

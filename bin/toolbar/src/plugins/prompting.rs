//! Delivers rendered prompts.

use async_trait::async_trait;
use serde_json::json;
use std::sync::{PoisonError, RwLock};
use toolbar_plugin::{ActionRequest, ActionResponse, Plugin, PluginConfig, PluginError};
use tracing::info;

pub const NAME: &str = "prompting";

/// Where prompts go when the action names no `target`.
const DEFAULT_TARGET: &str = "log";

/// Sink for `send_prompt`.
///
/// Targets: `log` writes the prompt to the log, `stdout` prints it.
#[derive(Debug)]
pub struct PromptingPlugin {
    default_target: RwLock<String>,
}

impl PromptingPlugin {
    #[must_use]
    pub fn new() -> Self {
        Self {
            default_target: RwLock::new(DEFAULT_TARGET.to_string()),
        }
    }

    fn default_target(&self) -> String {
        self.default_target
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for PromptingPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for PromptingPlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Sends rendered prompts to the log or standard output"
    }

    async fn initialize(&self, config: &PluginConfig) -> Result<(), PluginError> {
        if let Some(target) = config.get_str("default_target") {
            *self
                .default_target
                .write()
                .unwrap_or_else(PoisonError::into_inner) = target.to_string();
        }
        Ok(())
    }

    async fn perform(&self, request: &ActionRequest) -> Result<ActionResponse, PluginError> {
        if request.action != "send_prompt" {
            return Err(PluginError::UnsupportedAction {
                action: request.action.clone(),
            });
        }
        let prompt = request.require("prompt_template")?;
        let target = request
            .param("target")
            .map_or_else(|| self.default_target(), str::to_string);

        match target.as_str() {
            "log" => info!(event_type = %request.event_type, prompt = %prompt, "Prompt"),
            "stdout" => println!("{prompt}"),
            other => return Ok(ActionResponse::failure(format!("unknown prompt target: {other}"))),
        }
        Ok(ActionResponse::success(format!("prompt sent to {target}"))
            .with_data(json!({ "prompt": prompt, "target": target })))
    }
}

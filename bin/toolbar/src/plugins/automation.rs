//! Runs configured scripts.

use crate::config::ScriptConfig;
use async_trait::async_trait;
use serde_json::json;
use std::collections::BTreeMap;
use std::process::Stdio;
use tokio::process::Command;
use toolbar_plugin::{ActionRequest, ActionResponse, Plugin, PluginConfig, PluginError};
use tracing::{debug, info};

pub const NAME: &str = "automation";

/// Parameters with this prefix are exported to the script.
const PARAM_PREFIX: &str = "param_";

/// Trailing bytes of stderr kept in a failure message.
const STDERR_TAIL: usize = 512;

/// Sink for `run_script`.
///
/// Only scripts listed in configuration can run. Each `param_<name>`
/// parameter becomes the environment variable `TOOLBAR_PARAM_<NAME>`; the
/// event type and payload are exported as `TOOLBAR_EVENT_TYPE` and
/// `TOOLBAR_EVENT_PAYLOAD`.
#[derive(Debug, Clone)]
pub struct AutomationPlugin {
    scripts: BTreeMap<String, ScriptConfig>,
}

impl AutomationPlugin {
    #[must_use]
    pub fn new(scripts: BTreeMap<String, ScriptConfig>) -> Self {
        Self { scripts }
    }

    fn command(&self, script: &ScriptConfig, request: &ActionRequest) -> Command {
        let mut command = Command::new(&script.command);
        command
            .args(&script.args)
            .env("TOOLBAR_EVENT_TYPE", &request.event_type)
            .env("TOOLBAR_EVENT_PAYLOAD", request.payload.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (name, value) in &request.parameters {
            if let Some(name) = name.strip_prefix(PARAM_PREFIX) {
                command.env(format!("TOOLBAR_PARAM_{}", name.to_uppercase()), value);
            }
        }
        if let Some(dir) = &script.working_dir {
            command.current_dir(dir);
        }
        command
    }
}

#[async_trait]
impl Plugin for AutomationPlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Runs configured scripts with event parameters in the environment"
    }

    async fn initialize(&self, _config: &PluginConfig) -> Result<(), PluginError> {
        debug!(scripts = self.scripts.len(), "Automation scripts configured");
        Ok(())
    }

    async fn perform(&self, request: &ActionRequest) -> Result<ActionResponse, PluginError> {
        if request.action != "run_script" {
            return Err(PluginError::UnsupportedAction {
                action: request.action.clone(),
            });
        }
        let script_id = request.require("script_id")?;
        let script = self
            .scripts
            .get(script_id)
            .ok_or_else(|| PluginError::InvalidParameters {
                action: request.action.clone(),
                reason: format!("unknown script '{script_id}'"),
            })?;

        info!(script = %script_id, command = %script.command, "Running script");
        // Dropping the future on timeout kills the child.
        let output = self
            .command(script, request)
            .output()
            .await
            .map_err(|e| PluginError::Action {
                reason: format!("cannot start script '{script_id}': {e}"),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if output.status.success() {
            return Ok(ActionResponse::success(format!("script '{script_id}' finished"))
                .with_data(json!({ "script_id": script_id, "stdout": stdout })));
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim();
        let tail_start = stderr
            .char_indices()
            .map(|(i, _)| i)
            .find(|i| stderr.len() - i <= STDERR_TAIL)
            .unwrap_or(stderr.len());
        Ok(ActionResponse::failure(format!(
            "script '{script_id}' exited with {}: {}",
            output.status,
            &stderr[tail_start..]
        ))
        .with_data(json!({ "script_id": script_id, "stdout": stdout })))
    }
}

//! Command implementations behind the CLI.

use crate::app::{self, App};
use crate::config::AppConfig;
use crate::error::AppError;
use crate::ingest::{IngestStats, ingest_lines};
use std::path::Path;
use std::sync::Arc;
use tokio::io::BufReader;
use toolbar_plugin::{PartialResolution, PluginDescriptor, resolve_partial};
use toolbar_workflow::store::WORKFLOWS_KEY;
use toolbar_workflow::{
    Event, KeyValueStore, LoadOutcome, MemoryKeyValueStore, RunReport, WorkflowStore,
};
use tracing::{info, warn};

/// Runs the daemon, reading notifications from stdin until end of input
/// or Ctrl-C.
///
/// # Errors
///
/// Startup failures from [`App::start`].
pub async fn run(config: &AppConfig) -> toolbar_core::Result<IngestStats, AppError> {
    let app = App::start(config).await?;
    info!(sources = ?app.ingestor().sources().collect::<Vec<_>>(), "Reading notifications from stdin");

    let stdin = BufReader::new(tokio::io::stdin());
    let stats = tokio::select! {
        stats = ingest_lines(stdin, app.ingestor()) => stats,
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!(error = %e, "Signal handler failed");
            }
            info!("Interrupted");
            IngestStats::default()
        }
    };
    app.shutdown().await;
    Ok(stats)
}

/// Checks a workflow document without touching the configured store.
///
/// # Errors
///
/// `Input` when the file is unreadable, `Workflows` when the document is
/// not a workflow document.
pub async fn validate(path: &Path) -> toolbar_core::Result<LoadOutcome, AppError> {
    let document = read_json(path).await?;
    let backend = Arc::new(MemoryKeyValueStore::new());
    backend.insert(WORKFLOWS_KEY, document).await;
    let store = WorkflowStore::new(backend as Arc<dyn KeyValueStore>);
    let outcome = store.load().await.map_err(|e| AppError::Workflows {
        reason: e.to_string(),
    })?;
    Ok(outcome)
}

/// What plugin discovery finds with the current configuration.
#[derive(Debug)]
pub struct PluginListing {
    pub descriptors: Vec<PluginDescriptor>,
    pub disabled: Vec<String>,
    pub problems: Vec<String>,
    pub resolution: PartialResolution,
}

#[must_use]
pub fn plugins(config: &AppConfig) -> PluginListing {
    let discovery = app::discover(config);
    let descriptors: Vec<PluginDescriptor> = discovery
        .candidates
        .iter()
        .map(|c| c.descriptor().as_ref().clone())
        .collect();
    let resolution = resolve_partial(&descriptors);
    PluginListing {
        descriptors,
        disabled: discovery.disabled,
        problems: discovery.errors.iter().map(ToString::to_string).collect(),
        resolution,
    }
}

/// Runs one event from a file through the stored workflows, inline.
///
/// # Errors
///
/// `Input` for an unreadable event file, otherwise startup failures.
pub async fn simulate(
    config: &AppConfig,
    event_path: &Path,
) -> toolbar_core::Result<Vec<RunReport>, AppError> {
    let event: Event =
        serde_json::from_value(read_json(event_path).await?).map_err(|e| AppError::Input {
            path: event_path.to_path_buf(),
            reason: e.to_string(),
        })?;
    let app = App::start(config).await?;
    let reports = app.dispatcher().run_now(&event).await;
    app.shutdown().await;
    Ok(reports)
}

async fn read_json(path: &Path) -> Result<serde_json::Value, AppError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| AppError::Input {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    serde_json::from_str(&text).map_err(|e| AppError::Input {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

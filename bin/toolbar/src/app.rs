//! Daemon wiring: plugins, workflow store, dispatcher and ingestion.

use crate::config::AppConfig;
use crate::error::AppError;
use crate::plugins::builtin_catalog;
use std::sync::Arc;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use toolbar_integration::{Deduplicator, GithubAdapter, Ingestor, LinearAdapter};
use toolbar_plugin::{Discovery, LifecycleManager, LoadReport};
use toolbar_workflow::{
    DispatchHistory, Dispatcher, Engine, EventSink, InMemoryHistory, JsonFileStore, KeyValueStore,
    LoadOutcome, RunPhase, RunReport, WorkflowStore,
};
use tracing::{info, warn};

/// Dispatch records kept in memory.
const HISTORY_CAPACITY: usize = 1000;

/// A running daemon.
pub struct App {
    manager: LifecycleManager,
    store: Arc<WorkflowStore>,
    dispatcher: Arc<Dispatcher>,
    history: Arc<InMemoryHistory>,
    ingestor: Ingestor,
    report_logger: JoinHandle<()>,
    stop_logger: oneshot::Sender<()>,
}

impl App {
    /// Loads plugins and workflows and starts the dispatcher.
    ///
    /// # Errors
    ///
    /// `Plugins` when loading is refused, `Workflows` when the workflow
    /// document cannot be read.
    pub async fn start(config: &AppConfig) -> toolbar_core::Result<Self, AppError> {
        let manager = start_plugins(config).await?;
        let store = open_store(config).await?;

        let history = Arc::new(InMemoryHistory::with_capacity(HISTORY_CAPACITY));
        let engine = Engine::new(manager.registry(), history.clone() as Arc<dyn DispatchHistory>)
            .with_action_timeout(config.dispatcher.action_timeout());
        let dispatcher = Arc::new(Dispatcher::start(
            engine,
            Arc::clone(&store),
            config.dispatcher.dispatcher(),
        ));
        let (stop_logger, stop) = oneshot::channel();
        let report_logger = tokio::spawn(log_reports(dispatcher.subscribe(), stop));

        let ingestor = Ingestor::new(
            Arc::clone(&dispatcher) as Arc<dyn EventSink>,
            Deduplicator::new(config.dedup_window_secs),
        )
        .with_adapter(Arc::new(GithubAdapter))
        .with_adapter(Arc::new(LinearAdapter));

        Ok(Self {
            manager,
            store,
            dispatcher,
            history,
            ingestor,
            report_logger,
            stop_logger,
        })
    }

    #[must_use]
    pub fn ingestor(&self) -> &Ingestor {
        &self.ingestor
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    #[must_use]
    pub fn store(&self) -> &Arc<WorkflowStore> {
        &self.store
    }

    #[must_use]
    pub fn history(&self) -> &Arc<InMemoryHistory> {
        &self.history
    }

    /// Drains the dispatcher, then unloads plugins in reverse order.
    pub async fn shutdown(self) {
        self.dispatcher.shutdown().await;
        let unload = self.manager.unload().await;
        for failure in &unload.cleanup_errors {
            warn!(plugin = %failure.plugin, reason = %failure.reason, "Plugin cleanup failed");
        }
        // The logger drains what is still buffered before it returns.
        let _ = self.stop_logger.send(());
        if let Err(e) = self.report_logger.await {
            warn!(error = %e, "Run report logger ended abnormally");
        }
        info!(stopped = unload.stopped.len(), "Shut down");
    }
}

/// Discovers, loads and activates plugins.
///
/// # Errors
///
/// `Plugins` when resolution refuses to load anything.
pub async fn start_plugins(config: &AppConfig) -> toolbar_core::Result<LifecycleManager, AppError> {
    let discovery = discover(config);
    let manager = LifecycleManager::new(discovery.candidates)
        .with_overrides(config.plugins.settings.clone())
        .with_policy(config.plugins.resolution);

    let report = manager.load().await.map_err(|e| AppError::Plugins {
        reason: e.to_string(),
    })?;
    log_load_report(&report);
    for failure in manager.activate_all().await {
        warn!(plugin = %failure.plugin, reason = %failure.reason, "Plugin not activated");
    }
    Ok(manager)
}

/// Candidates from built-ins and the configured manifest directories.
#[must_use]
pub fn discover(config: &AppConfig) -> Discovery {
    let discovery =
        builtin_catalog(config).discover(&config.plugins.dirs, &config.plugins.disabled);
    for error in &discovery.errors {
        warn!(error = %error, "Plugin discovery problem");
    }
    discovery
}

/// Opens and loads the workflow store under the configured directory.
///
/// # Errors
///
/// `Workflows` when the document cannot be read.
pub async fn open_store(config: &AppConfig) -> toolbar_core::Result<Arc<WorkflowStore>, AppError> {
    let backend = Arc::new(JsonFileStore::new(&config.workflows.path)) as Arc<dyn KeyValueStore>;
    let store = Arc::new(WorkflowStore::new(backend));
    let outcome = store.load().await.map_err(|e| AppError::Workflows {
        reason: e.to_string(),
    })?;
    log_load_outcome(&outcome);
    Ok(store)
}

fn log_load_report(report: &LoadReport) {
    for excluded in &report.excluded {
        warn!(plugin = %excluded.plugin, reason = %excluded.reason, "Plugin excluded");
    }
    for failed in &report.failed {
        warn!(plugin = %failed.plugin, reason = %failed.reason, "Plugin failed to load");
    }
    info!(order = ?report.order, initialized = report.initialized.len(), "Plugins loaded");
}

fn log_load_outcome(outcome: &LoadOutcome) {
    for skipped in &outcome.skipped {
        warn!(
            index = skipped.index,
            workflow = ?skipped.name,
            reason = %skipped.reason,
            "Workflow definition skipped"
        );
    }
}

async fn log_reports(mut reports: broadcast::Receiver<RunReport>, mut stop: oneshot::Receiver<()>) {
    loop {
        tokio::select! {
            biased;
            received = reports.recv() => match received {
                Ok(report) => log_report(&report),
                Err(RecvError::Lagged(missed)) => warn!(missed, "Run report log lagged"),
                Err(RecvError::Closed) => return,
            },
            _ = &mut stop => break,
        }
    }
    drain_reports(&mut reports);
}

/// Logs every report still buffered, without waiting for more.
fn drain_reports(reports: &mut broadcast::Receiver<RunReport>) -> usize {
    let mut logged = 0;
    loop {
        match reports.try_recv() {
            Ok(report) => {
                log_report(&report);
                logged += 1;
            }
            Err(TryRecvError::Lagged(missed)) => warn!(missed, "Run report log lagged"),
            Err(TryRecvError::Empty | TryRecvError::Closed) => return logged,
        }
    }
}

fn log_report(report: &RunReport) {
    if !report.matched {
        return;
    }
    match report.phase {
        RunPhase::Aborted => warn!(
            run_id = %report.run_id,
            workflow = %report.workflow_name,
            reason = ?report.abort_reason,
            "Workflow run aborted"
        ),
        _ => info!(
            run_id = %report.run_id,
            workflow = %report.workflow_name,
            dispatches = report.dispatches.len(),
            "Workflow run completed"
        ),
    }
}

//! Process-wide event dispatcher.
//!
//! `publish` enqueues an event on a bounded channel. A scheduler task picks
//! events up in arrival order and starts one run per enabled workflow whose
//! trigger type matches. The scheduler takes a slot from a fair semaphore
//! before starting each run, so at most `max_concurrent_runs` execute at
//! once and further events stay in the channel; `publish` waits once the
//! channel is full. Runs of the same workflow are chained: the scheduler
//! waits for the previous run to finish before taking a slot for the next,
//! which keeps per-workflow processing in arrival order.

use crate::engine::Engine;
use crate::error::DispatchError;
use crate::event::Event;
use crate::execution::RunReport;
use crate::store::WorkflowStore;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError};
use tokio::sync::{Semaphore, broadcast, mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use toolbar_core::WorkflowId;
use tracing::{debug, error, info, warn};

/// Buffered run reports per subscriber before the slowest one lags.
const REPORT_BUFFER: usize = 256;

/// Dispatcher limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Runs executing at once across all workflows.
    pub max_concurrent_runs: usize,
    /// Events accepted before `publish` waits.
    pub queue_capacity: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_concurrent_runs: 4,
            queue_capacity: 256,
        }
    }
}

/// Anything that accepts normalized events.
///
/// Notification adapters emit into this.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: Event) -> Result<(), DispatchError>;
}

/// Routes events to matching workflows.
pub struct Dispatcher {
    engine: Engine,
    store: Arc<WorkflowStore>,
    sender: std::sync::Mutex<Option<mpsc::Sender<Event>>>,
    reports: broadcast::Sender<RunReport>,
    scheduler: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Dispatcher {
    /// Starts the scheduler task. Must be called inside a tokio runtime.
    pub fn start(engine: Engine, store: Arc<WorkflowStore>, config: DispatcherConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let (reports, _) = broadcast::channel(REPORT_BUFFER);
        let scheduler = Scheduler {
            engine: engine.clone(),
            store: Arc::clone(&store),
            reports: reports.clone(),
            permits: Arc::new(Semaphore::new(config.max_concurrent_runs.max(1))),
            tails: HashMap::new(),
            runs: JoinSet::new(),
        };
        let handle = tokio::spawn(scheduler.run(receiver));
        info!(
            max_concurrent_runs = config.max_concurrent_runs,
            queue_capacity = config.queue_capacity,
            "Event dispatcher started"
        );
        Self {
            engine,
            store,
            sender: std::sync::Mutex::new(Some(sender)),
            reports,
            scheduler: tokio::sync::Mutex::new(Some(handle)),
        }
    }

    /// Queues an event for routing.
    ///
    /// # Errors
    ///
    /// `Closed` after [`shutdown`](Self::shutdown).
    pub async fn publish(&self, event: Event) -> Result<(), DispatchError> {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(DispatchError::Closed)?;
        debug!(event_id = %event.id, event_type = %event.event_type, "Event published");
        sender.send(event).await.map_err(|_| DispatchError::Closed)
    }

    /// Receives a report for every finished run.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RunReport> {
        self.reports.subscribe()
    }

    /// Runs the matching workflows for `event` inline, one after another,
    /// bypassing the queue.
    pub async fn run_now(&self, event: &Event) -> Vec<RunReport> {
        let mut reports = Vec::new();
        for workflow in self.store.enabled_for(event.event_type).await {
            reports.push(self.engine.run(&workflow, event).await);
        }
        reports
    }

    /// Stops accepting events and waits for queued and running work.
    pub async fn shutdown(&self) {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let handle = self.scheduler.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "Dispatcher scheduler ended abnormally");
            }
        }
        info!("Event dispatcher stopped");
    }
}

#[async_trait]
impl EventSink for Dispatcher {
    async fn emit(&self, event: Event) -> Result<(), DispatchError> {
        self.publish(event).await
    }
}

struct Scheduler {
    engine: Engine,
    store: Arc<WorkflowStore>,
    reports: broadcast::Sender<RunReport>,
    permits: Arc<Semaphore>,
    /// Completion signal of the most recently scheduled run per workflow.
    tails: HashMap<WorkflowId, oneshot::Receiver<()>>,
    runs: JoinSet<()>,
}

impl Scheduler {
    async fn run(mut self, mut receiver: mpsc::Receiver<Event>) {
        while let Some(event) = receiver.recv().await {
            self.reap();
            self.schedule(Arc::new(event)).await;
        }
        while let Some(result) = self.runs.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "Workflow run task failed");
            }
        }
    }

    async fn schedule(&mut self, event: Arc<Event>) {
        let workflows = self.store.enabled_for(event.event_type).await;
        if workflows.is_empty() {
            debug!(event_id = %event.id, event_type = %event.event_type, "No workflow listens to event");
            return;
        }
        debug!(event_id = %event.id, workflows = workflows.len(), "Scheduling workflow runs");

        for workflow in workflows {
            // A run waiting on its predecessor must not hold a pool slot.
            if let Some(previous) = self.tails.remove(&workflow.id) {
                // Resolves with an error too if the previous run panicked.
                let _ = previous.await;
            }
            let Ok(permit) = Arc::clone(&self.permits).acquire_owned().await else {
                warn!(workflow_id = %workflow.id, "Run pool closed, dropping run");
                return;
            };
            let (done, tail) = oneshot::channel();
            self.tails.insert(workflow.id, tail);
            let engine = self.engine.clone();
            let reports = self.reports.clone();
            let event = Arc::clone(&event);

            self.runs.spawn(async move {
                let report = engine.run(&workflow, &event).await;
                drop(permit);
                // No subscribers is fine.
                let _ = reports.send(report);
                let _ = done.send(());
            });
        }
    }

    /// Drops finished tasks and the chain links of finished runs.
    fn reap(&mut self) {
        while let Some(result) = self.runs.try_join_next() {
            if let Err(e) = result {
                error!(error = %e, "Workflow run task failed");
            }
        }
        self.tails
            .retain(|_, tail| matches!(tail.try_recv(), Err(oneshot::error::TryRecvError::Empty)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ActionKind, EventType};
    use crate::definition::Workflow;
    use crate::edge::Edge;
    use crate::history::{DispatchHistory, InMemoryHistory};
    use crate::node::{ActionSpec, Node, TriggerSpec};
    use crate::store::{KeyValueStore, MemoryKeyValueStore};
    use serde_json::json;
    use std::time::Duration;
    use toolbar_plugin::{
        LifecycleManager, MockPlugin, MockResponse, Plugin, PluginCandidate, PluginConstructor,
        PluginDescriptor, PluginRegistry,
    };

    fn prompt_workflow(name: &str, priority: i32) -> Workflow {
        let mut workflow = Workflow::new(name, TriggerSpec::new(EventType::LinearIssueCreated))
            .with_priority(priority);
        let prompt = workflow.add_node(Node::action(
            "prompt",
            ActionSpec::new(ActionKind::SendPrompt).with_parameter("prompt_template", "{issue.title}"),
        ));
        workflow.connect(workflow.root(), prompt, Edge::Unconditional).unwrap();
        workflow
    }

    async fn dispatcher(workflows: Vec<Workflow>, config: DispatcherConfig) -> (Dispatcher, Arc<InMemoryHistory>) {
        // Empty registry: every dispatch ends in "target unavailable".
        dispatcher_with(PluginRegistry::new(), workflows, config).await
    }

    async fn dispatcher_with(
        registry: PluginRegistry,
        workflows: Vec<Workflow>,
        config: DispatcherConfig,
    ) -> (Dispatcher, Arc<InMemoryHistory>) {
        let store = Arc::new(WorkflowStore::new(
            Arc::new(MemoryKeyValueStore::new()) as Arc<dyn KeyValueStore>
        ));
        for workflow in workflows {
            store.save(workflow).await.unwrap();
        }
        let history = Arc::new(InMemoryHistory::new());
        let engine = Engine::new(registry, history.clone() as Arc<dyn DispatchHistory>);
        (Dispatcher::start(engine, store, config), history)
    }

    /// A loaded and active `prompting` plugin that answers after `delay`.
    async fn slow_prompting(delay: Duration) -> (LifecycleManager, Arc<MockPlugin>) {
        let prompting = Arc::new(MockPlugin::new("prompting").responding(MockResponse::Delay(delay)));
        let plugin = Arc::clone(&prompting);
        let constructor: PluginConstructor = Arc::new(move || Arc::clone(&plugin) as Arc<dyn Plugin>);
        let manager = LifecycleManager::new([PluginCandidate::new(
            PluginDescriptor::from_plugin(prompting.as_ref()),
            constructor,
        )]);
        manager.load().await.unwrap();
        assert!(manager.activate_all().await.is_empty());
        (manager, prompting)
    }

    fn issue(title: &str) -> Event {
        Event::new(
            EventType::LinearIssueCreated,
            json!({ "issue": { "title": title } }),
            "linear-events",
        )
    }

    #[tokio::test]
    async fn overlapping_workflows_all_run() {
        let (dispatcher, _) = dispatcher(
            vec![prompt_workflow("low", 0), prompt_workflow("high", 10)],
            DispatcherConfig::default(),
        )
        .await;

        let reports = dispatcher.run_now(&issue("Crash on save")).await;
        let names: Vec<_> = reports.iter().map(|r| r.workflow_name.as_str()).collect();
        assert_eq!(names, vec!["high", "low"]);
        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn unmatched_event_dispatches_nothing() {
        let (dispatcher, history) =
            dispatcher(vec![prompt_workflow("issues", 0)], DispatcherConfig::default()).await;
        dispatcher
            .publish(Event::new(EventType::GithubPrCreated, json!({}), "github-events"))
            .await
            .unwrap();
        dispatcher.shutdown().await;
        assert!(history.is_empty().await);
    }

    #[tokio::test]
    async fn same_workflow_processes_in_arrival_order() {
        let (dispatcher, history) = dispatcher(
            vec![prompt_workflow("issues", 0)],
            DispatcherConfig {
                max_concurrent_runs: 8,
                queue_capacity: 16,
            },
        )
        .await;
        let mut reports = dispatcher.subscribe();

        for n in 0..5 {
            dispatcher.publish(issue(&format!("issue {n}"))).await.unwrap();
        }
        dispatcher.shutdown().await;

        let prompts: Vec<_> = history
            .records()
            .await
            .into_iter()
            .map(|r| r.parameters["prompt_template"].clone())
            .collect();
        let expected: Vec<_> = (0..5).map(|n| format!("issue {n}")).collect();
        assert_eq!(prompts, expected);

        let first = tokio::time::timeout(Duration::from_secs(1), reports.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.workflow_name, "issues");
        assert!(first.matched);
    }

    #[tokio::test]
    async fn concurrent_runs_stay_within_the_cap() {
        let (manager, prompting) = slow_prompting(Duration::from_millis(100)).await;
        let workflows = vec![
            prompt_workflow("first", 0),
            prompt_workflow("second", 0),
            prompt_workflow("third", 0),
        ];
        let (dispatcher, history) = dispatcher_with(
            manager.registry(),
            workflows,
            DispatcherConfig {
                max_concurrent_runs: 2,
                queue_capacity: 8,
            },
        )
        .await;

        for n in 0..3 {
            dispatcher.publish(issue(&format!("issue {n}"))).await.unwrap();
        }
        dispatcher.shutdown().await;

        assert_eq!(history.records().await.len(), 9);
        assert_eq!(prompting.peak_in_flight(), 2);
    }

    #[tokio::test]
    async fn publish_waits_once_the_queue_is_full() {
        let (manager, prompting) = slow_prompting(Duration::from_millis(300)).await;
        let (dispatcher, history) = dispatcher_with(
            manager.registry(),
            vec![prompt_workflow("issues", 0)],
            DispatcherConfig {
                max_concurrent_runs: 1,
                queue_capacity: 1,
            },
        )
        .await;

        // One running, one waiting for its predecessor, one in the channel.
        for n in 0..3 {
            dispatcher.publish(issue(&format!("issue {n}"))).await.unwrap();
        }
        let blocked =
            tokio::time::timeout(Duration::from_millis(100), dispatcher.publish(issue("overflow"))).await;
        assert!(blocked.is_err());

        dispatcher.shutdown().await;
        assert_eq!(history.records().await.len(), 3);
        assert_eq!(prompting.peak_in_flight(), 1);
    }

    #[tokio::test]
    async fn publish_after_shutdown_is_rejected() {
        let (dispatcher, _) = dispatcher(Vec::new(), DispatcherConfig::default()).await;
        dispatcher.shutdown().await;
        let err = dispatcher.publish(issue("late")).await.unwrap_err();
        assert_eq!(err, DispatchError::Closed);
    }
}

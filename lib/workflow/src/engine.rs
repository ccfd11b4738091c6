//! Workflow graph engine.
//!
//! Runs one workflow against one event:
//! 1. Checks the trigger's event type and conditions
//! 2. Walks the graph depth-first from the trigger's successors
//! 3. Condition nodes follow their on-true or on-false edge
//! 4. Action nodes render their parameters, dispatch to the target plugin
//!    found in the registry, then follow their outgoing edge
//!
//! Runs share nothing but the registry and the history. The engine never
//! mutates the workflow it runs.

use crate::catalog::ActionKind;
use crate::condition;
use crate::definition::Workflow;
use crate::edge::Edge;
use crate::error::ActionDispatchError;
use crate::event::Event;
use crate::execution::{ActionOutcome, DispatchRecord, RunReport};
use crate::history::DispatchHistory;
use crate::node::{ActionSpec, Node, NodeId, NodeKind};
use crate::template::render;
use chrono::Utc;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use toolbar_core::{DispatchId, WorkflowRunId};
use toolbar_plugin::{ActionRequest, ActionResponse, PluginRegistry};
use tracing::{debug, info, instrument, warn};

/// Default bound on a single plugin call.
pub const DEFAULT_ACTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Executes workflow runs.
#[derive(Clone)]
pub struct Engine {
    registry: PluginRegistry,
    history: Arc<dyn DispatchHistory>,
    action_timeout: Duration,
}

impl Engine {
    /// Creates an engine that resolves targets in `registry`.
    pub fn new(registry: PluginRegistry, history: Arc<dyn DispatchHistory>) -> Self {
        Self {
            registry,
            history,
            action_timeout: DEFAULT_ACTION_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_action_timeout(mut self, timeout: Duration) -> Self {
        self.action_timeout = timeout;
        self
    }

    #[must_use]
    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    #[must_use]
    pub fn history(&self) -> &Arc<dyn DispatchHistory> {
        &self.history
    }

    /// Runs `workflow` for `event` to completion.
    ///
    /// Never fails: a trigger that does not match ends the run with
    /// `matched = false`, and dispatch problems are recorded as outcomes.
    #[instrument(skip(self, workflow, event), fields(workflow_id = %workflow.id, event_id = %event.id))]
    pub async fn run(&self, workflow: &Workflow, event: &Event) -> RunReport {
        let mut report = RunReport::new(workflow.id, workflow.name(), event.id, event.event_type);
        report.evaluating();

        if !self.trigger_matches(workflow, event, &mut report.warnings) {
            debug!(workflow = %workflow.name(), "Workflow did not match");
            report.complete();
            return report;
        }
        report.matched = true;

        let mut visited = HashSet::new();
        let mut stack = successors(workflow, workflow.root(), None);
        stack.reverse();

        while let Some(node_id) = stack.pop() {
            if !visited.insert(node_id) {
                continue;
            }
            let Some(node) = workflow.graph.get_node(node_id) else {
                continue;
            };
            report.visited.push(node_id);

            let next = match &node.kind {
                NodeKind::Trigger(_) | NodeKind::End => Vec::new(),
                NodeKind::Condition(condition) => {
                    report.evaluating();
                    let evaluation = condition::evaluate(condition, &event.payload);
                    if let Some(warning) = evaluation.warning {
                        warn!(node_id = %node.id, warning = %warning, "Condition evaluated to false");
                        report.warnings.push(format!("{}: {warning}", node.name));
                    }
                    debug!(node_id = %node.id, result = evaluation.matched, "Condition evaluated");
                    successors(workflow, node_id, Some(Edge::branch(evaluation.matched)))
                }
                NodeKind::Action(spec) => {
                    report.dispatching();
                    let record = self
                        .dispatch(workflow, report.run_id, node, spec, event, &mut report.warnings)
                        .await;
                    let outcome = record.outcome;
                    let message = record.message.clone();
                    self.history.append(record.clone()).await;
                    report.dispatches.push(record);

                    if spec.blocking && outcome != ActionOutcome::Success {
                        warn!(node_id = %node.id, outcome = %outcome, "Blocking action did not succeed, aborting run");
                        report.abort(format!(
                            "blocking action '{}' ended with {outcome}: {message}",
                            node.name
                        ));
                        return report;
                    }
                    successors(workflow, node_id, None)
                }
            };
            stack.extend(next.into_iter().rev());
        }

        report.complete();
        info!(
            workflow = %workflow.name(),
            dispatches = report.dispatches.len(),
            "Workflow run completed"
        );
        report
    }

    fn trigger_matches(&self, workflow: &Workflow, event: &Event, warnings: &mut Vec<String>) -> bool {
        let Some(trigger) = workflow.trigger() else {
            return false;
        };
        if trigger.event_type != event.event_type {
            return false;
        }
        for condition in &trigger.conditions {
            let evaluation = condition::evaluate(condition, &event.payload);
            if let Some(warning) = evaluation.warning {
                warn!(workflow_id = %workflow.id, warning = %warning, "Trigger condition evaluated to false");
                warnings.push(format!("trigger: {warning}"));
            }
            if !evaluation.matched {
                return false;
            }
        }
        true
    }

    async fn dispatch(
        &self,
        workflow: &Workflow,
        run_id: WorkflowRunId,
        node: &Node,
        spec: &ActionSpec,
        event: &Event,
        warnings: &mut Vec<String>,
    ) -> DispatchRecord {
        let mut parameters = BTreeMap::new();
        for (name, template) in &spec.parameters {
            let rendered = render(template, &event.payload);
            for path in &rendered.unresolved {
                warn!(
                    workflow_id = %workflow.id,
                    node_id = %node.id,
                    parameter = %name,
                    placeholder = %path,
                    "Unresolved placeholder replaced with empty string"
                );
                warnings.push(format!("{}: unresolved placeholder {{{path}}} in '{name}'", node.name));
            }
            parameters.insert(name.clone(), rendered.text);
        }
        spec.action.fill_from_event(&mut parameters, &event.payload);

        let target = spec.resolved_target().map(str::to_string);
        let result = match &target {
            Some(target) => self.invoke(target, spec.action, &parameters, event).await,
            None => Err(ActionDispatchError::NoTarget {
                action: spec.action.to_string(),
            }),
        };

        let (outcome, message) = match result {
            Ok(response) if response.success => (ActionOutcome::Success, response.message),
            Ok(response) => (ActionOutcome::Failure, response.message),
            Err(e) => (ActionOutcome::Error, e.to_string()),
        };
        match outcome {
            ActionOutcome::Success => {
                info!(node_id = %node.id, action = %spec.action, plugin = ?target, "Action dispatched");
            }
            _ => {
                warn!(node_id = %node.id, action = %spec.action, plugin = ?target, outcome = %outcome, message = %message, "Action did not succeed");
            }
        }

        DispatchRecord {
            id: DispatchId::new(),
            run_id,
            workflow_id: workflow.id,
            node_id: node.id,
            action: spec.action,
            target,
            parameters,
            outcome,
            message,
            timestamp: Utc::now(),
        }
    }

    async fn invoke(
        &self,
        target: &str,
        action: ActionKind,
        parameters: &BTreeMap<String, String>,
        event: &Event,
    ) -> Result<ActionResponse, ActionDispatchError> {
        let instance =
            self.registry
                .lookup_active(target)
                .map_err(|e| ActionDispatchError::TargetUnavailable {
                    target: target.to_string(),
                    reason: e.to_string(),
                })?;
        let request = ActionRequest::new(action.as_str(), parameters.clone())
            .with_event(event.event_type.as_str(), event.payload.clone());

        match tokio::time::timeout(self.action_timeout, instance.plugin().perform(&request)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(ActionDispatchError::Plugin {
                target: target.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(ActionDispatchError::Timeout {
                target: target.to_string(),
                timeout_ms: self.action_timeout.as_millis(),
            }),
        }
    }
}

/// Successor node IDs in edge order, optionally restricted to one edge kind.
fn successors(workflow: &Workflow, node_id: NodeId, kind: Option<Edge>) -> Vec<NodeId> {
    workflow
        .graph
        .outgoing(node_id)
        .into_iter()
        .filter(|(edge, _)| kind.is_none_or(|k| k == *edge))
        .map(|(_, node)| node.id)
        .collect()
}

//! Workflow run records.
//!
//! A run moves through `Triggered → Evaluating → Dispatching` and ends
//! `Completed` or `Aborted`. Every action dispatch leaves an append-only
//! [`DispatchRecord`]; the run as a whole is summarized in a [`RunReport`].

use crate::catalog::{ActionKind, EventType};
use crate::node::NodeId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use toolbar_core::{DispatchId, EventId, WorkflowId, WorkflowRunId};

/// Phase of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    /// An event of the trigger's type arrived.
    Triggered,
    /// Trigger and branch conditions are being evaluated.
    Evaluating,
    /// An action is being sent to its target plugin.
    Dispatching,
    Completed,
    /// A blocking action did not succeed; the rest of the run was skipped.
    Aborted,
}

impl RunPhase {
    /// Returns true if this is a terminal phase.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Aborted)
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Triggered => "triggered",
            Self::Evaluating => "evaluating",
            Self::Dispatching => "dispatching",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
        })
    }
}

/// Result of one action dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionOutcome {
    Success,
    /// The plugin handled the action and reported failure.
    Failure,
    /// The action never completed: no target, target unavailable, timeout or plugin error.
    Error,
}

impl fmt::Display for ActionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Error => "error",
        })
    }
}

/// Append-only record of one action dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchRecord {
    pub id: DispatchId,
    pub run_id: WorkflowRunId,
    pub workflow_id: WorkflowId,
    pub node_id: NodeId,
    pub action: ActionKind,
    /// Resolved target plugin, if one could be named.
    pub target: Option<String>,
    /// Parameters after placeholder substitution.
    pub parameters: BTreeMap<String, String>,
    pub outcome: ActionOutcome,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Summary of one workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: WorkflowRunId,
    pub workflow_id: WorkflowId,
    pub workflow_name: String,
    pub event_id: EventId,
    pub event_type: EventType,
    pub phase: RunPhase,
    /// Whether the trigger conditions held.
    pub matched: bool,
    /// Nodes visited after the trigger, in visit order.
    pub visited: Vec<NodeId>,
    pub dispatches: Vec<DispatchRecord>,
    /// Condition warnings and unresolved placeholders.
    pub warnings: Vec<String>,
    pub abort_reason: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunReport {
    /// Creates a new report in `Triggered` phase.
    #[must_use]
    pub fn new(
        workflow_id: WorkflowId,
        workflow_name: impl Into<String>,
        event_id: EventId,
        event_type: EventType,
    ) -> Self {
        Self {
            run_id: WorkflowRunId::new(),
            workflow_id,
            workflow_name: workflow_name.into(),
            event_id,
            event_type,
            phase: RunPhase::Triggered,
            matched: false,
            visited: Vec::new(),
            dispatches: Vec::new(),
            warnings: Vec::new(),
            abort_reason: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn evaluating(&mut self) {
        self.phase = RunPhase::Evaluating;
    }

    pub fn dispatching(&mut self) {
        self.phase = RunPhase::Dispatching;
    }

    /// Ends the run normally.
    pub fn complete(&mut self) {
        self.phase = RunPhase::Completed;
        self.finished_at = Some(Utc::now());
    }

    /// Ends the run after a blocking action did not succeed.
    pub fn abort(&mut self, reason: impl Into<String>) {
        self.phase = RunPhase::Aborted;
        self.abort_reason = Some(reason.into());
        self.finished_at = Some(Utc::now());
    }

    /// Dispatch records for one action kind.
    pub fn dispatches_of(&self, action: ActionKind) -> impl Iterator<Item = &DispatchRecord> {
        self.dispatches.iter().filter(move |d| d.action == action)
    }

    /// Returns the duration of the run.
    #[must_use]
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at.unwrap_or_else(Utc::now) - self.started_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> RunReport {
        RunReport::new(
            WorkflowId::new(),
            "wf",
            EventId::new(),
            EventType::GithubPrCreated,
        )
    }

    #[test]
    fn run_lifecycle() {
        let mut run = report();
        assert_eq!(run.phase, RunPhase::Triggered);
        assert!(!run.phase.is_terminal());

        run.evaluating();
        run.dispatching();
        assert_eq!(run.phase, RunPhase::Dispatching);

        run.complete();
        assert!(run.phase.is_terminal());
        assert!(run.finished_at.is_some());
        assert!(run.duration() >= chrono::Duration::zero());
    }

    #[test]
    fn abort_records_reason() {
        let mut run = report();
        run.abort("blocking action failed");
        assert_eq!(run.phase, RunPhase::Aborted);
        assert_eq!(run.abort_reason.as_deref(), Some("blocking action failed"));
    }

    #[test]
    fn outcome_serializes_snake_case() {
        assert_eq!(
            serde_json::to_value(ActionOutcome::Error).unwrap(),
            serde_json::json!("error")
        );
        assert_eq!(RunPhase::Aborted.to_string(), "aborted");
    }
}

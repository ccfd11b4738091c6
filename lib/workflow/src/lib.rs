//! Event automation engine for toolbar.
//!
//! This crate provides:
//!
//! - **Catalog**: event types with payload schemas, action kinds with
//!   default targets and required parameters
//! - **Conditions**: a closed operator set evaluated against event payloads
//! - **Graph Model**: trigger, condition, action and end nodes in a petgraph
//!   graph with unconditional and on-true/on-false edges
//! - **Engine**: depth-first execution of one workflow for one event,
//!   dispatching actions into plugins found in the registry
//! - **Dispatcher**: the process-wide event bus with a bounded run pool
//! - **Store**: validated persistence of workflow definitions, including
//!   migration of the flat `{trigger, actions[]}` format

pub mod catalog;
pub mod condition;
pub mod definition;
pub mod dispatcher;
pub mod edge;
pub mod engine;
pub mod error;
pub mod event;
pub mod execution;
pub mod graph;
pub mod history;
pub mod legacy;
pub mod node;
pub mod store;
pub mod template;

pub use catalog::{ActionKind, EventType, FieldKind, ParseCatalogError, PayloadSchema};
pub use condition::{Condition, ConditionWarning, Evaluation, Operator, evaluate};
pub use definition::{Workflow, WorkflowMetadata, WorkflowRecord, WorkflowSummary};
pub use dispatcher::{Dispatcher, DispatcherConfig, EventSink};
pub use edge::{Edge, EdgeRef};
pub use engine::{DEFAULT_ACTION_TIMEOUT, Engine};
pub use error::{ActionDispatchError, DispatchError, GraphError, StoreError, WorkflowError};
pub use event::{Event, lookup_path};
pub use execution::{ActionOutcome, DispatchRecord, RunPhase, RunReport};
pub use graph::WorkflowGraph;
pub use history::{DispatchHistory, InMemoryHistory};
pub use node::{ActionSpec, Node, NodeId, NodeKind, TriggerSpec};
pub use store::{
    JsonFileStore, KeyValueStore, LoadOutcome, MemoryKeyValueStore, SkippedWorkflow, WorkflowStore,
};
pub use template::{Rendered, render};

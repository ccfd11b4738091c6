//! Core types shared across the toolbar automation crates.
//!
//! Provides the rootcause-based `Result` alias and the ULID-backed
//! identifiers used by workflows, runs, events and dispatch records.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{DispatchId, EventId, ParseIdError, WorkflowId, WorkflowRunId};

//! Toolbar daemon.
//!
//! Hosts the built-in and manifest-declared plugins, loads workflow
//! definitions, and runs them against notifications read from stdin.

pub mod app;
pub mod commands;
pub mod config;
pub mod error;
pub mod ingest;
pub mod plugins;

//! Error types for the daemon.

use std::fmt;
use std::path::PathBuf;

/// Errors that stop a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// Configuration could not be loaded.
    Config { reason: String },
    /// Plugins could not be resolved or loaded.
    Plugins { reason: String },
    /// The workflow store could not be loaded.
    Workflows { reason: String },
    /// An input file could not be read or parsed.
    Input { path: PathBuf, reason: String },
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { reason } => write!(f, "configuration error: {reason}"),
            Self::Plugins { reason } => write!(f, "plugin startup failed: {reason}"),
            Self::Workflows { reason } => write!(f, "workflow store unavailable: {reason}"),
            Self::Input { path, reason } => {
                write!(f, "cannot read '{}': {reason}", path.display())
            }
        }
    }
}

impl std::error::Error for AppError {}

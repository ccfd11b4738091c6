//! Error types for the integration crate.

use std::fmt;
use toolbar_workflow::DispatchError;

/// Errors from normalizing or forwarding a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterError {
    /// No adapter is registered for the notification source.
    UnknownSource { source: String },
    /// A field the event needs is absent or has the wrong shape.
    MissingField {
        source: &'static str,
        kind: String,
        field: &'static str,
    },
    /// The event sink refused the event.
    Emit(DispatchError),
}

impl fmt::Display for AdapterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownSource { source } => {
                write!(f, "no notification adapter for source '{source}'")
            }
            Self::MissingField {
                source,
                kind,
                field,
            } => {
                write!(f, "{source} '{kind}' notification is missing {field}")
            }
            Self::Emit(e) => write!(f, "event not accepted: {e}"),
        }
    }
}

impl std::error::Error for AdapterError {}

impl From<DispatchError> for AdapterError {
    fn from(e: DispatchError) -> Self {
        Self::Emit(e)
    }
}

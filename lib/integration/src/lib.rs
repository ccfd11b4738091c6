//! Notification adapters for toolbar.
//!
//! GitHub and Linear notifications, whether pushed by a webhook or found
//! by a poller, are normalized into [`toolbar_workflow::Event`]s. The
//! [`Ingestor`] suppresses copies of the same change inside a time window
//! and forwards the rest to an event sink, usually the dispatcher.

pub mod adapter;
pub mod dedup;
pub mod error;
pub mod github;
pub mod linear;

pub use adapter::{IngestOutcome, Ingestor, Normalized, Notification, NotificationAdapter};
pub use dedup::{DEFAULT_WINDOW_SECS, Deduplicator, Seen};
pub use error::AdapterError;
pub use github::GithubAdapter;
pub use linear::LinearAdapter;

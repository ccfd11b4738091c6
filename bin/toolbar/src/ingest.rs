//! JSON-lines notification intake.
//!
//! Each non-blank line is one [`Notification`]:
//! `{"source": "github", "kind": "pull_request", "payload": {...}}`.

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use toolbar_integration::{AdapterError, IngestOutcome, Ingestor, Notification};
use tracing::warn;

/// Counters for one intake session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub emitted: usize,
    pub duplicates: usize,
    pub ignored: usize,
    pub rejected: usize,
}

/// Feeds every line of `reader` to `ingestor` until end of input.
///
/// Bad lines are logged and counted. Reading stops early once the
/// dispatcher refuses events.
pub async fn ingest_lines<R>(reader: R, ingestor: &Ingestor) -> IngestStats
where
    R: AsyncBufRead + Unpin,
{
    let mut stats = IngestStats::default();
    let mut lines = reader.lines();
    let mut line_no = 0usize;
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Reading notifications failed");
                break;
            }
        };
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }

        let notification: Notification = match serde_json::from_str(&line) {
            Ok(notification) => notification,
            Err(e) => {
                warn!(line = line_no, error = %e, "Unparseable notification");
                stats.rejected += 1;
                continue;
            }
        };
        match ingestor.ingest(notification).await {
            Ok(IngestOutcome::Emitted(_)) => stats.emitted += 1,
            Ok(IngestOutcome::Duplicate) => stats.duplicates += 1,
            Ok(IngestOutcome::Ignored) => stats.ignored += 1,
            Err(AdapterError::Emit(e)) => {
                warn!(line = line_no, error = %e, "Dispatcher stopped accepting events");
                stats.rejected += 1;
                break;
            }
            Err(e) => {
                warn!(line = line_no, error = %e, "Notification rejected");
                stats.rejected += 1;
            }
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use toolbar_integration::{Deduplicator, GithubAdapter};
    use toolbar_workflow::{DispatchError, Event, EventSink, EventType};

    #[derive(Default)]
    struct Collect(Mutex<Vec<Event>>);

    #[async_trait]
    impl EventSink for Collect {
        async fn emit(&self, event: Event) -> Result<(), DispatchError> {
            self.0.lock().unwrap().push(event);
            Ok(())
        }
    }

    #[tokio::test]
    async fn counts_each_line() {
        let sink = Arc::new(Collect::default());
        let ingestor = Ingestor::new(sink.clone() as Arc<dyn EventSink>, Deduplicator::new(60))
            .with_adapter(Arc::new(GithubAdapter));
        let branch = r#"{"source":"github","kind":"create","payload":{"ref":"feature/x","ref_type":"branch","repository":{"full_name":"acme/site"},"sender":{"login":"octo"}}}"#;
        let input = format!(
            "{branch}\n\n{branch}\n{{\"source\":\"github\",\"kind\":\"ping\"}}\nnot json\n{{\"source\":\"jira\",\"kind\":\"issue\"}}\n"
        );

        let stats = ingest_lines(input.as_bytes(), &ingestor).await;
        assert_eq!(
            stats,
            IngestStats {
                emitted: 1,
                duplicates: 1,
                ignored: 1,
                rejected: 2,
            }
        );
        let events = sink.0.lock().unwrap();
        assert_eq!(events[0].event_type, EventType::GithubBranchCreated);
    }
}

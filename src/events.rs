//! Deduplicated installation event stream
//!
//! The orchestration API's event feed returns the full history on every
//! read, so the stream keeps a set of already-emitted event ids and
//! forwards each event at most once per process lifetime. The set only
//! grows; event feeds for one install are small enough that unbounded
//! dedup is the right trade against ever re-emitting.

use crate::api::types::EventRecord;
use crate::api::InstallApiClient;
use crate::error::ApiError;
use slog::{debug, Logger};
use std::collections::HashSet;

/// Severity of an installation event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl EventSeverity {
    fn parse(severity: &str) -> Self {
        match severity {
            "warning" => EventSeverity::Warning,
            "error" => EventSeverity::Error,
            "critical" => EventSeverity::Critical,
            _ => EventSeverity::Info,
        }
    }
}

/// One deduplicated installation event
#[derive(Debug, Clone)]
pub struct InstallEvent {
    pub id: String,
    pub message: String,
    pub severity: EventSeverity,
}

/// Stream of never-before-seen installation events.
///
/// Owns its dedup set; nothing else reads or writes it.
pub struct EventStream {
    seen: HashSet<String>,
    logger: Logger,
}

impl EventStream {
    pub fn new(logger: Logger) -> Self {
        Self {
            seen: HashSet::new(),
            logger,
        }
    }

    /// Fetch the feed and return only events not emitted before.
    ///
    /// A failed read yields no events; the feed is re-read in full on
    /// the next poll, so nothing is lost to a transient failure.
    pub async fn poll(
        &mut self,
        client: &InstallApiClient,
        cluster_id: &str,
    ) -> Result<Vec<InstallEvent>, ApiError> {
        let records = client.events(cluster_id).await?;
        Ok(self.ingest(records))
    }

    /// Filter records down to first-time events and mark them seen.
    fn ingest(&mut self, records: Vec<EventRecord>) -> Vec<InstallEvent> {
        let mut fresh = Vec::new();

        for record in records {
            let key = record.dedup_key();
            if !self.seen.insert(key.clone()) {
                continue;
            }

            fresh.push(InstallEvent {
                id: key,
                severity: EventSeverity::parse(record.severity.as_deref().unwrap_or("")),
                message: record.message.unwrap_or_default(),
            });
        }

        if !fresh.is_empty() {
            debug!(self.logger, "New installation events"; "count" => fresh.len());
        }

        fresh
    }

    /// Number of distinct events emitted so far.
    pub fn emitted_count(&self) -> usize {
        self.seen.len()
    }
}

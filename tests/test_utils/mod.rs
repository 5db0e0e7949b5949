//! Test utilities and fixtures for reso-helper tests

#![allow(dead_code)]

use anyhow::Result;
use reso_helper::data::{HostKey, SessionRecord, SessionTable};
use reso_helper::integrations::ingest::SessionSink;
use reso_helper::presence::{AggregatorOptions, PresencePublisher, SessionAggregator};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Debounce delay used by the tests
pub const DELAY: Duration = Duration::from_secs(5);

/// Build a table from (name, count) pairs, in order
pub fn table(entries: &[(&str, u32)]) -> SessionTable {
    entries
        .iter()
        .map(|(name, count)| SessionRecord::new(*name, *count))
        .collect()
}

/// Publisher that records every status it is given
#[derive(Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<String>>,
}

impl RecordingPublisher {
    pub fn published(&self) -> Vec<String> {
        self.published.lock().unwrap().clone()
    }
}

impl PresencePublisher for RecordingPublisher {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn publish(&self, status: &str) -> Result<()> {
        self.published.lock().unwrap().push(status.to_string());
        Ok(())
    }
}

/// Publisher that records attempts and always fails
#[derive(Default)]
pub struct FailingPublisher {
    attempts: Mutex<Vec<String>>,
}

impl FailingPublisher {
    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }
}

impl PresencePublisher for FailingPublisher {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn publish(&self, status: &str) -> Result<()> {
        self.attempts.lock().unwrap().push(status.to_string());
        anyhow::bail!("platform rejected status")
    }
}

/// Sink that records every report it receives
#[derive(Default)]
pub struct RecordingSink {
    reports: Mutex<Vec<(HostKey, SessionTable)>>,
}

impl RecordingSink {
    pub fn reports(&self) -> Vec<(HostKey, SessionTable)> {
        self.reports.lock().unwrap().clone()
    }
}

impl SessionSink for RecordingSink {
    fn sessions_updated(&self, host: HostKey, sessions: SessionTable) {
        self.reports.lock().unwrap().push((host, sessions));
    }
}

pub fn aggregator_with(publisher: Arc<dyn PresencePublisher>) -> SessionAggregator {
    SessionAggregator::new(
        publisher,
        AggregatorOptions {
            delay: DELAY,
            strip_tag: "[fp]".to_string(),
        },
    )
}

pub fn recording_aggregator() -> (SessionAggregator, Arc<RecordingPublisher>) {
    let publisher = Arc::new(RecordingPublisher::default());
    (aggregator_with(publisher.clone()), publisher)
}

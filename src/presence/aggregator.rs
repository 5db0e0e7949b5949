//! Debounced aggregation of host session reports.
//!
//! `update` and the timer fire share one lock over the aggregate state and
//! the timer. The fire renders a snapshot under the lock and publishes after
//! releasing it, so a slow publisher never blocks incoming reports.

use super::debounce::DebounceTimer;
use super::PresencePublisher;
use crate::config::PresenceConfig;
use crate::data::{render_status, AggregateState, HostKey, SessionTable};
use chrono::Utc;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Tunables for the aggregator
#[derive(Debug, Clone)]
pub struct AggregatorOptions {
    /// Delay between the first update after idle and the publish
    pub delay: Duration,
    /// Cosmetic tag stripped from session names
    pub strip_tag: String,
}

impl Default for AggregatorOptions {
    fn default() -> Self {
        Self::from(&PresenceConfig::default())
    }
}

impl From<&PresenceConfig> for AggregatorOptions {
    fn from(config: &PresenceConfig) -> Self {
        Self {
            delay: Duration::from_secs(config.debounce_secs),
            strip_tag: config.strip_tag.clone(),
        }
    }
}

#[derive(Default)]
struct Slot {
    aggregate: AggregateState,
    timer: DebounceTimer,
}

struct Shared {
    slot: Mutex<Slot>,
    publisher: Arc<dyn PresencePublisher>,
    options: AggregatorOptions,
}

/// Buffers the latest report per host and publishes a coalesced status line.
///
/// Cheap to clone; clones share state. `update` must be called from within a
/// Tokio runtime because it schedules the publish as a task.
#[derive(Clone)]
pub struct SessionAggregator {
    shared: Arc<Shared>,
}

impl SessionAggregator {
    pub fn new(publisher: Arc<dyn PresencePublisher>, options: AggregatorOptions) -> Self {
        Self {
            shared: Arc::new(Shared {
                slot: Mutex::new(Slot::default()),
                publisher,
                options,
            }),
        }
    }

    pub fn options(&self) -> &AggregatorOptions {
        &self.shared.options
    }

    /// Replace the sessions of `host` and schedule a publish if none is pending.
    pub fn update(&self, host: impl Into<HostKey>, sessions: SessionTable) {
        let host = host.into();
        let mut slot = self.lock();

        tracing::debug!("Sessions updated for {} ({} sessions)", host, sessions.len());
        slot.aggregate.replace(host, sessions, Utc::now());

        let delay = self.shared.options.delay;
        let armed = slot.timer.arm(|epoch| {
            let this = self.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                this.fire(epoch);
            })
        });

        if armed {
            tracing::debug!("Status publish scheduled in {:?}", delay);
        }
    }

    /// Render the current state without touching the timer
    pub fn render(&self) -> String {
        render_status(&self.lock().aggregate, &self.shared.options.strip_tag)
    }

    /// Copy of the current per-host state
    pub fn snapshot(&self) -> AggregateState {
        self.lock().aggregate.clone()
    }

    /// Whether a publish is scheduled
    pub fn is_pending(&self) -> bool {
        self.lock().timer.is_pending()
    }

    /// Cancel a scheduled publish without rendering. State is kept.
    pub fn shutdown(&self) {
        if self.lock().timer.cancel() {
            tracing::debug!("Cancelled pending status publish");
        }
    }

    fn fire(&self, epoch: u64) {
        let status = {
            let mut slot = self.lock();
            if !slot.timer.settle(epoch) {
                return;
            }
            render_status(&slot.aggregate, &self.shared.options.strip_tag)
        };

        let publisher = &self.shared.publisher;
        tracing::info!("Updating status: {}", status);
        if let Err(e) = publisher.publish(&status) {
            tracing::warn!("Failed to publish status via {}: {:#}", publisher.name(), e);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.shared.slot.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Aggregator lock poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::SessionRecord;
    use anyhow::Result;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl PresencePublisher for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        fn publish(&self, status: &str) -> Result<()> {
            self.0.lock().unwrap().push(status.to_string());
            Ok(())
        }
    }

    fn aggregator(recorder: Arc<Recorder>) -> SessionAggregator {
        SessionAggregator::new(
            recorder,
            AggregatorOptions {
                delay: Duration::from_secs(5),
                strip_tag: "[fp]".to_string(),
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn update_arms_timer() {
        let recorder = Arc::new(Recorder::default());
        let agg = aggregator(recorder.clone());

        assert!(!agg.is_pending());
        agg.update("host", [SessionRecord::new("Forest", 1)].into_iter().collect());
        assert!(agg.is_pending());

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(!agg.is_pending());
        assert_eq!(*recorder.0.lock().unwrap(), vec!["Forest: 1".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn render_does_not_disarm() {
        let recorder = Arc::new(Recorder::default());
        let agg = aggregator(recorder.clone());

        agg.update("host", [SessionRecord::new("Forest", 2)].into_iter().collect());
        assert_eq!(agg.render(), "Forest: 2");
        assert!(agg.is_pending());
        assert!(recorder.0.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_keeps_state() {
        let recorder = Arc::new(Recorder::default());
        let agg = aggregator(recorder.clone());

        agg.update("host", [SessionRecord::new("Forest", 2)].into_iter().collect());
        agg.shutdown();

        assert!(!agg.is_pending());
        assert_eq!(agg.snapshot().host("host").unwrap().sessions.len(), 1);
    }
}
